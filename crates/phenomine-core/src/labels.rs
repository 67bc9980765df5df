//! Term name → id lookup backing the tree search box.

use std::collections::BTreeMap;

use crate::model::ConceptId;
use crate::ontology::GraphQuery;

#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    by_name: BTreeMap<String, ConceptId>,
    /// lowercased name -> original names, for prefix completion
    folded: BTreeMap<String, Vec<String>>,
}

impl LabelIndex {
    /// Index every term of the graph by name. When two terms share a name the
    /// first one enumerated keeps it.
    pub fn build(graph: &dyn GraphQuery) -> Self {
        let mut index = Self::default();
        for term in graph.all_terms() {
            index.insert(&term.name, &term.id);
        }
        tracing::debug!(labels = index.len(), "built term label index");
        index
    }

    fn insert(&mut self, name: &str, id: &ConceptId) {
        if self.by_name.contains_key(name) {
            return;
        }
        self.by_name.insert(name.to_string(), id.clone());
        self.folded
            .entry(name.to_lowercase())
            .or_default()
            .push(name.to_string());
    }

    pub fn lookup(&self, name: &str) -> Option<&ConceptId> {
        self.by_name.get(name)
    }

    /// Names starting with `prefix` (case-insensitive), sorted, at most
    /// `limit` of them.
    pub fn complete(&self, prefix: &str, limit: usize) -> Vec<&str> {
        let folded = prefix.to_lowercase();
        self.folded
            .range(folded.clone()..)
            .take_while(|(key, _)| key.starts_with(&folded))
            .flat_map(|(_, names)| names.iter().map(String::as_str))
            .take(limit)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
