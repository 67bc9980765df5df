//! Graph query facade over the term hierarchy.
//!
//! The hierarchy is a single-rooted DAG of `is_a` edges. The navigator and
//! the curation session only ever see it through [`GraphQuery`]; loading the
//! ontology from disk is the host application's job.
//!
//! [`MemoryOntology`] is a small in-memory implementation used by hosts that
//! already hold the terms, and by tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::OntologyError;
use crate::model::{ConceptId, Term};

/// Read-only queries over a term hierarchy.
pub trait GraphQuery: Send + Sync {
    fn term_for_id(&self, id: &ConceptId) -> Option<Arc<Term>>;

    /// Direct parents in the order the graph declares them.
    fn parents_of(&self, id: &ConceptId) -> Vec<ConceptId>;

    /// Direct children in the order the graph declares them.
    fn children_of(&self, id: &ConceptId) -> Vec<ConceptId>;

    /// Whether `to` is reachable from `from` by following parent edges.
    /// A term always reaches itself.
    fn exists_path(&self, from: &ConceptId, to: &ConceptId) -> bool;

    fn root_id(&self) -> ConceptId;

    fn all_terms(&self) -> Vec<Arc<Term>>;
}

// ============================================================================
// In-memory ontology
// ============================================================================

#[derive(Debug, Clone)]
pub struct MemoryOntology {
    root: ConceptId,
    terms: HashMap<ConceptId, Arc<Term>>,
    /// Insertion order of `terms`, so `all_terms` is deterministic.
    order: Vec<ConceptId>,
    parents: HashMap<ConceptId, Vec<ConceptId>>,
    children: HashMap<ConceptId, Vec<ConceptId>>,
}

impl MemoryOntology {
    pub fn builder() -> MemoryOntologyBuilder {
        MemoryOntologyBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl GraphQuery for MemoryOntology {
    fn term_for_id(&self, id: &ConceptId) -> Option<Arc<Term>> {
        self.terms.get(id).cloned()
    }

    fn parents_of(&self, id: &ConceptId) -> Vec<ConceptId> {
        self.parents.get(id).cloned().unwrap_or_default()
    }

    fn children_of(&self, id: &ConceptId) -> Vec<ConceptId> {
        self.children.get(id).cloned().unwrap_or_default()
    }

    fn exists_path(&self, from: &ConceptId, to: &ConceptId) -> bool {
        if !self.terms.contains_key(from) {
            return false;
        }
        let mut seen: HashSet<&ConceptId> = HashSet::new();
        let mut queue: VecDeque<&ConceptId> = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(parents) = self.parents.get(current) {
                queue.extend(parents.iter());
            }
        }
        false
    }

    fn root_id(&self) -> ConceptId {
        self.root.clone()
    }

    fn all_terms(&self) -> Vec<Arc<Term>> {
        self.order
            .iter()
            .filter_map(|id| self.terms.get(id).cloned())
            .collect()
    }
}

/// Collects terms and `is_a` edges, then validates them into a
/// [`MemoryOntology`].
#[derive(Debug, Default)]
pub struct MemoryOntologyBuilder {
    terms: Vec<Term>,
    edges: Vec<(ConceptId, ConceptId)>,
}

impl MemoryOntologyBuilder {
    pub fn term(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    /// Declare `child is_a parent`. Declaration order is the order
    /// `parents_of` / `children_of` report.
    pub fn is_a(mut self, child: impl Into<ConceptId>, parent: impl Into<ConceptId>) -> Self {
        self.edges.push((child.into(), parent.into()));
        self
    }

    pub fn build(self, root: impl Into<ConceptId>) -> Result<MemoryOntology, OntologyError> {
        let root = root.into();
        let mut terms = HashMap::new();
        let mut order = Vec::new();
        for term in self.terms {
            let id = term.id.clone();
            if terms.insert(id.clone(), Arc::new(term)).is_none() {
                order.push(id);
            }
        }
        if !terms.contains_key(&root) {
            return Err(OntologyError::UnknownRoot(root));
        }

        let mut parents: HashMap<ConceptId, Vec<ConceptId>> = HashMap::new();
        let mut children: HashMap<ConceptId, Vec<ConceptId>> = HashMap::new();
        for (child, parent) in self.edges {
            if !terms.contains_key(&child) || !terms.contains_key(&parent) {
                return Err(OntologyError::DanglingEdge { child, parent });
            }
            if child == root {
                return Err(OntologyError::RootHasParent(root));
            }
            let ps = parents.entry(child.clone()).or_default();
            if !ps.contains(&parent) {
                ps.push(parent.clone());
                children.entry(parent).or_default().push(child);
            }
        }

        check_acyclic(&order, &parents)?;

        Ok(MemoryOntology {
            root,
            terms,
            order,
            parents,
            children,
        })
    }
}

fn check_acyclic(
    order: &[ConceptId],
    parents: &HashMap<ConceptId, Vec<ConceptId>>,
) -> Result<(), OntologyError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<&ConceptId, Mark> = HashMap::new();
    for start in order {
        if marks.contains_key(start) {
            continue;
        }
        // iterative DFS: (node, next parent index)
        let mut stack: Vec<(&ConceptId, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::Visiting);
        while let Some((node, idx)) = stack.pop() {
            let ps = parents.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if idx < ps.len() {
                stack.push((node, idx + 1));
                let next = &ps[idx];
                match marks.get(next) {
                    Some(Mark::Visiting) => return Err(OntologyError::Cycle(next.clone())),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::Visiting);
                        stack.push((next, 0));
                    }
                }
            } else {
                marks.insert(node, Mark::Done);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> MemoryOntology {
        MemoryOntology::builder()
            .term(Term::new("HP:0000001", "All"))
            .term(Term::new("HP:0000118", "Phenotypic abnormality"))
            .term(Term::new("HP:0003011", "Abnormality of the musculature"))
            .term(Term::new("HP:0003198", "Myopathy"))
            .term(Term::new("HP:9999999", "Obsolete term"))
            .is_a("HP:0000118", "HP:0000001")
            .is_a("HP:0003011", "HP:0000118")
            .is_a("HP:0003198", "HP:0003011")
            .build("HP:0000001")
            .unwrap()
    }

    #[test]
    fn reports_parents_and_children_in_declaration_order() {
        let onto = small();
        assert_eq!(
            onto.children_of(&ConceptId::new("HP:0000001")),
            vec![ConceptId::new("HP:0000118")]
        );
        assert_eq!(
            onto.parents_of(&ConceptId::new("HP:0003198")),
            vec![ConceptId::new("HP:0003011")]
        );
        assert!(onto.children_of(&ConceptId::new("HP:0003198")).is_empty());
    }

    #[test]
    fn exists_path_follows_parent_edges() {
        let onto = small();
        let root = onto.root_id();
        assert!(onto.exists_path(&ConceptId::new("HP:0003198"), &root));
        assert!(onto.exists_path(&root, &root));
        assert!(!onto.exists_path(&ConceptId::new("HP:9999999"), &root));
        assert!(!onto.exists_path(&ConceptId::new("HP:0000000"), &root));
    }

    #[test]
    fn build_rejects_unknown_root_and_dangling_edges() {
        let err = MemoryOntology::builder()
            .term(Term::new("HP:1", "a"))
            .build("HP:0")
            .unwrap_err();
        assert_eq!(err, OntologyError::UnknownRoot(ConceptId::new("HP:0")));

        let err = MemoryOntology::builder()
            .term(Term::new("HP:0", "root"))
            .is_a("HP:1", "HP:0")
            .build("HP:0")
            .unwrap_err();
        assert!(matches!(err, OntologyError::DanglingEdge { .. }));
    }

    #[test]
    fn build_rejects_cycles() {
        let err = MemoryOntology::builder()
            .term(Term::new("HP:0", "root"))
            .term(Term::new("HP:1", "a"))
            .term(Term::new("HP:2", "b"))
            .is_a("HP:1", "HP:0")
            .is_a("HP:1", "HP:2")
            .is_a("HP:2", "HP:1")
            .build("HP:0")
            .unwrap_err();
        assert!(matches!(err, OntologyError::Cycle(_)));
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let onto = MemoryOntology::builder()
            .term(Term::new("HP:0", "root"))
            .term(Term::new("HP:1", "a"))
            .is_a("HP:1", "HP:0")
            .is_a("HP:1", "HP:0")
            .build("HP:0")
            .unwrap();
        assert_eq!(onto.children_of(&ConceptId::new("HP:0")).len(), 1);
    }
}
