//! Phenotype concept model.
//!
//! Terms are owned by the ontology and shared by reference (`Arc<Term>`);
//! annotations are cheap values created per mining round.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::NavigationError;

// ============================================================================
// Identifiers
// ============================================================================

/// Namespaced concept identifier such as `HP:0001324`.
///
/// Equality is plain string equality; the prefix is everything before the
/// first `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(String);

impl ConceptId {
    /// Wrap an identifier without validating it.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an identifier that must look like `PREFIX:LOCAL` with both parts
    /// non-empty and no surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, NavigationError> {
        match raw.split_once(':') {
            Some((prefix, local))
                if !prefix.is_empty()
                    && !local.is_empty()
                    && !raw.chars().any(char::is_whitespace) =>
            {
                Ok(Self(raw.to_string()))
            }
            _ => Err(NavigationError::MalformedId(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace prefix (`HP` for `HP:0001324`). Ids without a `:` have the
    /// whole string as prefix.
    pub fn prefix(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.contains(':') && self.prefix() == prefix
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConceptId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Terms and spans
// ============================================================================

/// A vocabulary term. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    pub id: ConceptId,
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub definition: Option<String>,
}

impl Term {
    pub fn new(id: impl Into<ConceptId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            synonyms: Vec::new(),
            definition: None,
        }
    }

    pub fn with_synonyms(mut self, synonyms: Vec<String>) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }
}

impl From<String> for ConceptId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Half-open `[start, end)` offset range, counted in UTF-16 code units of the
/// text it was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Build a span; `None` when `end < start`.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Zero-width span at the beginning of the text, used for terms added by
    /// hand from the tree rather than mined from text.
    pub fn empty() -> Self {
        Self { start: 0, end: 0 }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A raw hit from the mining service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MinedConcept {
    pub span: Span,
    pub term: Term,
    /// The slice of query text covered by `span`.
    pub matched_text: String,
}

/// Curated, user-facing annotation. `present == false` marks a NOT finding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhenotypeTerm {
    pub term: Arc<Term>,
    pub span: Span,
    pub present: bool,
}

impl PhenotypeTerm {
    pub fn new(term: Arc<Term>, span: Span, present: bool) -> Self {
        Self {
            term,
            span,
            present,
        }
    }

    pub fn id(&self) -> &ConceptId {
        &self.term.id
    }

    /// Identity used for the side-panel deduplication.
    pub fn key(&self) -> (&ConceptId, bool) {
        (&self.term.id, self.present)
    }
}

impl From<MinedConcept> for PhenotypeTerm {
    fn from(mined: MinedConcept) -> Self {
        Self::new(Arc::new(mined.term), mined.span, true)
    }
}

// ============================================================================
// Annotation set
// ============================================================================

/// Ordered collection of annotations for one query text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSet {
    terms: Vec<PhenotypeTerm>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge freshly mined annotations with previously approved ones. Exact
    /// duplicates (same id, presence and span) are dropped, first one wins.
    pub fn merge(
        mined: impl IntoIterator<Item = PhenotypeTerm>,
        approved: impl IntoIterator<Item = PhenotypeTerm>,
    ) -> Self {
        let mut set = Self::new();
        set.extend(mined.into_iter().chain(approved));
        set
    }

    /// Add an annotation unless an exact duplicate is already present.
    /// Returns whether it was inserted.
    pub fn insert(&mut self, term: PhenotypeTerm) -> bool {
        if self.terms.contains(&term) {
            return false;
        }
        self.terms.push(term);
        true
    }

    pub fn extend(&mut self, terms: impl IntoIterator<Item = PhenotypeTerm>) {
        for term in terms {
            self.insert(term);
        }
    }

    /// Remove every annotation with the given identity; returns how many went.
    pub fn remove(&mut self, id: &ConceptId, present: bool) -> usize {
        let before = self.terms.len();
        self.terms.retain(|t| !(t.id() == id && t.present == present));
        before - self.terms.len()
    }

    /// Whether an annotation with this identity is present, whatever its span.
    pub fn contains_key(&self, id: &ConceptId, present: bool) -> bool {
        self.terms.iter().any(|t| t.id() == id && t.present == present)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhenotypeTerm> {
        self.terms.iter()
    }

    pub fn as_slice(&self) -> &[PhenotypeTerm] {
        &self.terms
    }

    /// Move every annotation of `id` into the given presence class. Returns
    /// how many annotations changed; exact duplicates produced by the move
    /// are folded together.
    pub fn reclassify(&mut self, id: &ConceptId, present: bool) -> usize {
        let mut changed = 0;
        for term in self.terms.iter_mut() {
            if term.id() == id && term.present != present {
                term.present = present;
                changed += 1;
            }
        }
        if changed > 0 {
            let terms = std::mem::take(&mut self.terms);
            self.extend(terms);
        }
        changed
    }

    /// Annotations in render order: ascending `span.start`, ties keep
    /// insertion order.
    pub fn by_start(&self) -> Vec<&PhenotypeTerm> {
        let mut out: Vec<&PhenotypeTerm> = self.terms.iter().collect();
        out.sort_by_key(|t| t.span.start);
        out
    }

    /// Annotations in list order: by term name, ties keep insertion order.
    pub fn by_name(&self) -> Vec<&PhenotypeTerm> {
        let mut out: Vec<&PhenotypeTerm> = self.terms.iter().collect();
        out.sort_by(|a, b| compare_names(&a.term, &b.term));
        out
    }

    /// Split into present / NOT partitions, ordered by name, keeping the
    /// first annotation for each distinct id within a partition.
    pub fn side_panel(&self) -> SidePanel {
        let mut panel = SidePanel::default();
        let mut seen_present: HashSet<&ConceptId> = HashSet::new();
        let mut seen_excluded: HashSet<&ConceptId> = HashSet::new();

        for term in self.by_name() {
            if term.present {
                if seen_present.insert(term.id()) {
                    panel.present.push(term.clone());
                }
            } else if seen_excluded.insert(term.id()) {
                panel.excluded.push(term.clone());
            }
        }
        panel
    }
}

impl FromIterator<PhenotypeTerm> for AnnotationSet {
    fn from_iter<I: IntoIterator<Item = PhenotypeTerm>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a AnnotationSet {
    type Item = &'a PhenotypeTerm;
    type IntoIter = std::slice::Iter<'a, PhenotypeTerm>;

    fn into_iter(self) -> Self::IntoIter {
        self.terms.iter()
    }
}

/// The two checkbox lists shown next to the rendered text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidePanel {
    pub present: Vec<PhenotypeTerm>,
    pub excluded: Vec<PhenotypeTerm>,
}

impl SidePanel {
    pub fn len(&self) -> usize {
        self.present.len() + self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn compare_names(a: &Term, b: &Term) -> Ordering {
    a.name.cmp(&b.name)
}
