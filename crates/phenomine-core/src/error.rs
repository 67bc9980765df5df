use crate::model::ConceptId;

/// Local, non-fatal failures of tree navigation and focus requests.
///
/// Callers log these and keep the current selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("no path from {term} to root {root}")]
    PathNotFound { term: ConceptId, root: ConceptId },
    #[error("term id not present in the ontology: {0}")]
    UnresolvedId(String),
    #[error("malformed term id: {0:?}")]
    MalformedId(String),
}

/// Problems found while assembling an in-memory ontology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OntologyError {
    #[error("root term {0} was never added")]
    UnknownRoot(ConceptId),
    #[error("edge {child} -> {parent} references an unknown term")]
    DanglingEdge { child: ConceptId, parent: ConceptId },
    #[error("root term {0} must not have parents")]
    RootHasParent(ConceptId),
    #[error("term {0} is part of a parent cycle")]
    Cycle(ConceptId),
}
