//! Phenomine core: review phenotype concepts mined from clinical text.
//!
//! ```text
//!   query text ──► mining service ──► MinedConcept* ──┐
//!                                                      ▼
//!   approved PhenotypeTerm* ─────────────────► AnnotationSet
//!                                                 │        │
//!                                   annotate::render   side_panel()
//!                                                 │
//!                           click ──► resolve_focus ──► TreeNavigator::focus
//! ```
//!
//! - [`annotate`] lays highlighted, possibly overlapping spans over the text.
//! - [`navigator`] materializes the term hierarchy lazily and jumps to terms.
//! - [`ontology`] is the read-only graph seam both of them query.
//!
//! Networking and round bookkeeping live in `phenomine-mining`.

pub mod annotate;
pub mod error;
pub mod labels;
pub mod model;
pub mod navigator;
pub mod offsets;
pub mod ontology;

pub use annotate::{layout, render, render_document, resolve_focus, Segment};
pub use error::{NavigationError, OntologyError};
pub use labels::LabelIndex;
pub use model::{AnnotationSet, ConceptId, MinedConcept, PhenotypeTerm, SidePanel, Span, Term};
pub use navigator::{Navigation, NodeId, ParentPolicy, TreeNavigator, VisibleRow};
pub use offsets::{text_len, OffsetTable};
pub use ontology::{GraphQuery, MemoryOntology, MemoryOntologyBuilder};
