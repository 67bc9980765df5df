//! Curator review of one mining round.
//!
//! A round shows the query text with highlighted concepts next to two
//! checkbox lists (present / NOT). The curator ticks what they accept, may
//! move a concept between the lists, and finishes the round with a
//! [`Signal`].

use std::collections::HashSet;

use phenomine_core::annotate::render_set;
use phenomine_core::{render_document, AnnotationSet, ConceptId, PhenotypeTerm, SidePanel};

use crate::session::RoundToken;

/// How the curator ended a review round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Done,
    Cancelled,
}

type Key = (ConceptId, bool);

#[derive(Debug, Clone)]
pub struct ReviewRound {
    token: RoundToken,
    query: String,
    annotations: AnnotationSet,
    panel: SidePanel,
    approved: HashSet<Key>,
}

impl ReviewRound {
    /// `preapproved` keys start ticked; everything else starts unticked.
    pub fn new(
        token: RoundToken,
        query: impl Into<String>,
        annotations: AnnotationSet,
        preapproved: impl IntoIterator<Item = Key>,
    ) -> Self {
        let panel = annotations.side_panel();
        let mut round = Self {
            token,
            query: query.into(),
            annotations,
            panel,
            approved: HashSet::new(),
        };
        for (id, present) in preapproved {
            round.set_approved(&id, present, true);
        }
        round
    }

    pub fn token(&self) -> RoundToken {
        self.token
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn annotations(&self) -> &AnnotationSet {
        &self.annotations
    }

    pub fn panel(&self) -> &SidePanel {
        &self.panel
    }

    /// Highlighted markup fragment for the query text.
    pub fn markup(&self) -> String {
        render_set(&self.query, &self.annotations)
    }

    pub fn document(&self) -> String {
        render_document(&self.query, self.annotations.iter())
    }

    /// Side-panel entries with their checkbox state, present list first.
    pub fn entries(&self) -> impl Iterator<Item = (&PhenotypeTerm, bool)> + '_ {
        self.panel
            .present
            .iter()
            .chain(self.panel.excluded.iter())
            .map(|term| (term, self.is_approved(term.id(), term.present)))
    }

    pub fn is_approved(&self, id: &ConceptId, present: bool) -> bool {
        self.approved.contains(&(id.clone(), present))
    }

    fn has_entry(&self, id: &ConceptId, present: bool) -> bool {
        let list = if present { &self.panel.present } else { &self.panel.excluded };
        list.iter().any(|t| t.id() == id)
    }

    /// Set one checkbox. Returns false if there is no such entry.
    pub fn set_approved(&mut self, id: &ConceptId, present: bool, approved: bool) -> bool {
        if !self.has_entry(id, present) {
            tracing::debug!(term = %id, present, "no review entry to tick");
            return false;
        }
        let key = (id.clone(), present);
        if approved {
            self.approved.insert(key);
        } else {
            self.approved.remove(&key);
        }
        true
    }

    /// Flip one checkbox; returns the new state.
    pub fn toggle(&mut self, id: &ConceptId, present: bool) -> Option<bool> {
        let next = !self.is_approved(id, present);
        self.set_approved(id, present, next).then_some(next)
    }

    pub fn approve_all(&mut self) {
        let keys: Vec<Key> = self
            .panel
            .present
            .iter()
            .chain(self.panel.excluded.iter())
            .map(|t| (t.id().clone(), t.present))
            .collect();
        self.approved.extend(keys);
    }

    /// Move every annotation of `id` into the present or NOT list. A ticked
    /// entry stays ticked in its new list. Returns how many annotations moved.
    pub fn reclassify(&mut self, id: &ConceptId, present: bool) -> usize {
        let moved = self.annotations.reclassify(id, present);
        if moved == 0 {
            return 0;
        }
        if self.approved.remove(&(id.clone(), !present)) {
            self.approved.insert((id.clone(), present));
        }
        self.panel = self.annotations.side_panel();
        moved
    }

    /// Ticked entries, one per `(id, present)`, present list first.
    pub fn approved(&self) -> Vec<PhenotypeTerm> {
        self.entries()
            .filter(|(_, approved)| *approved)
            .map(|(term, _)| term.clone())
            .collect()
    }
}
