//! Decoding of the mining service payload.
//!
//! The service answers with a JSON array of records:
//!
//! ```json
//! [{"token": {"id": "HP:0003198", "categories": ["Phenotype"], "terms": ["myopathy"]},
//!   "start": 12, "end": 20}]
//! ```
//!
//! `start` and `end` count UTF-16 code units of the query text.
//!
//! A payload that is not an array fails the whole round. Individual records
//! that do not fit are dropped and logged.

use std::collections::HashSet;

use phenomine_core::{ConceptId, MinedConcept, OffsetTable, Span, Term};
use serde::Deserialize;

use crate::error::MiningError;

#[derive(Debug, Deserialize)]
struct RawRecord {
    token: RawToken,
    start: usize,
    end: usize,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    id: String,
    #[serde(default)]
    terms: Vec<String>,
}

impl RawRecord {
    fn into_concept(self, query: &str, offsets: &OffsetTable) -> Result<MinedConcept, &'static str> {
        let span = Span::new(self.start, self.end).ok_or("start after end")?;
        if span.end > offsets.len() {
            return Err("span past end of query text");
        }
        if !self.token.id.contains(':') {
            return Err("id without namespace prefix");
        }
        let mut labels = self.token.terms.into_iter();
        let name = labels.next().ok_or("no term labels")?;

        let matched_text = offsets.slice(query, span.start, span.end).to_string();
        Ok(MinedConcept {
            span,
            term: Term::new(ConceptId::new(self.token.id), name).with_synonyms(labels.collect()),
            matched_text,
        })
    }
}

/// Decode `payload` mined from `query`, keeping only hits from the
/// `vocabulary` namespace. Exact duplicates are collapsed, payload order is
/// kept otherwise.
pub fn decode(payload: &str, query: &str, vocabulary: &str) -> Result<Vec<MinedConcept>, MiningError> {
    let records: Vec<serde_json::Value> =
        serde_json::from_str(payload).map_err(|e| MiningError::MalformedPayload(e.to_string()))?;

    let offsets = OffsetTable::new(query);
    let total = records.len();
    let mut dropped = 0usize;
    let mut foreign = 0usize;
    let mut seen: HashSet<(ConceptId, Span)> = HashSet::new();
    let mut concepts = Vec::new();

    for (index, value) in records.into_iter().enumerate() {
        let concept = serde_json::from_value::<RawRecord>(value)
            .map_err(|e| e.to_string())
            .and_then(|raw| raw.into_concept(query, &offsets).map_err(str::to_string));
        let concept = match concept {
            Ok(concept) => concept,
            Err(reason) => {
                tracing::debug!(index, reason = %reason, "dropping mining record");
                dropped += 1;
                continue;
            }
        };

        if !concept.term.id.has_prefix(vocabulary) {
            foreign += 1;
            continue;
        }
        if seen.insert((concept.term.id.clone(), concept.span)) {
            concepts.push(concept);
        }
    }

    tracing::debug!(
        total,
        kept = concepts.len(),
        dropped,
        foreign,
        vocabulary,
        "decoded mining payload"
    );
    Ok(concepts)
}
