//! Highlighted markup over the mined text.
//!
//! Mining hits may overlap. Rendering walks the hits in start order with a
//! cursor that only moves forward: each hit is clamped to start no earlier
//! than where the previous one ended, so every character of the text is
//! emitted exactly once and no wrapper ever covers a negative range. A hit
//! that is completely covered by an earlier, longer one produces no wrapper.
//!
//! Offsets count UTF-16 code units, see [`crate::offsets`].

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::{AnnotationSet, ConceptId, PhenotypeTerm, Span, Term};
use crate::offsets::OffsetTable;

/// Bridge function the embedding view must expose to receive focus
/// requests; highlighted spans call it with the concept id.
pub const FOCUS_BRIDGE_FN: &str = "focusOnTerm";

const DOCUMENT_HEAD: &str = concat!(
    "<html><head><style>",
    ".tooltip { position: relative; display: inline-block; border-bottom: 1px dotted black; color: red; cursor: pointer; }",
    ".tooltip .tooltiptext { visibility: hidden; width: 230px; background-color: #555; color: #fff; text-align: left; ",
    "border-radius: 6px; padding: 5px; position: absolute; z-index: 1; bottom: 125%; left: 50%; margin-left: -60px; ",
    "opacity: 0; transition: opacity 1s; white-space: pre-line; }",
    ".tooltip:hover .tooltiptext { visibility: visible; opacity: 1; }",
    "</style>",
    "<script>function focusOnTerm(id) { phenomine_bridge.focusToTerm(id); }</script>",
    "</head>"
);

const DOCUMENT_BODY_BEGIN: &str = "<body><h2>Text-mining analysis terms:</h2><p>";
const DOCUMENT_BODY_END: &str = "</p></body></html>";

/// One piece of the laid-out text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Plain(&'a str),
    Highlight {
        concept: &'a PhenotypeTerm,
        /// The clamped range actually covered.
        span: Span,
        body: &'a str,
    },
}

impl<'a> Segment<'a> {
    /// The source text this segment covers.
    pub fn text(&self) -> &'a str {
        match self {
            Segment::Plain(text) => text,
            Segment::Highlight { body, .. } => body,
        }
    }
}

/// Lay out `text` against `concepts`, clamping overlaps. Concepts are sorted
/// by `span.start`; ties keep their input order.
pub fn layout<'a>(
    text: &'a str,
    concepts: impl IntoIterator<Item = &'a PhenotypeTerm>,
) -> Vec<Segment<'a>> {
    let bounds = OffsetTable::new(text);
    let len = bounds.len();

    let mut ordered: Vec<&PhenotypeTerm> = concepts.into_iter().collect();
    ordered.sort_by_key(|c| c.span.start);

    let mut segments = Vec::with_capacity(ordered.len() * 2 + 1);
    let mut offset = 0usize;
    for concept in ordered {
        if concept.span.end > len {
            tracing::warn!(
                term = %concept.id(),
                end = concept.span.end,
                text_len = len,
                "span runs past the end of the text; clamping"
            );
        }
        let end = concept.span.end.min(len);
        let start = concept.span.start.max(offset);
        if start >= end {
            tracing::debug!(
                term = %concept.id(),
                start = concept.span.start,
                end = concept.span.end,
                "nothing left of the span to highlight"
            );
            continue;
        }

        if start > offset {
            segments.push(Segment::Plain(bounds.slice(text, offset, start)));
        }
        segments.push(Segment::Highlight {
            concept,
            span: Span { start, end },
            body: bounds.slice(text, start, end),
        });
        offset = end;
    }
    if offset < len {
        segments.push(Segment::Plain(bounds.slice(text, offset, len)));
    }
    segments
}

/// Render `text` as a markup fragment with one clickable, tooltipped wrapper
/// per highlighted span. Runs of whitespace are collapsed and the result is
/// trimmed.
pub fn render<'a>(text: &'a str, concepts: impl IntoIterator<Item = &'a PhenotypeTerm>) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for segment in layout(text, concepts) {
        match segment {
            Segment::Plain(plain) => out.push_str(&escape_text(plain)),
            Segment::Highlight { concept, body, .. } => {
                push_highlight(&mut out, &concept.term, body)
            }
        }
    }
    collapse_whitespace(&out)
}

pub fn render_set(text: &str, set: &AnnotationSet) -> String {
    render(text, set.iter())
}

/// [`render`] wrapped in a standalone document with the tooltip styles and
/// the focus bridge script.
pub fn render_document<'a>(
    text: &'a str,
    concepts: impl IntoIterator<Item = &'a PhenotypeTerm>,
) -> String {
    let fragment = render(text, concepts);
    let mut out = String::with_capacity(
        DOCUMENT_HEAD.len() + DOCUMENT_BODY_BEGIN.len() + fragment.len() + DOCUMENT_BODY_END.len(),
    );
    out.push_str(DOCUMENT_HEAD);
    out.push_str(DOCUMENT_BODY_BEGIN);
    out.push_str(&fragment);
    out.push_str(DOCUMENT_BODY_END);
    out
}

fn push_highlight(out: &mut String, term: &Term, body: &str) {
    let id = escape_attr(term.id.as_str());
    let _ = write!(
        out,
        "<span class=\"tooltip\" data-term-id=\"{id}\" onclick=\"{FOCUS_BRIDGE_FN}('{id}')\">{}<span class=\"tooltiptext\">{}\n{}</span></span>",
        escape_text(body),
        escape_text(term.id.as_str()),
        escape_text(&term.name),
    );
}

/// Turn the id carried by a clicked wrapper back into a concept id. Malformed
/// ids are logged and dropped.
pub fn resolve_focus(raw: &str) -> Option<ConceptId> {
    match ConceptId::parse(raw) {
        Ok(id) => {
            tracing::debug!(term = %id, "focus requested from highlighted text");
            Some(id)
        }
        Err(err) => {
            tracing::warn!(raw, error = %err, "ignoring focus request");
            None
        }
    }
}

/// Details panel for the term selected in the tree.
pub fn term_details_markup(term: &Term) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\"><title>Term details</title></head><body>\
         <p><b>Term ID:</b> {}</p><p><b>Term Name:</b> {}</p><p><b>Synonyms:</b> {}</p><p><b>Definition:</b> {}</p>\
         </body></html>",
        escape_text(term.id.as_str()),
        escape_text(&term.name),
        escape_text(&term.synonyms.join(", ")),
        escape_text(term.definition.as_deref().unwrap_or("")),
    )
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s)
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn collapse_whitespace(s: &str) -> String {
    static RUNS: OnceLock<Regex> = OnceLock::new();
    let runs = RUNS.get_or_init(|| Regex::new(r"\s{2,}").expect("whitespace pattern compiles"));
    runs.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn hit(id: &str, name: &str, start: usize, end: usize) -> PhenotypeTerm {
        PhenotypeTerm::new(
            Arc::new(Term::new(id, name)),
            Span::new(start, end).unwrap(),
            true,
        )
    }

    fn bodies<'a>(segments: &[Segment<'a>]) -> Vec<&'a str> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Highlight { body, .. } => Some(*body),
                Segment::Plain(_) => None,
            })
            .collect()
    }

    #[test]
    fn highlights_single_hit() {
        let text = "Patient has myopathy.";
        let hits = vec![hit("HP:0000001", "Myopathy", 12, 20)];
        let markup = render(text, &hits);

        assert!(markup.starts_with("Patient has <span"));
        assert!(markup.contains(">myopathy<span class=\"tooltiptext\">HP:0000001\nMyopathy</span></span>"));
        assert!(markup.ends_with("</span></span>."));
        assert!(markup.contains("focusOnTerm('HP:0000001')"));
    }

    #[test]
    fn overlapping_hit_is_clamped() {
        let text = "abcdefgh";
        let hits = vec![hit("HP:1", "A", 0, 5), hit("HP:2", "B", 3, 8)];
        let segments = layout(text, &hits);
        assert_eq!(bodies(&segments), vec!["abcde", "fgh"]);
        match &segments[1] {
            Segment::Highlight { span, .. } => assert_eq!(*span, Span::new(5, 8).unwrap()),
            other => panic!("expected highlight, got {other:?}"),
        }
    }

    #[test]
    fn swallowed_hit_emits_no_wrapper_and_cursor_never_rewinds() {
        let text = "0123456789";
        let hits = vec![hit("HP:1", "Long", 0, 8), hit("HP:2", "Inner", 2, 5), hit("HP:3", "Tail", 6, 10)];
        let segments = layout(text, &hits);
        assert_eq!(bodies(&segments), vec!["01234567", "89"]);
        let joined: String = segments.iter().map(Segment::text).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn unsorted_input_is_laid_out_by_start() {
        let text = "one two three";
        let hits = vec![hit("HP:3", "Three", 8, 13), hit("HP:1", "One", 0, 3)];
        assert_eq!(bodies(&layout(text, &hits)), vec!["one", "three"]);
    }

    #[test]
    fn equal_starts_keep_input_order() {
        let text = "abcdef";
        let hits = vec![hit("HP:2", "Short", 0, 2), hit("HP:1", "Long", 0, 6)];
        let segments = layout(text, &hits);
        assert_eq!(bodies(&segments), vec!["ab", "cdef"]);
    }

    #[test]
    fn spans_past_the_end_are_clamped() {
        let text = "abc";
        let hits = vec![hit("HP:1", "A", 1, 99), hit("HP:2", "B", 50, 60)];
        let segments = layout(text, &hits);
        assert_eq!(bodies(&segments), vec!["bc"]);
    }

    #[test]
    fn offsets_are_not_bytes() {
        let text = "Fièvre et myopathie";
        let hits = vec![hit("HP:1", "Fever", 0, 6), hit("HP:2", "Myopathy", 10, 19)];
        assert_eq!(bodies(&layout(text, &hits)), vec!["Fièvre", "myopathie"]);
    }

    #[test]
    fn offsets_count_utf16_units() {
        let text = "😀 myopathy and 𝔣ever";
        let hits = vec![hit("HP:1", "Myopathy", 3, 11), hit("HP:2", "Fever", 16, 22)];
        let segments = layout(text, &hits);
        assert_eq!(bodies(&segments), vec!["myopathy", "𝔣ever"]);
        let joined: String = segments.iter().map(Segment::text).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn markup_escapes_text_and_collapses_whitespace() {
        let text = "  a <b> &   c  ";
        let markup = render(text, std::iter::empty());
        assert_eq!(markup, "a &lt;b&gt; &amp; c");
    }

    #[test]
    fn document_wraps_fragment() {
        let hits = vec![hit("HP:1", "A", 0, 1)];
        let doc = render_document("a b", &hits);
        assert!(doc.starts_with("<html><head>"));
        assert!(doc.contains("function focusOnTerm(id)"));
        assert!(doc.ends_with(" b</p></body></html>"));
    }

    #[test]
    fn resolve_focus_rejects_malformed_ids() {
        assert_eq!(resolve_focus("HP:0001324"), Some(ConceptId::new("HP:0001324")));
        assert_eq!(resolve_focus("HP0001324"), None);
        assert_eq!(resolve_focus("'); alert(1); ('"), None);
    }

    #[test]
    fn term_details_lists_synonyms_and_definition() {
        let term = Term::new("HP:0003198", "Myopathy")
            .with_synonyms(vec!["Muscle disease".into(), "Myopathic changes".into()])
            .with_definition("A disorder of muscle.");
        let html = term_details_markup(&term);
        assert!(html.contains("<b>Synonyms:</b> Muscle disease, Myopathic changes</p>"));
        assert!(html.contains("<b>Definition:</b> A disorder of muscle.</p>"));

        let bare = term_details_markup(&Term::new("HP:1", "Bare"));
        assert!(bare.contains("<b>Definition:</b> </p>"));
    }
}
