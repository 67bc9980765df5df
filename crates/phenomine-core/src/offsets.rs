//! Offsets into query text.
//!
//! The mining service reports positions in UTF-16 code units, so a character
//! outside the Basic Multilingual Plane counts twice. [`OffsetTable`] maps
//! those positions to byte indices of the Rust string. A position that falls
//! between the two halves of a surrogate pair maps to the start of the
//! character.

/// UTF-16 position → byte index table for one text.
#[derive(Debug, Clone)]
pub struct OffsetTable {
    bytes: Vec<usize>,
}

impl OffsetTable {
    pub fn new(text: &str) -> Self {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        for (idx, ch) in text.char_indices() {
            for _ in 0..ch.len_utf16() {
                bytes.push(idx);
            }
        }
        bytes.push(text.len());
        Self { bytes }
    }

    /// Length of the text in UTF-16 code units.
    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte index for a position, clamped to the end of the text.
    pub fn byte(&self, pos: usize) -> usize {
        self.bytes[pos.min(self.len())]
    }

    pub fn slice<'t>(&self, text: &'t str, from: usize, to: usize) -> &'t str {
        let from = self.byte(from);
        let to = self.byte(to).max(from);
        &text[from..to]
    }
}

/// Length of `text` as the mining service counts it.
pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}
