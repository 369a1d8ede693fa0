//! Byte-offset to line/column conversion.
//!
//! The parser reports positions as byte offsets; everything user-facing wants
//! 1-indexed line:column pairs. A [`LineIndex`] is built once per file and
//! answers lookups by binary search over line start offsets.

/// Precomputed line start offsets for one source file.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Build the index for `source`.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex { line_starts }
    }

    /// Convert a byte offset to a 1-indexed `(line, col)` pair.
    ///
    /// Offsets past the end of the source clamp to the last line. Columns
    /// count bytes from the line start.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let col = offset - self.line_starts[line];
        (line as u32 + 1, col as u32 + 1)
    }
}
