use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A declaration's position in the program: file name plus 1-based line.
///
/// Locations order by file then line, which is the "textual order" used when
/// picking the earliest of several duplicate declarations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line }
    }

    /// A location for entities synthesized by the compiler itself.
    pub fn builtin() -> Self {
        Self { file: "<builtin>".to_string(), line: 0 }
    }

    pub fn is_builtin(&self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Pre-computed index of line start positions.
///
/// Built once per source file and used to turn a [`SourceLoc`] line back into
/// the byte range that diagnostics rendering labels.
#[derive(Debug)]
pub struct LineIndex {
    /// Byte offset of the start of each line. The first entry is always 0.
    line_starts: Vec<u32>,
    len: u32,
}

impl LineIndex {
    /// Build a line index by scanning the source text for newline characters.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self { line_starts, len: source.len() as u32 }
    }

    /// Byte range of a 1-based line, excluding its newline.
    ///
    /// Lines past the end of the file clamp to an empty range at EOF.
    pub fn line_range(&self, line: u32) -> Range<usize> {
        let idx = line.saturating_sub(1) as usize;
        let Some(&start) = self.line_starts.get(idx) else {
            return self.len as usize..self.len as usize;
        };
        let end = match self.line_starts.get(idx + 1) {
            Some(&next) => next - 1,
            None => self.len,
        };
        start as usize..end.max(start) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_order_by_file_then_line() {
        let mut locs = vec![
            SourceLoc::new("b.m", 1),
            SourceLoc::new("a.m", 9),
            SourceLoc::new("a.m", 2),
        ];
        locs.sort();
        assert_eq!(
            locs,
            vec![SourceLoc::new("a.m", 2), SourceLoc::new("a.m", 9), SourceLoc::new("b.m", 1)]
        );
    }

    #[test]
    fn display_is_file_colon_line() {
        assert_eq!(SourceLoc::new("list.m", 42).to_string(), "list.m:42");
    }

    #[test]
    fn line_range_excludes_newline() {
        let idx = LineIndex::new(":- module a.\n:- instance c(int).\n");
        assert_eq!(idx.line_range(1), 0..12);
        assert_eq!(idx.line_range(2), 13..32);
    }

    #[test]
    fn line_range_past_eof_is_empty() {
        let idx = LineIndex::new("x");
        assert_eq!(idx.line_range(7), 1..1);
    }
}
