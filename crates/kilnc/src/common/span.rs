//! Source spans and human-facing locations

use std::fmt;
use std::sync::Arc;

/// Byte range into a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// File, line and column of a token or operation.
///
/// Lines and columns are 1-based. The byte span is kept alongside so the
/// pretty reporter can underline the exact source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Arc<str>,
    pub line: u32,
    pub col: u32,
    pub span: Span,
}

impl Location {
    pub fn new(file: Arc<str>, line: u32, col: u32, span: Span) -> Self {
        Self {
            file,
            line,
            col,
            span,
        }
    }

    /// Location used for synthesized tokens in tests and for end of input
    /// when the source is empty.
    pub fn synthetic(file: &str) -> Self {
        Self {
            file: Arc::from(file),
            line: 1,
            col: 1,
            span: Span::default(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Maps byte offsets to line/column pairs for one source file
#[derive(Debug, Clone)]
pub struct LineIndex {
    file: Arc<str>,
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(file: &str, source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            file: Arc::from(file),
            line_starts,
        }
    }

    pub fn locate(&self, span: Span) -> Location {
        let line = match self.line_starts.binary_search(&span.start) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let col = span.start - self.line_starts[line];
        let (line, col) = (line as u32 + 1, col as u32 + 1);
        Location::new(Arc::clone(&self.file), line, col, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_lines_and_columns() {
        let index = LineIndex::new("demo.kln", "main ::\n  1 print\nend\n");

        let loc = index.locate(Span::new(0, 4));
        assert_eq!((loc.line, loc.col), (1, 1));

        let loc = index.locate(Span::new(10, 11));
        assert_eq!((loc.line, loc.col), (2, 3));

        let loc = index.locate(Span::new(18, 21));
        assert_eq!((loc.line, loc.col), (3, 1));
        assert_eq!(loc.to_string(), "demo.kln:3:1");
    }
}
