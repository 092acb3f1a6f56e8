//! 1-based line/byte mapping with binary search.

/// Precomputed line-start offsets for a buffer.
///
/// Lines are 1-based throughout; byte ranges are closed-open.
#[derive(Debug, Clone)]
pub struct LineCounter {
    /// Byte offset of the start of each line. Always begins with 0.
    starts: Vec<usize>,
    len: usize,
}

impl LineCounter {
    pub fn new(content: &str) -> Self {
        let mut starts = vec![0usize];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self {
            starts,
            len: content.len(),
        }
    }

    /// Number of lines in the buffer. An empty buffer has one (empty) line.
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// 1-based line containing the given byte offset.
    /// Offsets past the end map to the last line.
    pub fn line_for_offset(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Byte offset of the start of a 1-based line, or None past the end.
    pub fn offset_for_line(&self, line: usize) -> Option<usize> {
        if line == 0 {
            return None;
        }
        self.starts.get(line - 1).copied()
    }

    /// Closed-open byte span of a 1-based line, excluding the newline.
    pub fn line_span(&self, line: usize) -> Option<(usize, usize)> {
        let start = self.offset_for_line(line)?;
        let end = match self.starts.get(line) {
            Some(next) => next - 1,
            None => self.len,
        };
        Some((start, end))
    }

    /// Convert a byte offset to 1-based (line, column).
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = self.line_for_offset(offset);
        let start = self.starts[line - 1];
        (line, offset.saturating_sub(start) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_offsets_to_lines() {
        let lc = LineCounter::new("ab\ncd\nef");
        assert_eq!(lc.line_count(), 3);
        assert_eq!(lc.line_for_offset(0), 1);
        assert_eq!(lc.line_for_offset(2), 1);
        assert_eq!(lc.line_for_offset(3), 2);
        assert_eq!(lc.line_for_offset(7), 3);
    }

    #[test]
    fn line_spans_exclude_newline() {
        let lc = LineCounter::new("ab\ncd\n");
        assert_eq!(lc.line_span(1), Some((0, 2)));
        assert_eq!(lc.line_span(2), Some((3, 5)));
        // trailing newline produces a final empty line
        assert_eq!(lc.line_span(3), Some((6, 6)));
        assert_eq!(lc.line_span(4), None);
    }

    #[test]
    fn line_col_is_one_based() {
        let lc = LineCounter::new("ab\ncd");
        assert_eq!(lc.line_col(0), (1, 1));
        assert_eq!(lc.line_col(4), (2, 2));
    }

    #[test]
    fn empty_buffer_has_one_line() {
        let lc = LineCounter::new("");
        assert_eq!(lc.line_count(), 1);
        assert_eq!(lc.line_span(1), Some((0, 0)));
    }
}
