//! Byte offset to source line translation for fragment diagnostics.

use crate::error::LocateError;

/// The line surrounding a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: usize,
    /// Full text of the line, without its newline.
    pub text: String,
    /// 0-based byte offset of the location within `text`.
    pub column: usize,
}

impl SourceLocation {
    /// Returns a marker line that puts a `^` under the located character.
    ///
    /// Tabs before the caret are kept so the marker lines up with `text`
    /// however the viewer expands them; everything else becomes a space.
    pub fn marker(&self) -> String {
        let mut marker: String = self
            .text
            .char_indices()
            .take_while(|(i, _)| *i < self.column)
            .map(|(_, c)| if c == '\t' { '\t' } else { ' ' })
            .collect();
        marker.push('^');
        marker
    }
}

/// Locates `offset` within `content`.
///
/// An offset pointing at a newline byte belongs to the line that newline
/// terminates.
pub fn locate(content: &[u8], offset: i64) -> Result<SourceLocation, LocateError> {
    let out_of_bounds = LocateError::OffsetOutOfBounds {
        offset,
        len: content.len(),
    };
    let offset = usize::try_from(offset).map_err(|_| out_of_bounds.clone())?;
    if offset >= content.len() {
        return Err(out_of_bounds);
    }

    let before = &content[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    let end = content[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(content.len(), |i| start + i);

    Ok(SourceLocation {
        line,
        text: String::from_utf8_lossy(&content[start..end]).into_owned(),
        column: offset - start,
    })
}

/// Converts a 1-based line and column, as reported by `serde_json`, into a
/// byte offset. Returns `None` if the content has fewer lines.
///
/// Column 0 means the last byte consumed was the newline ending the previous
/// line, so it maps to that newline.
pub fn offset_of(content: &[u8], line: usize, column: usize) -> Option<usize> {
    if line == 0 {
        return None;
    }
    let mut start = 0;
    for _ in 1..line {
        let next = content[start..].iter().position(|&b| b == b'\n')?;
        start += next + 1;
    }
    match column {
        0 if start > 0 => Some(start - 1),
        _ => Some(start + column.saturating_sub(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &[u8] = b"{\n\t\"name\": \"root\",\n  \"rules\": x\n}";

    #[test]
    fn test_first_line() {
        let loc = locate(CONTENT, 0).unwrap();
        assert_eq!(loc.line, 1);
        assert_eq!(loc.text, "{");
        assert_eq!(loc.column, 0);
        assert_eq!(loc.marker(), "^");
    }

    #[test]
    fn test_middle_line() {
        let offset = CONTENT.iter().position(|&b| b == b'x').unwrap();
        let loc = locate(CONTENT, offset as i64).unwrap();
        assert_eq!(loc.line, 3);
        assert_eq!(loc.text, "  \"rules\": x");
        assert_eq!(loc.column, 11);
        assert_eq!(loc.marker(), "           ^");
    }

    #[test]
    fn test_marker_keeps_tabs() {
        let offset = CONTENT.iter().position(|&b| b == b'n').unwrap();
        let loc = locate(CONTENT, offset as i64).unwrap();
        assert_eq!(loc.line, 2);
        assert_eq!(loc.marker(), "\t ^");
    }

    #[test]
    fn test_last_line_without_newline() {
        let loc = locate(CONTENT, CONTENT.len() as i64 - 1).unwrap();
        assert_eq!(loc.line, 4);
        assert_eq!(loc.text, "}");
        assert_eq!(loc.column, 0);
    }

    #[test]
    fn test_offset_on_newline() {
        let loc = locate(b"ab\ncd", 2).unwrap();
        assert_eq!(loc.line, 1);
        assert_eq!(loc.text, "ab");
        assert_eq!(loc.column, 2);
    }

    #[test]
    fn test_out_of_bounds() {
        assert_eq!(
            locate(CONTENT, -1),
            Err(LocateError::OffsetOutOfBounds {
                offset: -1,
                len: CONTENT.len()
            })
        );
        assert!(locate(CONTENT, CONTENT.len() as i64).is_err());
        assert!(locate(b"", 0).is_err());
        assert!(locate(CONTENT, i64::MAX).is_err());
    }

    #[test]
    fn test_offset_of() {
        assert_eq!(offset_of(CONTENT, 1, 1), Some(0));
        assert_eq!(offset_of(CONTENT, 3, 12), Some(30));
        assert_eq!(CONTENT[30], b'x');
        assert_eq!(offset_of(CONTENT, 9, 1), None);
        assert_eq!(offset_of(CONTENT, 0, 1), None);
    }

    #[test]
    fn test_offset_of_column_zero_is_previous_newline() {
        assert_eq!(offset_of(CONTENT, 2, 0), Some(1));
        assert_eq!(CONTENT[1], b'\n');
        assert_eq!(offset_of(CONTENT, 1, 0), Some(0));
    }

    // -----------------------------------------------------------------------
    // Property-based tests
    // -----------------------------------------------------------------------

    use proptest::prelude::*;

    proptest! {
        /// Any in-bounds offset lands on the line containing it, and any other
        /// offset is rejected with the buffer length.
        #[test]
        fn locate_any_buffer_and_offset(
            content in proptest::collection::vec(any::<u8>(), 0..64),
            offset in -8i64..80,
        ) {
            let in_bounds = offset >= 0 && (offset as usize) < content.len();
            match locate(&content, offset) {
                Ok(loc) => {
                    prop_assert!(in_bounds);
                    let lines: Vec<&[u8]> = content.split(|&b| b == b'\n').collect();
                    let line = lines[loc.line - 1];
                    prop_assert_eq!(&loc.text, &String::from_utf8_lossy(line).into_owned());
                    prop_assert!(loc.column <= line.len());

                    let start = offset as usize - loc.column;
                    prop_assert_eq!(&content[start..start + line.len()], line);
                }
                Err(LocateError::OffsetOutOfBounds { offset: reported, len }) => {
                    prop_assert!(!in_bounds);
                    prop_assert_eq!(reported, offset);
                    prop_assert_eq!(len, content.len());
                }
            }
        }
    }
}
