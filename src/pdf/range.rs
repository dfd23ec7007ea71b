//! Page range parsing for `"<start>-<end>"` selections

use crate::error::{Error, Result};
use std::fmt;

/// 1-indexed inclusive page range.
///
/// Parsing only checks the shape; `check_bounds` enforces
/// `1 <= start <= end <= total` once the page count is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// Parse a literal `"<start>-<end>"` string.
    pub fn parse(range: &str) -> Result<Self> {
        let invalid = || Error::InvalidRangeFormat {
            range: range.to_string(),
        };

        let (start, end) = range.trim().split_once('-').ok_or_else(invalid)?;
        let start: u32 = start.trim().parse().map_err(|_| invalid())?;
        let end: u32 = end.trim().parse().map_err(|_| invalid())?;

        Ok(Self { start, end })
    }

    /// Validate against the document's page count.
    pub fn check_bounds(&self, total: u32) -> Result<()> {
        if self.start < 1 || self.start > self.end || self.end > total {
            return Err(Error::RangeOutOfBounds {
                start: self.start,
                end: self.end,
                total,
            });
        }
        Ok(())
    }

    /// Number of pages selected, assuming the bounds have been checked
    pub fn page_count(&self) -> u32 {
        self.end.saturating_sub(self.start) + 1
    }

    /// 0-indexed page indices in document order
    pub fn indices(&self) -> impl Iterator<Item = u32> {
        (self.start..=self.end).map(|p| p - 1)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("3-5", 3, 5)]
    #[case("1-1", 1, 1)]
    #[case(" 2 - 7 ", 2, 7)]
    #[case("0-2", 0, 2)]
    #[case("5-3", 5, 3)]
    fn test_parse_shape(#[case] input: &str, #[case] start: u32, #[case] end: u32) {
        assert_eq!(PageRange::parse(input).unwrap(), PageRange { start, end });
    }

    #[rstest]
    #[case("")]
    #[case("5")]
    #[case("a-b")]
    #[case("1-")]
    #[case("-3")]
    #[case("1-2-3")]
    #[case("-1-3")]
    #[case("1.5-3")]
    fn test_parse_invalid_format(#[case] input: &str) {
        assert!(matches!(
            PageRange::parse(input),
            Err(Error::InvalidRangeFormat { .. })
        ));
    }

    #[rstest]
    #[case("5-3")]
    #[case("0-2")]
    #[case("1-11")]
    fn test_out_of_bounds(#[case] input: &str) {
        let range = PageRange::parse(input).unwrap();
        match range.check_bounds(10) {
            Err(Error::RangeOutOfBounds { total, .. }) => assert_eq!(total, 10),
            other => panic!("expected RangeOutOfBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_in_bounds() {
        let range = PageRange::parse("3-5").unwrap();
        range.check_bounds(10).unwrap();
        assert_eq!(range.page_count(), 3);
        assert_eq!(range.indices().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(range.to_string(), "3-5");

        PageRange::parse("1-10").unwrap().check_bounds(10).unwrap();
    }
}
