//! Tag selection.
//!
//! A pattern is a list of literal segments separated by `_`. Between
//! consecutive segments any run of characters may appear, so `postgres_tokio`
//! selects `postgres_12_tokio_rustls`. Segments must appear in order, and the
//! first segment is anchored at the start of the tag. A leading `_` (an empty
//! first segment) lifts the anchor.

/// Delimiter that introduces a gap between literal segments.
pub const SEGMENT_DELIMITER: char = '_';

/// Parsed selection pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagPattern<'a> {
    segments: Vec<&'a str>,
}

impl<'a> TagPattern<'a> {
    /// Splits `pattern` into its literal segments.
    #[must_use]
    pub fn parse(pattern: &'a str) -> Self {
        Self {
            segments: pattern.split(SEGMENT_DELIMITER).collect(),
        }
    }

    /// Literal segments in order.
    #[must_use]
    pub fn segments(&self) -> &[&'a str] {
        &self.segments
    }

    /// Whether the segments occur in `tag`, in order, with the first one as a
    /// prefix.
    #[must_use]
    pub fn is_match(&self, tag: &str) -> bool {
        let mut segments = self.segments.iter();
        let Some(first) = segments.next() else {
            return true;
        };
        let Some(mut rest) = tag.strip_prefix(*first) else {
            return false;
        };
        for segment in segments {
            match rest.split_once(*segment) {
                Some((_, after)) => rest = after,
                None => return false,
            }
        }
        true
    }
}

/// Decides whether `tag` is selected by `pattern`.
///
/// An empty pattern selects everything. With `exact` the tag must equal the
/// pattern; otherwise [`TagPattern`] ordered-segment matching applies.
#[must_use]
pub fn matches(tag: &str, pattern: &str, exact: bool) -> bool {
    if pattern.is_empty() {
        return true;
    }
    if exact {
        return tag == pattern;
    }
    TagPattern::parse(pattern).is_match(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty_pattern("anything", "", true)]
    #[case::ordered_gap("axxxbyyy", "a_b", true)]
    #[case::reversed_segments("axxxbyyy", "b_a", false)]
    #[case::segments_span_tag_delimiters("ax_by", "a_b", true)]
    #[case::prefix_anchor("mysql_8_tokio_rustls", "8_tokio", false)]
    #[case::leading_gap_floats("mysql_8_tokio_rustls", "_8_tokio", true)]
    #[case::engine_and_runtime("postgres_12_client_ssl_tokio_rustls", "postgres_tokio", true)]
    #[case::colon_hierarchy("check:tokio:rustls", "check:tokio", true)]
    #[case::missing_segment("postgres_12_tokio_rustls", "postgres_actix", false)]
    #[case::segments_do_not_overlap("abc", "ab_bc", false)]
    fn fuzzy_matching(#[case] tag: &str, #[case] pattern: &str, #[case] expected: bool) {
        assert_eq!(matches(tag, pattern, false), expected);
    }

    #[rstest]
    #[case::identical("unit:core", "unit:core", true)]
    #[case::prefix_only("unit:core", "unit", false)]
    #[case::superset("unit:core", "unit:core:extra", false)]
    #[case::fuzzy_would_match("postgres_12_tokio_rustls", "postgres_tokio", false)]
    #[case::empty_pattern("unit:core", "", true)]
    fn exact_matching(#[case] tag: &str, #[case] pattern: &str, #[case] expected: bool) {
        assert_eq!(matches(tag, pattern, true), expected);
    }

    #[rstest]
    fn pattern_exposes_segments() {
        assert_eq!(TagPattern::parse("a_b_c").segments(), &["a", "b", "c"]);
    }
}
