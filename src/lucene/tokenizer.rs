//! nom parsers for the term-level pieces of the Lucene grammar.

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::map,
    sequence::{delimited, tuple},
    IResult,
};

/// Quoted phrase body: `"quick brown fox"` → `quick brown fox`.
pub fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_until("\""), char('"'))(input)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeToken {
    pub lower: Option<String>,
    pub upper: Option<String>,
    pub inclusive: bool,
}

fn bound(input: &str) -> IResult<&str, Option<String>> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != ']' && c != '}'),
        |s: &str| (s != "*").then(|| s.to_string()),
    )(input)
}

/// `[a TO b]` / `{a TO b}`; `*` on either side means unbounded.
pub fn range(input: &str) -> IResult<&str, RangeToken> {
    let body = |open, close, inclusive| {
        map(
            tuple((
                char(open),
                multispace0,
                bound,
                multispace1,
                tag_no_case("TO"),
                multispace1,
                bound,
                multispace0,
                char(close),
            )),
            move |(_, _, lower, _, _, _, upper, _, _)| RangeToken {
                lower,
                upper,
                inclusive,
            },
        )
    };
    alt((body('[', ']', true), body('{', '}', false)))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted() {
        let (rest, body) = quoted("\"quick brown fox\" tail").unwrap();
        assert_eq!(body, "quick brown fox");
        assert_eq!(rest, " tail");
    }

    #[test]
    fn test_inclusive_range() {
        let (_, r) = range("[1 TO 10]").unwrap();
        assert_eq!(
            r,
            RangeToken {
                lower: Some("1".to_string()),
                upper: Some("10".to_string()),
                inclusive: true,
            }
        );
    }

    #[test]
    fn test_exclusive_range() {
        let (_, r) = range("{0.5 TO 2.5}").unwrap();
        assert!(!r.inclusive);
        assert_eq!(r.lower.as_deref(), Some("0.5"));
    }

    #[test]
    fn test_open_bound() {
        let (_, r) = range("[100 TO *]").unwrap();
        assert_eq!(r.lower.as_deref(), Some("100"));
        assert!(r.upper.is_none());
    }

    #[test]
    fn test_lowercase_to_accepted() {
        let (_, r) = range("[1 to 2]").unwrap();
        assert_eq!(r.upper.as_deref(), Some("2"));
    }
}
