//! Remaps parsed Lucene nodes into the internal query tree.
//!
//! This is where unsupported free-text syntax becomes a hard error:
//! the parser recognizes boosts and fuzzy terms so the rejection can
//! name the feature instead of failing on a stray character.

use serde_json::{Number, Value};

use super::{LuceneNode, Occur};
use crate::dsl::query::{BoolQuery, Query, QueryStringSubtype, RangeQuery};
use crate::error::Error;

pub fn to_query(node: &LuceneNode) -> Result<Query, Error> {
    match node {
        LuceneNode::Term { field, text } => Ok(Query::QueryString {
            phrase: text.clone(),
            subtype: QueryStringSubtype::Term,
            field: field.clone(),
        }),
        LuceneNode::Phrase { field, terms } => Ok(Query::QueryString {
            phrase: terms.join(" "),
            subtype: QueryStringSubtype::Phrase,
            field: field.clone(),
        }),
        LuceneNode::Prefix { field, text } => Ok(Query::QueryString {
            phrase: text.clone(),
            subtype: QueryStringSubtype::Prefix,
            field: field.clone(),
        }),
        LuceneNode::Wildcard { field, pattern } => Ok(Query::QueryString {
            phrase: pattern.clone(),
            subtype: QueryStringSubtype::Wildcard,
            field: field.clone(),
        }),
        LuceneNode::MatchAll => Ok(Query::QueryString {
            phrase: "*".to_string(),
            subtype: QueryStringSubtype::MatchAll,
            field: None,
        }),
        LuceneNode::TermRange {
            field,
            lower,
            upper,
            inclusive,
        } => {
            let mut range = RangeQuery {
                field: field.clone(),
                ..RangeQuery::default()
            };
            let lower = lower.as_deref().map(decimal_bound).transpose()?;
            let upper = upper.as_deref().map(decimal_bound).transpose()?;
            if *inclusive {
                range.gte = lower;
                range.lte = upper;
            } else {
                range.gt = lower;
                range.lt = upper;
            }
            Ok(Query::Range(range))
        }
        LuceneNode::Boolean { clauses } => {
            let mut bool_query = BoolQuery::default();
            for (occur, child) in clauses {
                let query = to_query(child)?;
                match occur {
                    Occur::Must => bool_query.must.push(query),
                    Occur::Should => bool_query.should.push(query),
                    Occur::MustNot => bool_query.must_not.push(query),
                }
            }
            Ok(Query::Bool(bool_query))
        }
        LuceneNode::Boost { .. } => Err(Error::Compile(
            "unsupported query string feature: boost".to_string(),
        )),
        LuceneNode::Fuzzy { .. } => Err(Error::Compile(
            "unsupported query string feature: fuzzy match".to_string(),
        )),
    }
}

fn decimal_bound(text: &str) -> Result<Value, Error> {
    let parsed: f64 = text
        .parse()
        .map_err(|_| Error::Compile(format!("range bound is not a number: {text}")))?;
    Number::from_f64(parsed)
        .map(Value::Number)
        .ok_or_else(|| Error::Compile(format!("range bound is not finite: {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lucene::parse;
    use serde_json::json;

    fn adapt(input: &str) -> Result<Query, Error> {
        to_query(&parse(input).unwrap())
    }

    #[test]
    fn test_phrase_joins_terms() {
        assert_eq!(
            adapt("\"quick brown fox\"").unwrap(),
            Query::QueryString {
                phrase: "quick brown fox".to_string(),
                subtype: QueryStringSubtype::Phrase,
                field: None,
            }
        );
    }

    #[test]
    fn test_inclusive_range_maps_to_gte_lte() {
        match adapt("bytes:[100 TO 200]").unwrap() {
            Query::Range(r) => {
                assert_eq!(r.field, "bytes");
                assert_eq!(r.gte, Some(json!(100.0)));
                assert_eq!(r.lte, Some(json!(200.0)));
                assert!(r.gt.is_none() && r.lt.is_none());
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_exclusive_range_maps_to_gt_lt() {
        match adapt("bytes:{100 TO *}").unwrap() {
            Query::Range(r) => {
                assert_eq!(r.gt, Some(json!(100.0)));
                assert!(r.lt.is_none());
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_range_bound_is_fatal() {
        assert!(matches!(
            adapt("name:[alpha TO omega]"),
            Err(Error::Compile(_))
        ));
    }

    #[test]
    fn test_boolean_distributes_by_occurrence() {
        match adapt("error AND NOT debug").unwrap() {
            Query::Bool(b) => {
                assert_eq!(b.must.len(), 1);
                assert_eq!(b.must_not.len(), 1);
                assert!(b.should.is_empty());
            }
            other => panic!("expected bool, got {:?}", other),
        }
    }

    #[test]
    fn test_boost_and_fuzzy_are_fatal() {
        assert!(matches!(adapt("urgent^4"), Err(Error::Compile(_))));
        assert!(matches!(adapt("roam~"), Err(Error::Compile(_))));
    }

    #[test]
    fn test_bare_star_is_match_all() {
        assert_eq!(
            adapt("*").unwrap(),
            Query::QueryString {
                phrase: "*".to_string(),
                subtype: QueryStringSubtype::MatchAll,
                field: None,
            }
        );
    }
}
