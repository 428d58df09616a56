//! Internal query tree and the discriminator-keyed deserializer.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Error;
use crate::lucene;

/// One node of the internal query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Bool(BoolQuery),
    MatchPhrase {
        field: String,
        phrase: String,
    },
    Range(RangeQuery),
    Exists {
        field: String,
    },
    QueryString {
        phrase: String,
        subtype: QueryStringSubtype,
        field: Option<String>,
    },
}

/// What kind of free-text match a `query_string` leaf performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStringSubtype {
    Term,
    Phrase,
    Prefix,
    Wildcard,
    MatchAll,
}

/// The four clause lists of an ES `bool` query.
///
/// ES `filter` clauses merge into `must`; they only differ in scoring,
/// which does not exist here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub must_not: Vec<Query>,
    pub should: Vec<Query>,
    pub should_not: Vec<Query>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.must_not.is_empty()
            && self.should.is_empty()
            && self.should_not.is_empty()
    }
}

/// An ES `range` clause body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RangeQuery {
    #[serde(skip)]
    pub field: String,
    #[serde(default)]
    pub gte: Option<Value>,
    #[serde(default)]
    pub gt: Option<Value>,
    #[serde(default)]
    pub lte: Option<Value>,
    #[serde(default)]
    pub lt: Option<Value>,
    #[serde(default)]
    pub format: Option<String>,
}

impl RangeQuery {
    /// Temporal ranges wrap bounds in datetime conversions. The `format`
    /// property is the canonical signal; a field literally named
    /// `timestamp` is the deprecated fallback.
    pub fn is_temporal(&self) -> bool {
        self.format.is_some() || self.field == "timestamp"
    }
}

impl Query {
    /// Parse one query clause object. The single property name selects
    /// the constructor; unknown discriminators are dropped (`Ok(None)`),
    /// malformed payloads under a known discriminator are `Error::Parse`.
    pub fn from_value(value: &Value) -> Result<Option<Query>, Error> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Parse(format!("query clause must be an object: {value}")))?;
        let (key, body) = match obj.iter().next() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        match key.as_str() {
            "bool" => Ok(Some(Query::Bool(BoolQuery::from_value(body)?))),
            "match_phrase" => parse_match_phrase(body).map(Some),
            "range" => parse_range(body).map(Some),
            "exists" => parse_exists(body).map(Some),
            "query_string" => parse_query_string(body).map(Some),
            other => {
                debug!(clause = other, "dropping unrecognized query clause");
                Ok(None)
            }
        }
    }
}

impl BoolQuery {
    pub fn from_value(body: &Value) -> Result<BoolQuery, Error> {
        let obj = body
            .as_object()
            .ok_or_else(|| Error::Parse("bool body must be an object".to_string()))?;

        let mut parsed = BoolQuery::default();
        for (key, list) in obj {
            let target = match key.as_str() {
                "must" | "filter" => &mut parsed.must,
                "must_not" => &mut parsed.must_not,
                "should" => &mut parsed.should,
                "should_not" => &mut parsed.should_not,
                other => {
                    debug!(clause = other, "dropping unrecognized bool property");
                    continue;
                }
            };
            target.extend(clause_list(list)?);
        }
        Ok(parsed)
    }
}

// A clause list is either a single clause object or an array of them.
fn clause_list(value: &Value) -> Result<Vec<Query>, Error> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut queries = Vec::with_capacity(items.len());
    for item in items {
        if let Some(q) = Query::from_value(item)? {
            queries.push(q);
        }
    }
    Ok(queries)
}

fn parse_match_phrase(body: &Value) -> Result<Query, Error> {
    let obj = body
        .as_object()
        .ok_or_else(|| Error::Parse("match_phrase body must be an object".to_string()))?;
    let (field, spec) = obj
        .iter()
        .next()
        .ok_or_else(|| Error::Parse("match_phrase needs a field".to_string()))?;

    // Both the shorthand `{"field": "text"}` and the expanded
    // `{"field": {"query": "text"}}` forms occur in the wild.
    let raw = match spec {
        Value::Object(inner) => inner
            .get("query")
            .ok_or_else(|| Error::Parse(format!("match_phrase on {field} is missing query")))?,
        other => other,
    };
    let phrase = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            return Err(Error::Parse(format!(
                "match_phrase on {field} has unsupported value: {other}"
            )))
        }
    };
    Ok(Query::MatchPhrase {
        field: field.clone(),
        phrase,
    })
}

fn parse_range(body: &Value) -> Result<Query, Error> {
    let obj = body
        .as_object()
        .ok_or_else(|| Error::Parse("range body must be an object".to_string()))?;
    let (field, bounds) = obj
        .iter()
        .next()
        .ok_or_else(|| Error::Parse("range needs a field".to_string()))?;

    let mut range: RangeQuery = serde_json::from_value(bounds.clone())
        .map_err(|e| Error::Parse(format!("bad range body on {field}: {e}")))?;
    range.field = field.clone();

    if range.format.is_none() && range.field == "timestamp" {
        warn!(
            field = %range.field,
            "treating range as temporal by field name; send a format property instead"
        );
    }
    Ok(Query::Range(range))
}

fn parse_exists(body: &Value) -> Result<Query, Error> {
    #[derive(Deserialize)]
    struct ExistsBody {
        field: String,
    }
    let parsed: ExistsBody = serde_json::from_value(body.clone())
        .map_err(|e| Error::Parse(format!("bad exists body: {e}")))?;
    Ok(Query::Exists {
        field: parsed.field,
    })
}

fn parse_query_string(body: &Value) -> Result<Query, Error> {
    #[derive(Deserialize)]
    struct QueryStringBody {
        query: String,
        #[serde(default)]
        default_field: Option<String>,
    }
    let parsed: QueryStringBody = serde_json::from_value(body.clone())
        .map_err(|e| Error::Parse(format!("bad query_string body: {e}")))?;

    let node = lucene::parse(&parsed.query)?;
    let mut query = lucene::adapter::to_query(&node)?;

    // default_field only binds an unscoped top-level leaf
    if let Some(default_field) = parsed.default_field {
        if let Query::QueryString {
            field: field @ None,
            ..
        } = &mut query
        {
            *field = Some(default_field);
        }
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_match_phrase_shorthand() {
        let q = Query::from_value(&json!({"match_phrase": {"level": "error"}}))
            .unwrap()
            .unwrap();
        assert_eq!(
            q,
            Query::MatchPhrase {
                field: "level".to_string(),
                phrase: "error".to_string()
            }
        );
    }

    #[test]
    fn test_match_phrase_expanded_and_numeric() {
        let q = Query::from_value(&json!({"match_phrase": {"code": {"query": 404}}}))
            .unwrap()
            .unwrap();
        assert_eq!(
            q,
            Query::MatchPhrase {
                field: "code".to_string(),
                phrase: "404".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_discriminator_is_dropped() {
        let q = Query::from_value(&json!({"more_like_this": {"fields": ["a"]}})).unwrap();
        assert!(q.is_none());
    }

    #[test]
    fn test_non_object_clause_is_parse_error() {
        assert!(matches!(
            Query::from_value(&json!("just a string")),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_bool_filter_merges_into_must() {
        let q = Query::from_value(&json!({
            "bool": {
                "must": [{"match_phrase": {"a": "1"}}],
                "filter": [{"exists": {"field": "b"}}],
                "must_not": [{"match_phrase": {"c": "3"}}]
            }
        }))
        .unwrap()
        .unwrap();
        match q {
            Query::Bool(b) => {
                assert_eq!(b.must.len(), 2);
                assert_eq!(b.must_not.len(), 1);
                assert!(b.should.is_empty());
            }
            other => panic!("expected bool, got {:?}", other),
        }
    }

    #[test]
    fn test_bool_drops_unknown_members() {
        let q = Query::from_value(&json!({
            "bool": {
                "must": [
                    {"match_phrase": {"a": "1"}},
                    {"unknown_clause": {}}
                ]
            }
        }))
        .unwrap()
        .unwrap();
        match q {
            Query::Bool(b) => assert_eq!(b.must.len(), 1),
            other => panic!("expected bool, got {:?}", other),
        }
    }

    #[test]
    fn test_single_clause_not_in_array() {
        let q = Query::from_value(&json!({
            "bool": {"must": {"exists": {"field": "host"}}}
        }))
        .unwrap()
        .unwrap();
        match q {
            Query::Bool(b) => assert_eq!(
                b.must,
                vec![Query::Exists {
                    field: "host".to_string()
                }]
            ),
            other => panic!("expected bool, got {:?}", other),
        }
    }

    #[test]
    fn test_range_with_format_is_temporal() {
        let q = Query::from_value(&json!({
            "range": {"created": {"gte": 0, "lte": 10, "format": "epoch_millis"}}
        }))
        .unwrap()
        .unwrap();
        match q {
            Query::Range(r) => {
                assert!(r.is_temporal());
                assert_eq!(r.field, "created");
                assert_eq!(r.gte, Some(json!(0)));
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_range_temporal_by_field_name() {
        let q = Query::from_value(&json!({"range": {"timestamp": {"gt": 5}}}))
            .unwrap()
            .unwrap();
        match q {
            Query::Range(r) => assert!(r.is_temporal()),
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_range_is_not_temporal() {
        let q = Query::from_value(&json!({"range": {"bytes": {"gte": 100}}}))
            .unwrap()
            .unwrap();
        match q {
            Query::Range(r) => assert!(!r.is_temporal()),
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_query_string_goes_through_lucene() {
        let q = Query::from_value(&json!({"query_string": {"query": "level:error"}}))
            .unwrap()
            .unwrap();
        assert_eq!(
            q,
            Query::QueryString {
                phrase: "error".to_string(),
                subtype: QueryStringSubtype::Term,
                field: Some("level".to_string()),
            }
        );
    }

    #[test]
    fn test_query_string_default_field_binds_unscoped_leaf() {
        let q = Query::from_value(&json!({
            "query_string": {"query": "error", "default_field": "message"}
        }))
        .unwrap()
        .unwrap();
        match q {
            Query::QueryString { field, .. } => assert_eq!(field.as_deref(), Some("message")),
            other => panic!("expected query_string, got {:?}", other),
        }
    }

    #[test]
    fn test_query_string_boost_is_fatal() {
        assert!(matches!(
            Query::from_value(&json!({"query_string": {"query": "error^2.0"}})),
            Err(Error::Compile(_))
        ));
    }
}
