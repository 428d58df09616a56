//! Pure bottom-up fold from the query tree to KQL fragments.
//!
//! No shared mutable state; compiling the same tree twice yields the
//! same text. A leaf compiles to either a `where`-style predicate or a
//! standalone pipe stage (unscoped free-text `search`).

use serde_json::Value;

use crate::datemath;
use crate::dsl::query::{BoolQuery, Query, QueryStringSubtype, RangeQuery};
use crate::dsl::request::SortClause;
use crate::error::Error;

/// Result of compiling one query node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Nothing to emit; the clause was dropped.
    Empty,
    /// A boolean expression usable inside `where (...)`.
    Predicate(String),
    /// A complete pipe stage, emitted as-is.
    Stage(String),
}

/// Compile a query node to a fragment. Boolean nodes compile to a single
/// predicate, which is how they appear when nested inside clause lists;
/// use [`compile_query`] at the top level to get pipe stages.
pub fn compile(query: &Query) -> Result<Fragment, Error> {
    match query {
        Query::Bool(bool_query) => compile_bool_predicate(bool_query),
        Query::MatchPhrase { field, phrase } => {
            if field.is_empty() {
                return Ok(Fragment::Empty);
            }
            Ok(Fragment::Predicate(format!(
                "{field} == \"{}\"",
                escape_string(phrase)
            )))
        }
        Query::Exists { field } => Ok(Fragment::Predicate(format!("isnotnull({field})"))),
        Query::Range(range) => compile_range(range),
        Query::QueryString {
            phrase,
            subtype,
            field,
        } => compile_query_string(phrase, *subtype, field.as_deref()),
    }
}

/// Compile the top level of a query to pipe stages (without the leading
/// `| `). An empty or fully-dropped query compiles to no stages.
pub fn compile_query(query: &Query) -> Result<Vec<String>, Error> {
    let bool_query = match query {
        Query::Bool(b) => b,
        other => {
            return Ok(match compile(other)? {
                Fragment::Empty => vec![],
                Fragment::Predicate(p) => vec![format!("where ({p})")],
                Fragment::Stage(s) => vec![s],
            })
        }
    };

    let lists = [
        (&bool_query.must, false),
        (&bool_query.must_not, true),
        (&bool_query.should, false),
        (&bool_query.should_not, true),
    ];

    let mut stages = Vec::new();
    for (list, negated) in lists {
        let mut predicates = Vec::new();
        for clause in list {
            match compile(clause)? {
                Fragment::Empty => {}
                Fragment::Predicate(p) => predicates.push(p),
                Fragment::Stage(s) => {
                    if negated {
                        return Err(Error::Compile(
                            "free text search cannot be negated".to_string(),
                        ));
                    }
                    stages.push(s);
                }
            }
        }
        if !predicates.is_empty() {
            let not = if negated { "not " } else { "" };
            stages.push(format!("where {not}({})", predicates.join(" and ")));
        }
    }
    Ok(stages)
}

/// Compile one sort entry. Internal fields (leading underscore) sort
/// server-side concepts that do not exist here and are dropped.
pub fn compile_sort(clause: &SortClause) -> String {
    let (field, order) = clause.field_and_order();
    if field.is_empty() || field.starts_with('_') {
        return String::new();
    }
    format!("{field} {order}")
}

// Nested bool: each list collapses to one parenthesized group, groups
// joined with " and ". Pipe fragments have no predicate form, so free
// text inside a nested bool is fatal.
fn compile_bool_predicate(bool_query: &BoolQuery) -> Result<Fragment, Error> {
    let lists = [
        (&bool_query.must, false),
        (&bool_query.must_not, true),
        (&bool_query.should, false),
        (&bool_query.should_not, true),
    ];

    let mut groups = Vec::new();
    for (list, negated) in lists {
        let mut predicates = Vec::new();
        for clause in list {
            match compile(clause)? {
                Fragment::Empty => {}
                Fragment::Predicate(p) => predicates.push(p),
                Fragment::Stage(_) => {
                    return Err(Error::Compile(
                        "free text search is not allowed inside a nested boolean".to_string(),
                    ))
                }
            }
        }
        if !predicates.is_empty() {
            let not = if negated { "not " } else { "" };
            groups.push(format!("{not}({})", predicates.join(" and ")));
        }
    }

    if groups.is_empty() {
        Ok(Fragment::Empty)
    } else {
        Ok(Fragment::Predicate(groups.join(" and ")))
    }
}

fn compile_range(range: &RangeQuery) -> Result<Fragment, Error> {
    let temporal = range.is_temporal();
    let bound = |value: &Value| -> Result<String, Error> {
        if temporal {
            match value {
                Value::Number(n) => Ok(format!("fromUnixTimeMilli({n})")),
                Value::String(s) => datemath::to_kusto_expr(s),
                other => Err(Error::Parse(format!(
                    "unsupported temporal range bound: {other}"
                ))),
            }
        } else {
            match value {
                Value::Number(n) => Ok(n.to_string()),
                Value::String(s) => Ok(format!("\"{}\"", escape_string(s))),
                other => Err(Error::Parse(format!("unsupported range bound: {other}"))),
            }
        }
    };

    // Closed temporal intervals read better as `between`
    if temporal {
        if let (Some(lower), Some(upper)) = (&range.gte, &range.lte) {
            return Ok(Fragment::Predicate(format!(
                "{} between ({} .. {})",
                range.field,
                bound(lower)?,
                bound(upper)?
            )));
        }
    }

    let mut parts = Vec::new();
    if let Some(v) = &range.gte {
        parts.push(format!("{} >= {}", range.field, bound(v)?));
    }
    if let Some(v) = &range.gt {
        parts.push(format!("{} > {}", range.field, bound(v)?));
    }
    if let Some(v) = &range.lte {
        parts.push(format!("{} <= {}", range.field, bound(v)?));
    }
    if let Some(v) = &range.lt {
        parts.push(format!("{} < {}", range.field, bound(v)?));
    }

    if parts.is_empty() {
        return Ok(Fragment::Empty);
    }
    Ok(Fragment::Predicate(parts.join(" and ")))
}

fn compile_query_string(
    phrase: &str,
    subtype: QueryStringSubtype,
    field: Option<&str>,
) -> Result<Fragment, Error> {
    use QueryStringSubtype::*;

    let fragment = match (field, subtype) {
        (Some(f), Term | Phrase) => {
            Fragment::Predicate(format!("{f} contains \"{}\"", escape_string(phrase)))
        }
        (Some(f), Prefix) => {
            Fragment::Predicate(format!("{f} startswith \"{}\"", escape_string(phrase)))
        }
        (Some(f), Wildcard) => Fragment::Predicate(format!(
            "{f} matches regex \"{}\"",
            escape_string(&wildcard_to_regex(phrase))
        )),
        (Some(f), MatchAll) => Fragment::Predicate(format!("isnotnull({f})")),
        (None, MatchAll) => Fragment::Empty,
        (None, Term | Phrase) => Fragment::Stage(format!("search {phrase} | project-away $table")),
        (None, Prefix) => {
            Fragment::Predicate(format!("* startswith \"{}\"", escape_string(phrase)))
        }
        (None, Wildcard) => Fragment::Predicate(format!(
            "* matches regex \"{}\"",
            escape_string(&wildcard_to_regex(phrase))
        )),
    };
    Ok(fragment)
}

pub(crate) fn escape_string(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

// Glob pattern to an anchored-enough regex: `*` spans anything, `?` one
// character, everything else literal.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                regex.push('\\');
                regex.push(c);
            }
            other => regex.push(other),
        }
    }
    regex
}
