//! Recursive-descent parser for the supported Lucene syntax.
//!
//! Precedence: OR (lowest) > AND > NOT > primary (highest).

use super::tokenizer;
use super::{LuceneNode, Occur};
use crate::error::Error;

pub fn parse(query: &str) -> Result<LuceneNode, Error> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(Error::Parse("empty query string".to_string()));
    }
    parse_or(trimmed)
}

fn parse_or(input: &str) -> Result<LuceneNode, Error> {
    let parts = split_by_operator(input, " OR ");
    if parts.len() > 1 {
        let clauses = parts
            .iter()
            .map(|p| parse_and(p).map(|n| (Occur::Should, n)))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(LuceneNode::Boolean { clauses });
    }
    parse_and(input)
}

fn parse_and(input: &str) -> Result<LuceneNode, Error> {
    let parts = split_by_operator(input, " AND ");
    if parts.len() > 1 {
        let clauses = parts
            .iter()
            .map(|p| parse_clause(p, Occur::Must))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(LuceneNode::Boolean { clauses });
    }

    let (occur, node) = parse_clause(input, Occur::Must)?;
    if occur == Occur::MustNot {
        return Ok(LuceneNode::Boolean {
            clauses: vec![(Occur::MustNot, node)],
        });
    }
    Ok(node)
}

fn parse_clause(input: &str, default: Occur) -> Result<(Occur, LuceneNode), Error> {
    let trimmed = input.trim();
    if let Some(rest) = trimmed.strip_prefix("NOT ") {
        return Ok((Occur::MustNot, parse_primary(rest)?));
    }
    if let Some(rest) = trimmed.strip_prefix('+') {
        return Ok((Occur::Must, parse_primary(rest)?));
    }
    if let Some(rest) = trimmed.strip_prefix('-') {
        return Ok((Occur::MustNot, parse_primary(rest)?));
    }
    Ok((default, parse_primary(trimmed)?))
}

fn parse_primary(input: &str) -> Result<LuceneNode, Error> {
    let trimmed = input.trim();

    if trimmed.starts_with('(') && trimmed.ends_with(')') {
        return parse_or(&trimmed[1..trimmed.len() - 1]);
    }

    // Boost: term^2.0
    if let Some((term_part, boost_part)) = trimmed.rsplit_once('^') {
        if let Ok(boost) = boost_part.parse::<f32>() {
            return Ok(LuceneNode::Boost {
                node: Box::new(parse_term(term_part)?),
                boost,
            });
        }
    }

    // Fuzzy: term~ / term~2
    if let Some((term_part, fuzz)) = trimmed.rsplit_once('~') {
        if !term_part.is_empty() && (fuzz.is_empty() || fuzz.chars().all(|c| c.is_ascii_digit())) {
            let distance = if fuzz.is_empty() { 2 } else { fuzz.parse().unwrap_or(2) };
            return Ok(LuceneNode::Fuzzy {
                node: Box::new(parse_term(term_part)?),
                distance,
            });
        }
    }

    parse_term(trimmed)
}

fn parse_term(input: &str) -> Result<LuceneNode, Error> {
    let trimmed = input.trim();

    if let Ok((_, body)) = tokenizer::quoted(trimmed) {
        return Ok(phrase(None, body));
    }

    if let Some((field, value)) = trimmed.split_once(':') {
        if is_field_name(field) {
            if let Ok((_, r)) = tokenizer::range(value) {
                return Ok(LuceneNode::TermRange {
                    field: field.to_string(),
                    lower: r.lower,
                    upper: r.upper,
                    inclusive: r.inclusive,
                });
            }
            if let Ok((_, body)) = tokenizer::quoted(value) {
                return Ok(phrase(Some(field.to_string()), body));
            }
            return Ok(classify(Some(field.to_string()), value));
        }
    }

    if trimmed.contains(char::is_whitespace) {
        return Ok(phrase(None, trimmed));
    }

    Ok(classify(None, trimmed))
}

fn phrase(field: Option<String>, body: &str) -> LuceneNode {
    LuceneNode::Phrase {
        field,
        terms: body.split_whitespace().map(str::to_string).collect(),
    }
}

fn classify(field: Option<String>, text: &str) -> LuceneNode {
    if text == "*" && field.is_none() {
        return LuceneNode::MatchAll;
    }
    let stars = text.matches('*').count();
    let questions = text.matches('?').count();
    if stars == 1 && questions == 0 && text.ends_with('*') && text.len() > 1 {
        return LuceneNode::Prefix {
            field,
            text: text[..text.len() - 1].to_string(),
        };
    }
    if stars > 0 || questions > 0 {
        return LuceneNode::Wildcard {
            field,
            pattern: text.to_string(),
        };
    }
    LuceneNode::Term {
        field,
        text: text.to_string(),
    }
}

fn is_field_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-' || c == '@')
}

// Split by operator at depth zero, respecting parentheses and quotes.
fn split_by_operator(input: &str, operator: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
            rest = &rest[c.len_utf8()..];
        } else if !in_quotes && c == '(' {
            depth += 1;
            current.push(c);
            rest = &rest[1..];
        } else if !in_quotes && c == ')' {
            depth = depth.saturating_sub(1);
            current.push(c);
            rest = &rest[1..];
        } else if !in_quotes && depth == 0 && rest.starts_with(operator) {
            if !current.trim().is_empty() {
                parts.push(current.trim().to_string());
            }
            current.clear();
            rest = &rest[operator.len()..];
        } else {
            current.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }

    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    if parts.is_empty() {
        vec![input.to_string()]
    } else {
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_term() {
        assert_eq!(
            parse("auth").unwrap(),
            LuceneNode::Term {
                field: None,
                text: "auth".to_string()
            }
        );
    }

    #[test]
    fn test_field_term() {
        assert_eq!(
            parse("level:error").unwrap(),
            LuceneNode::Term {
                field: Some("level".to_string()),
                text: "error".to_string()
            }
        );
    }

    #[test]
    fn test_empty_is_error() {
        assert!(parse("  ").is_err());
    }

    #[test]
    fn test_quoted_phrase() {
        assert_eq!(
            parse("\"quick brown fox\"").unwrap(),
            LuceneNode::Phrase {
                field: None,
                terms: vec!["quick".into(), "brown".into(), "fox".into()]
            }
        );
    }

    #[test]
    fn test_unquoted_multiword_is_phrase() {
        match parse("quick fox").unwrap() {
            LuceneNode::Phrase { field: None, terms } => assert_eq!(terms.len(), 2),
            other => panic!("expected phrase, got {:?}", other),
        }
    }

    #[test]
    fn test_field_scoped_phrase() {
        match parse("msg:\"disk full\"").unwrap() {
            LuceneNode::Phrase { field, terms } => {
                assert_eq!(field.as_deref(), Some("msg"));
                assert_eq!(terms, vec!["disk", "full"]);
            }
            other => panic!("expected phrase, got {:?}", other),
        }
    }

    #[test]
    fn test_prefix() {
        assert_eq!(
            parse("err*").unwrap(),
            LuceneNode::Prefix {
                field: None,
                text: "err".to_string()
            }
        );
    }

    #[test]
    fn test_wildcard() {
        assert_eq!(
            parse("host:web-??-*a").unwrap(),
            LuceneNode::Wildcard {
                field: Some("host".to_string()),
                pattern: "web-??-*a".to_string()
            }
        );
    }

    #[test]
    fn test_match_all() {
        assert_eq!(parse("*").unwrap(), LuceneNode::MatchAll);
    }

    #[test]
    fn test_range_inclusive() {
        assert_eq!(
            parse("bytes:[100 TO 200]").unwrap(),
            LuceneNode::TermRange {
                field: "bytes".to_string(),
                lower: Some("100".to_string()),
                upper: Some("200".to_string()),
                inclusive: true,
            }
        );
    }

    #[test]
    fn test_and_distributes_must() {
        match parse("error AND warning").unwrap() {
            LuceneNode::Boolean { clauses } => {
                assert_eq!(clauses.len(), 2);
                assert!(clauses.iter().all(|(o, _)| *o == Occur::Must));
            }
            other => panic!("expected boolean, got {:?}", other),
        }
    }

    #[test]
    fn test_or_distributes_should() {
        match parse("error OR warning OR info").unwrap() {
            LuceneNode::Boolean { clauses } => {
                assert_eq!(clauses.len(), 3);
                assert!(clauses.iter().all(|(o, _)| *o == Occur::Should));
            }
            other => panic!("expected boolean, got {:?}", other),
        }
    }

    #[test]
    fn test_not_distributes_must_not() {
        match parse("error AND NOT debug").unwrap() {
            LuceneNode::Boolean { clauses } => {
                assert_eq!(clauses[0].0, Occur::Must);
                assert_eq!(clauses[1].0, Occur::MustNot);
            }
            other => panic!("expected boolean, got {:?}", other),
        }
    }

    #[test]
    fn test_minus_prefix() {
        match parse("error AND -debug").unwrap() {
            LuceneNode::Boolean { clauses } => assert_eq!(clauses[1].0, Occur::MustNot),
            other => panic!("expected boolean, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_not() {
        match parse("NOT debug").unwrap() {
            LuceneNode::Boolean { clauses } => {
                assert_eq!(clauses.len(), 1);
                assert_eq!(clauses[0].0, Occur::MustNot);
            }
            other => panic!("expected boolean, got {:?}", other),
        }
    }

    #[test]
    fn test_parens_respected() {
        match parse("(a OR b) AND c").unwrap() {
            LuceneNode::Boolean { clauses } => {
                assert_eq!(clauses.len(), 2);
                assert!(matches!(clauses[0].1, LuceneNode::Boolean { .. }));
            }
            other => panic!("expected boolean, got {:?}", other),
        }
    }

    #[test]
    fn test_operator_inside_quotes_ignored() {
        match parse("\"black AND white\"").unwrap() {
            LuceneNode::Phrase { terms, .. } => assert_eq!(terms.len(), 3),
            other => panic!("expected phrase, got {:?}", other),
        }
    }

    #[test]
    fn test_boost_parsed() {
        assert!(matches!(
            parse("important^2.0").unwrap(),
            LuceneNode::Boost { boost, .. } if boost == 2.0
        ));
    }

    #[test]
    fn test_fuzzy_parsed() {
        assert!(matches!(
            parse("roam~1").unwrap(),
            LuceneNode::Fuzzy { distance: 1, .. }
        ));
    }
}
