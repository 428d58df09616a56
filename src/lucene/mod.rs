//! Lucene-syntax free text support for `query_string` clauses.
//!
//! The tokenizer and parser produce a closed node set; the adapter remaps
//! each node into the internal query tree. Anything the adapter does not
//! recognize is a hard error; this is the boundary of supported
//! free-text syntax.

pub mod adapter;
mod parser;
mod tokenizer;

pub use parser::parse;

/// Lucene occurrence flag on boolean clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

/// Parsed Lucene-syntax node.
#[derive(Debug, Clone, PartialEq)]
pub enum LuceneNode {
    /// Single term: `auth` or `level:error`
    Term {
        field: Option<String>,
        text: String,
    },

    /// Phrase: `"quick brown fox"` or unquoted multi-word text
    Phrase {
        field: Option<String>,
        terms: Vec<String>,
    },

    /// Trailing-star prefix: `err*`
    Prefix {
        field: Option<String>,
        text: String,
    },

    /// General wildcard: `e?r*r`
    Wildcard {
        field: Option<String>,
        pattern: String,
    },

    /// `field:[a TO b]` (inclusive) or `field:{a TO b}` (exclusive)
    TermRange {
        field: String,
        lower: Option<String>,
        upper: Option<String>,
        inclusive: bool,
    },

    /// Bare `*`
    MatchAll,

    /// `a AND b`, `a OR b`, `NOT a`, `+a -b`
    Boolean {
        clauses: Vec<(Occur, LuceneNode)>,
    },

    /// `term^2.0`, parsed so the adapter can reject it explicitly
    Boost {
        node: Box<LuceneNode>,
        boost: f32,
    },

    /// `term~` / `term~2`, parsed so the adapter can reject it explicitly
    Fuzzy {
        node: Box<LuceneNode>,
        distance: u32,
    },
}
