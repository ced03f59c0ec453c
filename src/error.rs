//! Error types for the `xss_guard` crate.
//!
//! Malformed markup is never an error: every irregularity in the input is
//! resolved by a fallback and still produces output. Errors only come from
//! building the machinery (grammar, policy) or from writing to a sink.

/// A malformed rule notation or an inconsistent rule graph.
///
/// Raised by [`Grammar::compile`](crate::grammar::Grammar::compile) and by
/// start-rule lookups; never raised while filtering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    /// A `(` was never closed.
    #[error("unterminated group opened at offset {offset}")]
    UnterminatedGroup { offset: usize },

    /// A quoted literal was never closed.
    #[error("unterminated literal starting at offset {offset}")]
    UnterminatedLiteral { offset: usize },

    /// A `[` character class was never closed.
    #[error("unterminated character class starting at offset {offset}")]
    UnterminatedCharClass { offset: usize },

    /// A character that is not part of the rule notation.
    #[error("unknown operator {found:?} at offset {offset}")]
    UnknownOperator { found: char, offset: usize },

    /// A well-formed token in a position where it cannot appear.
    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    /// A `#x` code point that is malformed or not a valid `char`.
    #[error("invalid character code at offset {offset}")]
    InvalidCharCode { offset: usize },

    /// A rule name with no `::=` after it.
    #[error("expected `::=` after rule name `{name}`")]
    MissingDefinition { name: String },

    /// Two definitions for the same rule name.
    #[error("rule `{name}` is defined more than once")]
    DuplicateRule { name: String },

    /// A reference to a rule that is never defined.
    #[error("rule `{rule}` references undefined rule `{name}`")]
    UndefinedRule { rule: String, name: String },

    /// Tokenization was asked to start from a rule that does not exist.
    #[error("unknown start rule `{name}`")]
    UnknownStartRule { name: String },

    /// The rule text contained no definitions at all.
    #[error("grammar contains no rules")]
    EmptyGrammar,
}

/// All errors that can occur while building or running a filter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The rule notation handed to the grammar engine is invalid.
    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),

    /// An allowed or denied attribute pattern is not a valid regex.
    #[error("Invalid attribute pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A rule referenced a listener name the registry does not know.
    #[error("Unknown listener: {0}")]
    UnknownListener(String),

    /// The streaming filter could not write to its sink.
    #[error("Sink write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A type alias for `Result<T, xss_guard::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
