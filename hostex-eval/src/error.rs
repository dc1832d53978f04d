use thiserror::Error;

/// Errors from compiling or evaluating an expression.
///
/// Compile-time variants (`UnexpectedCharacter`, `UnexpectedToken`,
/// `UnexpectedEnd`, `UnknownFunction`) surface at configuration load;
/// evaluation variants (`UnknownVariable`, `TypeMismatch`) are recovered
/// per metric per scrape.
#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    /// The lexer hit a character that cannot start any token.
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedCharacter {
        /// The offending character.
        ch: char,
        /// Byte offset into the expression string.
        offset: usize,
    },

    /// The parser found a token that does not fit the grammar.
    #[error("unexpected token '{token}' at offset {offset}")]
    UnexpectedToken {
        /// Display form of the offending token.
        token: String,
        /// Byte offset into the expression string.
        offset: usize,
    },

    /// The expression ended mid-production.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// A call referenced a function outside the built-in table.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// Evaluation referenced a variable absent from the bindings.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    /// An arithmetic operator was applied to a per-instance sequence.
    #[error("type mismatch: {0} requires a scalar operand")]
    TypeMismatch(&'static str),
}
