mod error;
mod grammar;

pub use error::ParseError;

use crate::Expr;

/// Parse an expression into a tree numbered in pre-order from 1.
///
/// The grammar is the CEL subset used in policy conditions: literals,
/// identifiers, field selection, calls and method calls, indexing, the
/// arithmetic, relational and logical operators, the conditional operator,
/// list and map constructors, `has()` and the list macros (`all`, `exists`,
/// `exists_one`, `map`, `filter`). Lists and maps made only of literals are
/// folded into literal nodes.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid expression, or if it
/// nests deeper than [`DEFAULT_MAX_DEPTH`](crate::DEFAULT_MAX_DEPTH) allows.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    use winnow::Parser;
    grammar::source
        .parse(grammar::Input { input, state: 0 })
        .map(Expr::renumbered)
        .map_err(|e| ParseError::new(e.offset(), e.to_string()))
}
