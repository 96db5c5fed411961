use super::Expr;
use crate::parse::{parse, ParseError};

/// A policy condition: an expression leaf or a logical combination of conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Expr(Expr),
    /// Satisfied when every child is; empty is satisfied.
    All(Vec<Condition>),
    /// Satisfied when some child is; empty is not satisfied.
    Any(Vec<Condition>),
}

impl Condition {
    /// Parse an expression leaf.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if `source` is not a valid expression.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        parse(source).map(Condition::Expr)
    }

    #[must_use]
    pub fn all(children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::All(children.into_iter().collect())
    }

    #[must_use]
    pub fn any(children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Any(children.into_iter().collect())
    }
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Condition::Expr(expr)
    }
}
