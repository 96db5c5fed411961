//! Function names the expression grammar uses for its operators.
//!
//! Operators are ordinary calls in the expression tree; these constants are the
//! call names the parser emits and the evaluator, residual builder and unparser
//! dispatch on.

pub const LOGICAL_AND: &str = "_&&_";
pub const LOGICAL_OR: &str = "_||_";
pub const LOGICAL_NOT: &str = "!_";
pub const NEGATE: &str = "-_";
pub const CONDITIONAL: &str = "_?_:_";
pub const INDEX: &str = "_[_]";
pub const IN: &str = "@in";
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";

pub const EQUALS: &str = "_==_";
pub const NOT_EQUALS: &str = "_!=_";
pub const LESS: &str = "_<_";
pub const LESS_EQUALS: &str = "_<=_";
pub const GREATER: &str = "_>_";
pub const GREATER_EQUALS: &str = "_>=_";

pub const ADD: &str = "_+_";
pub const SUBTRACT: &str = "_-_";
pub const MULTIPLY: &str = "_*_";
pub const DIVIDE: &str = "_/_";
pub const MODULO: &str = "_%_";

// Binding strength, loosest first.
pub(crate) const PREC_CONDITIONAL: u8 = 1;
pub(crate) const PREC_OR: u8 = 2;
pub(crate) const PREC_AND: u8 = 3;
pub(crate) const PREC_RELATION: u8 = 4;
pub(crate) const PREC_ADDITIVE: u8 = 5;
pub(crate) const PREC_MULTIPLICATIVE: u8 = 6;
pub(crate) const PREC_UNARY: u8 = 7;
pub(crate) const PREC_MEMBER: u8 = 8;

/// Source symbol and precedence of a binary operator call.
pub(crate) fn binary(function: &str) -> Option<(&'static str, u8)> {
    let found = match function {
        LOGICAL_OR => ("||", PREC_OR),
        LOGICAL_AND => ("&&", PREC_AND),
        EQUALS => ("==", PREC_RELATION),
        NOT_EQUALS => ("!=", PREC_RELATION),
        LESS => ("<", PREC_RELATION),
        LESS_EQUALS => ("<=", PREC_RELATION),
        GREATER => (">", PREC_RELATION),
        GREATER_EQUALS => (">=", PREC_RELATION),
        IN => ("in", PREC_RELATION),
        ADD => ("+", PREC_ADDITIVE),
        SUBTRACT => ("-", PREC_ADDITIVE),
        MULTIPLY => ("*", PREC_MULTIPLICATIVE),
        DIVIDE => ("/", PREC_MULTIPLICATIVE),
        MODULO => ("%", PREC_MULTIPLICATIVE),
        _ => return None,
    };
    Some(found)
}
