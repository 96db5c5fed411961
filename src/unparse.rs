use std::fmt;

use crate::types::comprehension::classify;
use crate::types::ops::{self, PREC_CONDITIONAL, PREC_MEMBER, PREC_OR, PREC_UNARY};
use crate::{Call, Comprehension, Expr, ExprKind, Literal};

/// Binding strength of the construct at the root of `expr`.
pub(crate) fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Call(call) if call.target.is_none() => match call.function.as_str() {
            ops::CONDITIONAL if call.args.len() == 3 => PREC_CONDITIONAL,
            ops::LOGICAL_NOT | ops::NEGATE if call.args.len() == 1 => PREC_UNARY,
            function if call.args.len() == 2 => ops::binary(function).map_or(PREC_MEMBER, |(_, p)| p),
            _ => PREC_MEMBER,
        },
        ExprKind::Literal(Literal::Int(i)) if *i < 0 => PREC_UNARY,
        ExprKind::Literal(Literal::Float(f)) if f.is_sign_negative() => PREC_UNARY,
        _ => PREC_MEMBER,
    }
}

fn operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
    if precedence(expr) < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn comma_separated(f: &mut fmt::Formatter<'_>, items: &[&Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_call(f: &mut fmt::Formatter<'_>, call: &Call) -> fmt::Result {
    if let Some(target) = &call.target {
        operand(f, target, PREC_MEMBER)?;
        write!(f, ".{}(", call.function)?;
        comma_separated(f, &call.args.iter().collect::<Vec<_>>())?;
        return f.write_str(")");
    }
    match (call.function.as_str(), call.args.as_slice()) {
        (ops::CONDITIONAL, [condition, then, otherwise]) => {
            operand(f, condition, PREC_OR)?;
            f.write_str(" ? ")?;
            operand(f, then, PREC_OR)?;
            f.write_str(" : ")?;
            operand(f, otherwise, PREC_CONDITIONAL)
        }
        (ops::LOGICAL_NOT, [inner]) => {
            f.write_str("!")?;
            operand(f, inner, PREC_UNARY)
        }
        (ops::NEGATE, [inner]) => {
            f.write_str("-")?;
            operand(f, inner, PREC_UNARY)
        }
        (ops::INDEX, [container, index]) => {
            operand(f, container, PREC_MEMBER)?;
            write!(f, "[{index}]")
        }
        (function, [left, right]) => match ops::binary(function) {
            Some((symbol, prec)) => {
                operand(f, left, prec)?;
                write!(f, " {symbol} ")?;
                operand(f, right, prec + 1)
            }
            None => write_global(f, function, &call.args),
        },
        (function, args) => write_global(f, function, args),
    }
}

fn write_global(f: &mut fmt::Formatter<'_>, function: &str, args: &[Expr]) -> fmt::Result {
    write!(f, "{function}(")?;
    comma_separated(f, &args.iter().collect::<Vec<_>>())?;
    f.write_str(")")
}

fn write_comprehension(f: &mut fmt::Formatter<'_>, c: &Comprehension) -> fmt::Result {
    let Some(view) = classify(c) else {
        // No macro spelling; show the raw fold.
        write!(
            f,
            "__comprehension__({}, {}, {}, {}, {}, {}, {})",
            c.iter_range, c.iter_var, c.accu_var, c.accu_init, c.loop_condition, c.loop_step, c.result
        )?;
        return Ok(());
    };
    operand(f, &c.iter_range, PREC_MEMBER)?;
    write!(f, ".{}({}", view.kind.name(), c.iter_var)?;
    if let Some(second) = &c.iter_var2 {
        write!(f, ", {second}")?;
    }
    for part in view.parts() {
        write!(f, ", {part}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(literal) => write!(f, "{literal}"),
            ExprKind::Ident(name) => f.write_str(name),
            ExprKind::Select {
                operand: inner,
                field,
                test_only,
            } => {
                if *test_only {
                    f.write_str("has(")?;
                    operand(f, inner, PREC_MEMBER)?;
                    write!(f, ".{field})")
                } else {
                    operand(f, inner, PREC_MEMBER)?;
                    write!(f, ".{field}")
                }
            }
            ExprKind::Call(call) => write_call(f, call),
            ExprKind::List(items) => {
                f.write_str("[")?;
                comma_separated(f, &items.iter().collect::<Vec<_>>())?;
                f.write_str("]")
            }
            ExprKind::Map(entries) => {
                f.write_str("{")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", entry.key, entry.value)?;
                }
                f.write_str("}")
            }
            ExprKind::Comprehension(c) => write_comprehension(f, c),
        }
    }
}
