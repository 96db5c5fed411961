use std::fmt;

use super::{ops, Expr, ExprKind, PlanNode};
use crate::{normalise, Operator};

/// A boolean filter over residual expressions, suitable for translation into
/// a datastore query.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Expression(Expr),
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

/// A plan reduced to what a data layer needs to know.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanFilter {
    AlwaysAllowed,
    AlwaysDenied,
    Conditional(Filter),
}

impl Filter {
    /// Lift `&&`, `||` and `!` calls at the top of `expr` into filter nodes.
    #[must_use]
    pub fn from_expr(expr: &Expr) -> Self {
        if let ExprKind::Call(call) = &expr.kind {
            if call.target.is_none() {
                match (call.function.as_str(), call.args.as_slice()) {
                    (ops::LOGICAL_AND, [left, right]) => {
                        return Filter::And(vec![Filter::from_expr(left), Filter::from_expr(right)])
                    }
                    (ops::LOGICAL_OR, [left, right]) => {
                        return Filter::Or(vec![Filter::from_expr(left), Filter::from_expr(right)])
                    }
                    (ops::LOGICAL_NOT, [inner]) => {
                        return Filter::Not(Box::new(Filter::from_expr(inner)))
                    }
                    _ => {}
                }
            }
        }
        Filter::Expression(expr.clone())
    }

    /// Convert a plan node, lifting logical calls inside its expressions.
    #[must_use]
    pub fn from_plan(node: &PlanNode) -> Self {
        match node {
            PlanNode::Constant(b) => Filter::Expression(Expr::literal(*b)),
            PlanNode::Expression(expr) => Filter::from_expr(expr),
            PlanNode::Operation(op) => {
                let children = op.nodes.iter().map(Filter::from_plan).collect();
                match op.operator {
                    Operator::And => Filter::And(children),
                    Operator::Or => Filter::Or(children),
                }
            }
        }
    }

    /// This filter in normal form. See [`normalise`](crate::normalise).
    #[must_use]
    pub fn normalised(self) -> Self {
        normalise(self)
    }

    /// The constant a filter leaf denotes, if it is a boolean literal.
    #[must_use]
    pub fn as_constant(&self) -> Option<bool> {
        match self {
            Filter::Expression(expr) => expr.as_bool(),
            _ => None,
        }
    }
}

impl PlanFilter {
    /// Normalise a plan into a filter, collapsing decided plans.
    #[must_use]
    pub fn from_plan(node: &PlanNode) -> Self {
        let filter = Filter::from_plan(node).normalised();
        match filter.as_constant() {
            Some(true) => PlanFilter::AlwaysAllowed,
            Some(false) => PlanFilter::AlwaysDenied,
            None => PlanFilter::Conditional(filter),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Expression(expr) => {
                if crate::unparse::precedence(expr) <= ops::PREC_AND {
                    write!(f, "({expr})")
                } else {
                    write!(f, "{expr}")
                }
            }
            Filter::Not(inner) => match inner.as_ref() {
                Filter::Expression(expr) => write!(f, "!({expr})"),
                other => write!(f, "!{other}"),
            },
            Filter::And(children) if children.is_empty() => f.write_str("true"),
            Filter::Or(children) if children.is_empty() => f.write_str("false"),
            Filter::And(children) => write_joined(f, children, " && "),
            Filter::Or(children) => write_joined(f, children, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Filter], separator: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}

impl fmt::Display for PlanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanFilter::AlwaysAllowed => f.write_str("always allowed"),
            PlanFilter::AlwaysDenied => f.write_str("always denied"),
            PlanFilter::Conditional(filter) => write!(f, "{filter}"),
        }
    }
}
