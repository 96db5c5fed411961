use crate::{Expr, Filter, Operator};

/// Bring a filter into normal form.
///
/// - Expression leaves that are `&&`, `||` or `!` calls are lifted into
///   filter nodes.
/// - Negation is pushed down to the leaves with De Morgan's laws and double
///   negation cancels.
/// - Nested operations of the same kind are flattened, and their children
///   are deduplicated and sorted by rendered form.
/// - Boolean literal children are folded; an operation left with no
///   children becomes its neutral literal and one left with a single child
///   becomes that child.
///
/// Normalising a filter that is already normal returns it unchanged.
#[must_use]
pub fn normalise(filter: Filter) -> Filter {
    match filter {
        Filter::Expression(expr) => match Filter::from_expr(&expr) {
            Filter::Expression(_) => Filter::Expression(expr),
            lifted => normalise(lifted),
        },
        Filter::Not(inner) => negate(normalise(*inner)),
        Filter::And(children) => combine(Operator::And, children.into_iter().map(normalise)),
        Filter::Or(children) => combine(Operator::Or, children.into_iter().map(normalise)),
    }
}

/// Negation of a normal filter.
fn negate(filter: Filter) -> Filter {
    match filter {
        Filter::Expression(expr) => match expr.as_bool() {
            Some(b) => constant(!b),
            None => Filter::Not(Box::new(Filter::Expression(expr))),
        },
        Filter::Not(inner) => *inner,
        Filter::And(children) => combine(Operator::Or, children.into_iter().map(negate)),
        Filter::Or(children) => combine(Operator::And, children.into_iter().map(negate)),
    }
}

fn combine(operator: Operator, children: impl Iterator<Item = Filter>) -> Filter {
    let absorbing = operator == Operator::Or;
    let mut flat = Vec::new();
    for child in children {
        match (operator, child) {
            (Operator::And, Filter::And(grandchildren)) | (Operator::Or, Filter::Or(grandchildren)) => {
                flat.extend(grandchildren);
            }
            (_, child) => match child.as_constant() {
                Some(b) if b == absorbing => return constant(absorbing),
                Some(_) => {}
                None => flat.push(child),
            },
        }
    }
    flat.sort_by_cached_key(ToString::to_string);
    flat.dedup_by(|a, b| a.to_string() == b.to_string());
    match flat.len() {
        0 => constant(!absorbing),
        1 => flat.swap_remove(0),
        _ => match operator {
            Operator::And => Filter::And(flat),
            Operator::Or => Filter::Or(flat),
        },
    }
}

fn constant(b: bool) -> Filter {
    Filter::Expression(Expr::literal(b))
}
