//! The list macros and the comprehension shapes they expand to.
//!
//! Every macro folds over its range with the accumulator [`ACCUMULATOR`]:
//!
//! | macro        | init    | condition                       | step                                   | result       |
//! |--------------|---------|---------------------------------|----------------------------------------|--------------|
//! | `all`        | `true`  | `@not_strictly_false(acc)`      | `acc && p`                             | `acc`        |
//! | `exists`     | `false` | `@not_strictly_false(!acc)`     | `acc \|\| p`                           | `acc`        |
//! | `exists_one` | `0`     | `true`                          | `p ? acc + 1 : acc`                    | `acc == 1`   |
//! | `map` (2)    | `[]`    | `true`                          | `acc + [t]`                            | `acc`        |
//! | `map` (3)    | `[]`    | `true`                          | `p ? acc + [t] : acc`                  | `acc`        |
//! | `filter`     | `[]`    | `true`                          | `p ? acc + [x] : acc`                  | `acc`        |
//!
//! `p` is the predicate and `t` the transform written by the user; they are
//! the only parts of a comprehension that depend on the iteration variables.

use super::expr::{call, ident, list, Comprehension, Expr, ExprKind};
use super::literal::Literal;
use super::ops;

/// Accumulator name used by macro expansion.
pub const ACCUMULATOR: &str = "__result__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroKind {
    All,
    Exists,
    ExistsOne,
    /// `map(x, t)`
    Map,
    /// `map(x, p, t)`
    MapFilter,
    Filter,
}

impl MacroKind {
    const KINDS: [MacroKind; 6] = [
        MacroKind::All,
        MacroKind::Exists,
        MacroKind::ExistsOne,
        MacroKind::Filter,
        MacroKind::MapFilter,
        MacroKind::Map,
    ];

    /// Method name in source syntax.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MacroKind::All => "all",
            MacroKind::Exists => "exists",
            MacroKind::ExistsOne => "exists_one",
            MacroKind::Map | MacroKind::MapFilter => "map",
            MacroKind::Filter => "filter",
        }
    }

    /// Resolve a method call `name` with `argc` arguments to a macro.
    #[must_use]
    pub fn from_call(name: &str, argc: usize) -> Option<MacroKind> {
        match (name, argc) {
            ("all", 2 | 3) => Some(MacroKind::All),
            ("exists", 2 | 3) => Some(MacroKind::Exists),
            ("exists_one", 2 | 3) => Some(MacroKind::ExistsOne),
            ("map", 2) => Some(MacroKind::Map),
            ("map", 3) => Some(MacroKind::MapFilter),
            ("filter", 2) => Some(MacroKind::Filter),
            _ => None,
        }
    }

    /// Whether the macro may bind a second iteration variable.
    #[must_use]
    pub fn allows_two_vars(self) -> bool {
        matches!(self, MacroKind::All | MacroKind::Exists | MacroKind::ExistsOne)
    }

    fn has_predicate(self) -> bool {
        !matches!(self, MacroKind::Map)
    }

    fn has_transform(self) -> bool {
        matches!(self, MacroKind::Map | MacroKind::MapFilter)
    }

    fn accu_init(self) -> Expr {
        match self {
            MacroKind::All => Expr::literal(true),
            MacroKind::Exists => Expr::literal(false),
            MacroKind::ExistsOne => Expr::literal(0_i64),
            MacroKind::Map | MacroKind::MapFilter | MacroKind::Filter => {
                Expr::literal(Literal::List(Vec::new()))
            }
        }
    }

    fn loop_condition(self, accu: &str) -> Expr {
        match self {
            MacroKind::All => call(ops::NOT_STRICTLY_FALSE, vec![ident(accu)]),
            MacroKind::Exists => call(ops::NOT_STRICTLY_FALSE, vec![!ident(accu)]),
            _ => Expr::literal(true),
        }
    }

    fn result(self, accu: &str) -> Expr {
        match self {
            MacroKind::ExistsOne => call(ops::EQUALS, vec![ident(accu), Expr::literal(1_i64)]),
            _ => ident(accu),
        }
    }

    /// Build the loop step from the user-written parts.
    ///
    /// Returns `None` when a part this macro requires is missing.
    #[must_use]
    pub fn loop_step(
        self,
        accu: &str,
        iter_var: &str,
        predicate: Option<Expr>,
        transform: Option<Expr>,
    ) -> Option<Expr> {
        let appended = |item: Expr| call(ops::ADD, vec![ident(accu), list(vec![item])]);
        let guarded = |guard: Expr, then: Expr| call(ops::CONDITIONAL, vec![guard, then, ident(accu)]);
        Some(match self {
            MacroKind::All => ident(accu).and(predicate?),
            MacroKind::Exists => ident(accu).or(predicate?),
            MacroKind::ExistsOne => guarded(
                predicate?,
                call(ops::ADD, vec![ident(accu), Expr::literal(1_i64)]),
            ),
            MacroKind::Map => appended(transform?),
            MacroKind::MapFilter => guarded(predicate?, appended(transform?)),
            MacroKind::Filter => guarded(predicate?, appended(ident(iter_var))),
        })
    }
}

/// A comprehension recognised as one of the supported macros.
#[derive(Debug, Clone, Copy)]
pub struct MacroView<'a> {
    pub kind: MacroKind,
    pub predicate: Option<&'a Expr>,
    pub transform: Option<&'a Expr>,
}

/// Expand a macro call into its comprehension.
///
/// Returns `None` when the parts do not fit the macro.
#[must_use]
pub fn expand(
    kind: MacroKind,
    range: Expr,
    iter_var: &str,
    iter_var2: Option<&str>,
    predicate: Option<Expr>,
    transform: Option<Expr>,
) -> Option<Expr> {
    if iter_var2.is_some() && !kind.allows_two_vars() {
        return None;
    }
    if iter_var == ACCUMULATOR || iter_var2 == Some(ACCUMULATOR) {
        return None;
    }
    let loop_step = kind.loop_step(ACCUMULATOR, iter_var, predicate, transform)?;
    Some(Expr::new(ExprKind::Comprehension(Box::new(Comprehension {
        iter_range: range,
        iter_var: iter_var.to_owned(),
        iter_var2: iter_var2.map(str::to_owned),
        accu_var: ACCUMULATOR.to_owned(),
        accu_init: kind.accu_init(),
        loop_condition: kind.loop_condition(ACCUMULATOR),
        loop_step,
        result: kind.result(ACCUMULATOR),
    }))))
}

/// Recognise a comprehension as one of the supported macros.
#[must_use]
pub fn classify(c: &Comprehension) -> Option<MacroView<'_>> {
    let accu = c.accu_var.as_str();
    if c.iter_var == accu || c.iter_var2.as_deref() == Some(accu) {
        return None;
    }
    MacroKind::KINDS.into_iter().find_map(|kind| {
        if c.iter_var2.is_some() && !kind.allows_two_vars() {
            return None;
        }
        if !c.accu_init.same_shape(&kind.accu_init())
            || !c.loop_condition.same_shape(&kind.loop_condition(accu))
            || !c.result.same_shape(&kind.result(accu))
        {
            return None;
        }
        let (predicate, transform) = step_parts(kind, &c.loop_step, accu, &c.iter_var)?;
        Some(MacroView {
            kind,
            predicate,
            transform,
        })
    })
}

type Parts<'a> = (Option<&'a Expr>, Option<&'a Expr>);

fn step_parts<'a>(kind: MacroKind, step: &'a Expr, accu: &str, iter_var: &str) -> Option<Parts<'a>> {
    let is_accu = |e: &Expr| e.as_ident() == Some(accu);
    match kind {
        MacroKind::All | MacroKind::Exists => {
            let function = if kind == MacroKind::All {
                ops::LOGICAL_AND
            } else {
                ops::LOGICAL_OR
            };
            match step.as_call(function, 2)? {
                [acc, predicate] if is_accu(acc) => Some((Some(predicate), None)),
                _ => None,
            }
        }
        MacroKind::ExistsOne => {
            let [predicate, then, otherwise] = step.as_call(ops::CONDITIONAL, 3)? else {
                return None;
            };
            let [acc, one] = then.as_call(ops::ADD, 2)? else {
                return None;
            };
            let counts = is_accu(acc) && one.as_literal() == Some(&Literal::Int(1));
            (counts && is_accu(otherwise)).then_some((Some(predicate), None))
        }
        MacroKind::Map => appended_item(step, accu).map(|t| (None, Some(t))),
        MacroKind::MapFilter | MacroKind::Filter => {
            let [predicate, then, otherwise] = step.as_call(ops::CONDITIONAL, 3)? else {
                return None;
            };
            if !is_accu(otherwise) {
                return None;
            }
            let item = appended_item(then, accu)?;
            let is_filter = item.as_ident() == Some(iter_var);
            match kind {
                MacroKind::Filter if is_filter => Some((Some(predicate), None)),
                MacroKind::MapFilter if !is_filter => Some((Some(predicate), Some(item))),
                _ => None,
            }
        }
    }
}

/// The `t` of `acc + [t]`.
fn appended_item<'a>(step: &'a Expr, accu: &str) -> Option<&'a Expr> {
    let [acc, single] = step.as_call(ops::ADD, 2)? else {
        return None;
    };
    if acc.as_ident() != Some(accu) {
        return None;
    }
    match &single.kind {
        ExprKind::List(items) if items.len() == 1 => items.first(),
        _ => None,
    }
}

impl MacroView<'_> {
    /// Parts present for this macro, in source order.
    #[must_use]
    pub fn parts(&self) -> Vec<&Expr> {
        let mut parts = Vec::with_capacity(2);
        if self.kind.has_predicate() {
            parts.extend(self.predicate);
        }
        if self.kind.has_transform() {
            parts.extend(self.transform);
        }
        parts
    }
}
