use std::collections::HashSet;

use tracing::trace;

use crate::types::comprehension::classify;
use crate::types::ops;
use crate::{
    Activation, Comprehension, EvalTrace, Evaluator, Expr, ExprKind, Limits, Literal, PlanError,
};

/// Rebuilds an expression from its evaluation trace.
///
/// Resolved nodes become literals. Unresolved nodes are rebuilt from their
/// rebuilt children. Comprehensions get a dedicated pass: the range and the
/// fixed macro parts use the outer trace, while the predicate and transform
/// are evaluated again with the loop variables unknown and residualised
/// against that nested trace.
#[derive(Debug)]
pub struct ResidualBuilder<'a, E: ?Sized> {
    evaluator: &'a E,
    activation: &'a Activation,
    limits: Limits,
}

impl<'a, E: Evaluator + ?Sized> ResidualBuilder<'a, E> {
    #[must_use]
    pub fn new(evaluator: &'a E, activation: &'a Activation, limits: Limits) -> Self {
        Self {
            evaluator,
            activation,
            limits,
        }
    }

    /// Residual of `expr` given the trace of its evaluation against this
    /// builder's activation. The result has fresh pre-order identifiers.
    ///
    /// # Errors
    ///
    /// - [`PlanError::TraceMismatch`] if the trace mentions nodes that are not
    ///   in `expr`, or `expr` reuses an identifier.
    /// - [`PlanError::UnsupportedComprehensionShape`] for loops that are not
    ///   one of the list macros.
    /// - [`PlanError::Evaluation`] if re-evaluating a loop body fails.
    /// - [`PlanError::DepthExceeded`] past the configured nesting limit.
    pub fn residual(&self, expr: &Expr, trace: &EvalTrace) -> Result<Expr, PlanError> {
        check_trace(expr, trace)?;
        Ok(self.rebuild(expr, trace, 0)?.renumbered())
    }

    fn rebuild(&self, expr: &Expr, trace: &EvalTrace, depth: usize) -> Result<Expr, PlanError> {
        if depth > self.limits.max_depth {
            return Err(PlanError::DepthExceeded {
                limit: self.limits.max_depth,
            });
        }
        if let Some(value) = trace.value_of(expr.id) {
            match Literal::try_from(value) {
                Ok(literal) => return Ok(Expr::literal(literal)),
                Err(e) => trace!(id = %expr.id, reason = %e, "keeping structure of resolved node"),
            }
        }
        match &expr.kind {
            ExprKind::Comprehension(c) => self.comprehension(expr, c, trace, depth),
            _ => {
                let rebuilt = expr.try_map_children(&mut |child| self.rebuild(child, trace, depth + 1))?;
                Ok(prune(rebuilt))
            }
        }
    }

    fn comprehension(
        &self,
        expr: &Expr,
        c: &Comprehension,
        trace: &EvalTrace,
        depth: usize,
    ) -> Result<Expr, PlanError> {
        let unsupported = |reason: &str| PlanError::UnsupportedComprehensionShape {
            id: expr.id,
            reason: reason.to_owned(),
        };
        let view = classify(c).ok_or_else(|| unsupported("loop does not match any list macro"))?;
        let depth = depth + 1;

        let masked = self.activation.masking(c.bound_vars());
        let nested = ResidualBuilder::new(self.evaluator, &masked, self.limits);
        let predicate = view
            .predicate
            .map(|p| nested.rebuild_detached(p, depth))
            .transpose()?;
        let transform = view
            .transform
            .map(|t| nested.rebuild_detached(t, depth))
            .transpose()?;
        let loop_step = view
            .kind
            .loop_step(&c.accu_var, &c.iter_var, predicate, transform)
            .ok_or_else(|| unsupported("macro is missing its predicate or transform"))?;

        let rebuilt = Comprehension {
            iter_range: self.rebuild(&c.iter_range, trace, depth)?,
            iter_var: c.iter_var.clone(),
            iter_var2: c.iter_var2.clone(),
            accu_var: c.accu_var.clone(),
            accu_init: self.rebuild(&c.accu_init, trace, depth)?,
            loop_condition: self.rebuild(&c.loop_condition, trace, depth)?,
            loop_step,
            result: self.rebuild(&c.result, trace, depth)?,
        };
        if classify(&rebuilt).is_none() {
            return Err(unsupported("residual loop no longer matches its macro"));
        }
        Ok(Expr::with_id(expr.id, ExprKind::Comprehension(Box::new(rebuilt))))
    }

    /// Evaluate a loop body on its own and residualise it against the
    /// resulting trace.
    fn rebuild_detached(&self, part: &Expr, depth: usize) -> Result<Expr, PlanError> {
        let evaluation = self.evaluator.evaluate(part, self.activation)?;
        trace!(
            id = %part.id,
            known = evaluation.outcome.known().is_some(),
            "evaluated comprehension body"
        );
        check_trace(part, &evaluation.trace)?;
        self.rebuild(part, &evaluation.trace, depth)
    }
}

fn check_trace(expr: &Expr, trace: &EvalTrace) -> Result<(), PlanError> {
    let mut present = HashSet::new();
    expr.walk(&mut |node| {
        present.insert(node.id);
    });
    let mut ids = expr.duplicate_ids();
    ids.extend(trace.ids().filter(|id| !present.contains(id)));
    if ids.is_empty() {
        return Ok(());
    }
    ids.sort_unstable();
    ids.dedup();
    Err(PlanError::TraceMismatch { ids })
}

/// Drop the parts of a rebuilt call that its literal operands already decide.
fn prune(expr: Expr) -> Expr {
    pruned(&expr).unwrap_or(expr)
}

fn pruned(expr: &Expr) -> Option<Expr> {
    if let Some([left, right]) = expr.as_call(ops::LOGICAL_AND, 2) {
        return prune_logical(false, left, right);
    }
    if let Some([left, right]) = expr.as_call(ops::LOGICAL_OR, 2) {
        return prune_logical(true, left, right);
    }
    let [condition, then, otherwise] = expr.as_call(ops::CONDITIONAL, 3)? else {
        return None;
    };
    let branch = if condition.as_bool()? { then } else { otherwise };
    trace!(id = %expr.id, "pruned conditional");
    Some(branch.clone())
}

/// `decisive` is the operand value that decides the operator on its own.
fn prune_logical(decisive: bool, left: &Expr, right: &Expr) -> Option<Expr> {
    if left.as_bool() == Some(decisive) || right.as_bool() == Some(decisive) {
        return Some(Expr::literal(decisive));
    }
    if left.as_bool().is_some() {
        return Some(right.clone());
    }
    if right.as_bool().is_some() {
        return Some(left.clone());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::comprehension::ACCUMULATOR;
    use crate::{call, ident, parse, Interpreter, Value};

    fn activation() -> Activation {
        Activation::new()
            .set("P.attr.name", "harry")
            .set("P.attr.geo", Value::list(["GB", "US"]))
            .set("P.attr.authenticated", true)
            .set("T", 100_i64)
    }

    fn residual_with(source: &str, act: &Activation) -> Result<Expr, PlanError> {
        let expr = parse(source).unwrap();
        let interpreter = Interpreter::new();
        let evaluation = interpreter.evaluate(&expr, act)?;
        ResidualBuilder::new(&interpreter, act, Limits::default()).residual(&expr, &evaluation.trace)
    }

    fn residual(source: &str) -> String {
        residual_with(source, &activation()).unwrap().to_string()
    }

    #[test]
    fn literals_stay_literals() {
        assert_eq!(residual("false"), "false");
        assert_eq!(residual("P.attr.authenticated"), "true");
    }

    #[test]
    fn unknown_expression_is_unchanged() {
        assert_eq!(
            residual("R.attr.department == \"marketing\""),
            "R.attr.department == \"marketing\""
        );
    }

    #[test]
    fn known_operands_fold_in_place() {
        assert_eq!(residual("R.attr.owner == P.attr.name"), "R.attr.owner == \"harry\"");
        assert_eq!(residual("R.attr.geo in P.attr.geo"), "R.attr.geo in [\"GB\", \"US\"]");
        assert_eq!(residual("R.attr.count + T * 2 > 10"), "R.attr.count + 200 > 10");
    }

    #[test]
    fn decided_logical_operands_are_pruned() {
        assert_eq!(residual("R.attr.public || P.attr.name == \"ron\""), "R.attr.public");
        assert_eq!(residual("P.attr.authenticated && R.attr.public"), "R.attr.public");
        assert_eq!(residual("R.attr.public && T == 1"), "false");
    }

    #[test]
    fn conditional_with_known_condition_is_pruned() {
        assert_eq!(residual("T > 1 ? R.attr.a : R.attr.b"), "R.attr.a");
        assert_eq!(residual("R.attr.flag ? T : P.attr.name"), "R.attr.flag ? 100 : \"harry\"");
    }

    #[test]
    fn timestamps_keep_their_structure() {
        assert_eq!(
            residual("R.attr.created < timestamp(\"2024-01-01T00:00:00Z\")"),
            "R.attr.created < timestamp(\"2024-01-01T00:00:00Z\")"
        );
    }

    #[test]
    fn filter_body_partially_resolved() {
        assert_eq!(
            residual("R.attr.items.filter(x, x.price > T)"),
            "R.attr.items.filter(x, x.price > 100)"
        );
    }

    #[test]
    fn each_macro_shape_residualises() {
        for (source, expected) in [
            ("R.attr.items.all(x, x.owner == P.attr.name)", "R.attr.items.all(x, x.owner == \"harry\")"),
            ("R.attr.items.exists(x, x.price > T)", "R.attr.items.exists(x, x.price > 100)"),
            ("R.attr.items.exists_one(x, x.price > T)", "R.attr.items.exists_one(x, x.price > 100)"),
            ("R.attr.items.map(x, x.price * T)", "R.attr.items.map(x, x.price * 100)"),
            (
                "R.attr.items.map(x, x.price > T, x.name + P.attr.name)",
                "R.attr.items.map(x, x.price > 100, x.name + \"harry\")",
            ),
            ("R.attr.tags.all(k, v, v != P.attr.name)", "R.attr.tags.all(k, v, v != \"harry\")"),
        ] {
            assert_eq!(residual(source), expected, "{source}");
        }
    }

    #[test]
    fn known_range_with_unknown_body() {
        assert_eq!(
            residual("P.attr.geo.exists(g, g == R.attr.geo)"),
            "[\"GB\", \"US\"].exists(g, g == R.attr.geo)"
        );
    }

    #[test]
    fn body_independent_of_loop_variable_folds() {
        assert_eq!(
            residual("R.attr.items.all(x, P.attr.authenticated)"),
            "R.attr.items.all(x, true)"
        );
    }

    #[test]
    fn nested_comprehensions() {
        assert_eq!(
            residual("R.attr.groups.all(g, g.members.exists(m, m == P.attr.name))"),
            "R.attr.groups.all(g, g.members.exists(m, m == \"harry\"))"
        );
    }

    #[test]
    fn loop_variable_shadows_bound_attribute() {
        let act = activation().set("x", 7_i64);
        assert_eq!(
            residual_with("R.attr.items.filter(x, x > 1)", &act).unwrap().to_string(),
            "R.attr.items.filter(x, x > 1)"
        );
    }

    #[test]
    fn residual_ids_are_fresh() {
        let expr = residual_with("R.attr.items.filter(x, x.price > T) == P.attr.geo", &activation()).unwrap();
        assert!(expr.duplicate_ids().is_empty());
        assert_eq!(expr, expr.clone().renumbered());
    }

    #[test]
    fn residual_is_idempotent() {
        let first = residual_with("R.attr.items.exists(x, x.price > T) && R.attr.owner == P.attr.name", &activation())
            .unwrap();
        let empty = Activation::new();
        let interpreter = Interpreter::new();
        let evaluation = interpreter.evaluate(&first, &empty).unwrap();
        let second = ResidualBuilder::new(&interpreter, &empty, Limits::default())
            .residual(&first, &evaluation.trace)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn foreign_trace_ids_are_rejected() {
        let expr = parse("R.attr.a == 1").unwrap();
        let mut trace = EvalTrace::new();
        trace.resolve(crate::ExprId(999), Value::Bool(true));
        let act = Activation::new();
        let err = ResidualBuilder::new(&Interpreter::new(), &act, Limits::default())
            .residual(&expr, &trace)
            .unwrap_err();
        assert!(matches!(err, PlanError::TraceMismatch { ids } if ids == vec![crate::ExprId(999)]));
    }

    #[test]
    fn unnumbered_trees_are_rejected() {
        let expr = ident("R").and(ident("P"));
        let act = Activation::new();
        let err = ResidualBuilder::new(&Interpreter::new(), &act, Limits::default())
            .residual(&expr, &EvalTrace::new())
            .unwrap_err();
        assert!(matches!(err, PlanError::TraceMismatch { .. }));
    }

    #[test]
    fn unknown_comprehension_shape_is_rejected() {
        let custom = Expr::new(ExprKind::Comprehension(Box::new(Comprehension {
            iter_range: ident("xs"),
            iter_var: "x".into(),
            iter_var2: None,
            accu_var: ACCUMULATOR.into(),
            accu_init: Expr::literal(0_i64),
            loop_condition: Expr::literal(true),
            loop_step: call(ops::ADD, vec![ident(ACCUMULATOR), ident("x")]),
            result: ident(ACCUMULATOR),
        })))
        .renumbered();
        let act = Activation::new();
        let err = ResidualBuilder::new(&Interpreter::new(), &act, Limits::default())
            .residual(&custom, &EvalTrace::new())
            .unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedComprehensionShape { id, .. } if id == custom.id));
    }

    #[test]
    fn depth_limit() {
        let expr = parse("R.attr.a + (R.attr.b + (R.attr.c + R.attr.d))").unwrap();
        let act = Activation::new();
        let err = ResidualBuilder::new(&Interpreter::new(), &act, Limits { max_depth: 2 })
            .residual(&expr, &EvalTrace::new())
            .unwrap_err();
        assert!(matches!(err, PlanError::DepthExceeded { limit: 2 }));
    }
}
