//! The built-in partial evaluator.
//!
//! [`Interpreter`] walks an expression once, treating unbound attributes as
//! unknown, and records the value of every node it fully decides. The
//! residual builder uses that record to fold known sub-expressions into
//! literals.

mod builtins;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::types::ops;
use crate::{
    Activation, Call, Comprehension, EvalTrace, Evaluation, EvaluationError, Evaluator, Expr,
    ExprId, ExprKind, Limits, MapKey, Outcome, Value,
};

type Slot = Result<Outcome, EvaluationError>;

/// Source of the current time for `now()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    /// Always report the given instant. Useful for reproducible plans.
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn now(self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(instant) => instant,
        }
    }
}

/// Tree-walking evaluator over [`Value`]s with unknown propagation.
///
/// Logical operators absorb unknowns and errors where the other side decides
/// the result; every other function is strict and yields unknown as soon as
/// any argument is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter {
    clock: Clock,
    limits: Limits,
}

impl Interpreter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }
}

impl Evaluator for Interpreter {
    fn evaluate(&self, expr: &Expr, activation: &Activation) -> Result<Evaluation, EvaluationError> {
        let mut run = Run {
            activation,
            now: self.clock.now(),
            max_depth: self.limits.max_depth,
            trace: EvalTrace::new(),
            locals: Vec::new(),
            loop_depth: 0,
        };
        let outcome = run.eval(expr, 0)?;
        trace!(nodes = run.trace.len(), known = outcome.known().is_some(), "evaluated expression");
        Ok(Evaluation {
            outcome,
            trace: run.trace,
        })
    }
}

/// State of one evaluation.
struct Run<'a> {
    activation: &'a Activation,
    now: DateTime<Utc>,
    max_depth: usize,
    trace: EvalTrace,
    /// Comprehension bindings, innermost last.
    locals: Vec<(String, Slot)>,
    /// Loop bodies are evaluated many times; their nodes are not traced.
    loop_depth: usize,
}

impl Run<'_> {
    fn eval(&mut self, expr: &Expr, depth: usize) -> Slot {
        if depth > self.max_depth {
            return Err(EvaluationError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        let result = self.dispatch(expr, depth + 1);
        if self.loop_depth == 0 {
            self.record(expr.id, &result);
        }
        result
    }

    fn record(&mut self, id: ExprId, result: &Slot) {
        match result {
            Ok(Outcome::Known(value)) => self.trace.resolve(id, value.clone()),
            Ok(Outcome::Unknown) | Err(_) => self.trace.mark_unresolved(id),
        }
    }

    fn dispatch(&mut self, expr: &Expr, depth: usize) -> Slot {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Outcome::Known(literal.to_value())),
            ExprKind::Ident(name) => self.lookup(name),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => self.select(expr, operand, field, *test_only, depth),
            ExprKind::Call(call) => self.call(call, depth),
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                let mut pending = Pending::default();
                for item in items {
                    if let Some(value) = pending.take(self.eval(item, depth)) {
                        values.push(value);
                    }
                }
                pending.finish(|| Value::List(values))
            }
            ExprKind::Map(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                let mut pending = Pending::default();
                for entry in entries {
                    let key = pending.take(self.eval(&entry.key, depth));
                    let value = pending.take(self.eval(&entry.value, depth));
                    if let (Some(key), Some(value)) = (key, value) {
                        match MapKey::try_from(&key) {
                            Ok(key) => values.push((key, value)),
                            Err(found) => pending.fail(EvaluationError::TypeMismatch {
                                expected: "map key",
                                found,
                            }),
                        }
                    }
                }
                pending.finish(|| Value::Map(values.into_iter().collect()))
            }
            ExprKind::Comprehension(c) => self.comprehension(c, depth),
        }
    }

    fn lookup(&self, name: &str) -> Slot {
        match self.locals.iter().rev().find(|(local, _)| local == name) {
            Some((_, slot)) => slot.clone(),
            None => self.activation.resolve(&[name]),
        }
    }

    /// Segments of an `a.b.c` chain whose root is not a comprehension variable.
    fn qualified_path<'e>(&self, expr: &'e Expr) -> Option<Vec<&'e str>> {
        match &expr.kind {
            ExprKind::Ident(name) if !self.locals.iter().any(|(local, _)| local == name) => {
                Some(vec![name.as_str()])
            }
            ExprKind::Select {
                operand,
                field,
                test_only: false,
            } => {
                let mut path = self.qualified_path(operand)?;
                path.push(field.as_str());
                Some(path)
            }
            _ => None,
        }
    }

    fn select(&mut self, expr: &Expr, operand: &Expr, field: &str, test_only: bool, depth: usize) -> Slot {
        if !test_only {
            if let Some(path) = self.qualified_path(expr) {
                return self.activation.resolve(&path);
            }
        }
        match self.eval(operand, depth)? {
            Outcome::Known(value) if test_only => value.has_field(field).map(|b| Outcome::Known(Value::Bool(b))),
            Outcome::Known(value) => value.field(field).map(|v| Outcome::Known(v.clone())),
            Outcome::Unknown if test_only => {
                // The enclosing object is only partly bound; the field itself may be.
                let Some(mut path) = self.qualified_path(operand) else {
                    return Ok(Outcome::Unknown);
                };
                path.push(field);
                match self.activation.resolve(&path) {
                    Ok(Outcome::Known(_)) => Ok(Outcome::Known(Value::Bool(true))),
                    _ => Ok(Outcome::Unknown),
                }
            }
            Outcome::Unknown => Ok(Outcome::Unknown),
        }
    }

    fn call(&mut self, call: &Call, depth: usize) -> Slot {
        if call.target.is_none() {
            match (call.function.as_str(), call.args.as_slice()) {
                (ops::LOGICAL_AND, [left, right]) => return self.logical(false, left, right, depth),
                (ops::LOGICAL_OR, [left, right]) => return self.logical(true, left, right, depth),
                (ops::CONDITIONAL, [condition, then, otherwise]) => {
                    return self.conditional(condition, then, otherwise, depth);
                }
                (ops::NOT_STRICTLY_FALSE, [arg]) => {
                    let strictly_false = matches!(self.eval(arg, depth), Ok(Outcome::Known(Value::Bool(false))));
                    return Ok(Outcome::Known(Value::Bool(!strictly_false)));
                }
                _ => {}
            }
        }
        let mut values = Vec::with_capacity(call.args.len() + 1);
        let mut pending = Pending::default();
        for arg in call.target.as_deref().into_iter().chain(&call.args) {
            if let Some(value) = pending.take(self.eval(arg, depth)) {
                values.push(value);
            }
        }
        if let Some(outcome) = pending.settle()? {
            return Ok(outcome);
        }
        builtins::apply(&call.function, call.target.is_some(), &values, self.now).map(Outcome::Known)
    }

    /// `&&` when `decisive` is false, `||` when it is true.
    fn logical(&mut self, decisive: bool, left: &Expr, right: &Expr, depth: usize) -> Slot {
        let results = [self.eval(left, depth), self.eval(right, depth)];
        let mut unknown = false;
        let mut error = None;
        for result in results {
            match result {
                Ok(Outcome::Known(Value::Bool(b))) if b == decisive => {
                    return Ok(Outcome::Known(Value::Bool(decisive)));
                }
                Ok(Outcome::Known(Value::Bool(_))) => {}
                Ok(Outcome::Known(other)) => {
                    error.get_or_insert(EvaluationError::TypeMismatch {
                        expected: "bool",
                        found: other.type_name(),
                    });
                }
                Ok(Outcome::Unknown) => unknown = true,
                Err(e) => {
                    error.get_or_insert(e);
                }
            }
        }
        match (unknown, error) {
            (true, _) => Ok(Outcome::Unknown),
            (false, Some(e)) => Err(e),
            (false, None) => Ok(Outcome::Known(Value::Bool(!decisive))),
        }
    }

    fn conditional(&mut self, condition: &Expr, then: &Expr, otherwise: &Expr, depth: usize) -> Slot {
        match self.eval(condition, depth)? {
            Outcome::Known(Value::Bool(true)) => self.eval(then, depth),
            Outcome::Known(Value::Bool(false)) => self.eval(otherwise, depth),
            Outcome::Known(other) => Err(EvaluationError::TypeMismatch {
                expected: "bool",
                found: other.type_name(),
            }),
            Outcome::Unknown => {
                // Both branches may survive into the residual.
                let _ = self.eval(then, depth);
                let _ = self.eval(otherwise, depth);
                Ok(Outcome::Unknown)
            }
        }
    }

    fn comprehension(&mut self, c: &Comprehension, depth: usize) -> Slot {
        let range = match self.eval(&c.iter_range, depth)? {
            Outcome::Known(range) => range,
            Outcome::Unknown => return Ok(Outcome::Unknown),
        };
        let bindings = iteration_bindings(range, c.iter_var2.is_some())?;
        let init = self.eval(&c.accu_init, depth);

        let base = self.locals.len();
        self.locals.push((c.accu_var.clone(), init));
        self.loop_depth += 1;
        let result = self.fold(c, bindings, depth);
        self.loop_depth -= 1;
        self.locals.truncate(base);
        result
    }

    fn fold(&mut self, c: &Comprehension, bindings: Vec<(Value, Option<Value>)>, depth: usize) -> Slot {
        let accu = self.locals.len() - 1;
        for (first, second) in bindings {
            self.locals.push((c.iter_var.clone(), Ok(Outcome::Known(first))));
            if let (Some(name), Some(value)) = (&c.iter_var2, second) {
                self.locals.push((name.clone(), Ok(Outcome::Known(value))));
            }
            if matches!(self.eval(&c.loop_condition, depth), Ok(Outcome::Known(Value::Bool(false)))) {
                break;
            }
            let step = self.eval(&c.loop_step, depth);
            self.locals.truncate(accu + 1);
            if let Some((_, slot)) = self.locals.get_mut(accu) {
                *slot = step;
            }
        }
        self.locals.truncate(accu + 1);
        self.eval(&c.result, depth)
    }
}

/// Element bindings for one pass over a range: lists bind elements (or
/// index and element), maps bind keys (or key and value).
fn iteration_bindings(range: Value, two_vars: bool) -> Result<Vec<(Value, Option<Value>)>, EvaluationError> {
    match range {
        Value::List(items) if two_vars => Ok(items
            .into_iter()
            .zip(0_i64..)
            .map(|(item, i)| (Value::Int(i), Some(item)))
            .collect()),
        Value::List(items) => Ok(items.into_iter().map(|item| (item, None)).collect()),
        Value::Map(entries) if two_vars => Ok(entries
            .into_iter()
            .map(|(key, value)| (Value::from(key), Some(value)))
            .collect()),
        Value::Map(entries) => Ok(entries.into_keys().map(|key| (Value::from(key), None)).collect()),
        other => Err(EvaluationError::TypeMismatch {
            expected: "list or map",
            found: other.type_name(),
        }),
    }
}

/// Accumulates the outcomes of strict operands. An unknown operand wins over
/// an error so that the residual keeps the expression.
#[derive(Default)]
struct Pending {
    unknown: bool,
    error: Option<EvaluationError>,
}

impl Pending {
    fn take(&mut self, result: Slot) -> Option<Value> {
        match result {
            Ok(Outcome::Known(value)) => Some(value),
            Ok(Outcome::Unknown) => {
                self.unknown = true;
                None
            }
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn fail(&mut self, error: EvaluationError) {
        self.error.get_or_insert(error);
    }

    fn settle(self) -> Result<Option<Outcome>, EvaluationError> {
        match (self.unknown, self.error) {
            (true, _) => Ok(Some(Outcome::Unknown)),
            (false, Some(e)) => Err(e),
            (false, None) => Ok(None),
        }
    }

    fn finish(self, value: impl FnOnce() -> Value) -> Slot {
        Ok(self.settle()?.unwrap_or_else(|| Outcome::Known(value())))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{parse, TraceEntry};

    fn eval(source: &str, activation: &Activation) -> Result<Evaluation, EvaluationError> {
        Interpreter::new().evaluate(&parse(source).unwrap(), activation)
    }

    fn outcome(source: &str, activation: &Activation) -> Slot {
        eval(source, activation).map(|e| e.outcome)
    }

    fn known(v: impl Into<Value>) -> Slot {
        Ok(Outcome::Known(v.into()))
    }

    fn principal() -> Activation {
        Activation::new()
            .set("P.attr.name", "harry")
            .set("P.attr.geo", Value::list(["GB", "US"]))
            .set("T", 100_i64)
    }

    #[test]
    fn known_comparison() {
        assert_eq!(outcome("P.attr.name == \"harry\"", &principal()), known(true));
        assert_eq!(outcome("T + 1 > 100", &principal()), known(true));
    }

    #[test]
    fn unbound_attribute_is_unknown() {
        assert_eq!(outcome("R.attr.owner == P.attr.name", &principal()), Ok(Outcome::Unknown));
    }

    #[test]
    fn trace_records_known_subtrees() {
        let expr = parse("R.attr.owner == P.attr.name").unwrap();
        let evaluation = Interpreter::new().evaluate(&expr, &principal()).unwrap();
        let ExprKind::Call(call) = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(evaluation.trace.get(expr.id), Some(&TraceEntry::Unresolved));
        assert_eq!(evaluation.trace.get(call.args[0].id), Some(&TraceEntry::Unresolved));
        assert_eq!(evaluation.trace.value_of(call.args[1].id), Some(&Value::from("harry")));
    }

    #[test]
    fn and_absorbs_unknown_when_decided() {
        assert_eq!(outcome("false && R.attr.flag", &principal()), known(false));
        assert_eq!(outcome("R.attr.flag && false", &principal()), known(false));
        assert_eq!(outcome("true && R.attr.flag", &principal()), Ok(Outcome::Unknown));
        assert_eq!(outcome("R.attr.flag || true", &principal()), known(true));
    }

    #[test]
    fn logical_operators_absorb_errors() {
        assert_eq!(outcome("false && 1 / 0 == 1", &principal()), known(false));
        assert_eq!(outcome("R.attr.flag || 1 / 0 == 1", &principal()), Ok(Outcome::Unknown));
        assert_eq!(
            outcome("true && 1 / 0 == 1", &principal()),
            Err(EvaluationError::DivisionByZero)
        );
        assert!(matches!(
            outcome("true && 1", &principal()),
            Err(EvaluationError::TypeMismatch { expected: "bool", .. })
        ));
    }

    #[test]
    fn strict_calls_prefer_unknown_over_error() {
        assert_eq!(outcome("R.attr.x + (1 / 0)", &principal()), Ok(Outcome::Unknown));
        assert_eq!(outcome("1 / 0", &principal()), Err(EvaluationError::DivisionByZero));
    }

    #[test]
    fn conditional() {
        assert_eq!(outcome("T > 50 ? \"big\" : R.attr.size", &principal()), known("big"));
        assert_eq!(outcome("R.attr.flag ? 1 : 2", &principal()), Ok(Outcome::Unknown));
    }

    #[test]
    fn unknown_condition_traces_both_branches() {
        let expr = parse("R.attr.flag ? T : P.attr.name").unwrap();
        let evaluation = Interpreter::new().evaluate(&expr, &principal()).unwrap();
        assert!(evaluation.trace.ids().count() >= 3);
        let ExprKind::Call(call) = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(evaluation.trace.value_of(call.args[1].id), Some(&Value::Int(100)));
        assert_eq!(evaluation.trace.value_of(call.args[2].id), Some(&Value::from("harry")));
    }

    #[test]
    fn missing_key_in_bound_map_is_an_error() {
        let act = principal().set("P.attr.roles", Value::map([("marketing", "ADMIN")]));
        assert_eq!(
            outcome("P.attr.roles.sales == \"ADMIN\"", &act),
            Err(EvaluationError::NoSuchKey { key: "sales".into() })
        );
        assert_eq!(outcome("P.attr.roles[\"marketing\"]", &act), known("ADMIN"));
    }

    #[test]
    fn presence_tests() {
        assert_eq!(outcome("has(P.attr.name)", &principal()), known(true));
        assert_eq!(outcome("has(R.attr.owner)", &principal()), Ok(Outcome::Unknown));
        let act = principal().set("P.attr.roles", Value::map([("marketing", "ADMIN")]));
        assert_eq!(outcome("has(P.attr.roles.sales)", &act), known(false));
    }

    #[test]
    fn membership_over_bound_list() {
        assert_eq!(outcome("\"GB\" in P.attr.geo", &principal()), known(true));
        assert_eq!(outcome("R.attr.geo in P.attr.geo", &principal()), Ok(Outcome::Unknown));
    }

    #[test]
    fn comprehension_over_known_range() {
        let act = principal();
        assert_eq!(outcome("P.attr.geo.all(g, g.size() == 2)", &act), known(true));
        assert_eq!(outcome("P.attr.geo.exists(g, g == \"US\")", &act), known(true));
        assert_eq!(outcome("P.attr.geo.exists_one(g, g == \"FR\")", &act), known(false));
        assert_eq!(
            outcome("P.attr.geo.map(g, g.lowerAscii())", &act),
            known(Value::list(["gb", "us"]))
        );
        assert_eq!(
            outcome("P.attr.geo.filter(g, g != \"GB\")", &act),
            known(Value::list(["US"]))
        );
        assert_eq!(
            outcome("[1, 2, 3].map(x, x > 1, x * 10)", &act),
            known(Value::list([20_i64, 30]))
        );
    }

    #[test]
    fn two_variable_comprehensions() {
        let act = principal();
        assert_eq!(outcome("[\"a\", \"b\"].all(i, v, i < 2 && v != \"\")", &act), known(true));
        assert_eq!(
            outcome("{\"a\": 1, \"b\": 2}.exists(k, v, k == \"b\" && v == 2)", &act),
            known(true)
        );
        assert_eq!(outcome("{\"a\": 1}.all(k, k == \"a\")", &act), known(true));
    }

    #[test]
    fn comprehension_with_unknown_body_is_unknown() {
        assert_eq!(
            outcome("P.attr.geo.exists(g, g == R.attr.geo)", &principal()),
            Ok(Outcome::Unknown)
        );
        assert_eq!(
            outcome("P.attr.geo.exists(g, g == \"GB\" || g == R.attr.geo)", &principal()),
            known(true)
        );
    }

    #[test]
    fn comprehension_over_unknown_range() {
        let evaluation = eval("R.attr.items.all(x, x > 0)", &principal()).unwrap();
        assert_eq!(evaluation.outcome, Outcome::Unknown);
    }

    #[test]
    fn exists_recovers_from_element_errors() {
        assert_eq!(outcome("[0, 1].exists(x, 1 / x == 1)", &principal()), known(true));
        assert_eq!(
            outcome("[0].exists(x, 1 / x == 1)", &principal()),
            Err(EvaluationError::DivisionByZero)
        );
    }

    #[test]
    fn loop_bodies_are_not_traced() {
        let expr = parse("[1, 2].all(x, x > 0)").unwrap();
        let evaluation = Interpreter::new().evaluate(&expr, &principal()).unwrap();
        let ExprKind::Comprehension(c) = &expr.kind else {
            panic!("expected comprehension");
        };
        assert!(evaluation.trace.get(c.loop_step.id).is_none());
        assert!(evaluation.trace.get(c.iter_range.id).is_some());
        assert_eq!(evaluation.trace.value_of(expr.id), Some(&Value::Bool(true)));
    }

    #[test]
    fn masked_variables_are_unknown() {
        let act = principal().set("x", 5_i64);
        let expr = parse("x > 1").unwrap();
        let masked = act.masking(["x"]);
        assert_eq!(
            Interpreter::new().evaluate(&expr, &masked).unwrap().outcome,
            Outcome::Unknown
        );
        assert_eq!(outcome("x.price > 1", &masked), Ok(Outcome::Unknown));
    }

    #[test]
    fn fixed_clock_drives_now() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let interpreter = Interpreter::new().with_clock(Clock::Fixed(instant));
        let expr = parse("now() > timestamp(\"2024-01-01T00:00:00Z\")").unwrap();
        let evaluation = interpreter.evaluate(&expr, &Activation::new()).unwrap();
        assert_eq!(evaluation.outcome, Outcome::Known(Value::Bool(true)));
        assert_eq!(interpreter.clock(), Clock::Fixed(instant));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let interpreter = Interpreter::new().with_limits(Limits { max_depth: 3 });
        let expr = parse("1 + (2 + (3 + (4 + 5)))").unwrap();
        assert_eq!(
            interpreter.evaluate(&expr, &Activation::new()),
            Err(EvaluationError::DepthExceeded { limit: 3 })
        );
    }

    #[test]
    fn map_literals_with_unknown_values() {
        assert_eq!(outcome("{\"a\": R.attr.x}", &principal()), Ok(Outcome::Unknown));
        assert_eq!(
            outcome("{\"a\": T}", &principal()),
            known(Value::map([("a", 100_i64)]))
        );
        assert!(outcome("{[1]: T}", &principal()).is_err());
    }
}
