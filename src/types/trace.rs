use std::collections::BTreeMap;

use super::{Activation, EvaluationError, Expr, ExprId, Value};

/// What evaluation learned about a single node.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEntry {
    Resolved(Value),
    Unresolved,
}

/// Per-node record of a partial evaluation, keyed by [`ExprId`].
///
/// A node with no entry is treated as unresolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalTrace {
    entries: BTreeMap<ExprId, TraceEntry>,
}

impl EvalTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: ExprId, entry: TraceEntry) {
        self.entries.insert(id, entry);
    }

    pub fn resolve(&mut self, id: ExprId, value: Value) {
        self.record(id, TraceEntry::Resolved(value));
    }

    pub fn mark_unresolved(&mut self, id: ExprId) {
        self.record(id, TraceEntry::Unresolved);
    }

    #[must_use]
    pub fn get(&self, id: ExprId) -> Option<&TraceEntry> {
        self.entries.get(&id)
    }

    /// The resolved value of a node, if any.
    #[must_use]
    pub fn value_of(&self, id: ExprId) -> Option<&Value> {
        match self.entries.get(&id) {
            Some(TraceEntry::Resolved(value)) => Some(value),
            _ => None,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of evaluating an expression against a partial activation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Known(Value),
    Unknown,
}

impl Outcome {
    #[must_use]
    pub fn known(&self) -> Option<&Value> {
        match self {
            Outcome::Known(value) => Some(value),
            Outcome::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: Outcome,
    pub trace: EvalTrace,
}

/// An expression evaluator that tolerates unknown inputs.
///
/// Implementations evaluate `expr` against `activation`, treating unbound and
/// masked names as unknown, and report what they learned about every node
/// they visited outside comprehension loop bodies.
pub trait Evaluator {
    /// # Errors
    ///
    /// Returns an [`EvaluationError`] when a fully known sub-expression fails
    /// and no unknown input masks the failure.
    fn evaluate(&self, expr: &Expr, activation: &Activation) -> Result<Evaluation, EvaluationError>;
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    fn evaluate(&self, expr: &Expr, activation: &Activation) -> Result<Evaluation, EvaluationError> {
        (**self).evaluate(expr, activation)
    }
}

impl<E: Evaluator + ?Sized> Evaluator for std::sync::Arc<E> {
    fn evaluate(&self, expr: &Expr, activation: &Activation) -> Result<Evaluation, EvaluationError> {
        (**self).evaluate(expr, activation)
    }
}
