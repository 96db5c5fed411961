use tracing::debug;

use crate::residual::ResidualBuilder;
use crate::resolve::Resolver;
use crate::{
    Activation, Condition, EvaluationError, Evaluator, Expr, Limits, LogicalOperation, Operator,
    Outcome, PlanError, PlanNode,
};

/// Plans one condition tree against one activation.
pub(crate) struct ConditionEvaluator<'a, E: ?Sized> {
    resolver: Resolver<'a>,
    evaluator: &'a E,
    activation: &'a Activation,
    limits: Limits,
}

impl<'a, E: Evaluator + ?Sized> ConditionEvaluator<'a, E> {
    pub(crate) fn new(
        resolver: Resolver<'a>,
        evaluator: &'a E,
        activation: &'a Activation,
        limits: Limits,
    ) -> Self {
        Self {
            resolver,
            evaluator,
            activation,
            limits,
        }
    }

    pub(crate) fn evaluate(&self, condition: &Condition) -> Result<PlanNode, PlanError> {
        self.evaluate_at(condition, 0)
    }

    fn evaluate_at(&self, condition: &Condition, depth: usize) -> Result<PlanNode, PlanError> {
        if depth > self.limits.max_depth {
            return Err(PlanError::DepthExceeded {
                limit: self.limits.max_depth,
            });
        }
        match condition {
            Condition::Expr(expr) => self.leaf(expr),
            Condition::All(children) => self.combine(Operator::And, children, depth),
            Condition::Any(children) => self.combine(Operator::Or, children, depth),
        }
    }

    /// Resolve, evaluate and residualise a single expression.
    pub(crate) fn leaf(&self, expr: &Expr) -> Result<PlanNode, PlanError> {
        let resolved = self.resolver.resolve(expr)?;
        let evaluation = self.evaluator.evaluate(&resolved, self.activation)?;
        if let Outcome::Known(value) = &evaluation.outcome {
            if value.as_bool().is_none() {
                return Err(EvaluationError::TypeMismatch {
                    expected: "bool",
                    found: value.type_name(),
                }
                .into());
            }
        }
        let residual = ResidualBuilder::new(self.evaluator, self.activation, self.limits)
            .residual(&resolved, &evaluation.trace)?;
        let node = match residual.as_bool() {
            Some(b) => PlanNode::Constant(b),
            None => PlanNode::Expression(residual),
        };
        debug!(condition = %expr, plan = %node, "planned condition leaf");
        Ok(node)
    }

    fn combine(&self, operator: Operator, children: &[Condition], depth: usize) -> Result<PlanNode, PlanError> {
        // Every child is planned before folding so that a failing sibling
        // fails the whole tree even when a constant would decide it.
        let nodes = children
            .iter()
            .map(|child| self.evaluate_at(child, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fold(operator, nodes))
    }
}

/// Constant-fold the children of a logical operation, keeping the order of
/// the children that survive.
pub(crate) fn fold(operator: Operator, nodes: Vec<PlanNode>) -> PlanNode {
    let absorbing = operator == Operator::Or;
    let mut kept = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node.as_constant() {
            Some(b) if b == absorbing => return PlanNode::Constant(absorbing),
            Some(_) => {}
            None => kept.push(node),
        }
    }
    match kept.len() {
        0 => PlanNode::Constant(!absorbing),
        1 => kept.swap_remove(0),
        _ => PlanNode::Operation(LogicalOperation {
            operator,
            nodes: kept,
        }),
    }
}
