use thiserror::Error;

use super::ExprId;

/// Failures raised while planning a condition.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("variable cycle detected: {}", path.join(" -> "))]
    VariableCycle { path: Vec<String> },

    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("evaluation trace does not match expression: {}", join_ids(ids))]
    TraceMismatch { ids: Vec<ExprId> },

    #[error("expression nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("unsupported comprehension shape at node {id}: {reason}")]
    UnsupportedComprehensionShape { id: ExprId, reason: String },
}

/// Failures of a fully known sub-expression during evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("no such key '{key}'")]
    NoSuchKey { key: String },

    #[error("no matching overload for '{function}' applied to ({args})")]
    NoSuchOverload { function: String, args: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("overflow in '{operation}'")]
    Overflow { operation: String },

    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("invalid argument to '{function}': {message}")]
    InvalidArgument { function: String, message: String },

    #[error("expression nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },
}

fn join_ids(ids: &[ExprId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_cycle_message() {
        let err = PlanError::VariableCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "variable cycle detected: a -> b -> a");
    }

    #[test]
    fn unknown_variable_message() {
        let err = PlanError::UnknownVariable {
            name: "V.missing".into(),
        };
        assert_eq!(err.to_string(), "unknown variable 'V.missing'");
    }

    #[test]
    fn trace_mismatch_message() {
        let err = PlanError::TraceMismatch {
            ids: vec![ExprId(7), ExprId(9)],
        };
        assert_eq!(
            err.to_string(),
            "evaluation trace does not match expression: #7, #9"
        );
    }

    #[test]
    fn evaluation_error_wraps() {
        let err = PlanError::from(EvaluationError::DivisionByZero);
        assert_eq!(err.to_string(), "evaluation failed: division by zero");
    }

    #[test]
    fn unsupported_shape_message() {
        let err = PlanError::UnsupportedComprehensionShape {
            id: ExprId(3),
            reason: "loop step matches no known macro".into(),
        };
        assert_eq!(
            err.to_string(),
            "unsupported comprehension shape at node #3: loop step matches no known macro"
        );
    }
}
