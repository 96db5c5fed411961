mod activation;
pub mod comprehension;
mod condition;
mod config;
mod error;
mod expr;
mod filter;
mod literal;
pub mod ops;
mod plan;
mod planner;
mod trace;
mod value;

pub use activation::Activation;
pub use condition::Condition;
pub use config::{Declarations, Limits, VariableTable, DEFAULT_MAX_DEPTH};
pub use error::{EvaluationError, PlanError};
pub use expr::{
    call, ident, list, member_call, select, Call, Comprehension, Expr, ExprId, ExprKind, IdGen,
    MapEntry,
};
pub use filter::{Filter, PlanFilter};
pub use literal::{Literal, MapKey, Unrepresentable};
pub use plan::{LogicalOperation, Operator, PlanNode};
pub use planner::{Planner, PlannerBuilder};
pub use trace::{EvalTrace, Evaluation, Evaluator, Outcome, TraceEntry};
pub use value::Value;
