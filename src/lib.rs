//! Partial evaluation of authorization conditions into query plans.
//!
//! A [`Planner`] takes a condition tree over principal and resource
//! attributes, evaluates everything the caller already knows, and returns
//! a [`PlanNode`] holding only the parts that still depend on unknown
//! attributes. The plan can be rendered back to expression source or
//! normalised into a [`PlanFilter`] for translation into a datastore query.

mod error;
mod evaluate;
mod interpreter;
mod normalise;
pub mod parse;
mod residual;
mod resolve;
#[cfg(feature = "wire")]
pub mod serial;
mod types;
mod unparse;

pub use error::ResidueError;
pub use interpreter::{Clock, Interpreter};
pub use normalise::normalise;
pub use parse::{parse, ParseError};
pub use residual::ResidualBuilder;
pub use resolve::Resolver;
pub use types::{
    call, ident, list, member_call, select, Activation, Call, Comprehension, Condition,
    Declarations, EvalTrace, Evaluation, EvaluationError, Evaluator, Expr, ExprId, ExprKind,
    Filter, IdGen, Limits, Literal, LogicalOperation, MapEntry, MapKey, Operator, Outcome,
    PlanError, PlanFilter, PlanNode, Planner, PlannerBuilder, TraceEntry, Unrepresentable, Value,
    VariableTable, DEFAULT_MAX_DEPTH,
};
pub use types::{comprehension, ops};
