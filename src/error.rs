use thiserror::Error;

use crate::parse::ParseError;
use crate::PlanError;

/// Unified error type covering parsing, planning and the wire format.
///
/// Returned by convenience methods like
/// [`Planner::plan_source()`](crate::Planner::plan_source).
#[derive(Debug, Error)]
pub enum ResidueError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[cfg(feature = "wire")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "wire")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}
