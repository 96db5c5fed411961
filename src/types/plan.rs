use std::fmt;

use super::Expr;

/// Logical connective of a [`LogicalOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Operator::And => "&&",
            Operator::Or => "||",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => f.write_str("and"),
            Operator::Or => f.write_str("or"),
        }
    }
}

/// The planner's output for a condition.
///
/// A `Constant` means the condition is decided by the known attributes
/// alone. `Expression` leaves hold residual expressions over unknown
/// attributes, and `Operation` combines two or more nodes that are not
/// constants.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Constant(bool),
    Expression(Expr),
    Operation(LogicalOperation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalOperation {
    pub operator: Operator,
    pub nodes: Vec<PlanNode>,
}

impl PlanNode {
    #[must_use]
    pub fn as_constant(&self) -> Option<bool> {
        match self {
            PlanNode::Constant(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_expression(&self) -> Option<&Expr> {
        match self {
            PlanNode::Expression(expr) => Some(expr),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_operation(&self) -> Option<&LogicalOperation> {
        match self {
            PlanNode::Operation(op) => Some(op),
            _ => None,
        }
    }
}

#[cfg(feature = "wire")]
impl PlanNode {
    /// Serialize the plan to the binary wire format.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::serial::SerializeError> {
        crate::serial::encode(self)
    }

    /// Deserialize a plan from bytes produced by [`PlanNode::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) if the
    /// header, checksum or payload is invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes)
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanNode::Constant(b) => write!(f, "{b}"),
            PlanNode::Expression(expr) => write!(f, "{expr}"),
            PlanNode::Operation(op) => {
                f.write_str("(")?;
                for (i, node) in op.nodes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.operator.symbol())?;
                    }
                    write!(f, "{node}")?;
                }
                f.write_str(")")
            }
        }
    }
}
