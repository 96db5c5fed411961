//! Binary serialization and deserialization of plan results.
//!
//! A [`PlanNode`](crate::PlanNode) is written as a 32-byte fixed header
//! followed by a bincode-encoded payload. The payload stores the plan, its
//! expressions and their literals as flat tables linked by index, so decoding
//! does not recurse however deep the plan is. Logical operations, expression
//! trees and literal values nested deeper than
//! [`DEFAULT_MAX_DEPTH`](crate::DEFAULT_MAX_DEPTH) levels are rejected.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"RSDU"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! ## Versioning
//!
//! The format version in the header must match exactly. If it does not,
//! deserialization fails immediately with [`DeserializeError::IncompatibleVersion`].
//! The engine version is informational only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    Call, Comprehension, Expr, ExprId, ExprKind, Literal, LogicalOperation, MapEntry, MapKey,
    Operator, PlanNode, DEFAULT_MAX_DEPTH,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAGIC: &[u8; 4] = b"RSDU";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when serializing a [`PlanNode`](crate::PlanNode) to bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode plan: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("plan payload of {0} bytes exceeds the 4 GiB format limit")]
    TooLarge(usize),

    #[error("plan table of {0} entries exceeds the format's u32 index range")]
    TooManyNodes(usize),
}

/// Errors that can occur when deserializing a [`PlanNode`](crate::PlanNode) from bytes.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a residue plan: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: blob is v{blob}, engine supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Serialized type hierarchy
//
// The payload is three flat tables. Entries refer to their children by index
// into the same table, children always precede their parents, and every entry
// except the last plan node has exactly one parent. Decoding a table never
// recurses, and rebuilding walks it front to back.
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SerializedPlan {
    metadata: PlanMetadata,
    literals: Vec<SerializedLiteral>,
    exprs: Vec<SerializedExpr>,
    nodes: Vec<SerializedNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlanMetadata {
    node_count: usize,
    expression_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum SerializedNode {
    Constant(bool),
    Expression(u32),
    Operation {
        operator: SerializedOperator,
        nodes: Vec<u32>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum SerializedOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializedExpr {
    id: u64,
    kind: SerializedKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum SerializedKind {
    Literal(u32),
    Ident(String),
    Select {
        operand: u32,
        field: String,
        test_only: bool,
    },
    Call {
        function: String,
        target: Option<u32>,
        args: Vec<u32>,
    },
    List(Vec<u32>),
    Map(Vec<(u32, u32)>),
    Comprehension(Box<SerializedComprehension>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializedComprehension {
    iter_range: u32,
    iter_var: String,
    iter_var2: Option<String>,
    accu_var: String,
    accu_init: u32,
    loop_condition: u32,
    loop_step: u32,
    result: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum SerializedLiteral {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<u32>),
    Map(Vec<(SerializedMapKey, u32)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum SerializedMapKey {
    Bool(bool),
    Int(i64),
    Str(String),
}

fn invalid(message: impl Into<String>) -> DeserializeError {
    DeserializeError::Validation(message.into())
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TableWriter {
    literals: Vec<SerializedLiteral>,
    exprs: Vec<SerializedExpr>,
    nodes: Vec<SerializedNode>,
}

fn push<T>(table: &mut Vec<T>, entry: T) -> Result<u32, SerializeError> {
    let index = u32::try_from(table.len()).map_err(|_| SerializeError::TooManyNodes(table.len()))?;
    table.push(entry);
    Ok(index)
}

fn serialize_key(key: &MapKey) -> SerializedMapKey {
    match key {
        MapKey::Bool(v) => SerializedMapKey::Bool(*v),
        MapKey::Int(v) => SerializedMapKey::Int(*v),
        MapKey::String(v) => SerializedMapKey::Str(v.clone()),
    }
}

impl TableWriter {
    fn literal(&mut self, literal: &Literal) -> Result<u32, SerializeError> {
        let entry = match literal {
            Literal::Null => SerializedLiteral::Null,
            Literal::Bool(v) => SerializedLiteral::Bool(*v),
            Literal::Int(v) => SerializedLiteral::Int(*v),
            Literal::Float(v) => SerializedLiteral::Float(*v),
            Literal::String(v) => SerializedLiteral::Str(v.clone()),
            Literal::Bytes(v) => SerializedLiteral::Bytes(v.clone()),
            Literal::List(items) => SerializedLiteral::List(
                items
                    .iter()
                    .map(|item| self.literal(item))
                    .collect::<Result<_, _>>()?,
            ),
            Literal::Map(entries) => SerializedLiteral::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((serialize_key(k), self.literal(v)?)))
                    .collect::<Result<_, SerializeError>>()?,
            ),
        };
        push(&mut self.literals, entry)
    }

    fn expr(&mut self, expr: &Expr) -> Result<u32, SerializeError> {
        let kind = match &expr.kind {
            ExprKind::Literal(literal) => SerializedKind::Literal(self.literal(literal)?),
            ExprKind::Ident(name) => SerializedKind::Ident(name.clone()),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => SerializedKind::Select {
                operand: self.expr(operand)?,
                field: field.clone(),
                test_only: *test_only,
            },
            ExprKind::Call(call) => SerializedKind::Call {
                function: call.function.clone(),
                target: call.target.as_deref().map(|t| self.expr(t)).transpose()?,
                args: call.args.iter().map(|arg| self.expr(arg)).collect::<Result<_, _>>()?,
            },
            ExprKind::List(items) => {
                SerializedKind::List(items.iter().map(|item| self.expr(item)).collect::<Result<_, _>>()?)
            }
            ExprKind::Map(entries) => SerializedKind::Map(
                entries
                    .iter()
                    .map(|e| Ok((self.expr(&e.key)?, self.expr(&e.value)?)))
                    .collect::<Result<_, SerializeError>>()?,
            ),
            ExprKind::Comprehension(c) => SerializedKind::Comprehension(Box::new(SerializedComprehension {
                iter_range: self.expr(&c.iter_range)?,
                iter_var: c.iter_var.clone(),
                iter_var2: c.iter_var2.clone(),
                accu_var: c.accu_var.clone(),
                accu_init: self.expr(&c.accu_init)?,
                loop_condition: self.expr(&c.loop_condition)?,
                loop_step: self.expr(&c.loop_step)?,
                result: self.expr(&c.result)?,
            })),
        };
        push(&mut self.exprs, SerializedExpr { id: expr.id.0, kind })
    }

    fn node(&mut self, node: &PlanNode) -> Result<u32, SerializeError> {
        let entry = match node {
            PlanNode::Constant(b) => SerializedNode::Constant(*b),
            PlanNode::Expression(expr) => SerializedNode::Expression(self.expr(expr)?),
            PlanNode::Operation(op) => SerializedNode::Operation {
                operator: match op.operator {
                    Operator::And => SerializedOperator::And,
                    Operator::Or => SerializedOperator::Or,
                },
                nodes: op.nodes.iter().map(|n| self.node(n)).collect::<Result<_, _>>()?,
            },
        };
        push(&mut self.nodes, entry)
    }
}

fn plan_to_serialized(node: &PlanNode) -> Result<SerializedPlan, SerializeError> {
    let mut writer = TableWriter::default();
    writer.node(node)?;
    let expression_count = count_expressions(&writer.nodes);
    Ok(SerializedPlan {
        metadata: PlanMetadata {
            node_count: writer.nodes.len(),
            expression_count,
        },
        literals: writer.literals,
        exprs: writer.exprs,
        nodes: writer.nodes,
    })
}

fn count_expressions(nodes: &[SerializedNode]) -> usize {
    nodes
        .iter()
        .filter(|node| matches!(node, SerializedNode::Expression(_)))
        .count()
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Entries rebuilt so far, with their depth. Each may be claimed once.
#[derive(Debug)]
struct Rebuilt<T> {
    name: &'static str,
    slots: Vec<Option<(T, usize)>>,
}

impl<T> Rebuilt<T> {
    fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Take a child. Only entries already rebuilt can be referenced, which
    /// rules out cycles.
    fn claim(&mut self, index: u32) -> Result<(T, usize), DeserializeError> {
        let name = self.name;
        self.slots
            .get_mut(index as usize)
            .ok_or_else(|| invalid(format!("{name} {index} is referenced before it is defined")))?
            .take()
            .ok_or_else(|| invalid(format!("{name} {index} is referenced more than once")))
    }

    fn claim_all(&mut self, indices: &[u32]) -> Result<(Vec<T>, usize), DeserializeError> {
        let mut depth = 0;
        let mut values = Vec::with_capacity(indices.len());
        for &index in indices {
            let (value, d) = self.claim(index)?;
            depth = depth.max(d);
            values.push(value);
        }
        Ok((values, depth))
    }

    fn push(&mut self, value: T, child_depth: usize) -> Result<(), DeserializeError> {
        let depth = child_depth + 1;
        if depth > DEFAULT_MAX_DEPTH {
            return Err(invalid(format!(
                "{} {} is nested deeper than {DEFAULT_MAX_DEPTH} levels",
                self.name,
                self.slots.len()
            )));
        }
        self.slots.push(Some((value, depth)));
        Ok(())
    }

    fn ensure_consumed(&self) -> Result<(), DeserializeError> {
        match self.slots.iter().position(Option::is_some) {
            Some(index) => Err(invalid(format!("{} {index} is never referenced", self.name))),
            None => Ok(()),
        }
    }
}

fn deserialize_key(key: SerializedMapKey) -> MapKey {
    match key {
        SerializedMapKey::Bool(v) => MapKey::Bool(v),
        SerializedMapKey::Int(v) => MapKey::Int(v),
        SerializedMapKey::Str(v) => MapKey::String(v),
    }
}

fn rebuild_literals(entries: Vec<SerializedLiteral>) -> Result<Rebuilt<Literal>, DeserializeError> {
    let mut table = Rebuilt::new("literal", entries.len());
    for entry in entries {
        let (literal, depth) = match entry {
            SerializedLiteral::Null => (Literal::Null, 0),
            SerializedLiteral::Bool(v) => (Literal::Bool(v), 0),
            SerializedLiteral::Int(v) => (Literal::Int(v), 0),
            SerializedLiteral::Float(v) => (Literal::Float(v), 0),
            SerializedLiteral::Str(v) => (Literal::String(v), 0),
            SerializedLiteral::Bytes(v) => (Literal::Bytes(v), 0),
            SerializedLiteral::List(items) => {
                let (items, depth) = table.claim_all(&items)?;
                (Literal::List(items), depth)
            }
            SerializedLiteral::Map(entries) => {
                let mut map = BTreeMap::new();
                let mut depth = 0;
                for (key, index) in entries {
                    let (value, d) = table.claim(index)?;
                    depth = depth.max(d);
                    if map.insert(deserialize_key(key), value).is_some() {
                        return Err(invalid("map literal has duplicate keys"));
                    }
                }
                (Literal::Map(map), depth)
            }
        };
        table.push(literal, depth)?;
    }
    Ok(table)
}

fn rebuild_exprs(
    entries: Vec<SerializedExpr>,
    literals: &mut Rebuilt<Literal>,
) -> Result<Rebuilt<Expr>, DeserializeError> {
    let mut table = Rebuilt::new("expression", entries.len());
    for entry in entries {
        let (kind, depth) = match entry.kind {
            SerializedKind::Literal(index) => (ExprKind::Literal(literals.claim(index)?.0), 0),
            SerializedKind::Ident(name) => (ExprKind::Ident(name), 0),
            SerializedKind::Select {
                operand,
                field,
                test_only,
            } => {
                let (operand, depth) = table.claim(operand)?;
                (
                    ExprKind::Select {
                        operand: Box::new(operand),
                        field,
                        test_only,
                    },
                    depth,
                )
            }
            SerializedKind::Call {
                function,
                target,
                args,
            } => {
                let target = target.map(|index| table.claim(index)).transpose()?;
                let (args, args_depth) = table.claim_all(&args)?;
                let depth = target.as_ref().map_or(args_depth, |(_, d)| args_depth.max(*d));
                let call = Call {
                    function,
                    target: target.map(|(t, _)| Box::new(t)),
                    args,
                };
                (ExprKind::Call(call), depth)
            }
            SerializedKind::List(items) => {
                let (items, depth) = table.claim_all(&items)?;
                (ExprKind::List(items), depth)
            }
            SerializedKind::Map(entries) => {
                let mut rebuilt = Vec::with_capacity(entries.len());
                let mut depth = 0;
                for (key, value) in entries {
                    let (key, kd) = table.claim(key)?;
                    let (value, vd) = table.claim(value)?;
                    depth = depth.max(kd).max(vd);
                    rebuilt.push(MapEntry { key, value });
                }
                (ExprKind::Map(rebuilt), depth)
            }
            SerializedKind::Comprehension(c) => {
                let c = *c;
                let (parts, depth) = table.claim_all(&[
                    c.iter_range,
                    c.accu_init,
                    c.loop_condition,
                    c.loop_step,
                    c.result,
                ])?;
                let Ok([iter_range, accu_init, loop_condition, loop_step, result]) =
                    <[Expr; 5]>::try_from(parts)
                else {
                    return Err(invalid("comprehension is missing a part"));
                };
                (
                    ExprKind::Comprehension(Box::new(Comprehension {
                        iter_range,
                        iter_var: c.iter_var,
                        iter_var2: c.iter_var2,
                        accu_var: c.accu_var,
                        accu_init,
                        loop_condition,
                        loop_step,
                        result,
                    })),
                    depth,
                )
            }
        };
        table.push(Expr::with_id(ExprId(entry.id), kind), depth)?;
    }
    Ok(table)
}

fn rebuild_nodes(
    entries: Vec<SerializedNode>,
    exprs: &mut Rebuilt<Expr>,
) -> Result<Rebuilt<PlanNode>, DeserializeError> {
    let mut table = Rebuilt::new("plan node", entries.len());
    for entry in entries {
        let (node, depth) = match entry {
            SerializedNode::Constant(b) => (PlanNode::Constant(b), 0),
            SerializedNode::Expression(index) => {
                let (expr, _) = exprs.claim(index)?;
                if let Some(id) = expr.duplicate_ids().first() {
                    return Err(invalid(format!(
                        "expression node id {} is used more than once",
                        id.0
                    )));
                }
                (PlanNode::Expression(expr), 0)
            }
            SerializedNode::Operation { operator, nodes } => {
                if nodes.is_empty() {
                    return Err(invalid("empty and/or operation"));
                }
                let (nodes, depth) = table.claim_all(&nodes)?;
                let operator = match operator {
                    SerializedOperator::And => Operator::And,
                    SerializedOperator::Or => Operator::Or,
                };
                (PlanNode::Operation(LogicalOperation { operator, nodes }), depth)
            }
        };
        table.push(node, depth)?;
    }
    Ok(table)
}

fn serialized_to_plan(ser: SerializedPlan) -> Result<PlanNode, DeserializeError> {
    validate_metadata(&ser)?;
    let mut literals = rebuild_literals(ser.literals)?;
    let mut exprs = rebuild_exprs(ser.exprs, &mut literals)?;
    let mut nodes = rebuild_nodes(ser.nodes, &mut exprs)?;

    let root = nodes
        .slots
        .len()
        .checked_sub(1)
        .and_then(|last| u32::try_from(last).ok())
        .ok_or_else(|| invalid("plan has no nodes"))?;
    let (plan, _) = nodes.claim(root)?;

    literals.ensure_consumed()?;
    exprs.ensure_consumed()?;
    nodes.ensure_consumed()?;
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_metadata(ser: &SerializedPlan) -> Result<(), DeserializeError> {
    if ser.metadata.node_count != ser.nodes.len() {
        return Err(invalid(format!(
            "metadata says {} plan nodes but payload has {}",
            ser.metadata.node_count,
            ser.nodes.len()
        )));
    }
    let expression_count = count_expressions(&ser.nodes);
    if ser.metadata.expression_count != expression_count {
        return Err(invalid(format!(
            "metadata says {} expressions but payload has {}",
            ser.metadata.expression_count, expression_count
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Header I/O
// ---------------------------------------------------------------------------

fn write_header(buf: &mut Vec<u8>, payload: &[u8]) -> Result<(), SerializeError> {
    let payload_len = u32::try_from(payload.len()).map_err(|_| SerializeError::TooLarge(payload.len()))?;
    let hash = blake3::hash(payload);

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash.as_bytes()[..16]);
    Ok(())
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32, always fits in u32
fn read_header(bytes: &[u8]) -> Result<(u16, u32, [u8; 16]), DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    // bytes[6..8] engine version, bytes[8..12] flags
    let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);

    Ok((format_version, payload_len, hash))
}

// ---------------------------------------------------------------------------
// Public encode/decode
// ---------------------------------------------------------------------------

pub(crate) fn encode(node: &PlanNode) -> Result<Vec<u8>, SerializeError> {
    let serialized = plan_to_serialized(node)?;
    let payload = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload)?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<PlanNode, DeserializeError> {
    let (format_version, payload_len, stored_hash) = read_header(bytes)?;

    if format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_len as usize {
        return Err(DeserializeError::LengthMismatch {
            expected: payload_len,
            actual: payload.len(),
        });
    }

    if blake3::hash(payload).as_bytes()[..16] != stored_hash {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (serialized, read): (SerializedPlan, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    if read != payload.len() {
        return Err(invalid(format!(
            "{} unread bytes after the plan payload",
            payload.len() - read
        )));
    }

    serialized_to_plan(serialized)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
