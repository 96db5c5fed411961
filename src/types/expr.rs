use std::collections::HashSet;
use std::fmt;

use super::literal::Literal;
use super::ops;

/// Identifier of a node within one expression tree.
///
/// Identifiers are unique within a tree and key the entries of an
/// [`EvalTrace`](super::EvalTrace). Nodes built programmatically carry the
/// placeholder `ExprId(0)` until the tree is [renumbered](Expr::renumbered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ExprId(pub u64);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic identifier allocator for one tree-building pass.
#[derive(Debug)]
pub struct IdGen {
    next: u64,
}

impl IdGen {
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> ExprId {
        let id = ExprId(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// A node of the expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    /// Field selection. With `test_only` set this is the presence test `has(operand.field)`.
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
    },
    Call(Call),
    List(Vec<Expr>),
    Map(Vec<MapEntry>),
    Comprehension(Box<Comprehension>),
}

/// A function application. Operators are calls named after [`ops`] constants;
/// method-style calls carry a `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub function: String,
    pub target: Option<Box<Expr>>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
}

/// The general fold form that list macros expand to.
///
/// `accu_var` starts at `accu_init`; for each element of `iter_range` (bound
/// to `iter_var`, or to `iter_var`/`iter_var2` as index/key and value) the
/// step replaces the accumulator while `loop_condition` holds. The value of
/// the comprehension is `result`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub iter_range: Expr,
    pub iter_var: String,
    pub iter_var2: Option<String>,
    pub accu_var: String,
    pub accu_init: Expr,
    pub loop_condition: Expr,
    pub loop_step: Expr,
    pub result: Expr,
}

impl Comprehension {
    /// Names bound while evaluating the loop condition and step.
    #[must_use]
    pub fn bound_vars(&self) -> Vec<&str> {
        let mut vars = vec![self.iter_var.as_str()];
        if let Some(second) = &self.iter_var2 {
            vars.push(second.as_str());
        }
        vars.push(self.accu_var.as_str());
        vars
    }
}

impl Expr {
    /// A node with a placeholder identifier.
    #[must_use]
    pub fn new(kind: ExprKind) -> Self {
        Self {
            id: ExprId::default(),
            kind,
        }
    }

    #[must_use]
    pub fn with_id(id: ExprId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    #[must_use]
    pub fn literal(literal: impl Into<Literal>) -> Self {
        Self::new(ExprKind::Literal(literal.into()))
    }

    #[must_use]
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// The value of a boolean literal node.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.as_literal().and_then(Literal::as_bool)
    }

    #[must_use]
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// The call at this node if it is a global call to `function` with `arity` arguments.
    #[must_use]
    pub fn as_call(&self, function: &str, arity: usize) -> Option<&[Expr]> {
        match &self.kind {
            ExprKind::Call(call)
                if call.target.is_none()
                    && call.function == function
                    && call.args.len() == arity =>
            {
                Some(&call.args)
            }
            _ => None,
        }
    }

    /// Direct children in pre-order position.
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Ident(_) => Vec::new(),
            ExprKind::Select { operand, .. } => vec![operand.as_ref()],
            ExprKind::Call(call) => call.target.as_deref().into_iter().chain(&call.args).collect(),
            ExprKind::List(items) => items.iter().collect(),
            ExprKind::Map(entries) => entries.iter().flat_map(|e| [&e.key, &e.value]).collect(),
            ExprKind::Comprehension(c) => vec![
                &c.iter_range,
                &c.accu_init,
                &c.loop_condition,
                &c.loop_step,
                &c.result,
            ],
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Literal(_) | ExprKind::Ident(_) => Vec::new(),
            ExprKind::Select { operand, .. } => vec![operand.as_mut()],
            ExprKind::Call(call) => call
                .target
                .as_deref_mut()
                .into_iter()
                .chain(&mut call.args)
                .collect(),
            ExprKind::List(items) => items.iter_mut().collect(),
            ExprKind::Map(entries) => entries
                .iter_mut()
                .flat_map(|e| [&mut e.key, &mut e.value])
                .collect(),
            ExprKind::Comprehension(c) => vec![
                &mut c.iter_range,
                &mut c.accu_init,
                &mut c.loop_condition,
                &mut c.loop_step,
                &mut c.result,
            ],
        }
    }

    /// Rebuild this node with every direct child replaced by `f(child)`.
    /// The node keeps its identifier.
    pub(crate) fn try_map_children<E>(
        &self,
        f: &mut impl FnMut(&Expr) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        let kind = match &self.kind {
            ExprKind::Literal(_) | ExprKind::Ident(_) => self.kind.clone(),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => ExprKind::Select {
                operand: Box::new(f(operand)?),
                field: field.clone(),
                test_only: *test_only,
            },
            ExprKind::Call(call) => ExprKind::Call(Call {
                function: call.function.clone(),
                target: match &call.target {
                    Some(target) => Some(Box::new(f(target)?)),
                    None => None,
                },
                args: call.args.iter().map(|arg| f(arg)).collect::<Result<_, E>>()?,
            }),
            ExprKind::List(items) => {
                ExprKind::List(items.iter().map(|item| f(item)).collect::<Result<_, E>>()?)
            }
            ExprKind::Map(entries) => ExprKind::Map(
                entries
                    .iter()
                    .map(|entry| {
                        Ok(MapEntry {
                            key: f(&entry.key)?,
                            value: f(&entry.value)?,
                        })
                    })
                    .collect::<Result<_, E>>()?,
            ),
            ExprKind::Comprehension(c) => ExprKind::Comprehension(Box::new(Comprehension {
                iter_range: f(&c.iter_range)?,
                iter_var: c.iter_var.clone(),
                iter_var2: c.iter_var2.clone(),
                accu_var: c.accu_var.clone(),
                accu_init: f(&c.accu_init)?,
                loop_condition: f(&c.loop_condition)?,
                loop_step: f(&c.loop_step)?,
                result: f(&c.result)?,
            })),
        };
        Ok(Expr::with_id(self.id, kind))
    }

    /// Number of nodes on the longest path from this node to a leaf.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.children().into_iter().map(Expr::depth).max().unwrap_or(0)
    }

    /// Reassign identifiers in pre-order starting from 1.
    #[must_use]
    pub fn renumbered(mut self) -> Self {
        let mut ids = IdGen::new();
        self.renumber(&mut ids);
        self
    }

    /// Reassign identifiers in pre-order from the given allocator.
    pub fn renumber(&mut self, ids: &mut IdGen) {
        self.id = ids.next_id();
        for child in self.children_mut() {
            child.renumber(ids);
        }
    }

    /// Visit every node in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Identifiers that occur more than once in this tree.
    #[must_use]
    pub fn duplicate_ids(&self) -> Vec<ExprId> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        self.walk(&mut |node| {
            if !seen.insert(node.id) {
                duplicates.push(node.id);
            }
        });
        duplicates
    }

    /// Structural equality ignoring node identifiers.
    #[must_use]
    pub fn same_shape(&self, other: &Expr) -> bool {
        match (&self.kind, &other.kind) {
            (ExprKind::Literal(a), ExprKind::Literal(b)) => a == b,
            (ExprKind::Ident(a), ExprKind::Ident(b)) => a == b,
            (
                ExprKind::Select {
                    operand: a,
                    field: fa,
                    test_only: ta,
                },
                ExprKind::Select {
                    operand: b,
                    field: fb,
                    test_only: tb,
                },
            ) => fa == fb && ta == tb && a.same_shape(b),
            (ExprKind::Call(a), ExprKind::Call(b)) => {
                a.function == b.function
                    && match (&a.target, &b.target) {
                        (Some(x), Some(y)) => x.same_shape(y),
                        (None, None) => true,
                        _ => false,
                    }
                    && all_same_shape(&a.args, &b.args)
            }
            (ExprKind::List(a), ExprKind::List(b)) => all_same_shape(a, b),
            (ExprKind::Map(a), ExprKind::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| x.key.same_shape(&y.key) && x.value.same_shape(&y.value))
            }
            (ExprKind::Comprehension(a), ExprKind::Comprehension(b)) => {
                a.iter_var == b.iter_var
                    && a.iter_var2 == b.iter_var2
                    && a.accu_var == b.accu_var
                    && a.iter_range.same_shape(&b.iter_range)
                    && a.accu_init.same_shape(&b.accu_init)
                    && a.loop_condition.same_shape(&b.loop_condition)
                    && a.loop_step.same_shape(&b.loop_step)
                    && a.result.same_shape(&b.result)
            }
            _ => false,
        }
    }
}

fn all_same_shape(a: &[Expr], b: &[Expr]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_shape(y))
}

/// An identifier reference.
#[must_use]
pub fn ident(name: impl Into<String>) -> Expr {
    Expr::new(ExprKind::Ident(name.into()))
}

/// Field selection `operand.field`.
#[must_use]
pub fn select(operand: Expr, field: impl Into<String>) -> Expr {
    Expr::new(ExprKind::Select {
        operand: Box::new(operand),
        field: field.into(),
        test_only: false,
    })
}

/// A global function or operator call.
#[must_use]
pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call(Call {
        function: function.into(),
        target: None,
        args,
    }))
}

/// A method-style call `target.function(args)`.
#[must_use]
pub fn member_call(target: Expr, function: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call(Call {
        function: function.into(),
        target: Some(Box::new(target)),
        args,
    }))
}

#[must_use]
pub fn list(items: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::List(items))
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        call(ops::LOGICAL_NOT, vec![self])
    }
}

impl Expr {
    #[must_use]
    pub fn and(self, other: Expr) -> Expr {
        call(ops::LOGICAL_AND, vec![self, other])
    }

    #[must_use]
    pub fn or(self, other: Expr) -> Expr {
        call(ops::LOGICAL_OR, vec![self, other])
    }

    #[must_use]
    pub fn equals(self, other: Expr) -> Expr {
        call(ops::EQUALS, vec![self, other])
    }
}
