use tracing::trace;

use crate::{Comprehension, Declarations, Expr, ExprKind, Limits, PlanError, VariableTable};

/// Inlines variable references such as `V.geo` with their definitions.
///
/// Definitions may refer to other variables; expansion is recursive and a
/// reference back to a variable already being expanded is reported as a
/// cycle. Every identifier left after expansion must be a declared root or
/// a comprehension variable in scope.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    variables: &'a VariableTable,
    declarations: &'a Declarations,
    limits: Limits,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(variables: &'a VariableTable, declarations: &'a Declarations, limits: Limits) -> Self {
        Self {
            variables,
            declarations,
            limits,
        }
    }

    /// Resolve `expr`, returning a new tree with fresh identifiers.
    ///
    /// # Errors
    ///
    /// - [`PlanError::UnknownVariable`] for references to undefined variables
    ///   or undeclared identifiers.
    /// - [`PlanError::VariableCycle`] when a definition refers back to itself.
    /// - [`PlanError::DepthExceeded`] when the expanded tree nests too deeply.
    pub fn resolve(&self, expr: &Expr) -> Result<Expr, PlanError> {
        let resolved = self.walk(expr, &mut Vec::new(), &mut Vec::new(), 0)?;
        Ok(resolved.renumbered())
    }

    fn walk(
        &self,
        expr: &Expr,
        expansion: &mut Vec<String>,
        bound: &mut Vec<String>,
        depth: usize,
    ) -> Result<Expr, PlanError> {
        if depth > self.limits.max_depth {
            return Err(PlanError::DepthExceeded {
                limit: self.limits.max_depth,
            });
        }
        match &expr.kind {
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => match operand.as_ident() {
                Some(root) if self.is_alias(root, bound) => {
                    if *test_only {
                        Ok(Expr::literal(self.variables.contains(field)))
                    } else {
                        self.expand(root, field, expansion, depth)
                    }
                }
                _ => expr.try_map_children(&mut |child| self.walk(child, expansion, bound, depth + 1)),
            },
            ExprKind::Ident(name) => {
                if bound.iter().any(|b| b == name) || self.declarations.is_root(name) {
                    Ok(expr.clone())
                } else {
                    Err(PlanError::UnknownVariable { name: name.clone() })
                }
            }
            ExprKind::Comprehension(c) => self.comprehension(expr, c, expansion, bound, depth),
            _ => expr.try_map_children(&mut |child| self.walk(child, expansion, bound, depth + 1)),
        }
    }

    fn is_alias(&self, name: &str, bound: &[String]) -> bool {
        self.declarations.is_alias_root(name) && !bound.iter().any(|b| b == name)
    }

    fn expand(&self, root: &str, name: &str, expansion: &mut Vec<String>, depth: usize) -> Result<Expr, PlanError> {
        if let Some(start) = expansion.iter().position(|n| n == name) {
            let mut path = expansion[start..].to_vec();
            path.push(name.to_owned());
            return Err(PlanError::VariableCycle { path });
        }
        let Some(definition) = self.variables.get(name) else {
            return Err(PlanError::UnknownVariable {
                name: format!("{root}.{name}"),
            });
        };
        trace!(variable = name, depth, "expanding variable");
        expansion.push(name.to_owned());
        // Definitions cannot see the comprehension variables of the use site.
        let expanded = self.walk(definition, expansion, &mut Vec::new(), depth + 1);
        expansion.pop();
        expanded
    }

    fn comprehension(
        &self,
        expr: &Expr,
        c: &Comprehension,
        expansion: &mut Vec<String>,
        bound: &mut Vec<String>,
        depth: usize,
    ) -> Result<Expr, PlanError> {
        let depth = depth + 1;
        let iter_range = self.walk(&c.iter_range, expansion, bound, depth)?;
        let accu_init = self.walk(&c.accu_init, expansion, bound, depth)?;
        let loop_vars: Vec<&str> = c.bound_vars();
        let loop_condition = self.walk_scoped(&c.loop_condition, &loop_vars, expansion, bound, depth)?;
        let loop_step = self.walk_scoped(&c.loop_step, &loop_vars, expansion, bound, depth)?;
        let result = self.walk_scoped(&c.result, &[c.accu_var.as_str()], expansion, bound, depth)?;
        Ok(Expr::with_id(
            expr.id,
            ExprKind::Comprehension(Box::new(Comprehension {
                iter_range,
                iter_var: c.iter_var.clone(),
                iter_var2: c.iter_var2.clone(),
                accu_var: c.accu_var.clone(),
                accu_init,
                loop_condition,
                loop_step,
                result,
            })),
        ))
    }

    fn walk_scoped(
        &self,
        expr: &Expr,
        vars: &[&str],
        expansion: &mut Vec<String>,
        bound: &mut Vec<String>,
        depth: usize,
    ) -> Result<Expr, PlanError> {
        let base = bound.len();
        bound.extend(vars.iter().map(|v| (*v).to_owned()));
        let walked = self.walk(expr, expansion, bound, depth);
        bound.truncate(base);
        walked
    }
}
