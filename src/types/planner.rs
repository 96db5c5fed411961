use super::config::{Declarations, Limits, VariableTable};
use super::{Activation, Condition, EvalTrace, Evaluator, Expr, PlanError, PlanFilter, PlanNode};
use crate::evaluate::ConditionEvaluator;
use crate::interpreter::{Clock, Interpreter};
use crate::residual::ResidualBuilder;
use crate::resolve::Resolver;

/// Builder for constructing a [`Planner`].
///
/// # Example
///
/// ```
/// use residue::{Activation, Condition, PlanNode, PlannerBuilder};
///
/// let planner = PlannerBuilder::new()
///     .variable_source("owner", "R.attr.owner")
///     .unwrap()
///     .build();
///
/// let condition = Condition::parse("V.owner == P.attr.name").unwrap();
/// let activation = Activation::new().set("P.attr.name", "harry");
/// let plan = planner.plan(&condition, &activation).unwrap();
/// assert_eq!(plan.to_string(), "R.attr.owner == \"harry\"");
/// ```
#[derive(Debug, Default)]
pub struct PlannerBuilder {
    declarations: Declarations,
    variables: VariableTable,
    limits: Limits,
    clock: Clock,
}

impl PlannerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an additional attribute root.
    #[must_use]
    pub fn declare(mut self, name: &str) -> Self {
        self.declarations = self.declarations.declare(name);
        self
    }

    /// Register an additional alias root for variable references.
    #[must_use]
    pub fn alias_root(mut self, name: &str) -> Self {
        self.declarations = self.declarations.alias_root(name);
        self
    }

    /// Replace the declarations wholesale.
    #[must_use]
    pub fn declarations(mut self, declarations: Declarations) -> Self {
        self.declarations = declarations;
        self
    }

    /// Define a variable.
    #[must_use]
    pub fn variable(mut self, name: &str, definition: Expr) -> Self {
        self.variables.insert(name, definition);
        self
    }

    /// Parse and define a variable.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`](crate::ParseError) if `source` is not a valid expression.
    pub fn variable_source(self, name: &str, source: &str) -> Result<Self, crate::ParseError> {
        Ok(self.variable(name, crate::parse(source)?))
    }

    /// Replace the variable table wholesale.
    #[must_use]
    pub fn variables(mut self, variables: VariableTable) -> Self {
        self.variables = variables;
        self
    }

    /// Bound the nesting depth of resolved expressions.
    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.limits.max_depth = max_depth;
        self
    }

    /// Clock used by `now()` in the built-in interpreter.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Build a planner backed by the built-in [`Interpreter`].
    #[must_use]
    pub fn build(self) -> Planner<Interpreter> {
        let interpreter = Interpreter::new()
            .with_clock(self.clock)
            .with_limits(self.limits);
        self.build_with(interpreter)
    }

    /// Build a planner backed by a custom [`Evaluator`].
    #[must_use]
    pub fn build_with<E: Evaluator>(self, evaluator: E) -> Planner<E> {
        Planner {
            declarations: self.declarations,
            variables: self.variables,
            limits: self.limits,
            evaluator,
        }
    }
}

/// An immutable query planner. Thread-safe when its evaluator is, and
/// designed to live behind `Arc`.
#[derive(Debug)]
pub struct Planner<E = Interpreter> {
    declarations: Declarations,
    variables: VariableTable,
    limits: Limits,
    evaluator: E,
}

impl<E: Evaluator> Planner<E> {
    /// Plan a condition tree against the known attributes.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] when a leaf cannot be resolved or evaluated.
    /// Errors from any child abort the whole plan.
    pub fn plan(&self, condition: &Condition, activation: &Activation) -> Result<PlanNode, PlanError> {
        self.condition_evaluator(activation).evaluate(condition)
    }

    /// Plan a single expression.
    ///
    /// # Errors
    ///
    /// See [`Planner::plan`].
    pub fn plan_expr(&self, expr: &Expr, activation: &Activation) -> Result<PlanNode, PlanError> {
        self.condition_evaluator(activation).leaf(expr)
    }

    /// Plan a condition and normalise the result into a [`PlanFilter`].
    ///
    /// # Errors
    ///
    /// See [`Planner::plan`].
    pub fn plan_filter(&self, condition: &Condition, activation: &Activation) -> Result<PlanFilter, PlanError> {
        let plan = self.plan(condition, activation)?;
        Ok(PlanFilter::from_plan(&plan))
    }

    /// Parse a source expression and plan it.
    ///
    /// This is a convenience method combining [`parse`](crate::parse()) and
    /// [`Planner::plan_expr`].
    ///
    /// # Errors
    ///
    /// Returns [`ResidueError`](crate::ResidueError) on parse or planning failure.
    pub fn plan_source(&self, source: &str, activation: &Activation) -> Result<PlanNode, crate::ResidueError> {
        let expr = crate::parse(source)?;
        Ok(self.plan_expr(&expr, activation)?)
    }

    /// Inline variable references, returning a freshly numbered tree.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::VariableCycle`], [`PlanError::UnknownVariable`]
    /// or [`PlanError::DepthExceeded`].
    pub fn resolve(&self, expr: &Expr) -> Result<Expr, PlanError> {
        self.resolver().resolve(expr)
    }

    /// Residual of an already resolved expression given its evaluation trace.
    ///
    /// # Errors
    ///
    /// See [`ResidualBuilder::residual`].
    pub fn residual(&self, expr: &Expr, trace: &EvalTrace, activation: &Activation) -> Result<Expr, PlanError> {
        ResidualBuilder::new(&self.evaluator, activation, self.limits).residual(expr, trace)
    }

    #[must_use]
    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    #[must_use]
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    #[must_use]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    #[must_use]
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.variables, &self.declarations, self.limits)
    }

    fn condition_evaluator<'a>(&'a self, activation: &'a Activation) -> ConditionEvaluator<'a, E> {
        ConditionEvaluator::new(self.resolver(), &self.evaluator, activation, self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn builder_declares_roots() {
        let planner = PlannerBuilder::new().declare("T").build();
        assert!(planner.declarations().is_root("T"));
        assert!(planner.declarations().is_root("P"));
    }

    #[test]
    fn builder_sets_depth() {
        let planner = PlannerBuilder::new().max_depth(12).build();
        assert_eq!(planner.limits().max_depth, 12);
    }

    #[test]
    fn resolve_inlines_variables() {
        let planner = PlannerBuilder::new()
            .variable("geo", parse("R.attr.geo").unwrap())
            .build();
        let resolved = planner.resolve(&parse("V.geo == \"GB\"").unwrap()).unwrap();
        assert_eq!(resolved, parse("R.attr.geo == \"GB\"").unwrap());
    }

    #[test]
    fn plan_source_reports_parse_errors() {
        let planner = PlannerBuilder::new().build();
        let err = planner.plan_source("R.attr.(", &Activation::new()).unwrap_err();
        assert!(matches!(err, crate::ResidueError::Parse(_)));
    }

    #[test]
    fn planner_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Planner>();
    }
}
