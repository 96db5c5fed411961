use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::{EvaluationError, Outcome, Value};

/// Known attribute values for one planning request.
///
/// Values are bound at dot-separated paths such as `"P.attr.name"`.
/// `request.principal` and `request.resource` name the same attributes as
/// `P` and `R`, both when binding and when looking up. Paths
/// that are not bound are *unknown*: evaluation leaves the expressions that
/// depend on them in the residual. Root names can additionally be masked,
/// which makes them unknown regardless of bindings; comprehension variables
/// are masked this way while their bodies are partially evaluated.
///
/// Cloning is cheap; bindings are shared behind an [`Arc`].
#[derive(Debug, Clone, Default)]
pub struct Activation {
    data: Arc<HashMap<String, Binding>>,
    masked: BTreeSet<String>,
}

#[derive(Debug, Clone)]
enum Binding {
    Leaf(Value),
    Nested(HashMap<String, Binding>),
}

impl Activation {
    /// Create an empty activation. Every attribute is unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dot-separated path. Creates intermediate nested maps as needed.
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value.into());
        self
    }

    /// Insert a value at a dot-separated path (mutable reference version).
    pub fn insert(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((root, rest)) = canonical(&segments) else {
            return;
        };
        let segments: Vec<&str> = std::iter::once(root).chain(rest.iter().copied()).collect();
        Self::insert_recursive(Arc::make_mut(&mut self.data), &segments, value);
    }

    /// A copy of this activation in which the given root names are unknown.
    #[must_use]
    pub fn masking<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut masked = self.masked.clone();
        masked.extend(names.into_iter().map(str::to_owned));
        Self {
            data: Arc::clone(&self.data),
            masked,
        }
    }

    #[must_use]
    pub fn is_masked(&self, name: &str) -> bool {
        self.masked.contains(name)
    }

    /// Look up a qualified name given as path segments.
    ///
    /// Masked roots, unbound segments and paths ending at an intermediate
    /// map are unknown. A path that runs past a bound leaf selects into the
    /// leaf value.
    ///
    /// # Errors
    ///
    /// Selection into a bound value fails as [`Value::field`] does.
    pub fn resolve(&self, path: &[&str]) -> Result<Outcome, EvaluationError> {
        let Some(first) = path.first() else {
            return Ok(Outcome::Unknown);
        };
        if self.masked.contains(*first) {
            return Ok(Outcome::Unknown);
        }
        let Some((root, rest)) = canonical(path) else {
            return Ok(Outcome::Unknown);
        };
        let Some(mut binding) = self.data.get(root) else {
            return Ok(Outcome::Unknown);
        };
        for (i, segment) in rest.iter().enumerate() {
            match binding {
                Binding::Nested(children) => match children.get(*segment) {
                    Some(child) => binding = child,
                    None => return Ok(Outcome::Unknown),
                },
                Binding::Leaf(value) => {
                    let mut current = value;
                    for field in &rest[i..] {
                        current = current.field(field)?;
                    }
                    return Ok(Outcome::Known(current.clone()));
                }
            }
        }
        Ok(match binding {
            Binding::Leaf(value) => Outcome::Known(value.clone()),
            Binding::Nested(_) => Outcome::Unknown,
        })
    }

    /// Look up a dot-separated path.
    ///
    /// # Errors
    ///
    /// See [`Activation::resolve`].
    pub fn get(&self, path: &str) -> Result<Outcome, EvaluationError> {
        let segments: Vec<&str> = path.split('.').collect();
        self.resolve(&segments)
    }

    fn insert_recursive(map: &mut HashMap<String, Binding>, segments: &[&str], value: Value) {
        match segments {
            [] => {}
            [last] => {
                map.insert((*last).to_owned(), Binding::Leaf(value));
            }
            [first, rest @ ..] => {
                let entry = map
                    .entry((*first).to_owned())
                    .or_insert_with(|| Binding::Nested(HashMap::new()));
                match entry {
                    Binding::Nested(nested) => {
                        Self::insert_recursive(nested, rest, value);
                    }
                    Binding::Leaf(_) => {
                        let mut nested = HashMap::new();
                        Self::insert_recursive(&mut nested, rest, value);
                        *entry = Binding::Nested(nested);
                    }
                }
            }
        }
    }
}

/// Split a path into its root and the remaining segments, folding the
/// `request.principal` and `request.resource` prefixes into `P` and `R`.
fn canonical<'a, 'p>(path: &'p [&'a str]) -> Option<(&'a str, &'p [&'a str])> {
    match path {
        ["request", "principal", rest @ ..] => Some(("P", rest)),
        ["request", "resource", rest @ ..] => Some(("R", rest)),
        [root, rest @ ..] => Some((*root, rest)),
        [] => None,
    }
}
