use std::collections::{BTreeMap, BTreeSet};

use super::Expr;
use crate::parse::{parse, ParseError};

/// Default bound on expression nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Resource limits applied while resolving and residualising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Names an expression may refer to.
///
/// Declared roots (`request`, `P`, `R` and `runtime` by default) are
/// attribute namespaces looked up in the activation. Alias roots (`V` and
/// `variables`) introduce references into the [`VariableTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declarations {
    roots: BTreeSet<String>,
    alias_roots: BTreeSet<String>,
}

impl Default for Declarations {
    fn default() -> Self {
        Self {
            roots: ["request", "P", "R", "runtime"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            alias_roots: ["V", "variables"].into_iter().map(str::to_owned).collect(),
        }
    }
}

impl Declarations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declarations with no roots at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            roots: BTreeSet::new(),
            alias_roots: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn declare(mut self, name: impl Into<String>) -> Self {
        self.roots.insert(name.into());
        self
    }

    #[must_use]
    pub fn alias_root(mut self, name: impl Into<String>) -> Self {
        self.alias_roots.insert(name.into());
        self
    }

    #[must_use]
    pub fn is_root(&self, name: &str) -> bool {
        self.roots.contains(name)
    }

    #[must_use]
    pub fn is_alias_root(&self, name: &str) -> bool {
        self.alias_roots.contains(name)
    }

    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }
}

/// Named expressions referenced as `V.name` or `variables.name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    entries: BTreeMap<String, Expr>,
}

impl VariableTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse each `(name, source)` pair into a table.
    ///
    /// # Errors
    ///
    /// Returns the first [`ParseError`] encountered.
    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ParseError> {
        let mut table = Self::new();
        for (name, source) in sources {
            table.insert(name, parse(source)?);
        }
        Ok(table)
    }

    pub fn insert(&mut self, name: impl Into<String>, expr: Expr) {
        self.entries.insert(name.into(), expr);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.insert(name, expr);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
