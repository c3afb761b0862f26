//! Mapping between feature names and solver variables.
use rustc_hash::FxHashMap;

use crate::cnf::TranslationError;
use crate::node::Node;
use crate::{Lit, Var};

/// Assigns each feature name a solver variable.
///
/// Variables are handed out densely in insertion order, so the n-th inserted name has the
/// 0-based index n and the DIMACS number n + 1.
#[derive(Clone, Default, Debug)]
pub struct VarMap {
    names: Vec<String>,
    vars: FxHashMap<String, Var>,
}

impl VarMap {
    pub fn new() -> VarMap {
        VarMap::default()
    }

    /// Creates a map containing the given names in order.
    ///
    /// Repeated names are mapped to the variable of their first occurrence.
    pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> VarMap {
        let mut map = VarMap::new();
        for name in names {
            map.insert(name);
        }
        map
    }

    /// Returns the variable for `name`, allocating a new one if the name is unknown.
    pub fn insert(&mut self, name: impl Into<String>) -> Var {
        let name = name.into();
        if let Some(&var) = self.vars.get(&name) {
            return var;
        }
        let var = Var::from_index(self.names.len());
        self.vars.insert(name.clone(), var);
        self.names.push(name);
        var
    }

    pub fn var(&self, name: &str) -> Option<Var> {
        self.vars.get(name).cloned()
    }

    /// The literal of the named variable with the given polarity.
    pub fn lit(&self, name: &str, polarity: bool) -> Result<Lit, TranslationError> {
        match self.var(name) {
            Some(var) => Ok(var.lit(polarity)),
            None => Err(TranslationError::UnknownVariable {
                name: name.to_owned(),
            }),
        }
    }

    pub fn name(&self, var: Var) -> Option<&str> {
        self.names.get(var.index()).map(|name| name.as_str())
    }

    /// Converts a literal back into a formula over feature names.
    pub fn literal_node(&self, lit: Lit) -> Result<Node, TranslationError> {
        match self.name(lit.var()) {
            Some(name) => Ok(Node::literal(name, lit.is_positive())),
            None => Err(TranslationError::UnknownLiteral {
                lit: lit.to_dimacs(),
            }),
        }
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All variables with their names in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Var, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (Var::from_index(index), name.as_str()))
    }
}
