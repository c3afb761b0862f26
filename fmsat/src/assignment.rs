//! Complete variable assignments.
use std::fmt;

use fmsat_formula::{Lit, Var};

/// A value for every feature variable.
///
/// Stored as one literal per variable in index order, so membership tests are a single lookup.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Assignment {
    lits: Vec<Lit>,
}

impl Assignment {
    /// Builds an assignment for `var_count` variables from a backend model.
    ///
    /// Literals of variables past `var_count` are ignored. Variables the model leaves open are
    /// assigned `false`.
    pub fn from_model(model: &[Lit], var_count: usize) -> Assignment {
        let mut lits: Vec<Lit> = (0..var_count).map(|index| Lit::from_index(index, false)).collect();
        for &lit in model.iter() {
            if let Some(slot) = lits.get_mut(lit.index()) {
                *slot = lit;
            }
        }
        Assignment { lits }
    }

    /// Builds an assignment from 1-based signed integers.
    pub fn from_dimacs(values: &[isize]) -> Assignment {
        let model: Vec<Lit> = values.iter().map(|&value| Lit::from_dimacs(value)).collect();
        let var_count = model.iter().map(|lit| lit.index() + 1).max().unwrap_or(0);
        Assignment::from_model(&model, var_count)
    }

    /// Whether the assignment makes `lit` true.
    ///
    /// Literals of variables outside the assignment are never contained.
    pub fn contains(&self, lit: Lit) -> bool {
        self.lits.get(lit.index()) == Some(&lit)
    }

    /// The value of `var`, `None` for variables outside the assignment.
    pub fn value(&self, var: Var) -> Option<bool> {
        self.lits.get(var.index()).map(|lit| lit.is_positive())
    }

    pub fn lits(&self) -> &[Lit] {
        &self.lits
    }

    /// Number of assigned variables.
    pub fn len(&self) -> usize {
        self.lits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }

    /// Variables assigned `true`.
    pub fn selected(&self) -> impl Iterator<Item = Var> + '_ {
        self.lits
            .iter()
            .filter(|lit| lit.is_positive())
            .map(|lit| lit.var())
    }

    pub fn to_dimacs(&self) -> Vec<isize> {
        self.lits.iter().map(|lit| lit.to_dimacs()).collect()
    }
}

/// Uses the 1-based DIMACS encoding.
impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.lits.iter()).finish()
    }
}
