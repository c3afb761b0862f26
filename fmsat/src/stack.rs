//! Stack of temporary constraints.
use std::sync::Arc;

use rustc_hash::FxHashSet;
use thiserror::Error;

use fmsat_formula::{CnfFormula, Constraint, TranslationError, Translator, VarMap};

/// Possible errors while manipulating a [`ConstraintStack`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StackError {
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error("Pop from an empty constraint stack")]
    Empty,
    /// A scope found a different depth than it started with.
    #[error("Constraint stack imbalance: expected depth {}, found {}", expected, actual)]
    Imbalance { expected: usize, actual: usize },
}

/// How a constraint was received by the stack.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Applied,
    /// The constraint is known to conflict with the constraints below it without asking the
    /// backend. It is still on the stack and has to be popped.
    ImmediatelyContradictory,
}

/// A pushed constraint with its translation.
#[derive(Debug)]
pub struct StackEntry {
    source: Constraint,
    formula: CnfFormula,
}

impl StackEntry {
    /// The constraint as supplied by the caller.
    pub fn source(&self) -> &Constraint {
        &self.source
    }

    pub fn formula(&self) -> &CnfFormula {
        &self.formula
    }
}

/// An ordered stack of constraints layered on top of a base formula.
///
/// Pushing translates the constraint once. A failed translation leaves the stack unchanged.
pub struct ConstraintStack {
    vars: Arc<VarMap>,
    clause_limit: usize,
    entries: Vec<StackEntry>,
}

impl ConstraintStack {
    pub fn new(vars: Arc<VarMap>, clause_limit: usize) -> ConstraintStack {
        ConstraintStack {
            vars,
            clause_limit,
            entries: vec![],
        }
    }

    pub fn push(&mut self, constraint: Constraint) -> Result<PushOutcome, StackError> {
        let formula = Translator::new(&self.vars)
            .with_clause_limit(self.clause_limit)
            .translate(constraint.node())?;

        let outcome = if is_trivially_unsat(&formula) {
            PushOutcome::ImmediatelyContradictory
        } else {
            PushOutcome::Applied
        };

        self.entries.push(StackEntry {
            source: constraint,
            formula,
        });
        Ok(outcome)
    }

    pub fn pop(&mut self) -> Result<Constraint, StackError> {
        match self.entries.pop() {
            Some(entry) => Ok(entry.source),
            None => Err(StackError::Empty),
        }
    }

    /// Pops entries until the stack has the given depth.
    ///
    /// Fails without changes if the stack is already shallower.
    pub fn truncate(&mut self, depth: usize) -> Result<(), StackError> {
        if depth > self.entries.len() {
            return Err(StackError::Imbalance {
                expected: depth,
                actual: self.entries.len(),
            });
        }
        self.entries.truncate(depth);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The topmost entry.
    pub fn top(&self) -> Option<&StackEntry> {
        self.entries.last()
    }

    /// All entries in push order.
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    /// Translations of all entries in push order.
    pub fn snapshot_formulas(&self) -> Vec<&CnfFormula> {
        self.entries.iter().map(|entry| &entry.formula).collect()
    }

    /// The constraint a pushed formula was translated from.
    pub fn source_of(&self, position: usize) -> Option<&Constraint> {
        self.entries.get(position).map(|entry| &entry.source)
    }
}

/// Whether the formula contains an empty clause or complementary unit clauses.
pub(crate) fn is_trivially_unsat(formula: &CnfFormula) -> bool {
    let mut units = FxHashSet::default();
    for clause in formula.iter() {
        match clause {
            [] => return true,
            [unit] => {
                if units.contains(&!*unit) {
                    return true;
                }
                units.insert(*unit);
            }
            _ => (),
        }
    }
    false
}
