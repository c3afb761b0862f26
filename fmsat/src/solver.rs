//! Incremental satisfiability queries over a base formula.
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use log::{debug, error};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use fmsat_formula::{
    cnf::DEFAULT_CLAUSE_LIMIT, CnfFormula, Constraint, Lit, TranslationError, Translator, VarMap,
};

use crate::assignment::Assignment;
use crate::backend::{Backend, BackendError, FormulaId, Session, SessionOptions};
use crate::model::ModelError;
use crate::stack::{ConstraintStack, PushOutcome, StackError};

/// Possible errors while running an analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The backend could not be used at all. Aborts the whole analysis.
    #[error("Satisfiability backend unavailable: {}", reason)]
    Unavailable { reason: String },
    /// A query that has to be answered for the result to make sense had no result.
    #[error("No conclusive result for the {} query", query)]
    Inconclusive { query: &'static str },
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result of a satisfiability check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    /// The backend gave up, e.g. after a timeout.
    Unknown,
}

/// Result of a satisfiability check that produces a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Solution {
    Sat(Assignment),
    Unsat,
    Unknown,
}

impl Solution {
    pub fn into_model(self) -> Option<Assignment> {
        match self {
            Solution::Sat(model) => Some(model),
            _ => None,
        }
    }
}

/// The translated constraints every query starts from.
///
/// Shared read-only between solver instances, e.g. the workers of a parallel analysis.
pub struct BaseFormula {
    vars: Arc<VarMap>,
    constraints: Vec<Constraint>,
    formulas: Vec<CnfFormula>,
    clause_limit: usize,
    /// Values fixed by unit propagation of the base alone.
    implied: Vec<Option<bool>>,
    conflicting: bool,
}

impl BaseFormula {
    pub fn new(vars: VarMap, constraints: Vec<Constraint>) -> Result<BaseFormula, TranslationError> {
        BaseFormula::with_clause_limit(vars, constraints, DEFAULT_CLAUSE_LIMIT)
    }

    pub fn with_clause_limit(
        vars: VarMap,
        constraints: Vec<Constraint>,
        clause_limit: usize,
    ) -> Result<BaseFormula, TranslationError> {
        let translator = Translator::new(&vars).with_clause_limit(clause_limit);
        let formulas = constraints
            .iter()
            .map(|constraint| translator.translate(constraint.node()))
            .collect::<Result<Vec<_>, _>>()?;

        let (implied, conflicting) = propagate_units(vars.len(), &formulas);
        debug!(
            "Base formula with {} variables, {} constraints and {} fixed variables",
            vars.len(),
            constraints.len(),
            implied.iter().filter(|value| value.is_some()).count()
        );

        Ok(BaseFormula {
            vars: Arc::new(vars),
            constraints,
            formulas,
            clause_limit,
            implied,
            conflicting,
        })
    }

    pub fn vars(&self) -> &Arc<VarMap> {
        &self.vars
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn formulas(&self) -> &[CnfFormula] {
        &self.formulas
    }

    pub fn clause_limit(&self) -> usize {
        self.clause_limit
    }

    /// Literals fixed by unit propagation of the base formula.
    pub fn implied_literals(&self) -> Vec<Lit> {
        self.implied
            .iter()
            .enumerate()
            .filter_map(|(index, value)| value.map(|value| Lit::from_index(index, value)))
            .collect()
    }

    /// Whether unit propagation alone refutes the base formula.
    pub fn is_trivially_unsat(&self) -> bool {
        self.conflicting
    }

    /// Whether some clause of `formula` is falsified by the fixed values of the base.
    fn refutes(&self, formula: &CnfFormula) -> bool {
        formula.iter().any(|clause| {
            clause.iter().all(|lit| {
                self.implied.get(lit.index()).cloned().flatten() == Some(lit.is_negative())
            })
        })
    }
}

/// Computes the values fixed by unit propagation.
///
/// Also returns whether propagation ran into a conflict.
fn propagate_units(var_count: usize, formulas: &[CnfFormula]) -> (Vec<Option<bool>>, bool) {
    let mut values: Vec<Option<bool>> = vec![None; var_count];
    loop {
        let mut changed = false;
        for clause in formulas.iter().flat_map(|formula| formula.iter()) {
            let mut open = None;
            let mut open_count = 0;
            let mut satisfied = false;
            for &lit in clause.iter() {
                match values.get(lit.index()).cloned().flatten() {
                    Some(value) if value == lit.is_positive() => {
                        satisfied = true;
                        break;
                    }
                    Some(_) => (),
                    None => {
                        open = Some(lit);
                        open_count += 1;
                    }
                }
            }
            if satisfied {
                continue;
            }
            match (open_count, open) {
                (0, _) => return (values, true),
                (1, Some(lit)) => {
                    if let Some(value) = values.get_mut(lit.index()) {
                        *value = Some(lit.is_positive());
                        changed = true;
                    }
                }
                _ => (),
            }
        }
        if !changed {
            return (values, false);
        }
    }
}

/// A base formula plus a stack of temporary constraints.
///
/// Every query opens a fresh backend session with the base and the current stack. Instances are
/// not shared between threads, parallel analyses create one per worker over the same
/// [`BaseFormula`].
pub struct IncrementalSolver {
    backend: Arc<dyn Backend>,
    base: Arc<BaseFormula>,
    stack: ConstraintStack,
}

impl IncrementalSolver {
    pub fn new(backend: Arc<dyn Backend>, base: Arc<BaseFormula>) -> IncrementalSolver {
        let stack = ConstraintStack::new(base.vars().clone(), base.clause_limit());
        IncrementalSolver {
            backend,
            base,
            stack,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn base(&self) -> &Arc<BaseFormula> {
        &self.base
    }

    pub fn stack(&self) -> &ConstraintStack {
        &self.stack
    }

    /// Number of pushed constraints.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Pushes a temporary constraint.
    ///
    /// Besides contradictions within the constraint itself, this also reports constraints
    /// falsified by the values the base formula fixes.
    pub fn push(&mut self, constraint: Constraint) -> Result<PushOutcome, StackError> {
        let outcome = self.stack.push(constraint)?;
        if outcome == PushOutcome::Applied {
            let contradicts_base = self.base.is_trivially_unsat()
                || self
                    .stack
                    .top()
                    .map_or(false, |entry| self.base.refutes(entry.formula()));
            if contradicts_base {
                return Ok(PushOutcome::ImmediatelyContradictory);
            }
        }
        Ok(outcome)
    }

    /// Pushes a single literal as temporary constraint.
    pub fn push_literal(&mut self, lit: Lit) -> Result<PushOutcome, StackError> {
        let node = self.base.vars().literal_node(lit)?;
        self.push(Constraint::new(node))
    }

    pub fn pop(&mut self) -> Result<Constraint, StackError> {
        self.stack.pop()
    }

    /// Starts a scope that pops everything pushed through it when dropped.
    pub fn scope(&mut self) -> SolverScope<'_> {
        let depth = self.stack.len();
        SolverScope {
            solver: self,
            depth,
        }
    }

    /// Checks whether the base and all pushed constraints are satisfiable together.
    pub fn is_satisfiable(&self) -> Result<SatResult, AnalysisError> {
        let (mut session, _) = self.open_session(SessionOptions::default())?;
        query_outcome(session.is_unsat())
    }

    /// Checks satisfiability and returns a model if there is one.
    pub fn solve(&self) -> Result<Solution, AnalysisError> {
        let options = SessionOptions {
            generate_models: true,
            ..SessionOptions::default()
        };
        let (mut session, _) = self.open_session(options)?;
        Ok(match query_outcome(session.is_unsat())? {
            SatResult::Sat => match session.model() {
                Some(model) => Solution::Sat(Assignment::from_model(&model, self.base.var_count())),
                None => Solution::Unknown,
            },
            SatResult::Unsat => Solution::Unsat,
            SatResult::Unknown => Solution::Unknown,
        })
    }

    /// A model of the base and all pushed constraints, `None` if unsatisfiable or unknown.
    pub fn find_model(&self) -> Result<Option<Assignment>, AnalysisError> {
        Ok(self.solve()?.into_model())
    }

    /// A minimal set of constraints whose conjunction is unsatisfiable.
    ///
    /// Considers the constraints of the base formula and the stack, the returned handles are the
    /// ones originally supplied. Returns `None` if everything is satisfiable together. Removing
    /// any single constraint from the result makes it satisfiable.
    pub fn minimal_unsatisfiable_subset(
        &self,
    ) -> Result<Option<FxHashSet<Constraint>>, AnalysisError> {
        const QUERY: &str = "unsatisfiable subset";

        let options = SessionOptions {
            generate_unsat_core: true,
            ..SessionOptions::default()
        };
        let (mut session, origins) = self.open_session(options)?;

        match query_outcome(session.is_unsat())? {
            SatResult::Sat => return Ok(None),
            SatResult::Unknown => return Err(AnalysisError::Inconclusive { query: QUERY }),
            SatResult::Unsat => (),
        }

        let mut core = session
            .unsat_core()
            .ok_or(AnalysisError::Inconclusive { query: QUERY })?;

        // Deletion based minimization. Every constraint before `position` is necessary.
        let mut position = 0;
        while position < core.len() {
            let mut candidate = core.clone();
            candidate.remove(position);
            match query_outcome(session.is_unsat_among(&candidate))? {
                SatResult::Unsat => core = candidate,
                SatResult::Sat => position += 1,
                SatResult::Unknown => return Err(AnalysisError::Inconclusive { query: QUERY }),
            }
        }

        Ok(Some(
            core.iter()
                .filter_map(|id| origins.get(id).cloned())
                .collect(),
        ))
    }

    /// Opens a session containing the base and the stack.
    ///
    /// Returns the session together with the constraint each added formula originates from.
    pub(crate) fn open_session(
        &self,
        options: SessionOptions,
    ) -> Result<(Box<dyn Session + '_>, FxHashMap<FormulaId, Constraint>), AnalysisError> {
        let mut session = self
            .backend
            .open(self.base.var_count(), options)
            .map_err(|err| AnalysisError::Unavailable {
                reason: err.to_string(),
            })?;

        let mut origins = FxHashMap::default();
        for (constraint, formula) in self.base.constraints().iter().zip(self.base.formulas()) {
            let id = session.add_constraint(formula);
            origins.insert(id, constraint.clone());
        }
        for entry in self.stack.entries() {
            let id = session.add_constraint(entry.formula());
            origins.insert(id, entry.source().clone());
        }

        Ok((session, origins))
    }
}

/// Maps a backend answer to a query result.
///
/// Only an unavailable backend is an error, everything else just leaves the query unanswered.
pub(crate) fn query_outcome(result: Result<bool, BackendError>) -> Result<SatResult, AnalysisError> {
    match result {
        Ok(true) => Ok(SatResult::Unsat),
        Ok(false) => Ok(SatResult::Sat),
        Err(BackendError::Unavailable { reason }) => Err(AnalysisError::Unavailable { reason }),
        Err(err) => {
            debug!("Query without result: {}", err);
            Ok(SatResult::Unknown)
        }
    }
}

/// A solver that pops back to its starting depth when dropped.
///
/// Dereferences to the [`IncrementalSolver`], so constraints can be pushed and queries made
/// through the scope.
pub struct SolverScope<'a> {
    solver: &'a mut IncrementalSolver,
    depth: usize,
}

impl<'a> SolverScope<'a> {
    /// Depth of the stack when the scope was entered.
    pub fn start_depth(&self) -> usize {
        self.depth
    }
}

impl<'a> Deref for SolverScope<'a> {
    type Target = IncrementalSolver;

    fn deref(&self) -> &IncrementalSolver {
        &*self.solver
    }
}

impl<'a> DerefMut for SolverScope<'a> {
    fn deref_mut(&mut self) -> &mut IncrementalSolver {
        &mut *self.solver
    }
}

impl<'a> Drop for SolverScope<'a> {
    fn drop(&mut self) {
        if let Err(err) = self.solver.stack.truncate(self.depth) {
            error!("Leaving solver scope: {}", err);
            if !std::thread::panicking() {
                debug_assert!(false, "{}", err);
            }
        }
    }
}
