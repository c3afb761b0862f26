//! Satisfiability backends.
//!
//! A [`Backend`] opens independent [`Session`]s. Each session receives the translated constraints
//! of one query and answers satisfiability, model and unsatisfiable core requests for them. The
//! rest of the crate only talks to these traits, so tests can substitute scripted backends.
use rustc_hash::FxHashMap;
use thiserror::Error;

use varisat::Solver;

use fmsat_formula::{CnfFormula, ExtendFormula, Lit, Var};

/// Identifies a constraint added to a [`Session`].
pub type FormulaId = usize;

/// Possible errors reported by a backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend cannot be constructed or configured. Queries will not succeed later on.
    #[error("Satisfiability backend unavailable: {}", reason)]
    Unavailable { reason: String },
    #[error("Satisfiability query timed out")]
    Timeout,
    #[error("Satisfiability query interrupted")]
    Interrupted,
    #[error("Satisfiability query failed: {}", reason)]
    Failed { reason: String },
}

impl BackendError {
    /// Whether the error aborts the whole analysis instead of only the current query.
    pub fn is_fatal(&self) -> bool {
        match self {
            BackendError::Unavailable { .. } => true,
            _ => false,
        }
    }
}

/// What a session needs to support besides satisfiability checks.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub generate_models: bool,
    pub generate_unsat_core: bool,
}

/// A single query context of a backend.
pub trait Session {
    /// Adds a constraint and returns an identifier for unsatisfiable cores.
    fn add_constraint(&mut self, formula: &CnfFormula) -> FormulaId;

    /// Checks whether the conjunction of all added constraints is unsatisfiable.
    fn is_unsat(&mut self) -> Result<bool, BackendError>;

    /// Checks whether the conjunction of the given subset of added constraints is unsatisfiable.
    ///
    /// Only available for sessions opened with [`SessionOptions::generate_unsat_core`].
    fn is_unsat_among(&mut self, active: &[FormulaId]) -> Result<bool, BackendError>;

    /// A model of the last satisfiable check.
    fn model(&self) -> Option<Vec<Lit>>;

    /// Constraints responsible for the last unsatisfiable check.
    ///
    /// The core is not guaranteed to be minimal.
    fn unsat_core(&self) -> Option<Vec<FormulaId>>;
}

/// Factory of sessions.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Opens a session over the first `var_count` variables.
    fn open(
        &self,
        var_count: usize,
        options: SessionOptions,
    ) -> Result<Box<dyn Session + '_>, BackendError>;
}

/// Backend using the varisat CDCL solver.
#[derive(Copy, Clone, Default, Debug)]
pub struct VarisatBackend;

impl Backend for VarisatBackend {
    fn name(&self) -> &str {
        "varisat"
    }

    fn open(
        &self,
        var_count: usize,
        options: SessionOptions,
    ) -> Result<Box<dyn Session + '_>, BackendError> {
        Ok(Box::new(VarisatSession::new(var_count, options)))
    }
}

/// A varisat solver instance.
///
/// When unsatisfiable cores are requested every constraint `C` gets a selector variable `s` past
/// the feature variables and is added as the clauses `¬s ∨ c` for each clause `c` of `C`.
/// Checks then assume the selectors of the active constraints and the solver's failed
/// assumptions identify the core.
pub struct VarisatSession {
    solver: Solver<'static>,
    var_count: usize,
    options: SessionOptions,
    /// Selector of each added constraint, `None` if the constraint has no clauses.
    selectors: Vec<Option<Lit>>,
    constraint_of_selector: FxHashMap<Var, FormulaId>,
    core: Option<Vec<FormulaId>>,
    clause_buf: Vec<Lit>,
}

impl VarisatSession {
    pub fn new(var_count: usize, options: SessionOptions) -> VarisatSession {
        VarisatSession {
            solver: Solver::new(),
            var_count,
            options,
            selectors: vec![],
            constraint_of_selector: FxHashMap::default(),
            core: None,
            clause_buf: vec![],
        }
    }

    fn solve_assuming(&mut self, assumptions: &[Lit]) -> Result<bool, BackendError> {
        self.core = None;
        self.solver.assume(assumptions);
        let sat = self.solver.solve().map_err(|err| BackendError::Failed {
            reason: err.to_string(),
        })?;
        if !sat && self.options.generate_unsat_core {
            let constraint_of_selector = &self.constraint_of_selector;
            self.core = self.solver.failed_core().map(|failed| {
                failed
                    .iter()
                    .filter_map(|lit| constraint_of_selector.get(&lit.var()).cloned())
                    .collect()
            });
        }
        Ok(!sat)
    }
}

impl Session for VarisatSession {
    fn add_constraint(&mut self, formula: &CnfFormula) -> FormulaId {
        debug_assert!(formula.var_count() <= self.var_count);
        let id = self.selectors.len();

        if !self.options.generate_unsat_core || formula.len() == 0 {
            self.solver.add_formula(formula);
            self.selectors.push(None);
            return id;
        }

        let selector = Var::from_index(self.var_count + self.constraint_of_selector.len());
        self.constraint_of_selector.insert(selector, id);
        self.selectors.push(Some(selector.positive()));

        for clause in formula.iter() {
            self.clause_buf.clear();
            self.clause_buf.push(selector.negative());
            self.clause_buf.extend_from_slice(clause);
            self.solver.add_clause(&self.clause_buf);
        }
        id
    }

    fn is_unsat(&mut self) -> Result<bool, BackendError> {
        let assumptions: Vec<Lit> = self.selectors.iter().flatten().cloned().collect();
        self.solve_assuming(&assumptions)
    }

    fn is_unsat_among(&mut self, active: &[FormulaId]) -> Result<bool, BackendError> {
        if !self.options.generate_unsat_core {
            return Err(BackendError::Failed {
                reason: "session was opened without unsatisfiable core support".to_owned(),
            });
        }
        let assumptions: Vec<Lit> = active
            .iter()
            .filter_map(|&id| self.selectors.get(id).cloned().flatten())
            .collect();
        self.solve_assuming(&assumptions)
    }

    fn model(&self) -> Option<Vec<Lit>> {
        let var_count = self.var_count;
        self.solver.model().map(|model| {
            model
                .into_iter()
                .filter(|lit| lit.index() < var_count)
                .collect()
        })
    }

    fn unsat_core(&self) -> Option<Vec<FormulaId>> {
        self.core.clone()
    }
}
