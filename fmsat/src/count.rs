//! Counting of projected models.
use log::info;

use fmsat_formula::{CnfFormula, ExtendFormula, Var};

use crate::assignment::Assignment;
use crate::backend::SessionOptions;
use crate::monitor::Monitor;
use crate::solver::{query_outcome, AnalysisError, IncrementalSolver, SatResult};

/// Result of a bounded model count.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigurationCount {
    Exact(u64),
    /// Counting stopped early because of the limit, an inconclusive query or cancellation.
    AtLeast(u64),
}

impl ConfigurationCount {
    pub fn value(self) -> u64 {
        match self {
            ConfigurationCount::Exact(count) | ConfigurationCount::AtLeast(count) => count,
        }
    }

    pub fn is_exact(self) -> bool {
        match self {
            ConfigurationCount::Exact(_) => true,
            ConfigurationCount::AtLeast(_) => false,
        }
    }
}

/// Counts the assignments of `projection` that extend to a model, up to `limit`.
///
/// Runs in a single backend session holding the base and the current stack. Every model found is
/// excluded by a blocking clause over the projection, which is added to that session only. The
/// solver's stack is not modified.
pub fn count_configurations(
    solver: &IncrementalSolver,
    projection: &[Var],
    limit: u64,
    monitor: &dyn Monitor,
) -> Result<ConfigurationCount, AnalysisError> {
    let options = SessionOptions {
        generate_models: true,
        ..SessionOptions::default()
    };
    let (mut session, _) = solver.open_session(options)?;
    let var_count = solver.base().var_count();
    let mut blocking = Vec::with_capacity(projection.len());
    let mut count = 0;

    let result = loop {
        if count >= limit || monitor.is_canceled() {
            break ConfigurationCount::AtLeast(count);
        }
        match query_outcome(session.is_unsat())? {
            SatResult::Sat => (),
            SatResult::Unsat => break ConfigurationCount::Exact(count),
            SatResult::Unknown => break ConfigurationCount::AtLeast(count),
        }
        let model = match session.model() {
            Some(model) => Assignment::from_model(&model, var_count),
            None => break ConfigurationCount::AtLeast(count),
        };
        count += 1;

        blocking.clear();
        for &var in projection.iter() {
            let value = model.value(var).unwrap_or(false);
            blocking.push(var.lit(!value));
        }
        let mut formula = CnfFormula::new();
        formula.add_clause(&blocking);
        session.add_constraint(&formula);
    };

    info!("Counted {:?} configurations", result);
    Ok(result)
}
