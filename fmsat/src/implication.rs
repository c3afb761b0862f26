//! Detection of implied literals.
//!
//! A pair `(a, b)` is implied when every model of the base formula that makes `a` true also makes
//! `b` true. For a feature model the pairs `(parent, child)` of optional children identify the
//! false-optional features: children that are selected whenever their parent is.
use std::{fmt, sync::Arc, thread};

use log::{debug, info, trace, warn};

use fmsat_formula::Lit;

use crate::backend::Backend;
use crate::cache::{ModelCache, MAX_SOLUTION_BUFFER};
use crate::monitor::Monitor;
use crate::solver::{AnalysisError, BaseFormula, IncrementalSolver, Solution};
use crate::stack::PushOutcome;

/// A candidate implication `forcing => forced`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LiteralPair {
    pub forcing: Lit,
    pub forced: Lit,
}

impl LiteralPair {
    pub fn new(forcing: Lit, forced: Lit) -> LiteralPair {
        LiteralPair { forcing, forced }
    }

    /// Creates a pair from 1-based signed integers.
    pub fn from_dimacs(forcing: isize, forced: isize) -> LiteralPair {
        LiteralPair::new(Lit::from_dimacs(forcing), Lit::from_dimacs(forced))
    }
}

impl fmt::Display for LiteralPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} => {}", self.forcing, self.forced)
    }
}

/// Outcome of checking a single pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Verdict {
    Implied,
    Refuted,
    Unknown,
}

/// Checks candidate implications against the base formula of an [`IncrementalSolver`].
///
/// Pairs are tested in input order. Models found while refuting pairs are kept in a bounded
/// [`ModelCache`] and let later pairs be refuted without a query.
pub struct ImplicationChecker<'a> {
    solver: &'a mut IncrementalSolver,
    solution_buffer: usize,
}

impl<'a> ImplicationChecker<'a> {
    pub fn new(solver: &'a mut IncrementalSolver) -> ImplicationChecker<'a> {
        ImplicationChecker {
            solver,
            solution_buffer: MAX_SOLUTION_BUFFER,
        }
    }

    /// Sets the maximal number of cached models.
    pub fn with_solution_buffer(mut self, solution_buffer: usize) -> ImplicationChecker<'a> {
        self.solution_buffer = solution_buffer;
        self
    }

    /// Returns the pairs that are implied by the base formula and the current stack.
    ///
    /// Pairs whose check was inconclusive are left out, as are all pairs after a cancellation
    /// request. An empty or inconclusive base yields no pairs. The stack depth is the same before
    /// and after the call.
    pub fn analyze(
        &mut self,
        pairs: &[LiteralPair],
        monitor: &dyn Monitor,
    ) -> Result<Vec<LiteralPair>, AnalysisError> {
        let mut implied = vec![];
        if pairs.is_empty() || monitor.is_canceled() {
            return Ok(implied);
        }

        let mut cache = ModelCache::for_requests(pairs.len(), self.solution_buffer);
        match self.solver.find_model()? {
            Some(model) => cache.add(model),
            None => {
                info!("Base formula has no model, skipping implication analysis");
                return Ok(implied);
            }
        }

        let depth = self.solver.depth();
        let mut tested = 0;
        let mut skipped = 0;
        let mut unknown = 0;

        for &pair in pairs.iter() {
            if monitor.is_canceled() {
                info!(
                    "Implication analysis canceled after {} of {} pairs",
                    tested + skipped,
                    pairs.len()
                );
                break;
            }
            if cache.refutes(pair) {
                trace!("{} refuted by a cached model", pair);
                skipped += 1;
                continue;
            }

            tested += 1;
            match self.check_pair(pair, &mut cache)? {
                Verdict::Implied => {
                    debug!("{} is implied", pair);
                    implied.push(pair);
                }
                Verdict::Refuted => trace!("{} refuted", pair),
                Verdict::Unknown => unknown += 1,
            }
            debug_assert_eq!(self.solver.depth(), depth);
        }

        info!(
            "Implication analysis: {} pairs, {} queried, {} refuted by cache, {} inconclusive, {} implied",
            pairs.len(),
            tested,
            skipped,
            unknown,
            implied.len()
        );
        Ok(implied)
    }

    fn check_pair(
        &mut self,
        pair: LiteralPair,
        cache: &mut ModelCache,
    ) -> Result<Verdict, AnalysisError> {
        let mut scope = self.solver.scope();

        for &lit in [pair.forcing, !pair.forced].iter() {
            match scope.push_literal(lit) {
                Ok(PushOutcome::Applied) => (),
                Ok(PushOutcome::ImmediatelyContradictory) => return Ok(Verdict::Implied),
                Err(err) => {
                    warn!("Skipping {}: {}", pair, err);
                    return Ok(Verdict::Unknown);
                }
            }
        }

        Ok(match scope.solve()? {
            Solution::Unsat => Verdict::Implied,
            Solution::Unknown => Verdict::Unknown,
            Solution::Sat(model) => {
                cache.add(model);
                Verdict::Refuted
            }
        })
    }
}

/// Runs the implication analysis on several threads.
///
/// The pairs are split into contiguous chunks, one per thread. Each thread owns an independent
/// [`IncrementalSolver`] over the shared base formula. The result lists the implied pairs in input
/// order. The first error of any thread is returned.
pub fn analyze_parallel(
    backend: &Arc<dyn Backend>,
    base: &Arc<BaseFormula>,
    pairs: &[LiteralPair],
    threads: usize,
    solution_buffer: usize,
    monitor: &dyn Monitor,
) -> Result<Vec<LiteralPair>, AnalysisError> {
    let threads = threads.max(1);
    if threads == 1 || pairs.len() < 2 {
        let mut solver = IncrementalSolver::new(backend.clone(), base.clone());
        return ImplicationChecker::new(&mut solver)
            .with_solution_buffer(solution_buffer)
            .analyze(pairs, monitor);
    }

    let chunk_size = (pairs.len() + threads - 1) / threads;
    debug!(
        "Checking {} pairs on {} threads",
        pairs.len(),
        (pairs.len() + chunk_size - 1) / chunk_size
    );

    let results: Vec<Result<Vec<LiteralPair>, AnalysisError>> = thread::scope(|scope| {
        let handles: Vec<_> = pairs
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    let mut solver = IncrementalSolver::new(backend.clone(), base.clone());
                    ImplicationChecker::new(&mut solver)
                        .with_solution_buffer(solution_buffer)
                        .analyze(chunk, monitor)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    });

    let mut implied = vec![];
    for result in results {
        implied.extend(result?);
    }
    Ok(implied)
}
