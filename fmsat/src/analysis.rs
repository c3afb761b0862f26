//! Analyses of a feature model.
use std::sync::Arc;

use log::info;
use rustc_hash::{FxHashMap, FxHashSet};

use fmsat_formula::Constraint;

use crate::backend::Backend;
use crate::config::AnalysisConfig;
use crate::count::{self, ConfigurationCount};
use crate::enumerate::{ConfigurationEnumerator, ConfigurationSink, EnumerationSummary};
use crate::implication::{analyze_parallel, ImplicationChecker, LiteralPair};
use crate::model::{FeatureId, FeatureModel};
use crate::monitor::Monitor;
use crate::solver::{AnalysisError, BaseFormula, IncrementalSolver};

/// A feature model together with its translated base formula.
///
/// Every analysis starts from a fresh [`IncrementalSolver`] over the shared base formula.
pub struct ModelAnalysis<'a> {
    model: &'a FeatureModel,
    base: Arc<BaseFormula>,
    backend: Arc<dyn Backend>,
    config: AnalysisConfig,
}

impl<'a> ModelAnalysis<'a> {
    pub fn new(
        model: &'a FeatureModel,
        backend: Arc<dyn Backend>,
        config: AnalysisConfig,
    ) -> Result<ModelAnalysis<'a>, AnalysisError> {
        let base = Arc::new(model.base_formula(config.clause_limit)?);
        Ok(ModelAnalysis {
            model,
            base,
            backend,
            config,
        })
    }

    pub fn model(&self) -> &FeatureModel {
        self.model
    }

    pub fn base(&self) -> &Arc<BaseFormula> {
        &self.base
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// A solver over the base formula with an empty stack.
    pub fn solver(&self) -> IncrementalSolver {
        IncrementalSolver::new(self.backend.clone(), self.base.clone())
    }

    /// Optional features that are selected whenever their parent is.
    pub fn false_optional_features(
        &self,
        monitor: &dyn Monitor,
    ) -> Result<Vec<FeatureId>, AnalysisError> {
        let candidates: FxHashMap<LiteralPair, FeatureId> = self
            .model
            .optional_children()
            .into_iter()
            .map(|(parent, child)| {
                let pair = LiteralPair::new(parent.var().positive(), child.var().positive());
                (pair, child)
            })
            .collect();
        let mut pairs: Vec<LiteralPair> = candidates.keys().cloned().collect();
        pairs.sort_by_key(|pair| pair.forced.index());

        let threads = self.config.worker_count();
        let implied = if threads > 1 {
            analyze_parallel(
                &self.backend,
                &self.base,
                &pairs,
                threads,
                self.config.solution_buffer,
                monitor,
            )?
        } else {
            let mut solver = self.solver();
            ImplicationChecker::new(&mut solver)
                .with_solution_buffer(self.config.solution_buffer)
                .analyze(&pairs, monitor)?
        };

        let features: Vec<FeatureId> = implied
            .iter()
            .filter_map(|pair| candidates.get(pair).cloned())
            .collect();
        info!(
            "Found {} false-optional features among {} optional features",
            features.len(),
            pairs.len()
        );
        Ok(features)
    }

    /// Constraints responsible for `pair` being implied.
    ///
    /// Returns a minimal set of constraints that together with `forcing` and `!forced` is
    /// unsatisfiable, or `None` when the pair is not implied. The assumed literals themselves are
    /// part of the set when they are needed.
    pub fn explain(
        &self,
        pair: LiteralPair,
    ) -> Result<Option<FxHashSet<Constraint>>, AnalysisError> {
        let mut solver = self.solver();
        let mut scope = solver.scope();
        scope.push_literal(pair.forcing)?;
        scope.push_literal(!pair.forced)?;
        scope.minimal_unsatisfiable_subset()
    }

    /// Number of valid configurations, counted up to the configured limit.
    pub fn count_configurations(
        &self,
        monitor: &dyn Monitor,
    ) -> Result<ConfigurationCount, AnalysisError> {
        let projection: Vec<_> = self
            .model
            .concrete_features()
            .map(|feature| feature.var())
            .collect();
        count::count_configurations(&self.solver(), &projection, self.config.count_limit, monitor)
    }

    /// Enumerates the valid configurations into `sink`, honoring the configured budget.
    pub fn enumerate(
        &self,
        sink: &mut dyn ConfigurationSink,
        monitor: &dyn Monitor,
    ) -> Result<EnumerationSummary, AnalysisError> {
        ConfigurationEnumerator::new(self.model, self.solver(), monitor)
            .with_target(self.config.target())
            .enumerate(sink)
    }
}
