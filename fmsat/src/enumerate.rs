//! Enumeration of valid configurations by walking the feature tree.
//!
//! The enumerator keeps a frontier of features whose children still have to be decided. For the
//! first feature of the frontier it branches over the possible child selections of its group:
//!
//! * AND: mandatory children are always added, every subset of the optional children is a branch.
//! * OR: every non-empty subset of the children is a branch.
//! * ALTERNATIVE: every single child is a branch.
//!
//! Only children that are concrete or have concrete descendants are considered. When such
//! relevant children were left out of an OR or ALTERNATIVE group, one more branch selects none
//! of the relevant children. An empty frontier completes a configuration, which is then
//! materialized by the solver and checked against the accumulated selection.
use std::collections::BTreeSet;

use log::{debug, info, trace, warn};
use rustc_hash::FxHashSet;

use fmsat_formula::{Constraint, Node};

use crate::configuration::BuilderConfiguration;
use crate::model::{FeatureId, FeatureModel, GroupType};
use crate::monitor::Monitor;
use crate::solver::{AnalysisError, IncrementalSolver, SatResult};
use crate::stack::PushOutcome;

/// Receiver of enumerated configurations.
pub trait ConfigurationSink {
    /// Takes a configuration. Returning `false` stops the enumeration.
    fn add_configuration(&mut self, configuration: BuilderConfiguration) -> bool;
}

impl ConfigurationSink for Vec<BuilderConfiguration> {
    fn add_configuration(&mut self, configuration: BuilderConfiguration) -> bool {
        self.push(configuration);
        true
    }
}

/// Statistics of an enumeration run.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct EnumerationSummary {
    /// Configurations handed to the sink.
    pub emitted: u64,
    /// Completed selections without matching model.
    pub discarded: u64,
    /// Completed selections equal to an earlier one.
    pub duplicates: u64,
    /// Branches cut by partial satisfiability checks.
    pub pruned: u64,
    /// The run was stopped by the monitor or the sink.
    pub canceled: bool,
    /// The run stopped at the target number of configurations.
    pub target_reached: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Enumerates the valid configurations of a feature model.
///
/// Configurations are sets of concrete features. Every configuration is emitted once, with ids
/// counting up from 1 in emission order.
pub struct ConfigurationEnumerator<'a> {
    model: &'a FeatureModel,
    solver: IncrementalSolver,
    monitor: &'a dyn Monitor,
    target: Option<u64>,
    next_id: u64,
    /// Selections emitted so far, one entry per emitted configuration.
    ///
    /// Different branches can complete with the same concrete selection when an abstract feature
    /// is selected without any of its concrete descendants.
    seen: FxHashSet<Vec<FeatureId>>,
    summary: EnumerationSummary,
}

impl<'a> ConfigurationEnumerator<'a> {
    /// Creates an enumerator using `solver`, which has to be set up with the model's base
    /// formula.
    pub fn new(
        model: &'a FeatureModel,
        solver: IncrementalSolver,
        monitor: &'a dyn Monitor,
    ) -> ConfigurationEnumerator<'a> {
        ConfigurationEnumerator {
            model,
            solver,
            monitor,
            target: None,
            next_id: 1,
            seen: FxHashSet::default(),
            summary: EnumerationSummary::default(),
        }
    }

    /// Stops after emitting `target` configurations.
    pub fn with_target(mut self, target: Option<u64>) -> ConfigurationEnumerator<'a> {
        self.target = target;
        self
    }

    pub fn enumerate(
        mut self,
        sink: &mut dyn ConfigurationSink,
    ) -> Result<EnumerationSummary, AnalysisError> {
        let root = self.model.root();
        self.expand(&[], &[root], sink)?;

        let summary = self.summary;
        info!(
            "Enumerated {} configurations ({} discarded, {} duplicates, {} branches pruned){}",
            summary.emitted,
            summary.discarded,
            summary.duplicates,
            summary.pruned,
            if summary.canceled { ", canceled" } else { "" }
        );
        Ok(summary)
    }

    fn target_reached(&self) -> bool {
        self.target.map_or(false, |target| self.summary.emitted >= target)
    }

    /// Decides the children of the first feature of the frontier.
    ///
    /// `selected` holds the concrete features selected so far. Both slices belong to the caller,
    /// every branch builds its own copies.
    fn expand(
        &mut self,
        selected: &[FeatureId],
        frontier: &[FeatureId],
        sink: &mut dyn ConfigurationSink,
    ) -> Result<Flow, AnalysisError> {
        if self.monitor.is_canceled() {
            self.summary.canceled = true;
            return Ok(Flow::Stop);
        }
        if self.target_reached() {
            self.summary.target_reached = true;
            return Ok(Flow::Stop);
        }
        if self.model.has_cross_tree_constraints() && !self.is_feasible(selected)? {
            self.summary.pruned += 1;
            return Ok(Flow::Continue);
        }

        let (current, rest) = match frontier.split_first() {
            Some((&current, rest)) => (current, rest),
            None => return self.complete(selected, sink),
        };

        let model = self.model;
        let feature = model.feature(current);
        let mut selected = selected.to_vec();
        if feature.is_concrete() {
            selected.push(current);
        }

        let children = model.relevant_children(current);
        if children.is_empty() {
            return self.expand(&selected, rest, sink);
        }
        let pruned_children = children.len() < feature.children().len();

        match feature.group() {
            GroupType::And => {
                let (mandatory, optional): (Vec<FeatureId>, Vec<FeatureId>) = children
                    .iter()
                    .cloned()
                    .partition(|&child| model.feature(child).is_mandatory());
                let tail: Vec<FeatureId> = rest.iter().chain(mandatory.iter()).cloned().collect();
                self.expand_subsets(&selected, &optional, true, &tail, sink)
            }
            GroupType::Or => {
                self.expand_subsets(&selected, &children, pruned_children, rest, sink)
            }
            GroupType::Alternative => {
                for &child in children.iter() {
                    let mut frontier = Vec::with_capacity(rest.len() + 1);
                    frontier.push(child);
                    frontier.extend_from_slice(rest);
                    if self.expand(&selected, &frontier, sink)? == Flow::Stop {
                        return Ok(Flow::Stop);
                    }
                }
                if pruned_children {
                    self.expand(&selected, rest, sink)
                } else {
                    Ok(Flow::Continue)
                }
            }
        }
    }

    /// Branches over the subsets of `choices`, each placed in front of `tail`.
    ///
    /// Subsets are produced one at a time, so a stop in any branch ends the walk regardless of
    /// the number of choices.
    fn expand_subsets(
        &mut self,
        selected: &[FeatureId],
        choices: &[FeatureId],
        include_empty: bool,
        tail: &[FeatureId],
        sink: &mut dyn ConfigurationSink,
    ) -> Result<Flow, AnalysisError> {
        let mut picked = Vec::with_capacity(choices.len() + tail.len());
        self.expand_subsets_from(selected, choices, include_empty, tail, &mut picked, sink)
    }

    /// Decides the first of `choices`, leaving it out before taking it.
    fn expand_subsets_from(
        &mut self,
        selected: &[FeatureId],
        choices: &[FeatureId],
        include_empty: bool,
        tail: &[FeatureId],
        picked: &mut Vec<FeatureId>,
        sink: &mut dyn ConfigurationSink,
    ) -> Result<Flow, AnalysisError> {
        let (&choice, remaining) = match choices.split_first() {
            Some(split) => split,
            None => {
                if picked.is_empty() && !include_empty {
                    return Ok(Flow::Continue);
                }
                let mut frontier = picked.clone();
                frontier.extend_from_slice(tail);
                return self.expand(selected, &frontier, sink);
            }
        };

        if self.expand_subsets_from(selected, remaining, include_empty, tail, picked, sink)?
            == Flow::Stop
        {
            return Ok(Flow::Stop);
        }
        picked.push(choice);
        let flow = self.expand_subsets_from(selected, remaining, include_empty, tail, picked, sink);
        picked.pop();
        flow
    }

    /// Whether the selected features are consistent with the base formula.
    ///
    /// Inconclusive checks never prune.
    fn is_feasible(&mut self, selected: &[FeatureId]) -> Result<bool, AnalysisError> {
        let model = self.model;
        let partial = Node::and(selected.iter().map(|&feature| Node::var(model.name(feature))));

        let mut scope = self.solver.scope();
        match scope.push(Constraint::new(partial)) {
            Ok(PushOutcome::Applied) => (),
            Ok(PushOutcome::ImmediatelyContradictory) => return Ok(false),
            Err(err) => {
                warn!("Abandoning branch: {}", err);
                return Ok(false);
            }
        }
        Ok(scope.is_satisfiable()? != SatResult::Unsat)
    }

    /// Materializes a completed selection and hands it to the sink.
    fn complete(
        &mut self,
        selected: &[FeatureId],
        sink: &mut dyn ConfigurationSink,
    ) -> Result<Flow, AnalysisError> {
        let model = self.model;
        let mut key = selected.to_vec();
        key.sort();
        key.dedup();

        if self.seen.contains(&key) {
            trace!("Skipping repeated selection {:?}", key);
            self.summary.duplicates += 1;
            return Ok(Flow::Continue);
        }

        let exact = Node::and(model.concrete_features().map(|feature| {
            Node::literal(model.name(feature), key.binary_search(&feature).is_ok())
        }));

        let assignment = {
            let mut scope = self.solver.scope();
            match scope.push(Constraint::new(exact)) {
                Ok(PushOutcome::Applied) => scope.find_model()?,
                Ok(PushOutcome::ImmediatelyContradictory) => None,
                Err(err) => {
                    warn!("Abandoning configuration: {}", err);
                    None
                }
            }
        };

        let matches = assignment.map_or(false, |assignment| {
            model.concrete_features().all(|feature| {
                assignment.value(feature.var()) == Some(key.binary_search(&feature).is_ok())
            })
        });
        if !matches {
            debug!("Discarding selection without matching model");
            self.summary.discarded += 1;
            return Ok(Flow::Continue);
        }

        let features: BTreeSet<String> = key
            .iter()
            .map(|&feature| model.name(feature).to_owned())
            .collect();
        self.seen.insert(key);

        let configuration = BuilderConfiguration::new(self.next_id, features);
        trace!("Emitting {}", configuration);
        self.next_id += 1;
        self.summary.emitted += 1;

        if !sink.add_configuration(configuration) {
            self.summary.canceled = true;
            return Ok(Flow::Stop);
        }
        if self.target_reached() {
            self.summary.target_reached = true;
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use proptest::prelude::*;

    use fmsat_formula::{cnf::DEFAULT_CLAUSE_LIMIT, feature};

    use crate::backend::VarisatBackend;
    use crate::monitor::{CancelFlag, NeverCancel};
    use crate::test::{feature_model, valid_configurations};

    fn enumerate(model: &FeatureModel) -> Vec<BuilderConfiguration> {
        let mut configurations = vec![];
        run(model, None, &NeverCancel, &mut configurations);
        configurations
    }

    fn run(
        model: &FeatureModel,
        target: Option<u64>,
        monitor: &dyn Monitor,
        sink: &mut dyn ConfigurationSink,
    ) -> EnumerationSummary {
        let base = Arc::new(model.base_formula(DEFAULT_CLAUSE_LIMIT).unwrap());
        let solver = IncrementalSolver::new(Arc::new(VarisatBackend), base);
        ConfigurationEnumerator::new(model, solver, monitor)
            .with_target(target)
            .enumerate(sink)
            .unwrap()
    }

    fn selections(configurations: &[BuilderConfiguration]) -> Vec<Vec<&str>> {
        let mut selections: Vec<Vec<&str>> = configurations
            .iter()
            .map(|configuration| {
                configuration
                    .features()
                    .iter()
                    .map(|name| name.as_str())
                    .collect()
            })
            .collect();
        selections.sort();
        selections
    }

    #[test]
    fn only_mandatory_features() {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        let a = model.add_mandatory(root, "A").unwrap();
        model.add_mandatory(a, "B").unwrap();
        model.add_mandatory(root, "C").unwrap();

        let configurations = enumerate(&model);
        assert_eq!(configurations.len(), 1);
        assert_eq!(selections(&configurations), vec![vec!["A", "B", "C", "Root"]]);
        assert_eq!(configurations[0].id(), 1);
    }

    #[test]
    fn alternative_group() {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        model.set_abstract(root, true);
        model.set_group(root, GroupType::Alternative);
        for name in ["A", "B", "C", "D"].iter() {
            model.add_feature(root, *name).unwrap();
        }

        let configurations = enumerate(&model);
        assert_eq!(
            selections(&configurations),
            vec![vec!["A"], vec!["B"], vec!["C"], vec!["D"]]
        );
        let ids: Vec<u64> = configurations.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn mandatory_and_optional() {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        model.set_abstract(root, true);
        model.add_mandatory(root, "A").unwrap();
        model.add_feature(root, "B").unwrap();

        assert_eq!(
            selections(&enumerate(&model)),
            vec![vec!["A"], vec!["A", "B"]]
        );
    }

    #[test]
    fn or_group_with_abstract_leaf() {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        model.set_abstract(root, true);
        model.set_group(root, GroupType::Or);
        model.add_feature(root, "A").unwrap();
        model.add_feature(root, "B").unwrap();
        let placeholder = model.add_feature(root, "Placeholder").unwrap();
        model.set_abstract(placeholder, true);

        assert_eq!(
            selections(&enumerate(&model)),
            vec![vec![], vec!["A"], vec!["A", "B"], vec!["B"]]
        );
    }

    #[test]
    fn cross_tree_constraints_prune() {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        model.set_abstract(root, true);
        model.add_feature(root, "A").unwrap();
        model.add_feature(root, "B").unwrap();
        model.add_feature(root, "C").unwrap();
        model.add_constraint(feature!("A").implies(feature!("B"))).unwrap();
        model
            .add_constraint(Node::or(vec![!feature!("B"), !feature!("C")]))
            .unwrap();

        let mut configurations = vec![];
        let summary = run(&model, None, &NeverCancel, &mut configurations);

        assert_eq!(
            selections(&configurations),
            vec![vec![], vec!["A", "B"], vec!["B"], vec!["C"]]
        );
        assert!(summary.pruned > 0);
    }

    #[test]
    fn target_and_cancellation() {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        for index in 0..4 {
            model.add_feature(root, format!("F{}", index)).unwrap();
        }

        let mut configurations = vec![];
        let summary = run(&model, Some(5), &NeverCancel, &mut configurations);
        assert_eq!(configurations.len(), 5);
        assert!(summary.target_reached);

        let flag = CancelFlag::new();
        flag.cancel();
        let mut configurations = vec![];
        let summary = run(&model, None, &flag, &mut configurations);
        assert!(configurations.is_empty());
        assert!(summary.canceled);
    }

    #[test]
    fn wide_group_stops_at_target() {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        for index in 0..70 {
            model.add_feature(root, format!("F{}", index)).unwrap();
        }

        let mut configurations = vec![];
        let summary = run(&model, Some(3), &NeverCancel, &mut configurations);

        assert_eq!(configurations.len(), 3);
        assert!(summary.target_reached);
        let ids: Vec<u64> = configurations.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn wide_group_can_be_canceled() {
        struct CancelAfter(usize, CancelFlag, Vec<BuilderConfiguration>);

        impl ConfigurationSink for CancelAfter {
            fn add_configuration(&mut self, configuration: BuilderConfiguration) -> bool {
                self.2.push(configuration);
                if self.2.len() >= self.0 {
                    self.1.cancel();
                }
                true
            }
        }

        let mut model = FeatureModel::new("Root");
        let root = model.root();
        model.set_abstract(root, true);
        model.set_group(root, GroupType::Or);
        for index in 0..64 {
            model.add_feature(root, format!("F{}", index)).unwrap();
        }

        let flag = CancelFlag::new();
        let mut sink = CancelAfter(4, flag.clone(), vec![]);
        let summary = run(&model, None, &flag, &mut sink);

        assert_eq!(sink.2.len(), 4);
        assert!(summary.canceled);
    }

    #[test]
    fn abstract_feature_without_descendants_repeats_selection() {
        let mut model = FeatureModel::new("Root");
        let root = model.root();
        model.set_abstract(root, true);
        let group = model.add_feature(root, "Group").unwrap();
        model.set_abstract(group, true);
        model.add_feature(group, "Leaf").unwrap();

        let mut configurations = vec![];
        let summary = run(&model, None, &NeverCancel, &mut configurations);

        assert_eq!(selections(&configurations), vec![vec![], vec!["Leaf"]]);
        assert_eq!(summary.duplicates, 1);
    }

    #[test]
    fn sink_can_stop() {
        struct Take(usize, Vec<BuilderConfiguration>);

        impl ConfigurationSink for Take {
            fn add_configuration(&mut self, configuration: BuilderConfiguration) -> bool {
                self.1.push(configuration);
                self.1.len() < self.0
            }
        }

        let mut model = FeatureModel::new("Root");
        let root = model.root();
        model.add_feature(root, "A").unwrap();
        model.add_feature(root, "B").unwrap();

        let mut sink = Take(2, vec![]);
        let summary = run(&model, None, &NeverCancel, &mut sink);
        assert_eq!(sink.1.len(), 2);
        assert!(summary.canceled);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn emits_each_valid_configuration_once(model in feature_model(1..8usize, 0..3usize)) {
            let configurations = enumerate(&model);

            let emitted: Vec<BTreeSet<String>> = configurations
                .iter()
                .map(|configuration| configuration.features().clone())
                .collect();
            let unique: BTreeSet<BTreeSet<String>> = emitted.iter().cloned().collect();
            prop_assert_eq!(unique.len(), emitted.len());
            prop_assert_eq!(unique, valid_configurations(&model));

            let again = enumerate(&model);
            prop_assert_eq!(configurations, again);
        }
    }
}
