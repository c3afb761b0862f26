//! Test doubles and generators.
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use proptest::{prelude::*, *};

use fmsat_formula::{CnfFormula, Lit, Node};

use crate::backend::{
    Backend, BackendError, FormulaId, Session, SessionOptions, VarisatSession,
};
use crate::model::{FeatureModel, GroupType};

/// What a [`ScriptedBackend`] does for one satisfiability check.
#[derive(Clone, Debug)]
pub enum ScriptedStep {
    /// Solve with varisat.
    Solve,
    Fail(BackendError),
}

/// A backend that fails selected checks and solves the others with varisat.
///
/// Steps are consumed in order by the checks of all sessions. Once the script is exhausted every
/// check is solved.
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<ScriptedStep>>,
    unavailable: bool,
    queries: AtomicUsize,
    sessions: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptedStep>) -> ScriptedBackend {
        ScriptedBackend {
            steps: Mutex::new(steps.into()),
            unavailable: false,
            queries: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
        }
    }

    /// A backend that cannot open sessions.
    pub fn unavailable() -> ScriptedBackend {
        ScriptedBackend {
            unavailable: true,
            ..ScriptedBackend::new(vec![])
        }
    }

    /// Number of satisfiability checks so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of sessions opened so far.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> ScriptedStep {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.steps.lock().pop_front().unwrap_or(ScriptedStep::Solve)
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(
        &self,
        var_count: usize,
        options: SessionOptions,
    ) -> Result<Box<dyn Session + '_>, BackendError> {
        if self.unavailable {
            return Err(BackendError::Unavailable {
                reason: "scripted".to_owned(),
            });
        }
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            backend: self,
            inner: VarisatSession::new(var_count, options),
        }))
    }
}

struct ScriptedSession<'a> {
    backend: &'a ScriptedBackend,
    inner: VarisatSession,
}

impl<'a> Session for ScriptedSession<'a> {
    fn add_constraint(&mut self, formula: &CnfFormula) -> FormulaId {
        self.inner.add_constraint(formula)
    }

    fn is_unsat(&mut self) -> Result<bool, BackendError> {
        match self.backend.next_step() {
            ScriptedStep::Solve => self.inner.is_unsat(),
            ScriptedStep::Fail(err) => Err(err),
        }
    }

    fn is_unsat_among(&mut self, active: &[FormulaId]) -> Result<bool, BackendError> {
        match self.backend.next_step() {
            ScriptedStep::Solve => self.inner.is_unsat_among(active),
            ScriptedStep::Fail(err) => Err(err),
        }
    }

    fn model(&self) -> Option<Vec<Lit>> {
        self.inner.model()
    }

    fn unsat_core(&self) -> Option<Vec<FormulaId>> {
        self.inner.unsat_core()
    }
}

/// Generates feature models with the given number of features and cross-tree constraints.
///
/// Features are named `f0`, `f1`, ... with `f0` as root. Cross-tree constraints are implications
/// between two literals.
pub fn feature_model(
    features: impl Strategy<Value = usize>,
    constraints: impl Strategy<Value = usize>,
) -> impl Strategy<Value = FeatureModel> {
    (features, constraints).prop_flat_map(|(features, constraints)| {
        let features = features.max(1);
        (
            collection::vec(any::<sample::Index>(), features - 1),
            collection::vec(0..3u8, features),
            collection::vec(bool::ANY, features),
            collection::vec(bool::ANY, features),
            collection::vec(
                (
                    any::<sample::Index>(),
                    bool::ANY,
                    any::<sample::Index>(),
                    bool::ANY,
                ),
                constraints,
            ),
        )
            .prop_map(move |(parents, groups, mandatory, abstracts, cross)| {
                build_model(features, &parents, &groups, &mandatory, &abstracts, &cross)
            })
    })
}

fn build_model(
    features: usize,
    parents: &[sample::Index],
    groups: &[u8],
    mandatory: &[bool],
    abstracts: &[bool],
    cross: &[(sample::Index, bool, sample::Index, bool)],
) -> FeatureModel {
    let mut model = FeatureModel::new("f0");
    let mut ids = vec![model.root()];
    for index in 1..features {
        let parent = ids[parents[index - 1].index(index)];
        let id = model.add_feature(parent, format!("f{}", index)).unwrap();
        ids.push(id);
    }
    for (index, &id) in ids.iter().enumerate() {
        let group = match groups[index] {
            0 => GroupType::And,
            1 => GroupType::Or,
            _ => GroupType::Alternative,
        };
        model.set_group(id, group);
        model.set_mandatory(id, mandatory[index]);
        model.set_abstract(id, abstracts[index]);
    }
    for (a, a_polarity, b, b_polarity) in cross.iter() {
        let a = Node::literal(format!("f{}", a.index(features)), *a_polarity);
        let b = Node::literal(format!("f{}", b.index(features)), *b_polarity);
        model.add_constraint(a.implies(b)).unwrap();
    }
    model
}

/// All valid configurations of the model by exhaustive search, projected onto the concrete
/// features.
pub fn valid_configurations(model: &FeatureModel) -> BTreeSet<BTreeSet<String>> {
    let mut constraints = model.tree_constraints();
    constraints.extend(model.constraints().iter().cloned());

    let names: Vec<&str> = model.features().map(|(_, feature)| feature.name()).collect();
    let mut configurations = BTreeSet::new();

    for bits in 0..1u64 << names.len() {
        let mut value = |name: &str| {
            let index = names.iter().position(|&n| n == name).unwrap();
            bits & (1 << index) != 0
        };
        if constraints
            .iter()
            .all(|constraint| constraint.node().eval(&mut value))
        {
            configurations.insert(
                model
                    .concrete_features()
                    .filter(|id| bits & (1 << id.index()) != 0)
                    .map(|id| model.name(id).to_owned())
                    .collect(),
            );
        }
    }
    configurations
}
