//! Feature models.
use rustc_hash::FxHashMap;
use thiserror::Error;

use fmsat_formula::{Constraint, Node, TranslationError, Var, VarMap};

use crate::solver::BaseFormula;

/// Possible errors while building a feature model.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Duplicate feature '{}'", name)]
    DuplicateFeature { name: String },
    #[error("Unknown feature '{}'", name)]
    UnknownFeature { name: String },
    #[error("The model already has the root feature '{}'", root)]
    RootPresent { root: String },
}

/// Index of a feature within its [`FeatureModel`].
///
/// Also the index of the feature's solver variable.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FeatureId(usize);

impl FeatureId {
    pub fn index(self) -> usize {
        self.0
    }

    pub fn var(self) -> Var {
        Var::from_index(self.0)
    }
}

/// How the children of a feature are combined.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GroupType {
    /// Children are independent. Mandatory children are selected with their parent.
    And,
    /// At least one child is selected with the parent.
    Or,
    /// Exactly one child is selected with the parent.
    Alternative,
}

#[derive(Clone, Debug)]
pub struct Feature {
    name: String,
    parent: Option<FeatureId>,
    children: Vec<FeatureId>,
    group: GroupType,
    mandatory: bool,
    concrete: bool,
}

impl Feature {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<FeatureId> {
        self.parent
    }

    pub fn children(&self) -> &[FeatureId] {
        &self.children
    }

    /// Group type of the children.
    pub fn group(&self) -> GroupType {
        self.group
    }

    /// Only meaningful for children of an AND group.
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Concrete features are the ones that make up a product. Abstract features only structure
    /// the model.
    pub fn is_concrete(&self) -> bool {
        self.concrete
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A tree of features plus cross-tree constraints.
///
/// Features are identified by unique names. New features are optional, concrete and have an AND
/// group.
#[derive(Clone, Debug)]
pub struct FeatureModel {
    features: Vec<Feature>,
    ids: FxHashMap<String, FeatureId>,
    constraints: Vec<Constraint>,
}

impl FeatureModel {
    /// Creates a model consisting of the root feature.
    pub fn new(root: impl Into<String>) -> FeatureModel {
        let mut model = FeatureModel {
            features: vec![],
            ids: FxHashMap::default(),
            constraints: vec![],
        };
        model.insert(root.into(), None);
        model
    }

    fn insert(&mut self, name: String, parent: Option<FeatureId>) -> FeatureId {
        let id = FeatureId(self.features.len());
        self.ids.insert(name.clone(), id);
        self.features.push(Feature {
            name,
            parent,
            children: vec![],
            group: GroupType::And,
            mandatory: false,
            concrete: true,
        });
        if let Some(parent) = parent {
            self.features[parent.0].children.push(id);
        }
        id
    }

    pub fn root(&self) -> FeatureId {
        FeatureId(0)
    }

    /// Adds an optional concrete child.
    pub fn add_feature(
        &mut self,
        parent: FeatureId,
        name: impl Into<String>,
    ) -> Result<FeatureId, ModelError> {
        let name = name.into();
        if self.ids.contains_key(&name) {
            return Err(if name == self.features[0].name {
                ModelError::RootPresent { root: name }
            } else {
                ModelError::DuplicateFeature { name }
            });
        }
        Ok(self.insert(name, Some(parent)))
    }

    /// Adds a mandatory concrete child.
    pub fn add_mandatory(
        &mut self,
        parent: FeatureId,
        name: impl Into<String>,
    ) -> Result<FeatureId, ModelError> {
        let id = self.add_feature(parent, name)?;
        self.set_mandatory(id, true);
        Ok(id)
    }

    pub fn set_group(&mut self, feature: FeatureId, group: GroupType) {
        self.features[feature.0].group = group;
    }

    pub fn set_mandatory(&mut self, feature: FeatureId, mandatory: bool) {
        self.features[feature.0].mandatory = mandatory;
    }

    pub fn set_abstract(&mut self, feature: FeatureId, is_abstract: bool) {
        self.features[feature.0].concrete = !is_abstract;
    }

    /// Adds a cross-tree constraint.
    ///
    /// Fails if the constraint mentions a feature not in the model.
    pub fn add_constraint(&mut self, node: Node) -> Result<Constraint, ModelError> {
        let unknown = node
            .variables()
            .into_iter()
            .find(|name| !self.ids.contains_key(*name))
            .map(str::to_owned);
        if let Some(name) = unknown {
            return Err(ModelError::UnknownFeature { name });
        }
        let constraint = Constraint::new(node);
        self.constraints.push(constraint.clone());
        Ok(constraint)
    }

    pub fn feature(&self, id: FeatureId) -> &Feature {
        &self.features[id.0]
    }

    pub fn id(&self, name: &str) -> Option<FeatureId> {
        self.ids.get(name).cloned()
    }

    /// Looks up a feature by name.
    pub fn require(&self, name: &str) -> Result<FeatureId, ModelError> {
        self.id(name).ok_or_else(|| ModelError::UnknownFeature {
            name: name.to_owned(),
        })
    }

    pub fn name(&self, id: FeatureId) -> &str {
        &self.features[id.0].name
    }

    /// All features in insertion order, i.e. parents before children.
    pub fn features(&self) -> impl Iterator<Item = (FeatureId, &Feature)> {
        self.features
            .iter()
            .enumerate()
            .map(|(index, feature)| (FeatureId(index), feature))
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Always false, a model has at least the root feature.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The cross-tree constraints.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has_cross_tree_constraints(&self) -> bool {
        !self.constraints.is_empty()
    }

    pub fn concrete_features(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.features()
            .filter(|(_, feature)| feature.is_concrete())
            .map(|(id, _)| id)
    }

    /// Name of a concrete feature given its variable.
    pub fn concrete_name(&self, var: Var) -> Option<&str> {
        self.features
            .get(var.index())
            .filter(|feature| feature.is_concrete())
            .map(|feature| feature.name())
    }

    /// Solver variables of the features, indexed like the features.
    pub fn var_map(&self) -> VarMap {
        VarMap::from_names(self.features.iter().map(|feature| feature.name.clone()))
    }

    /// The constraints expressing the tree structure.
    ///
    /// One constraint per rule: the root is selected, every feature implies its parent, AND
    /// groups require their mandatory children, OR groups at least one child and ALTERNATIVE
    /// groups exactly one child.
    pub fn tree_constraints(&self) -> Vec<Constraint> {
        let mut constraints = vec![Constraint::new(Node::var(self.name(self.root())))];

        for feature in self.features.iter() {
            let this = Node::var(feature.name());
            if let Some(parent) = feature.parent {
                constraints.push(Constraint::new(
                    this.clone().implies(Node::var(self.name(parent))),
                ));
            }
            if feature.is_leaf() {
                continue;
            }

            let children: Vec<Node> = feature
                .children
                .iter()
                .map(|&child| Node::var(self.name(child)))
                .collect();

            match feature.group {
                GroupType::And => {
                    for (&child, node) in feature.children.iter().zip(children) {
                        if self.feature(child).is_mandatory() {
                            constraints.push(Constraint::new(this.clone().implies(node)));
                        }
                    }
                }
                GroupType::Or => {
                    constraints.push(Constraint::new(this.implies(Node::or(children))));
                }
                GroupType::Alternative => {
                    constraints.push(Constraint::new(
                        this.implies(Node::or(children.iter().cloned())),
                    ));
                    if children.len() > 1 {
                        constraints.push(Constraint::new(Node::at_most_one(&children)));
                    }
                }
            }
        }
        constraints
    }

    /// Tree and cross-tree constraints translated for the solver.
    pub fn base_formula(&self, clause_limit: usize) -> Result<BaseFormula, TranslationError> {
        let mut constraints = self.tree_constraints();
        constraints.extend(self.constraints.iter().cloned());
        BaseFormula::with_clause_limit(self.var_map(), constraints, clause_limit)
    }

    /// Whether the feature is concrete or has a concrete descendant.
    pub fn is_relevant(&self, id: FeatureId) -> bool {
        let feature = self.feature(id);
        feature.is_concrete()
            || feature
                .children
                .iter()
                .any(|&child| self.is_relevant(child))
    }

    /// Children that influence the concrete selection.
    pub fn relevant_children(&self, id: FeatureId) -> Vec<FeatureId> {
        self.feature(id)
            .children
            .iter()
            .cloned()
            .filter(|&child| self.is_relevant(child))
            .collect()
    }

    /// Candidate false-optional features as `(parent, child)` pairs.
    ///
    /// These are the optional children of AND groups. Children of OR and ALTERNATIVE groups are
    /// never mandatory by declaration.
    pub fn optional_children(&self) -> Vec<(FeatureId, FeatureId)> {
        self.features()
            .filter(|(_, feature)| feature.group == GroupType::And)
            .flat_map(|(id, feature)| {
                feature
                    .children
                    .iter()
                    .filter(move |&&child| !self.feature(child).is_mandatory())
                    .map(move |&child| (id, child))
            })
            .collect()
    }
}
