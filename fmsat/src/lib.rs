//! Satisfiability based analysis of feature models.
//!
//! A [`FeatureModel`] is translated into a [`BaseFormula`]. Analyses run queries against it
//! through an [`IncrementalSolver`], which keeps additional constraints on a
//! [`ConstraintStack`] and opens a fresh session of a satisfiability [`Backend`] per query.
//!
//! On top of that this crate provides:
//!
//! * detection of implied literals and false-optional features ([`ImplicationChecker`]),
//! * bounded counting of configurations ([`count_configurations`]),
//! * enumeration of all valid configurations ([`ConfigurationEnumerator`]),
//! * a bounded buffer handing configurations to parallel build workers
//!   ([`ConfigurationScheduler`], [`ConfigurationBuilder`]).

pub mod analysis;
pub mod assignment;
pub mod backend;
pub mod builder;
pub mod cache;
pub mod config;
pub mod configuration;
pub mod count;
pub mod enumerate;
pub mod implication;
pub mod model;
pub mod monitor;
pub mod sample;
pub mod schedule;
pub mod solver;
pub mod stack;

#[cfg(test)]
mod test;

pub use analysis::ModelAnalysis;
pub use assignment::Assignment;
pub use backend::{Backend, BackendError, Session, SessionOptions, VarisatBackend};
pub use builder::{BuildSource, BuildWorker, ConfigurationBuilder};
pub use cache::ModelCache;
pub use config::{AnalysisConfig, AnalysisConfigUpdate, BuildOrder};
pub use configuration::BuilderConfiguration;
pub use count::{count_configurations, ConfigurationCount};
pub use enumerate::{ConfigurationEnumerator, ConfigurationSink, EnumerationSummary};
pub use implication::{analyze_parallel, ImplicationChecker, LiteralPair};
pub use model::{Feature, FeatureId, FeatureModel, GroupType, ModelError};
pub use monitor::{CancelFlag, Monitor, NeverCancel};
pub use sample::{read_solutions, translate_solutions, Sample};
pub use schedule::{BuildProgress, ConfigurationScheduler, Fetch, OrderingPolicy};
pub use solver::{AnalysisError, BaseFormula, IncrementalSolver, SatResult, Solution, SolverScope};
pub use stack::{ConstraintStack, PushOutcome, StackError};

pub use fmsat_formula::{Constraint, Lit, Node, TranslationError, Var, VarMap};
