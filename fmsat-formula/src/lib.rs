//! Constraint formulas over named feature variables.
//!
//! Constraints are written as [`Node`] trees over feature names. A [`VarMap`] assigns each
//! feature a solver [`Var`] and a [`Translator`] turns nodes into [`CnfFormula`]s the
//! satisfiability backend understands.

/// Shortcut for tests
#[cfg(any(test, feature = "internal-testing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! lit {
    ($x:expr) => {
        $crate::Lit::from_dimacs($x)
    };
}

/// Shortcut for tests
#[cfg(any(test, feature = "internal-testing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! feature {
    ($x:expr) => {
        $crate::Node::var($x)
    };
}

/// Shortcut for tests
#[cfg(any(test, feature = "internal-testing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! var_map {
    ( $( $x:expr ),* ) => { $crate::VarMap::from_names(vec![ $( $x ),* ]) };
    ( $( $x:expr ),* , ) => { $crate::var_map![ $( $x ),* ] };
}

pub mod cnf;
pub mod constraint;
pub mod node;
pub mod vars;

#[cfg(any(test, feature = "internal-testing"))]
pub mod test;

pub use cnf::{to_cnf, TranslationError, Translator};
pub use constraint::Constraint;
pub use node::Node;
pub use vars::VarMap;

pub use varisat_formula::{CnfFormula, ExtendFormula, Lit, Var};
