//! Formula generators and helpers for tests.
use proptest::{prelude::*, *};

use crate::node::Node;
use crate::vars::VarMap;
use crate::CnfFormula;

/// A variable map with the names `x1` to `x{count}`.
pub fn numbered_vars(count: usize) -> VarMap {
    VarMap::from_names((1..=count).map(|index| format!("x{}", index)))
}

/// Generates formulas over the variables of [`numbered_vars`] up to the given nesting depth.
pub fn node_over(var_count: usize, depth: u32) -> impl Strategy<Value = Node> {
    let names: Vec<String> = (1..=var_count).map(|index| format!("x{}", index)).collect();
    let leaf = prop_oneof![
        4 => sample::select(names).prop_map(Node::Var),
        1 => bool::ANY.prop_map(Node::Const),
    ];
    leaf.prop_recursive(depth, 32, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|node| !node),
            collection::vec(inner.clone(), 0..4).prop_map(Node::And),
            collection::vec(inner.clone(), 0..4).prop_map(Node::Or),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.implies(b)),
            (inner.clone(), inner).prop_map(|(a, b)| a.equals(b)),
        ]
    })
}

/// Whether the full assignment, indexed by variable index, satisfies every clause.
pub fn cnf_is_satisfied(formula: &CnfFormula, assignment: &[bool]) -> bool {
    formula.iter().all(|clause| {
        clause
            .iter()
            .any(|lit| assignment[lit.index()] == lit.is_positive())
    })
}
