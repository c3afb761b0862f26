//! Identity-comparable constraints.
use std::{fmt, hash, sync::Arc};

use crate::node::Node;

/// A shared handle to a formula that compares by identity.
///
/// Two constraints are equal only if they are clones of the same handle, even when their
/// formulas are structurally equal. This allows the solver layer to refer back to the exact
/// constraint a caller supplied without copying it.
#[derive(Clone)]
pub struct Constraint {
    node: Arc<Node>,
}

impl Constraint {
    pub fn new(node: Node) -> Constraint {
        Constraint {
            node: Arc::new(node),
        }
    }

    /// The formula of this constraint.
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl From<Node> for Constraint {
    fn from(node: Node) -> Constraint {
        Constraint::new(node)
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Constraint) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Constraint {}

impl hash::Hash for Constraint {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.node) as usize).hash(state)
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Constraint({})", self.node)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;

    #[test]
    fn identity_not_structure() {
        let a = Constraint::new(Node::var("A"));
        let b = Constraint::new(Node::var("A"));

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.node(), b.node());

        let set: FxHashSet<Constraint> = vec![a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
