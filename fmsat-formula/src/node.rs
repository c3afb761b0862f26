//! Propositional formulas over feature names.
use std::{fmt, ops};

/// A propositional formula over named feature variables.
///
/// Nodes are plain values. Use [`Constraint`](crate::Constraint) when a formula needs an identity
/// that survives translation, e.g. to map an unsatisfiable core back to the user's constraints.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Node {
    Const(bool),
    Var(String),
    Not(Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
    Implies(Box<Node>, Box<Node>),
    Equals(Box<Node>, Box<Node>),
}

impl Node {
    /// A positive occurrence of the named variable.
    pub fn var(name: impl Into<String>) -> Node {
        Node::Var(name.into())
    }

    /// The named variable or its negation, `polarity` is `true` for the positive literal.
    pub fn literal(name: impl Into<String>, polarity: bool) -> Node {
        let var = Node::var(name);
        if polarity {
            var
        } else {
            !var
        }
    }

    pub fn and(nodes: impl IntoIterator<Item = Node>) -> Node {
        Node::And(nodes.into_iter().collect())
    }

    pub fn or(nodes: impl IntoIterator<Item = Node>) -> Node {
        Node::Or(nodes.into_iter().collect())
    }

    pub fn implies(self, consequent: Node) -> Node {
        Node::Implies(Box::new(self), Box::new(consequent))
    }

    pub fn equals(self, other: Node) -> Node {
        Node::Equals(Box::new(self), Box::new(other))
    }

    /// Pairwise exclusion of the given nodes.
    pub fn at_most_one(nodes: &[Node]) -> Node {
        let mut pairs = vec![];
        for (i, a) in nodes.iter().enumerate() {
            for b in nodes[i + 1..].iter() {
                pairs.push(Node::or(vec![!a.clone(), !b.clone()]));
            }
        }
        Node::And(pairs)
    }

    /// Names of all variables occurring in the formula, in order of first occurrence.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = vec![];
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Node::Const(_) => (),
            Node::Var(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Node::Not(inner) => inner.collect_variables(names),
            Node::And(children) | Node::Or(children) => {
                for child in children.iter() {
                    child.collect_variables(names);
                }
            }
            Node::Implies(a, b) | Node::Equals(a, b) => {
                a.collect_variables(names);
                b.collect_variables(names);
            }
        }
    }

    /// Evaluates the formula under the assignment given by `value`.
    pub fn eval(&self, value: &mut impl FnMut(&str) -> bool) -> bool {
        match self {
            Node::Const(constant) => *constant,
            Node::Var(name) => value(name),
            Node::Not(inner) => !inner.eval(value),
            Node::And(children) => children.iter().all(|child| child.eval(value)),
            Node::Or(children) => children.iter().any(|child| child.eval(value)),
            Node::Implies(a, b) => !a.eval(value) || b.eval(value),
            Node::Equals(a, b) => a.eval(value) == b.eval(value),
        }
    }
}

impl ops::Not for Node {
    type Output = Node;

    fn not(self) -> Node {
        match self {
            Node::Not(inner) => *inner,
            node => Node::Not(Box::new(node)),
        }
    }
}

impl From<&str> for Node {
    fn from(name: &str) -> Node {
        Node::var(name)
    }
}

fn write_junction(f: &mut fmt::Formatter, children: &[Node], op: &str, empty: &str) -> fmt::Result {
    match children {
        [] => write!(f, "{}", empty),
        [single] => write!(f, "{}", single),
        _ => {
            write!(f, "(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", op)?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")
        }
    }
}

/// Uses the infix notation of FeatureIDE's propositional formulas.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Const(value) => write!(f, "{}", value),
            Node::Var(name) => write!(f, "{}", name),
            Node::Not(inner) => write!(f, "-{}", inner),
            Node::And(children) => write_junction(f, children, "&", "true"),
            Node::Or(children) => write_junction(f, children, "|", "false"),
            Node::Implies(a, b) => write!(f, "({} => {})", a, b),
            Node::Equals(a, b) => write!(f, "({} <=> {})", a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_negation_collapses() {
        let node = !!Node::var("A");
        assert_eq!(node, Node::var("A"));
        assert_eq!(Node::literal("A", false), Node::Not(Box::new(Node::var("A"))));
    }

    #[test]
    fn display_infix() {
        let node = Node::var("A").implies(Node::or(vec![Node::var("B"), !Node::var("C")]));
        assert_eq!(node.to_string(), "(A => (B | -C))");
        assert_eq!(Node::and(Vec::new()).to_string(), "true");
        assert_eq!(Node::or(vec![Node::var("X")]).to_string(), "X");
    }

    #[test]
    fn variables_in_first_occurrence_order() {
        let node = Node::and(vec![
            Node::var("B").equals(Node::var("A")),
            Node::var("B").implies(Node::var("C")),
        ]);
        assert_eq!(node.variables(), vec!["B", "A", "C"]);
    }

    #[test]
    fn at_most_one_excludes_pairs() {
        let names = ["A", "B", "C"];
        let nodes: Vec<Node> = names.iter().map(|&name| Node::var(name)).collect();
        let node = Node::at_most_one(&nodes);

        for bits in 0..8u32 {
            let selected = bits.count_ones();
            let result = node.eval(&mut |name| {
                let index = names.iter().position(|&n| n == name).unwrap();
                bits & (1 << index) != 0
            });
            assert_eq!(result, selected <= 1, "bits {:03b}", bits);
        }
    }
}
