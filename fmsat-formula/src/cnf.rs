//! Translation of constraint formulas into conjunctive normal form.
use thiserror::Error;

use crate::node::Node;
use crate::vars::VarMap;
use crate::{CnfFormula, ExtendFormula, Lit};

/// Default bound on the number of clauses a single translation may produce.
pub const DEFAULT_CLAUSE_LIMIT: usize = 100_000;

/// Possible errors while translating a formula into CNF.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Unknown variable '{}'", name)]
    UnknownVariable { name: String },
    #[error("Literal {} does not belong to a known variable", lit)]
    UnknownLiteral { lit: isize },
    #[error("CNF translation exceeds the limit of {} clauses", limit)]
    TooLarge { limit: usize },
}

/// Formula in negation normal form, the intermediate representation of the translation.
enum Nnf {
    Const(bool),
    Lit(Lit),
    And(Vec<Nnf>),
    Or(Vec<Nnf>),
}

/// Translates formulas over feature names into CNF over the variables of a [`VarMap`].
///
/// The translation is equivalence preserving and introduces no auxiliary variables, so models of
/// the resulting formula are exactly the feature assignments satisfying the input. Distributing
/// disjunctions over conjunctions can blow up, which is bounded by the clause limit.
pub struct Translator<'a> {
    vars: &'a VarMap,
    clause_limit: usize,
}

impl<'a> Translator<'a> {
    pub fn new(vars: &'a VarMap) -> Translator<'a> {
        Translator {
            vars,
            clause_limit: DEFAULT_CLAUSE_LIMIT,
        }
    }

    pub fn with_clause_limit(mut self, clause_limit: usize) -> Translator<'a> {
        self.clause_limit = clause_limit;
        self
    }

    /// Translates a formula.
    ///
    /// The variable count of the result covers every variable of the map, whether or not it
    /// occurs in the formula.
    pub fn translate(&self, node: &Node) -> Result<CnfFormula, TranslationError> {
        let nnf = self.nnf(node, true)?;
        let clauses = self.clauses(&nnf)?;

        let mut formula = CnfFormula::new();
        formula.set_var_count(self.vars.len());
        for clause in clauses.iter() {
            formula.add_clause(&clause[..]);
        }
        Ok(formula)
    }

    fn nnf(&self, node: &Node, polarity: bool) -> Result<Nnf, TranslationError> {
        Ok(match node {
            Node::Const(value) => Nnf::Const(*value == polarity),
            Node::Var(name) => Nnf::Lit(self.vars.lit(name, polarity)?),
            Node::Not(inner) => self.nnf(inner, !polarity)?,
            Node::And(children) => {
                let parts = self.all_nnf(children, polarity)?;
                if polarity {
                    Nnf::And(parts)
                } else {
                    Nnf::Or(parts)
                }
            }
            Node::Or(children) => {
                let parts = self.all_nnf(children, polarity)?;
                if polarity {
                    Nnf::Or(parts)
                } else {
                    Nnf::And(parts)
                }
            }
            Node::Implies(a, b) => {
                if polarity {
                    Nnf::Or(vec![self.nnf(a, false)?, self.nnf(b, true)?])
                } else {
                    Nnf::And(vec![self.nnf(a, true)?, self.nnf(b, false)?])
                }
            }
            Node::Equals(a, b) => {
                let (a_pos, a_neg) = (self.nnf(a, true)?, self.nnf(a, false)?);
                let (b_pos, b_neg) = (self.nnf(b, true)?, self.nnf(b, false)?);
                if polarity {
                    Nnf::And(vec![
                        Nnf::Or(vec![a_neg, b_pos]),
                        Nnf::Or(vec![a_pos, b_neg]),
                    ])
                } else {
                    Nnf::Or(vec![
                        Nnf::And(vec![a_pos, b_neg]),
                        Nnf::And(vec![a_neg, b_pos]),
                    ])
                }
            }
        })
    }

    fn all_nnf(&self, nodes: &[Node], polarity: bool) -> Result<Vec<Nnf>, TranslationError> {
        nodes.iter().map(|node| self.nnf(node, polarity)).collect()
    }

    fn clauses(&self, nnf: &Nnf) -> Result<Vec<Vec<Lit>>, TranslationError> {
        match nnf {
            Nnf::Const(true) => Ok(vec![]),
            Nnf::Const(false) => Ok(vec![vec![]]),
            Nnf::Lit(lit) => Ok(vec![vec![*lit]]),
            Nnf::And(parts) => {
                let mut clauses = vec![];
                for part in parts.iter() {
                    clauses.extend(self.clauses(part)?);
                    self.check_limit(clauses.len())?;
                }
                Ok(clauses)
            }
            Nnf::Or(parts) => {
                // The empty clause is the neutral element of the clause-wise product.
                let mut product: Vec<Vec<Lit>> = vec![vec![]];
                for part in parts.iter() {
                    let rhs = self.clauses(part)?;
                    let mut next = Vec::with_capacity(product.len() * rhs.len());
                    for lhs_clause in product.iter() {
                        for rhs_clause in rhs.iter() {
                            if let Some(clause) = merge_clauses(lhs_clause, rhs_clause) {
                                next.push(clause);
                            }
                        }
                        self.check_limit(next.len())?;
                    }
                    product = next;
                }
                Ok(product)
            }
        }
    }

    fn check_limit(&self, clause_count: usize) -> Result<(), TranslationError> {
        if clause_count > self.clause_limit {
            Err(TranslationError::TooLarge {
                limit: self.clause_limit,
            })
        } else {
            Ok(())
        }
    }
}

/// Disjunction of two clauses.
///
/// Returns `None` for tautologies. The result is sorted and free of duplicates, which places
/// complementary literals next to each other.
fn merge_clauses(a: &[Lit], b: &[Lit]) -> Option<Vec<Lit>> {
    let mut clause: Vec<Lit> = a.iter().chain(b.iter()).cloned().collect();
    clause.sort();
    clause.dedup();
    if clause.windows(2).any(|pair| pair[0].var() == pair[1].var()) {
        None
    } else {
        Some(clause)
    }
}

/// Translates a formula using the default clause limit.
pub fn to_cnf(node: &Node, vars: &VarMap) -> Result<CnfFormula, TranslationError> {
    Translator::new(vars).translate(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::test::{cnf_is_satisfied, node_over, numbered_vars};

    #[test]
    fn implication_is_single_clause() {
        let vars = var_map!["A", "B"];
        let formula = to_cnf(&feature!("A").implies(feature!("B")), &vars).unwrap();

        assert_eq!(formula.len(), 1);
        assert_eq!(formula.var_count(), 2);
        assert_eq!(formula.iter().next().unwrap(), &[lit!(-1), lit!(2)][..]);
    }

    #[test]
    fn constants() {
        let vars = var_map!["A"];

        let truth = to_cnf(&Node::Const(true), &vars).unwrap();
        assert_eq!(truth.len(), 0);

        let falsity = to_cnf(&Node::or(Vec::new()), &vars).unwrap();
        assert_eq!(falsity.len(), 1);
        assert!(falsity.iter().next().unwrap().is_empty());
    }

    #[test]
    fn tautologies_are_dropped() {
        let vars = var_map!["A", "B"];
        let node = Node::or(vec![feature!("A"), !feature!("A"), feature!("B")]);
        assert_eq!(to_cnf(&node, &vars).unwrap().len(), 0);
    }

    #[test]
    fn unknown_variable() {
        let vars = var_map!["A"];
        let result = to_cnf(&feature!("A").implies(feature!("Missing")), &vars);
        assert_eq!(
            result,
            Err(TranslationError::UnknownVariable {
                name: "Missing".to_owned()
            })
        );
    }

    #[test]
    fn clause_limit() {
        let vars = numbered_vars(12);
        // (x1 & x2) | (x3 & x4) | ... distributes into 2^6 clauses.
        let node = Node::or((0..6).map(|i| {
            Node::and(vec![
                Node::var(format!("x{}", 2 * i + 1)),
                Node::var(format!("x{}", 2 * i + 2)),
            ])
        }));

        let translator = Translator::new(&vars);
        assert_eq!(translator.translate(&node).unwrap().len(), 64);

        let limited = Translator::new(&vars).with_clause_limit(63);
        assert_eq!(
            limited.translate(&node).map(|formula| formula.len()),
            Err(TranslationError::TooLarge { limit: 63 })
        );
    }

    proptest! {
        #[test]
        fn equivalent_to_formula(node in node_over(4, 4)) {
            let vars = numbered_vars(4);
            let formula = to_cnf(&node, &vars).unwrap();

            for bits in 0..16u32 {
                let assignment: Vec<bool> = (0..4).map(|i| bits & (1 << i) != 0).collect();
                let expected = node.eval(&mut |name| {
                    assignment[vars.var(name).unwrap().index()]
                });
                prop_assert_eq!(cnf_is_satisfied(&formula, &assignment), expected);
            }
        }
    }
}
