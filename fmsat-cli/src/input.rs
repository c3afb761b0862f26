//! DIMACS CNF input with feature names.
//!
//! Names are taken from comment lines of the form `c <number> <name>`. Variables without such a
//! comment are named by their number.
use std::{collections::BTreeMap, io};

use anyhow::{anyhow, Error};

use varisat::dimacs::DimacsParser;

use fmsat::{BaseFormula, Constraint, Lit, Node, TranslationError, Var, VarMap};

/// A CNF formula over named variables.
pub struct NamedCnf {
    vars: VarMap,
    named: Vec<bool>,
    clauses: Vec<Constraint>,
}

impl NamedCnf {
    pub fn read(mut input: impl io::Read) -> Result<NamedCnf, Error> {
        let mut contents = String::new();
        input.read_to_string(&mut contents)?;

        let mut comments = BTreeMap::new();
        for line in contents.lines() {
            let mut words = line.split_whitespace();
            if words.next() != Some("c") {
                continue;
            }
            let number = match words.next().and_then(|word| word.parse::<usize>().ok()) {
                Some(number) if number > 0 => number,
                _ => continue,
            };
            let name = words.collect::<Vec<_>>().join(" ");
            if !name.is_empty() {
                comments.entry(number).or_insert(name);
            }
        }

        let formula = DimacsParser::parse(contents.as_bytes())?;
        let var_count = formula
            .var_count()
            .max(comments.keys().next_back().cloned().unwrap_or(0));

        let mut vars = VarMap::new();
        let mut named = Vec::with_capacity(var_count);
        for number in 1..=var_count {
            let mut name = match comments.get(&number) {
                Some(name) if vars.var(name).is_none() => {
                    named.push(true);
                    name.clone()
                }
                _ => {
                    named.push(false);
                    number.to_string()
                }
            };
            while vars.var(&name).is_some() {
                name.insert(0, '_');
            }
            vars.insert(name);
        }

        let mut clauses = Vec::with_capacity(formula.len());
        for clause in formula.iter() {
            let lits = clause
                .iter()
                .map(|&lit| vars.literal_node(lit))
                .collect::<Result<Vec<_>, _>>()?;
            clauses.push(Constraint::new(Node::or(lits)));
        }

        log::info!(
            "Read {} clauses over {} variables, {} of them named",
            clauses.len(),
            var_count,
            named.iter().filter(|&&named| named).count()
        );

        Ok(NamedCnf {
            vars,
            named,
            clauses,
        })
    }

    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    pub fn clauses(&self) -> &[Constraint] {
        &self.clauses
    }

    pub fn base_formula(&self, clause_limit: usize) -> Result<BaseFormula, TranslationError> {
        BaseFormula::with_clause_limit(self.vars.clone(), self.clauses.clone(), clause_limit)
    }

    /// Name of a variable that takes part in configurations.
    ///
    /// These are the named variables, or all variables when the input names none.
    pub fn concrete_name(&self, var: Var) -> Option<&str> {
        let has_names = self.named.iter().any(|&named| named);
        match self.named.get(var.index()) {
            Some(&named) if named || !has_names => self.vars.name(var),
            _ => None,
        }
    }

    /// Variables that take part in configurations.
    pub fn concrete_vars(&self) -> Vec<Var> {
        self.vars
            .iter()
            .filter(|&(var, _)| self.concrete_name(var).is_some())
            .map(|(var, _)| var)
            .collect()
    }

    /// Parses a literal given by name or DIMACS number.
    ///
    /// A leading `-` or `!` negates the literal.
    pub fn parse_literal(&self, text: &str) -> Result<Lit, Error> {
        let text = text.trim();
        let (polarity, rest) = match text.chars().next() {
            Some('-') | Some('!') => (false, &text[1..]),
            _ => (true, text),
        };
        if let Some(var) = self.vars.var(rest) {
            return Ok(var.lit(polarity));
        }
        match rest.parse::<usize>() {
            Ok(number) if number > 0 && number <= self.vars.len() => {
                Ok(Var::from_dimacs(number as isize).lit(polarity))
            }
            _ => Err(anyhow!("Unknown variable '{}'", rest)),
        }
    }

    /// Formats a literal by name.
    pub fn show_literal(&self, lit: Lit) -> String {
        match self.vars.literal_node(lit) {
            Ok(node) => node.to_string(),
            Err(_) => lit.to_string(),
        }
    }
}
