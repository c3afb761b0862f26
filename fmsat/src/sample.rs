//! Translation of sampled solutions into configurations.
//!
//! A covering array generator for t-wise sampling produces raw solutions as lists of literals,
//! one solution per line in DIMACS clause syntax. Only the concrete features of a solution end up
//! in the configuration, so two solutions differing only in abstract features are duplicates.
use std::{collections::BTreeSet, io};

use log::{debug, info};
use rustc_hash::FxHashSet;

use varisat::dimacs::DimacsParser;

use fmsat_formula::{CnfFormula, Lit, Var};

use crate::configuration::BuilderConfiguration;

/// Configurations translated from sampled solutions.
#[derive(Clone, Default, Debug)]
pub struct Sample {
    pub configurations: Vec<BuilderConfiguration>,
    /// Number of solutions skipped as duplicates.
    pub duplicates: usize,
}

/// Translates solutions into configurations with ids counting up from `first_id`.
///
/// `concrete_name` returns the name of a concrete feature variable and `None` for every other
/// variable. Solutions selecting the same concrete features as an earlier one are skipped.
pub fn translate_solutions<'a, S: AsRef<[Lit]>>(
    solutions: impl IntoIterator<Item = S>,
    concrete_name: impl Fn(Var) -> Option<&'a str>,
    first_id: u64,
) -> Sample {
    let mut sample = Sample::default();
    let mut seen = FxHashSet::<BTreeSet<&'a str>>::default();
    let mut next_id = first_id;

    for solution in solutions {
        let selection: BTreeSet<&'a str> = solution
            .as_ref()
            .iter()
            .filter(|lit| lit.is_positive())
            .filter_map(|lit| concrete_name(lit.var()))
            .collect();

        if seen.contains(&selection) {
            debug!("Skipping duplicate solution {:?}", selection);
            sample.duplicates += 1;
            continue;
        }

        sample
            .configurations
            .push(BuilderConfiguration::new(next_id, selection.iter().cloned()));
        seen.insert(selection);
        next_id += 1;
    }

    info!(
        "Translated {} sampled configurations, skipped {} duplicates",
        sample.configurations.len(),
        sample.duplicates
    );
    sample
}

/// Reads raw solutions, one per line in DIMACS clause syntax.
pub fn read_solutions(input: impl io::Read) -> Result<CnfFormula, anyhow::Error> {
    DimacsParser::parse(input)
}
