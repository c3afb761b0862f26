//! Analysis commands.
use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Error};
use clap::{values_t, App, Arg, ArgMatches, SubCommand};
use log::info;

use fmsat::{
    analyze_parallel, count_configurations, read_solutions, translate_solutions, AnalysisConfig,
    Backend, ConfigurationCount, ConfigurationScheduler, Constraint, IncrementalSolver,
    LiteralPair, NeverCancel,
};

use super::config_args;
use crate::input::NamedCnf;

pub fn implied_args() -> App<'static, 'static> {
    config_args(
        SubCommand::with_name("implied")
            .about("Finds pairs of literals where the first implies the second")
            .arg_from_usage("[INPUT] 'The input file to use (stdin if omitted)'")
            .arg(
                Arg::from_usage("[pair] -p --pair")
                    .value_name("FORCING>:<FORCED")
                    .help(
                        "A candidate implication, literals given by name or number. \
                         Defaults to all pairs of named variables.",
                    )
                    .multiple(true)
                    .number_of_values(1),
            )
            .arg_from_usage("--explain 'Print the clauses responsible for each implication'"),
    )
}

pub fn count_args() -> App<'static, 'static> {
    config_args(
        SubCommand::with_name("count")
            .about("Counts the assignments of the named variables")
            .arg_from_usage("[INPUT] 'The input file to use (stdin if omitted)'"),
    )
}

pub fn order_args() -> App<'static, 'static> {
    config_args(
        SubCommand::with_name("order")
            .about("Prints sampled solutions as configurations in build order")
            .arg_from_usage("<SOLUTIONS> 'Sampled solutions, one per line in DIMACS clause syntax'")
            .arg_from_usage("[INPUT] 'The input file to use (stdin if omitted)'"),
    )
}

fn parse_pair(cnf: &NamedCnf, text: &str) -> Result<LiteralPair, Error> {
    let mut parts = text.splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(forcing), Some(forced)) => Ok(LiteralPair::new(
            cnf.parse_literal(forcing)?,
            cnf.parse_literal(forced)?,
        )),
        _ => Err(anyhow!("Expected a pair FORCING:FORCED, got '{}'", text)),
    }
}

pub fn implied_main(
    matches: &ArgMatches,
    cnf: &NamedCnf,
    backend: Arc<dyn Backend>,
    config: &AnalysisConfig,
) -> Result<i32, Error> {
    let mut pairs = vec![];
    for text in values_t!(matches, "pair", String).unwrap_or(vec![]) {
        pairs.push(parse_pair(cnf, &text)?);
    }
    if pairs.is_empty() {
        let vars = cnf.concrete_vars();
        for &forcing in vars.iter() {
            for &forced in vars.iter().filter(|&&forced| forced != forcing) {
                pairs.push(LiteralPair::new(forcing.positive(), forced.positive()));
            }
        }
    }
    info!("Checking {} candidate implications", pairs.len());

    let base = Arc::new(cnf.base_formula(config.clause_limit)?);
    let implied = analyze_parallel(
        &backend,
        &base,
        &pairs,
        config.worker_count(),
        config.solution_buffer,
        &NeverCancel,
    )?;

    let mut solver = IncrementalSolver::new(backend, base);
    for pair in implied {
        println!(
            "{} => {}",
            cnf.show_literal(pair.forcing),
            cnf.show_literal(pair.forced)
        );
        if matches.is_present("explain") {
            let mut scope = solver.scope();
            scope.push_literal(pair.forcing)?;
            scope.push_literal(!pair.forced)?;
            if let Some(subset) = scope.minimal_unsatisfiable_subset()? {
                print_constraints(subset);
            }
        }
    }
    Ok(0)
}

pub fn count_main(
    cnf: &NamedCnf,
    backend: Arc<dyn Backend>,
    config: &AnalysisConfig,
) -> Result<i32, Error> {
    let base = Arc::new(cnf.base_formula(config.clause_limit)?);
    let solver = IncrementalSolver::new(backend, base);
    let projection = cnf.concrete_vars();

    match count_configurations(&solver, &projection, config.count_limit, &NeverCancel)? {
        ConfigurationCount::Exact(count) => println!("s exact {}", count),
        ConfigurationCount::AtLeast(count) => println!("s at-least {}", count),
    }
    Ok(0)
}

pub fn order_main(
    matches: &ArgMatches,
    cnf: &NamedCnf,
    config: &AnalysisConfig,
) -> Result<i32, Error> {
    let path = matches
        .value_of("SOLUTIONS")
        .ok_or_else(|| anyhow!("No solutions file given"))?;
    info!("Reading solutions from '{}'", path);
    let solutions = read_solutions(fs::File::open(path)?)?;

    let sample = translate_solutions(solutions.iter(), |var| cnf.concrete_name(var), 1);
    let universe = cnf
        .concrete_vars()
        .into_iter()
        .filter_map(|var| cnf.concrete_name(var).map(str::to_owned))
        .collect();

    let scheduler = ConfigurationScheduler::new(
        config.ordering_policy(),
        universe,
        config.scheduler_capacity,
        true,
    );
    for configuration in sample.configurations {
        scheduler.add_configuration(configuration);
    }
    scheduler.finish();
    scheduler.sort();

    while let Some(configuration) = scheduler.wait_configuration() {
        println!("{}", configuration);
    }
    Ok(0)
}

/// Prints constraints as comment lines, sorted for stable output.
pub fn print_constraints(constraints: impl IntoIterator<Item = Constraint>) {
    let mut lines: Vec<String> = constraints
        .into_iter()
        .map(|constraint| constraint.to_string())
        .collect();
    lines.sort();
    for line in lines {
        println!("c   {}", line);
    }
}
