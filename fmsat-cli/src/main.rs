use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::sync::Arc;

use anyhow::Error;
use clap::{values_t, App, AppSettings, Arg, ArgMatches};
use env_logger::{fmt, Builder, Target};
use log::{error, info};
use log::{Level, LevelFilter, Record};

use fmsat::{
    AnalysisConfig, AnalysisConfigUpdate, Backend, IncrementalSolver, Solution, VarisatBackend,
};

use input::NamedCnf;

mod analyze;
mod input;

fn main() {
    let exit_code = match main_with_err() {
        Err(err) => {
            error!("{}", err);
            1
        }
        Ok(exit_code) => exit_code,
    };
    std::process::exit(exit_code);
}

fn init_logging() {
    let format = |buf: &mut fmt::Formatter, record: &Record| {
        if record.level() == Level::Info {
            writeln!(buf, "c {}", record.args())
        } else {
            writeln!(buf, "c {}: {}", record.level(), record.args())
        }
    };

    let mut builder = Builder::new();
    builder
        .target(Target::Stdout)
        .format(format)
        .filter(None, LevelFilter::Info);

    if let Ok(ref env_var) = env::var("FMSAT_LOG") {
        builder.parse_filters(env_var);
    }

    builder.init();
}

fn banner() {
    info!("This is fmsat {}", env!("CARGO_PKG_VERSION"));
    info!(
        "  {} build - {}",
        env!("FMSAT_PROFILE"),
        env!("FMSAT_RUSTC_VERSION")
    );
}

/// Options shared by all commands.
pub fn config_args<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
    app.arg_from_usage("[config-file] --config=[FILE] 'Read parameters from configuration file'")
        .arg(
            Arg::from_usage("[config-option] -C --config-option")
                .value_name("OPTION>=<VALUE")
                .help("Specify a single config option, see 'fmsat -C help' for a list of options.")
                .multiple(true)
                .number_of_values(1),
        )
}

fn main_with_err() -> Result<i32, Error> {
    let app = App::new("fmsat")
        .version(env!("CARGO_PKG_VERSION"))
        .setting(AppSettings::DisableHelpSubcommand)
        .setting(AppSettings::ArgsNegateSubcommands)
        .setting(AppSettings::VersionlessSubcommands)
        .arg_from_usage("[INPUT] 'The input file to use (stdin if omitted)'")
        .arg_from_usage(
            "--explain 'Print a minimal unsatisfiable subset of the clauses if unsatisfiable'",
        )
        .subcommand(analyze::implied_args())
        .subcommand(analyze::count_args())
        .subcommand(analyze::order_args());
    let matches = config_args(app).get_matches();

    let (command, command_matches) = matches.subcommand();
    let matches = command_matches.unwrap_or(&matches);

    if values_t!(matches, "config-option", String)
        .unwrap_or(vec![])
        .iter()
        .any(|option| option == "help")
    {
        print!("{}", AnalysisConfig::help());
        return Ok(0);
    }

    init_logging();
    banner();

    let config = read_config(matches)?;
    let cnf = read_input(matches)?;
    let backend: Arc<dyn Backend> = Arc::new(VarisatBackend);

    match command {
        "implied" => analyze::implied_main(matches, &cnf, backend, &config),
        "count" => analyze::count_main(&cnf, backend, &config),
        "order" => analyze::order_main(matches, &cnf, &config),
        _ => solve_main(matches, &cnf, backend, &config),
    }
}

fn read_config(matches: &ArgMatches) -> Result<AnalysisConfig, Error> {
    let mut config_update = AnalysisConfigUpdate::new();

    if let Some(config_path) = matches.value_of("config-file") {
        let mut config_contents = String::new();
        fs::File::open(config_path)?.read_to_string(&mut config_contents)?;

        config_update.merge(toml::from_str(&config_contents)?);
    }

    for config_option in values_t!(matches, "config-option", String).unwrap_or(vec![]) {
        config_update.merge(toml::from_str(&config_option)?);
    }

    let mut config = AnalysisConfig::default();
    config_update.apply(&mut config);
    Ok(config)
}

fn read_input(matches: &ArgMatches) -> Result<NamedCnf, Error> {
    match matches.value_of("INPUT") {
        Some(path) => {
            info!("Reading file '{}'", path);
            NamedCnf::read(fs::File::open(path)?)
        }
        None => {
            info!("Reading from stdin");
            let stdin = io::stdin();
            let locked_stdin = stdin.lock();
            NamedCnf::read(locked_stdin)
        }
    }
}

fn solve_main(
    matches: &ArgMatches,
    cnf: &NamedCnf,
    backend: Arc<dyn Backend>,
    config: &AnalysisConfig,
) -> Result<i32, Error> {
    let base = Arc::new(cnf.base_formula(config.clause_limit)?);
    let solver = IncrementalSolver::new(backend, base);

    match solver.solve()? {
        Solution::Sat(model) => {
            println!("s SATISFIABLE");
            print!("v");
            for lit in model.lits() {
                print!(" {}", lit);
            }
            println!(" 0");
            Ok(10)
        }
        Solution::Unsat => {
            println!("s UNSATISFIABLE");
            if matches.is_present("explain") {
                if let Some(subset) = solver.minimal_unsatisfiable_subset()? {
                    info!("Minimal unsatisfiable subset of {} clauses", subset.len());
                    analyze::print_constraints(subset);
                }
            }
            Ok(20)
        }
        Solution::Unknown => {
            println!("s UNKNOWN");
            Ok(0)
        }
    }
}
