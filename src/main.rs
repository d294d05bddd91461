//! callgen CLI entrypoint.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use callgen::{
    catalog_summary, check_program, generate, task_generate_with_report, BalancePolicy, ChoiceTable, Config,
    RandSource, Target, Verify,
};

#[derive(Debug, Parser)]
#[command(name = "callgen")]
#[command(about = "resource-aware call program generator for kernel interface fuzzing")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "callgen.toml")]
    config: PathBuf,

    /// Descriptor catalog (.json or .toml); overrides the config.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a single program
    Generate {
        /// Calls in the program (defaults to the config's target_length).
        #[arg(long)]
        len: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Choose descriptors uniformly instead of through the choice table.
        #[arg(long)]
        uniform: bool,

        #[arg(long)]
        verify: Option<Verify>,
    },

    /// Generate a balanced batch of prioritized programs
    Task {
        #[arg(long)]
        len: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        uniform: bool,

        #[arg(long)]
        jobs: Option<usize>,

        #[arg(long)]
        policy: Option<BalancePolicy>,

        #[arg(long)]
        headroom: Option<usize>,

        #[arg(long)]
        verify: Option<Verify>,
    },

    /// Show the descriptor catalog
    Catalog,

    /// Validate a program file (JSON) against the catalog
    Check {
        program: PathBuf,

        /// Run the repair pass before validating.
        #[arg(long)]
        fix: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log) {
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    let mut config = Config::load_optional(&cli.config);
    if let Some(catalog) = &cli.catalog {
        config.catalog = Some(catalog.clone());
    }

    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => {
            if cli.json {
                println!("{}", serde_json::json!({"error": format!("{err:#}")}));
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

fn choice_table(config: &Config, target: &Target, uniform: bool) -> anyhow::Result<Option<ChoiceTable>> {
    if uniform {
        return Ok(None);
    }
    if config.enabled.is_empty() {
        return Ok(Some(ChoiceTable::new(target)));
    }
    Ok(Some(ChoiceTable::with_enabled(target, config.enabled.as_slice())?))
}

fn rand_for(seed: Option<u64>) -> RandSource {
    match seed {
        Some(seed) => RandSource::from_seed(seed),
        None => RandSource::from_entropy(),
    }
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    config.validate()?;
    let target = config.load_target()?;

    match &cli.command {
        Command::Generate {
            len,
            seed,
            uniform,
            verify,
        } => {
            let ct = choice_table(config, &target, *uniform)?;
            let mut rand = rand_for(*seed);
            let ncalls = len.unwrap_or(config.target_length);
            let program = generate(&target, &mut rand, ncalls, ct.as_ref(), verify.unwrap_or(config.verify));
            if cli.json {
                let out = serde_json::json!({"seed": rand.seed(), "program": program});
                println!("{}", serde_json::to_string(&out)?);
            } else {
                println!("# seed {}", rand.seed());
                print!("{program}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Task {
            len,
            seed,
            uniform,
            jobs,
            policy,
            headroom,
            verify,
        } => {
            let ct = choice_table(config, &target, *uniform)?;
            let mut opt = config.task_options();
            if let Some(jobs) = jobs {
                opt.jobs = (*jobs).max(1);
            }
            if let Some(policy) = policy {
                opt.balance_policy = *policy;
            }
            if let Some(headroom) = headroom {
                opt.balance_headroom = *headroom;
            }
            if let Some(verify) = verify {
                opt.verify = *verify;
            }
            let mut rand = rand_for(*seed);
            let ncalls = len.unwrap_or(config.target_length);
            let out = task_generate_with_report(&target, &mut rand, ncalls, ct.as_ref(), &opt);
            if cli.json {
                println!("{}", serde_json::to_string(&out)?);
            } else {
                println!("# seed {} programs {}", out.seed, out.programs.len());
                for (i, p) in out.programs.iter().enumerate() {
                    println!("# program {i} priority {}", p.priority.unwrap_or_default());
                    print!("{p}");
                }
                for fix in &out.balance.appended {
                    println!("# balanced program {} ({:?})", fix.program, fix.category);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Catalog => {
            print_json_or_text(cli, &catalog_summary(&target))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Check { program, fix } => {
            let out = check_program(&target, program, *fix)?;
            print_json_or_text(cli, &out)?;
            if out["valid"] == true {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
    }
}

fn print_json_or_text<T: serde::Serialize>(cli: &Cli, value: &T) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}
