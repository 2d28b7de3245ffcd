use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fsmwl_config::{CollectionScope, ConcurrencyMode, RunConfig};
use tracing_subscriber::EnvFilter;

mod commands;
mod errors;

const DEFAULT_WORKLOAD: &str = "update_inc";

#[derive(Parser)]
#[command(name = "fsmwl", version, about = "fsmwl - concurrent FSM workloads for document stores")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workload and report the outcome
    Run {
        /// Workload to run when no configuration file is found
        #[arg(short, long)]
        workload: Option<String>,
        /// Number of concurrent workers
        #[arg(short, long)]
        threads: Option<usize>,
        /// State executions per worker
        #[arg(short, long)]
        iterations: Option<usize>,
        /// Seed for transition choices and fault injection
        #[arg(short, long)]
        seed: Option<u64>,
        /// Store concurrency control (document, collection)
        #[arg(long)]
        concurrency: Option<String>,
        /// How much of the store the run owns (shared, own_db, own_coll)
        #[arg(long)]
        scope: Option<String>,
        /// Record every state execution in the report
        #[arg(long)]
        trace: bool,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show effective configuration
    Config,
    /// Validate configuration file
    Validate,
    /// List available workloads
    List,
}

fn find_config() -> Option<PathBuf> {
    // 1. FSMWL_CONFIG environment variable
    if let Ok(path) = std::env::var("FSMWL_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. fsmwl.yaml in current directory
    let cwd_config = PathBuf::from("fsmwl.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. ~/.config/fsmwl/config.yaml
    if let Some(home) = dirs_next::home_dir() {
        let home_config = home.join(".config/fsmwl/config.yaml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_concurrency(value: &str) -> Result<ConcurrencyMode, String> {
    match value {
        "document" => Ok(ConcurrencyMode::Document),
        "collection" => Ok(ConcurrencyMode::Collection),
        other => Err(format!(
            "Unknown concurrency '{}', expected document or collection",
            other
        )),
    }
}

fn parse_scope(value: &str) -> Result<CollectionScope, String> {
    match value {
        "shared" => Ok(CollectionScope::Shared),
        "own_db" => Ok(CollectionScope::OwnDb),
        "own_coll" => Ok(CollectionScope::OwnColl),
        other => Err(format!(
            "Unknown scope '{}', expected shared, own_db or own_coll",
            other
        )),
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::List = cli.command {
        return commands::list::run();
    }

    let config_path = cli.config.or_else(find_config);
    if let Commands::Validate = cli.command {
        let path = config_path.ok_or(
            "No configuration file found. Use --config, set FSMWL_CONFIG, or create fsmwl.yaml",
        )?;
        return commands::validate::run(&RunConfig::from_file(&path)?);
    }

    let mut config = match &config_path {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::for_workload(DEFAULT_WORKLOAD),
    };

    match cli.command {
        Commands::Run {
            workload,
            threads,
            iterations,
            seed,
            concurrency,
            scope,
            trace,
            json,
        } => {
            // Flags override the file
            if let Some(workload) = workload {
                config.workload = workload;
            }
            if threads.is_some() {
                config.thread_count = threads;
            }
            if iterations.is_some() {
                config.iterations = iterations;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(concurrency) = concurrency {
                config.store.concurrency = parse_concurrency(&concurrency)?;
            }
            if let Some(scope) = scope {
                config.scope = parse_scope(&scope)?;
            }
            config.trace |= trace;
            commands::run::run(&config, commands::run::RunArgs { json }).await?;
        }
        Commands::Config => {
            commands::config::run(&config)?;
        }
        // Handled above before loading configuration
        Commands::Validate | Commands::List => {
            return Err("Internal error: command should have been handled earlier".into());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = err.exit_code();
            let code = if code < 0 {
                1u8
            } else if code > 255 {
                255u8
            } else {
                code as u8
            };
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        errors::print_error(e.as_ref());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
