use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mathstake_types::CodeType;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};

mod config;
mod logging;
mod node;

use config::NodeConfig;
use node::MarketNode;

const DEFAULT_CONFIG_FILE: &str = "./mathstake.toml";

#[derive(Parser)]
#[command(name = "mathstake")]
#[command(about = "MathStake evaluation node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the evaluation sweep until interrupted
    Run {
        /// Market state file, overrides the configured one
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Seconds between sweeps
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run a single sweep pass and exit
    Sweep {
        /// Market state file, overrides the configured one
        #[arg(short, long)]
        state: Option<PathBuf>,
    },

    /// Check a code file with the safety gate
    Validate {
        /// File holding the code
        #[arg(short, long)]
        file: PathBuf,

        /// algorithm, cost_function or test_input_generator
        #[arg(short = 't', long, default_value = "algorithm")]
        code_type: String,
    },

    /// Write a default configuration file
    Init {
        /// Output directory for configuration
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Config file, then `MATHSTAKE_*` variables, then CLI flags.
fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    let mut config = match path {
        Some(path) => NodeConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            NodeConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;

    if let Err(e) = logging::init_logging(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Run { state, interval } => {
            if let Some(state) = state {
                config.storage.state_file = state;
            }
            if let Some(interval) = interval {
                config.sweep.interval_secs = interval;
            }
            config.validate()?;
            run_node(config).await
        }
        Commands::Sweep { state } => {
            if let Some(state) = state {
                config.storage.state_file = state;
            }
            config.validate()?;
            let node = MarketNode::new(config).await?;
            let report = node.sweep_once().await?;
            info!(
                closed = report.closed,
                evaluated = report.evaluated.len(),
                refunded = report.refunded.len(),
                failed = report.failed.len(),
                volume = report.settled_volume.to_decimal(),
                "✅ Sweep complete"
            );
            for (problem_id, error) in &report.failed {
                warn!(problem_id = %problem_id, error = %error, "❌ Evaluation failed");
            }
            let (store, executions) = node.stats().await?;
            info!(
                problems = store.problem_count,
                open = store.open_problems,
                evaluated = store.evaluated_problems,
                transactions = store.transaction_count,
                executions = executions.total_executions,
                timed_out = executions.timed_out_executions,
                "📊 Market state"
            );
            Ok(())
        }
        Commands::Validate { file, code_type } => {
            config.validate()?;
            let code_type: CodeType = code_type.parse()?;
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let gate = node::build_gate(&config)?;
            let report = gate.validate(&code, code_type).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid {
                bail!("{} rejected with severity {}", file.display(), report.severity);
            }
            Ok(())
        }
        Commands::Init { output, force } => {
            std::fs::create_dir_all(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            let path = output.join("mathstake.toml");
            if path.exists() && !force {
                bail!("{} already exists, pass --force to overwrite", path.display());
            }
            NodeConfig::default().save_to_file(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

async fn run_node(config: NodeConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        state_file = %config.storage.state_file.display(),
        interval_secs = config.sweep.interval_secs,
        "🚀 Starting MathStake node"
    );

    let node = MarketNode::new(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 Shutdown requested"),
            Err(e) => warn!(error = %e, "⚠️ Could not listen for ctrl-c, stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    node.run(shutdown_rx).await?;
    signal.abort();
    info!("✅ Market state saved, node stopped");
    Ok(())
}
