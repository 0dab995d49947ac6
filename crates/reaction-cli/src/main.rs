//! reactionctl - drive the reaction engine from the command line.
//!
//! Usage:
//!   reactionctl replay --query-id <id> [--snapshot <rows.json>] [--ref-id <r>] <events.jsonl>
//!   reactionctl health

mod replay;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use observability::LogFormat;
use reaction_config::{init_logging, parse_level, Config, Paths};
use tracing::info;

use crate::replay::{check_health, run_replay, ReplayOptions};

#[derive(Parser, Debug)]
#[command(name = "reactionctl")]
#[command(about = "Replay reaction change streams and probe reaction endpoints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file. Defaults to ~/.reaction-stream/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Log format (compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Feed a JSONL file of change notifications through the engine and print
    /// every response as one JSON line
    Replay {
        /// Query the notifications belong to
        #[arg(long)]
        query_id: String,

        /// JSON array of rows served by the initial reload
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Frame ref id (defaults to the query id)
        #[arg(long)]
        ref_id: Option<String>,

        /// Stop once no response arrived for this long
        #[arg(long, default_value = "250")]
        idle_ms: u64,

        /// Change notifications, one JSON object per line
        events: PathBuf,
    },
    /// Validate the configured endpoint URL and build a listener for it.
    ///
    /// Listeners come from the in-memory transport, so no network connection
    /// is attempted: a failure here means the endpoint URL does not parse.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match &cli.config {
        Some(file) => Paths::for_config_file(file),
        None => Paths::new()?,
    };
    let config = Config::load(&paths).context("failed to load configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let level = parse_level(level).to_string().to_lowercase();
    init_logging("reactionctl", &level, cli.log_format, &paths)
        .context("failed to initialize logging")?;

    info!(endpoint = %config.endpoint_url, "reactionctl starting");

    match cli.command {
        Commands::Replay {
            query_id,
            snapshot,
            ref_id,
            idle_ms,
            events,
        } => {
            let options = ReplayOptions {
                query_id,
                ref_id,
                snapshot,
                events,
                idle: std::time::Duration::from_millis(idle_ms),
            };
            let stdout = std::io::stdout();
            let printed = run_replay(&config, &options, &mut stdout.lock()).await?;
            info!(responses = printed, "Replay finished");
        }
        Commands::Health => {
            let health = check_health(&config)?;
            println!("{}", serde_json::to_string(&health)?);
            if !health.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
