//! Vigil CLI
//!
//! - `vigil simulate` runs scripted calls through a full in-process engine
//! - `vigil verify <file>` checks an exported evidence report
//! - `vigil keygen <file>` writes a new evidence key pair
//! - `vigil config` prints the effective engine configuration

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_evidence::PqEvidenceCipher;
use vigil_session::EvidenceReport;

mod config;
mod simulate;

use simulate::SimulationOptions;

/// Vigil CLI application
#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil - live-call coercion scoring and intervention engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "VIGIL_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "VIGIL_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run simulated calls through the full pipeline
    Simulate {
        /// Number of concurrent calls
        #[arg(short, long, default_value_t = 10)]
        sessions: usize,

        /// How many of them follow the digital-arrest script
        #[arg(long, default_value_t = 1)]
        coercive: usize,

        /// Write an evidence report per intervened call into this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Verify an exported evidence report
    Verify {
        /// Report file written by `vigil simulate --report-dir`
        file: PathBuf,
    },

    /// Write a new evidence key pair for `evidence.key_file`
    Keygen {
        /// Where to write the key file
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let engine = config::load(cli.config.as_deref()).context("loading configuration")?;
    engine.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Simulate {
            sessions,
            coercive,
            report_dir,
        } => {
            let options = SimulationOptions {
                sessions,
                coercive: coercive.min(sessions),
                report_dir,
            };
            let outcome = simulate::run(engine, &options).await?;

            for summary in &outcome.sessions {
                let snapshot = &summary.snapshot;
                println!(
                    "{}  {:<14} {:<20} score {:>5.1}  {}",
                    snapshot.session_id,
                    snapshot.caller,
                    snapshot.mode,
                    snapshot.score.value,
                    if snapshot.intervened {
                        format!("intervened, {} evidence record(s)", snapshot.evidence.len())
                    } else {
                        "no action".to_string()
                    }
                );
            }
            println!(
                "\n{} call(s), {} intervened, {} rejected at admission",
                outcome.sessions.len(),
                outcome.intervened(),
                outcome.rejected
            );
            for path in &outcome.reports {
                println!("report: {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&outcome.metrics)?);
        }

        Commands::Verify { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let report = EvidenceReport::from_json(&json)
                .with_context(|| format!("parsing {}", file.display()))?;
            if let Err(e) = report.verify() {
                bail!("{}: verification failed: {}", file.display(), e);
            }
            println!(
                "{}: verified ({} evidence record(s), {} intervention record(s), session {})",
                file.display(),
                report.evidence.len(),
                report.interventions.len(),
                report.session_id
            );
        }

        Commands::Keygen { file } => {
            if file.exists() {
                bail!("{}: already exists; refusing to replace an evidence key", file.display());
            }
            PqEvidenceCipher::generate()
                .save(&file)
                .with_context(|| format!("writing {}", file.display()))?;
            println!("{}: new evidence key written", file.display());
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&engine)?);
        }
    }

    Ok(())
}
