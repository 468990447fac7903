use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quotagate::ratelimit::{Category, Identifier, POLICY_TABLE_VERSION};
use quotagate::{response, AdmissionEngine, PolicyRegistry, Settings};

#[derive(Debug, Parser)]
#[command(name = "quotagate", version, about = "Per-caller admission control")]
struct Cli {
    /// Path to a YAML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run admission checks and print each decision
    Check {
        /// Caller identifier
        #[arg(long)]
        identifier: String,

        /// Operation category; unknown names use the default policy
        #[arg(long, default_value = "default")]
        category: String,

        /// Number of consecutive checks
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Print the effective policy table
    Policies,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let settings = Settings::load(cli.config.as_deref())?;
    info!(
        shared = settings.shared.is_configured(),
        failure_mode = ?settings.failure_mode,
        "Configuration loaded"
    );

    match cli.command {
        Command::Check {
            identifier,
            category,
            count,
        } => {
            let identifier = Identifier::new(identifier)?;
            let category = Category::from_name(&category);
            let engine = AdmissionEngine::from_settings(&settings).await?;

            for _ in 0..count {
                let decision = engine.check(&identifier, category).await;
                let rejection = response::exceeded(&decision, engine.now_ms());
                let line = json!({
                    "decision": decision,
                    "rejection": rejection.map(|r| r.body),
                });
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        Command::Policies => {
            let registry = PolicyRegistry::with_overrides(&settings.policies)?;
            let table = json!({
                "version": POLICY_TABLE_VERSION,
                "policies": registry.policies(),
            });
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
