use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pinion_core::Settings;

mod commands;

#[derive(Parser)]
#[command(
    name = "pinion",
    about = "Pinion — progressive canary rollout decision engine",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to the pinion.toml configuration file.
    #[arg(short, long, global = true, default_value = "pinion.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one evaluation cycle: fetch metrics, decide, persist.
    ///
    /// Exits 0 when the canary is healthy or unchanged and 2 when the
    /// relative error increase crossed the rollback gate — the CI signal
    /// for downstream rollback automation.
    Evaluate {
        /// Compute and print the decision without persisting anything.
        #[arg(long)]
        analyze_only: bool,
        /// Skip writing the evaluation report file.
        #[arg(long)]
        skip_report_file: bool,
        /// Metrics JSON file (overrides the configured path).
        #[arg(long)]
        metrics: Option<String>,
    },
    /// Set an explicit rollout percentage, bypassing the evaluator.
    Override {
        /// New percentage, 0..=100. Out-of-range values are rejected.
        #[arg(long)]
        percentage: f64,
    },
    /// Reset a paused or rolled-back rollout to ACTIVE.
    Resume,
    /// Print the persisted rollout document.
    Status,
    /// Resolve (and persist) the variant assignment for one client.
    Assign {
        /// Client identifier.
        #[arg(long)]
        client: String,
        /// Logged-in user identifier, if any.
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pinion=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;

    match cli.command {
        Commands::Evaluate {
            analyze_only,
            skip_report_file,
            metrics,
        } => {
            commands::evaluate::run(
                &settings,
                commands::evaluate::EvaluateOpts {
                    analyze_only,
                    skip_report_file,
                    metrics,
                },
            )
            .await
        }
        Commands::Override { percentage } => {
            commands::operate::override_percentage(&settings, percentage)
        }
        Commands::Resume => commands::operate::resume(&settings),
        Commands::Status => commands::operate::status(&settings),
        Commands::Assign { client, user } => {
            commands::assign::run(&settings, &client, user.as_deref())
        }
    }
}

/// Load settings from the given path, falling back to defaults when the
/// file does not exist (the default config is valid out of the box).
fn load_settings(path: &str) -> anyhow::Result<Settings> {
    let path = Path::new(path);
    if path.exists() {
        Ok(Settings::from_file(path)?)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        let settings = Settings::default();
        settings.validate()?;
        Ok(settings)
    }
}
