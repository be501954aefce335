mod cli;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ht_domain::config::{Config, ObservabilityConfig};
use ht_engine::TriageEngine;

use crate::cli::{Cli, Command, ConfigCommand, ModelCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli::config_path(cli.config);
    let config = Config::load_or_default(&config_path);
    init_tracing(&config.observability);

    match cli.command {
        Command::Config(ConfigCommand::Validate) => {
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            return Ok(());
        }
        Command::Config(ConfigCommand::Show) => return cli::config::show(&config),
        _ => {}
    }

    let engine = TriageEngine::from_config(&config).context("building triage engine")?;

    let ok = match cli.command {
        Command::Run {
            text,
            image,
            offline,
        } => cli::run::run(&engine, text, image.as_deref(), offline).await?,
        Command::History { limit } => {
            cli::run::history(&engine, limit).await?;
            true
        }
        Command::Unsynced => {
            cli::run::unsynced(&engine).await?;
            true
        }
        Command::Sync => {
            cli::run::sync(&engine).await?;
            true
        }
        Command::Model(ModelCommand::Load) => cli::run::model_load(&engine).await?,
        Command::Model(ModelCommand::Status) => {
            cli::run::model_status(&engine).await?;
            true
        }
        Command::Clear => {
            cli::run::clear(&engine).await?;
            true
        }
        Command::Config(_) => true,
    };

    engine.unload_model().await;

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize logging on stderr so stdout stays machine-readable.
///
/// `RUST_LOG` takes precedence over `observability.log_filter`.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if obs.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
