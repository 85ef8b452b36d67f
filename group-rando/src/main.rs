use std::fs::File;

use anyhow::{Context, Result};
use envconfig::Envconfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use group_rando::{cli, config::Config};

async fn run(config: Config) -> Result<()> {
    let list_file = File::open(&config.randomization_list_path)
        .with_context(|| format!("opening {}", config.randomization_list_path))?;
    let group_file =
        File::open(&config.group_path).with_context(|| format!("opening {}", config.group_path))?;

    cli::run(&config, list_file, group_file, std::io::stdout()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the report, logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::init_from_env().context("invalid configuration")?;

    if let Err(e) = run(config).await {
        tracing::error!("randomization failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
