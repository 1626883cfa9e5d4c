/// canipull - can this AKS cluster pull from that container registry?
///
/// Walks through DNS resolution, region match, credential validation and the
/// registry token exchange, and reports the first failing step through the
/// process exit code.
mod azure;
mod checker;
mod config;
mod dns;
mod error;
mod exitcode;
mod location;
mod logger;
#[cfg(test)]
mod testutil;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::azure::AcrTokenExchanger;
use crate::checker::{CheckOptions, Checker};
use crate::config::DEFAULT_AZURE_CONFIG_PATH;
use crate::dns::SystemResolver;
use crate::exitcode::ExitOutcome;
use crate::logger::{Logger, DEFAULT_VERBOSITY};

#[derive(Parser)]
#[command(name = "canipull")]
#[command(
    about = "Check whether an AKS cluster can pull images from an Azure container registry",
    long_about = None
)]
struct Cli {
    /// Registry FQDN (e.g., myacr.azurecr.io)
    registry: Option<String>,

    /// Output verbosity level
    #[arg(short, long, default_value_t = DEFAULT_VERBOSITY)]
    verbose: u8,

    /// The azure.json config file path
    #[arg(long, default_value = DEFAULT_AZURE_CONFIG_PATH)]
    config: PathBuf,

    /// Cloud environment file, used when the cloud is AzureStackCloud
    #[arg(long, env = "AZURE_ENVIRONMENT_FILEPATH")]
    environment_file: Option<PathBuf>,

    /// Timeout in seconds for each outbound HTTP request
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = Logger::new(cli.verbose);

    // Initialize tracing
    let log_level = if logger.verbosity() >= 6 {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("canipull={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let Some(registry) = cli.registry.as_deref() else {
        println!("No ACR input. Expect `canipull myacr.azurecr.io`.");
        return ExitCode::SUCCESS;
    };

    match check(&cli, logger, registry).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            error!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Build the clients and run the checklist against `registry`
async fn check(cli: &Cli, logger: Logger, registry: &str) -> Result<ExitOutcome> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()
        .context("Failed to create HTTP client")?;

    let resolver = match SystemResolver::from_system_conf() {
        Ok(resolver) => resolver,
        Err(e) => {
            logger.v(2).info(format!("Checking CNAME ({}): FAILED", registry));
            logger.v(2).info(format!("{:#}", e));
            return Ok(ExitOutcome::DnsResolutionFailure);
        }
    };

    let options = CheckOptions {
        config_path: cli.config.clone(),
        environment_file: cli.environment_file.clone(),
        ..CheckOptions::default()
    };

    let checker = Checker::new(
        logger,
        resolver,
        AcrTokenExchanger::new(client.clone()),
        client,
        options,
    );

    Ok(checker.execute(registry).await)
}
