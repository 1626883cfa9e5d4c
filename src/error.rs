//! Checklist failures and their exit code mapping

use thiserror::Error;

use crate::azure::{CloudError, ExchangeError, TokenError};
use crate::config::ConfigError;
use crate::dns::DnsError;
use crate::exitcode::ExitOutcome;

/// First failure that aborted the checklist
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("DNS check failed: {0}")]
    Dns(#[from] DnsError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cloud environment error: {0}")]
    Cloud(#[from] CloudError),

    #[error("Credential error: {0}")]
    Credential(#[from] TokenError),

    #[error("Image pull permission error: {0}")]
    Permission(#[from] ExchangeError),
}

impl CheckError {
    pub fn outcome(&self) -> ExitOutcome {
        match self {
            CheckError::Dns(_) => ExitOutcome::DnsResolutionFailure,
            CheckError::Config(ConfigError::NotFound { .. }) => ExitOutcome::AzureConfigNotFound,
            CheckError::Config(ConfigError::Read { .. }) => ExitOutcome::AzureConfigReadFailure,
            CheckError::Config(ConfigError::Parse { .. }) => {
                ExitOutcome::AzureConfigUnmarshalFailure
            }
            CheckError::Cloud(_) => ExitOutcome::AzureCloudUnknown,
            CheckError::Credential(_) => ExitOutcome::ServicePrincipalCredentialInvalid,
            CheckError::Permission(_) => ExitOutcome::MissingImagePullPermission,
        }
    }
}
