/// Azure cloud environment endpoints
use std::path::Path;
use thiserror::Error;

use super::models::EnvironmentFile;

const AZURE_STACK_CLOUD: &str = "AzureStackCloud";

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("there is no cloud environment matching the name {0:?}")]
    Unknown(String),

    #[error("{name} requires an environment file (AZURE_ENVIRONMENT_FILEPATH is not set)")]
    MissingEnvironmentFile { name: String },

    #[error("failed to read environment file {path}: {source}")]
    EnvironmentFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse environment file {path}: {source}")]
    EnvironmentFileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Endpoints of a single Azure cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEnvironment {
    pub name: String,
    pub active_directory_endpoint: String,
    pub resource_manager_endpoint: String,
    pub container_registry_dns_suffix: String,
}

impl CloudEnvironment {
    fn known(
        name: &str,
        active_directory_endpoint: &str,
        resource_manager_endpoint: &str,
        container_registry_dns_suffix: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            active_directory_endpoint: active_directory_endpoint.to_string(),
            resource_manager_endpoint: resource_manager_endpoint.to_string(),
            container_registry_dns_suffix: container_registry_dns_suffix.to_string(),
        }
    }

    pub fn public() -> Self {
        Self::known(
            "AzurePublicCloud",
            "https://login.microsoftonline.com/",
            "https://management.azure.com/",
            "azurecr.io",
        )
    }

    pub fn china() -> Self {
        Self::known(
            "AzureChinaCloud",
            "https://login.chinacloudapi.cn/",
            "https://management.chinacloudapi.cn/",
            "azurecr.cn",
        )
    }

    pub fn us_government() -> Self {
        Self::known(
            "AzureUSGovernmentCloud",
            "https://login.microsoftonline.us/",
            "https://management.usgovcloudapi.net/",
            "azurecr.us",
        )
    }

    pub fn german() -> Self {
        Self::known(
            "AzureGermanCloud",
            "https://login.microsoftonline.de/",
            "https://management.microsoftazure.de/",
            "azurecr.de",
        )
    }

    /// Resolve a cloud by name (case-insensitive)
    ///
    /// `AzureStackCloud` is read from `environment_file`; every other name must
    /// be one of the built-in clouds.
    pub fn from_name(name: &str, environment_file: Option<&Path>) -> Result<Self, CloudError> {
        if name.eq_ignore_ascii_case(AZURE_STACK_CLOUD) {
            let path = environment_file.ok_or_else(|| CloudError::MissingEnvironmentFile {
                name: name.to_string(),
            })?;
            return Self::from_file(path);
        }

        [
            Self::public(),
            Self::china(),
            Self::us_government(),
            Self::german(),
        ]
        .into_iter()
        .find(|env| env.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| CloudError::Unknown(name.to_string()))
    }

    /// Load a custom environment from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, CloudError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| CloudError::EnvironmentFileRead {
                path: path.display().to_string(),
                source,
            })?;
        let file: EnvironmentFile =
            serde_json::from_str(&content).map_err(|source| CloudError::EnvironmentFileParse {
                path: path.display().to_string(),
                source,
            })?;

        let name = if file.name.is_empty() {
            AZURE_STACK_CLOUD.to_string()
        } else {
            file.name
        };

        Ok(Self {
            name,
            active_directory_endpoint: file.active_directory_endpoint,
            resource_manager_endpoint: file.resource_manager_endpoint,
            container_registry_dns_suffix: file.container_registry_dns_suffix,
        })
    }
}
