/// Cluster cloud-provider configuration (azure.json)
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// Default location of the cloud-provider config on AKS nodes
pub const DEFAULT_AZURE_CONFIG_PATH: &str = "/etc/kubernetes/azure.json";

/// Marker used in both client ID and secret when the kubelet uses managed identity
pub const MANAGED_IDENTITY_MARKER: &str = "msi";

/// Errors raised while loading the cluster configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {path}: {source}")]
    NotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Cloud identity configuration of the cluster
///
/// Missing keys deserialize as empty strings, unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cloud name (e.g., "AzurePublicCloud")
    pub cloud: String,

    /// Cluster region (e.g., "eastus")
    pub location: String,

    #[serde(rename = "tenantId")]
    pub tenant_id: String,

    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,

    #[serde(rename = "resourceGroup")]
    pub resource_group: String,

    #[serde(rename = "aadClientId")]
    pub aad_client_id: String,

    #[serde(rename = "aadClientSecret")]
    pub aad_client_secret: String,

    /// Client ID of the kubelet user-assigned managed identity
    #[serde(rename = "userAssignedIdentityID")]
    pub user_assigned_identity_id: String,

    #[serde(rename = "useManagedIdentityExtension")]
    pub use_managed_identity_extension: bool,

    #[serde(rename = "vmType")]
    pub vm_type: String,
}

/// How the cluster authenticates against Azure AD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    ManagedIdentity,
    ServicePrincipal,
}

impl ClusterConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        if let Err(source) = std::fs::metadata(path) {
            return Err(ConfigError::NotFound {
                path: display,
                source,
            });
        }

        let content = std::fs::read(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ConfigError::NotFound {
                path: display.clone(),
                source,
            },
            _ => ConfigError::Read {
                path: display.clone(),
                source,
            },
        })?;

        Self::from_slice(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Parse configuration from raw JSON bytes
    pub fn from_slice(content: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(content)
    }

    /// Managed identity is selected only when both client ID and secret carry the marker
    pub fn identity_mode(&self) -> IdentityMode {
        if self.aad_client_id == MANAGED_IDENTITY_MARKER
            && self.aad_client_secret == MANAGED_IDENTITY_MARKER
        {
            IdentityMode::ManagedIdentity
        } else {
            IdentityMode::ServicePrincipal
        }
    }

    /// Copy of the configuration with the client secret masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.aad_client_secret.is_empty()
            && config.aad_client_secret != MANAGED_IDENTITY_MARKER
        {
            config.aad_client_secret = "<redacted>".to_string();
        }
        config
    }
}
