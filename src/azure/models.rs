/// Azure AD, metadata service and registry wire models
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque bearer token issued by an identity provider or registry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keep bearer tokens out of debug output
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} bytes>)", self.0.len())
    }
}

/// Token response from the metadata service or the AAD token endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub token_type: String,
}

/// Response of the registry `/oauth2/exchange` endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeResponse {
    #[serde(default)]
    pub refresh_token: String,
}

/// Error body returned by AAD
#[derive(Debug, Clone, Deserialize)]
pub struct AadErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

/// Custom cloud environment file (Azure Stack)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentFile {
    pub name: String,
    #[serde(rename = "activeDirectoryEndpoint")]
    pub active_directory_endpoint: String,
    #[serde(rename = "resourceManagerEndpoint")]
    pub resource_manager_endpoint: String,
    #[serde(rename = "containerRegistryDNSSuffix")]
    pub container_registry_dns_suffix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_debug_hides_value() {
        let token = AccessToken::new("secret-token");
        assert_eq!(format!("{:?}", token), "AccessToken(<12 bytes>)");
        assert_eq!(token.to_string(), "secret-token");
    }

    #[test]
    fn test_aad_error_body() {
        let body = r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret"}"#;
        let parsed: AadErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error, "invalid_client");
        assert!(parsed.error_description.starts_with("AADSTS7000215"));
    }
}
