/// ARM access token acquisition (managed identity and service principal)
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::cloud::CloudEnvironment;
use super::models::{AadErrorResponse, AccessToken, TokenResponse};

/// Instance metadata service token endpoint
pub const MSI_METADATA_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// API version sent to the metadata service
pub const MSI_API_VERSION: &str = "2018-02-01";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to send {endpoint} request: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned error status: {status}. body: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to unmarshal {endpoint} response: {message}")]
    InvalidResponse {
        endpoint: &'static str,
        message: String,
    },

    #[error("tenant ID is required for service principal sign in")]
    MissingTenant,
}

/// Something that can produce an ARM access token
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire_arm_token(&self) -> Result<AccessToken, TokenError>;
}

/// Token retrieval through the instance metadata service
pub struct ManagedIdentityCredential {
    client: Client,
    metadata_endpoint: String,
    resource: String,
    client_id: String,
    resource_id: String,
}

impl ManagedIdentityCredential {
    /// Identity selected by client ID, or by resource ID when the client ID is empty
    pub fn new(
        client: Client,
        env: &CloudEnvironment,
        client_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            metadata_endpoint: MSI_METADATA_ENDPOINT.to_string(),
            resource: env.resource_manager_endpoint.clone(),
            client_id: client_id.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Override the metadata endpoint
    pub fn with_metadata_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metadata_endpoint = endpoint.into();
        self
    }

    fn request_url(&self) -> Result<Url, TokenError> {
        let mut url =
            Url::parse(&self.metadata_endpoint).map_err(|source| TokenError::InvalidEndpoint {
                endpoint: self.metadata_endpoint.clone(),
                source,
            })?;

        {
            let mut query = url.query_pairs_mut();
            if self.client_id.is_empty() {
                query.append_pair("mi_res_id", &self.resource_id);
            } else {
                query.append_pair("client_id", &self.client_id);
            }
            query.append_pair("resource", &self.resource);
            query.append_pair("api-version", MSI_API_VERSION);
        }

        Ok(url)
    }
}

#[async_trait]
impl TokenSource for ManagedIdentityCredential {
    async fn acquire_arm_token(&self) -> Result<AccessToken, TokenError> {
        const ENDPOINT: &str = "Metadata endpoint";

        let url = self.request_url()?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|source| TokenError::Request {
                endpoint: ENDPOINT,
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| TokenError::Request {
            endpoint: ENDPOINT,
            source,
        })?;

        if status != reqwest::StatusCode::OK {
            return Err(TokenError::Status {
                endpoint: ENDPOINT,
                status: status.as_u16(),
                body,
            });
        }

        parse_token_response(ENDPOINT, &body)
    }
}

/// OAuth2 client-credentials sign in against Azure AD
pub struct ServicePrincipalCredential {
    client: Client,
    active_directory_endpoint: String,
    resource: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ServicePrincipalCredential {
    pub fn new(
        client: Client,
        env: &CloudEnvironment,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            active_directory_endpoint: env.active_directory_endpoint.clone(),
            resource: env.resource_manager_endpoint.clone(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// `{authority}/{tenant}/oauth2/token`
    fn token_url(&self) -> Result<Url, TokenError> {
        if self.tenant_id.trim().is_empty() {
            return Err(TokenError::MissingTenant);
        }

        let authority = if self.active_directory_endpoint.ends_with('/') {
            self.active_directory_endpoint.clone()
        } else {
            format!("{}/", self.active_directory_endpoint)
        };

        Url::parse(&authority)
            .and_then(|base| base.join(&format!("{}/oauth2/token", self.tenant_id)))
            .map_err(|source| TokenError::InvalidEndpoint {
                endpoint: authority,
                source,
            })
    }
}

#[async_trait]
impl TokenSource for ServicePrincipalCredential {
    async fn acquire_arm_token(&self) -> Result<AccessToken, TokenError> {
        const ENDPOINT: &str = "AAD token endpoint";

        let url = self.token_url()?;
        debug!("POST {}", url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("resource", self.resource.as_str()),
        ];

        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|source| TokenError::Request {
                endpoint: ENDPOINT,
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| TokenError::Request {
            endpoint: ENDPOINT,
            source,
        })?;

        if !status.is_success() {
            // AAD puts the actionable AADSTS code in error_description
            let body = match serde_json::from_str::<AadErrorResponse>(&body) {
                Ok(err) => format!("{}: {}", err.error, err.error_description),
                Err(_) => body,
            };
            return Err(TokenError::Status {
                endpoint: ENDPOINT,
                status: status.as_u16(),
                body,
            });
        }

        parse_token_response(ENDPOINT, &body)
    }
}

fn parse_token_response(endpoint: &'static str, body: &str) -> Result<AccessToken, TokenError> {
    let token: TokenResponse =
        serde_json::from_str(body).map_err(|e| TokenError::InvalidResponse {
            endpoint,
            message: e.to_string(),
        })?;

    if token.access_token.is_empty() {
        return Err(TokenError::InvalidResponse {
            endpoint,
            message: "access_token is empty".to_string(),
        });
    }

    Ok(AccessToken::new(token.access_token))
}
