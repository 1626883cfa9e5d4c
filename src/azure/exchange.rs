/// Registry token exchange (ARM access token -> registry refresh token)
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::models::{AccessToken, ExchangeResponse};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("failed to send token exchange request to {registry}: {source}")]
    Request {
        registry: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("token exchange returned error status: {status}. body: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to unmarshal token exchange response: {0}")]
    InvalidResponse(String),
}

/// Exchanges an ARM token for a registry-scoped token
#[async_trait]
pub trait RegistryTokenExchanger: Send + Sync {
    async fn exchange_acr_access_token(
        &self,
        arm_token: &AccessToken,
        registry: &str,
        tenant_id: Option<&str>,
    ) -> Result<AccessToken, ExchangeError>;
}

/// Exchanger talking to the registry's `/oauth2/exchange` endpoint
#[derive(Clone)]
pub struct AcrTokenExchanger {
    client: Client,
    scheme: String,
}

impl AcrTokenExchanger {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            scheme: "https".to_string(),
        }
    }

    /// Use a different URL scheme for the registry endpoint
    #[allow(dead_code)]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    fn exchange_url(&self, registry: &str) -> String {
        format!("{}://{}/oauth2/exchange", self.scheme, registry)
    }
}

#[async_trait]
impl RegistryTokenExchanger for AcrTokenExchanger {
    async fn exchange_acr_access_token(
        &self,
        arm_token: &AccessToken,
        registry: &str,
        tenant_id: Option<&str>,
    ) -> Result<AccessToken, ExchangeError> {
        let url = self.exchange_url(registry);
        debug!("POST {}", url);

        let mut form = vec![
            ("grant_type", "access_token"),
            ("service", registry),
            ("access_token", arm_token.as_str()),
        ];
        if let Some(tenant) = tenant_id.filter(|t| !t.is_empty()) {
            form.push(("tenant", tenant));
        }

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|source| ExchangeError::Request {
                registry: registry.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ExchangeError::Request {
                registry: registry.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let exchange: ExchangeResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;

        if exchange.refresh_token.is_empty() {
            return Err(ExchangeError::InvalidResponse(
                "refresh_token is empty".to_string(),
            ));
        }

        Ok(AccessToken::new(exchange.refresh_token))
    }
}
