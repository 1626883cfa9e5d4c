/// Image pull readiness checklist
use reqwest::Client;
use std::path::PathBuf;

use crate::azure::token::MSI_METADATA_ENDPOINT;
use crate::azure::{
    CloudEnvironment, ManagedIdentityCredential, RegistryTokenExchanger,
    ServicePrincipalCredential, TokenSource,
};
use crate::config::{ClusterConfig, ConfigError, IdentityMode, DEFAULT_AZURE_CONFIG_PATH};
use crate::dns::{check_registry_dns, DnsError, NameResolver};
use crate::error::CheckError;
use crate::exitcode::ExitOutcome;
use crate::location::{check_region, RegionCheck};
use crate::logger::Logger;

/// Inputs that do not come from azure.json
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub config_path: PathBuf,
    /// Environment file used when the cloud is AzureStackCloud
    pub environment_file: Option<PathBuf>,
    pub metadata_endpoint: String,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_AZURE_CONFIG_PATH),
            environment_file: None,
            metadata_endpoint: MSI_METADATA_ENDPOINT.to_string(),
        }
    }
}

/// Runs the checks in order, stopping at the first failure
pub struct Checker<R, X> {
    logger: Logger,
    resolver: R,
    exchanger: X,
    client: Client,
    options: CheckOptions,
}

impl<R: NameResolver, X: RegistryTokenExchanger> Checker<R, X> {
    pub fn new(
        logger: Logger,
        resolver: R,
        exchanger: X,
        client: Client,
        options: CheckOptions,
    ) -> Self {
        Self {
            logger,
            resolver,
            exchanger,
            client,
            options,
        }
    }

    /// Run the checklist and map the result onto an exit outcome
    pub async fn execute(&self, registry: &str) -> ExitOutcome {
        match self.run(registry).await {
            Ok(()) => ExitOutcome::Success,
            Err(e) => {
                let outcome = e.outcome();
                self.logger
                    .v(4)
                    .info(format!("Exiting with {} ({})", outcome, outcome.code()));
                outcome
            }
        }
    }

    pub async fn run(&self, registry: &str) -> Result<(), CheckError> {
        let log = &self.logger;

        let endpoint = check_registry_dns(&self.resolver, registry, log)
            .await
            .map_err(|e| {
                match &e {
                    DnsError::Host { message, .. } => log.v(2).info(format!(
                        "Failed to resolve specified fqdn {}: {}",
                        registry, message
                    )),
                    DnsError::CanonicalName { message, .. } => log
                        .v(2)
                        .info(format!("Failed to get CNAME of the ACR: {}", message)),
                }
                e
            })?;

        let config = self.load_config()?;

        match check_region(endpoint.region.as_deref(), &config.location) {
            RegionCheck::Match => log
                .v(4)
                .info("Checking ACR location matches cluster location: SUCCEEDED"),
            RegionCheck::Mismatch {
                registry: acr_location,
                cluster,
            } => {
                log.v(2)
                    .info("Checking ACR location matches cluster location: FAILED");
                log.v(2).info(format!(
                    "ACR location '{}' does not match your cluster location '{}'. This may result in slow image pulls and extra cost.",
                    acr_location, cluster
                ));
            }
            RegionCheck::PrivateLink => log.v(4).info(format!(
                "ACR {} is reached through a private endpoint, skipping location check",
                endpoint.host
            )),
            RegionCheck::Unknown => log.v(2).info(format!(
                "Could not infer ACR location from canonical name '{}', skipping location check",
                endpoint.canonical_name
            )),
        }

        let mode = config.identity_mode();
        match mode {
            IdentityMode::ManagedIdentity => log.v(2).info("Checking managed identity..."),
            IdentityMode::ServicePrincipal => {
                log.v(4).info("The cluster uses service principal.")
            }
        }

        log.v(6).info(format!("Cluster cloud name: {}", config.cloud));
        let environment_file = self.options.environment_file.as_deref();
        let env = CloudEnvironment::from_name(&config.cloud, environment_file).map_err(|e| {
            log.v(2)
                .info(format!("Unknown Azure cloud name: {}", config.cloud));
            log.v(6).info(&e);
            e
        })?;

        let suffix = format!(".{}", env.container_registry_dns_suffix);
        if !env.container_registry_dns_suffix.is_empty() && !registry.ends_with(&suffix) {
            log.v(4).info(format!(
                "Registry {} is not under the {} registry domain {}",
                registry, env.name, env.container_registry_dns_suffix
            ));
        }

        match mode {
            IdentityMode::ManagedIdentity => {
                log.v(2).info(format!(
                    "Kubelet managed identity client ID: {}",
                    config.user_assigned_identity_id
                ));
                let credential = ManagedIdentityCredential::new(
                    self.client.clone(),
                    &env,
                    config.user_assigned_identity_id.clone(),
                    "",
                )
                .with_metadata_endpoint(self.options.metadata_endpoint.clone());
                self.validate_pull(&credential, mode, registry, &config).await
            }
            IdentityMode::ServicePrincipal => {
                let credential = ServicePrincipalCredential::new(
                    self.client.clone(),
                    &env,
                    config.tenant_id.clone(),
                    config.aad_client_id.clone(),
                    config.aad_client_secret.clone(),
                );
                self.validate_pull(&credential, mode, registry, &config).await
            }
        }
    }

    fn load_config(&self) -> Result<ClusterConfig, ConfigError> {
        let log = &self.logger;
        let path = &self.options.config_path;

        log.v(6)
            .info(format!("Loading azure.json file from {}", path.display()));

        match ClusterConfig::from_file(path) {
            Ok(config) => {
                if log.v(6).enabled() {
                    if let Ok(json) = serde_json::to_string_pretty(&config.redacted()) {
                        log.v(6).info(format!("Loaded azure.json:\n{}", json));
                    }
                }
                Ok(config)
            }
            Err(e) => {
                match &e {
                    ConfigError::NotFound { .. } => log.v(2).info(
                        "Failed to load azure.json. Are you running inside Kubernetes on Azure?",
                    ),
                    ConfigError::Read { source, .. } => {
                        log.v(2).info(format!("Failed to read azure.json file: {}", source))
                    }
                    ConfigError::Parse { source, .. } => {
                        log.v(2).info(format!("Failed to read azure.json file: {}", source))
                    }
                }
                Err(e)
            }
        }
    }

    /// Acquire an ARM token and exchange it for a registry token
    async fn validate_pull<T: TokenSource>(
        &self,
        source: &T,
        mode: IdentityMode,
        registry: &str,
        config: &ClusterConfig,
    ) -> Result<(), CheckError> {
        let log = &self.logger;

        let (check, failure) = match mode {
            IdentityMode::ManagedIdentity => (
                "Validating managed identity existence",
                "Getting managed identity token failed with",
            ),
            IdentityMode::ServicePrincipal => (
                "Validating service principal credential",
                "Sign in to AAD failed with",
            ),
        };

        let arm_token = match source.acquire_arm_token().await {
            Ok(token) => token,
            Err(e) => {
                log.v(2).info(format!("{}: FAILED", check));
                log.v(2).info(format!("{}: {}", failure, e));
                return Err(e.into());
            }
        };
        log.v(2).info(format!("{}: SUCCEEDED", check));
        log.v(9).info(format!("ARM access token: {}", arm_token));

        let acr_token = match self
            .exchanger
            .exchange_acr_access_token(&arm_token, registry, Some(config.tenant_id.as_str()))
            .await
        {
            Ok(token) => token,
            Err(e) => {
                log.v(2).info("Validating image pull permission: FAILED");
                log.v(2)
                    .info(format!("ACR {} rejected token exchange: {}", registry, e));
                return Err(e.into());
            }
        };
        log.v(2).info("Validating image pull permission: SUCCEEDED");
        log.v(9).info(format!("ACR access token: {}", acr_token));
        log.v(2)
            .info(format!("Your cluster can pull images from {}!", registry));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::AcrTokenExchanger;
    use crate::dns::StaticResolver;
    use crate::testutil::serve;
    use axum::extract::Form;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::io::Write;

    const CNAME: &str = "registry.eastus.cloudapp.net.";

    /// Mock AAD + registry; the registry accepts only `allowed_token`
    fn cloud_router(allowed_token: &'static str) -> Router {
        Router::new()
            .route(
                "/:tenant/oauth2/token",
                post(|| async {
                    Json(serde_json::json!({"access_token": "arm-token", "token_type": "Bearer"}))
                }),
            )
            .route(
                "/metadata/identity/oauth2/token",
                get(|| async { (StatusCode::NOT_FOUND, "identity not found") }),
            )
            .route(
                "/oauth2/exchange",
                post(move |Form(form): Form<HashMap<String, String>>| async move {
                    if form.get("access_token").map(String::as_str) == Some(allowed_token) {
                        (
                            StatusCode::OK,
                            Json(serde_json::json!({"refresh_token": "acr-token"})),
                        )
                    } else {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(serde_json::json!({"errors": [{"code": "UNAUTHORIZED"}]})),
                        )
                    }
                }),
            )
    }

    struct Scenario {
        _dir: tempfile::TempDir,
        registry: String,
        options: CheckOptions,
    }

    /// Write azure.json plus an AzureStackCloud environment file pointing at `base`
    fn scenario(base: &str, azure_json: serde_json::Value) -> Scenario {
        let dir = tempfile::tempdir().unwrap();

        let config_path = dir.path().join("azure.json");
        std::fs::write(&config_path, azure_json.to_string()).unwrap();

        let env_path = dir.path().join("environment.json");
        let mut env_file = std::fs::File::create(&env_path).unwrap();
        write!(
            env_file,
            "{}",
            serde_json::json!({
                "name": "AzureStackCloud",
                "activeDirectoryEndpoint": format!("{}/", base),
                "resourceManagerEndpoint": "https://management.azure.com/",
                "containerRegistryDNSSuffix": "azurecr.io"
            })
        )
        .unwrap();

        Scenario {
            _dir: dir,
            registry: base.trim_start_matches("http://").to_string(),
            options: CheckOptions {
                config_path,
                environment_file: Some(env_path),
                metadata_endpoint: format!("{}/metadata/identity/oauth2/token", base),
            },
        }
    }

    fn service_principal_config() -> serde_json::Value {
        serde_json::json!({
            "cloud": "AzureStackCloud",
            "location": "East US",
            "tenantId": "tenant",
            "aadClientId": "client",
            "aadClientSecret": "secret"
        })
    }

    fn checker(
        s: &Scenario,
        resolver: StaticResolver,
    ) -> Checker<StaticResolver, AcrTokenExchanger> {
        let client = Client::new();
        Checker::new(
            Logger::new(0),
            resolver,
            AcrTokenExchanger::new(client.clone()).with_scheme("http"),
            client,
            s.options.clone(),
        )
    }

    #[tokio::test]
    async fn test_service_principal_can_pull() {
        let base = serve(cloud_router("arm-token")).await;
        let s = scenario(&base, service_principal_config());
        let resolver = StaticResolver::default().with_cname(&s.registry, CNAME);

        let outcome = checker(&s, resolver).execute(&s.registry).await;
        assert_eq!(outcome, ExitOutcome::Success);
    }

    #[tokio::test]
    async fn test_registry_rejects_exchange() {
        let base = serve(cloud_router("some-other-token")).await;
        let s = scenario(&base, service_principal_config());
        let resolver = StaticResolver::default().with_cname(&s.registry, CNAME);

        let outcome = checker(&s, resolver).execute(&s.registry).await;
        assert_eq!(outcome, ExitOutcome::MissingImagePullPermission);
        assert_eq!(outcome.code(), 60);
    }

    #[tokio::test]
    async fn test_managed_identity_not_found() {
        let base = serve(cloud_router("arm-token")).await;
        let s = scenario(
            &base,
            serde_json::json!({
                "cloud": "AzureStackCloud",
                "location": "eastus",
                "tenantId": "tenant",
                "aadClientId": "msi",
                "aadClientSecret": "msi",
                "userAssignedIdentityID": "kubelet-identity"
            }),
        );
        let resolver = StaticResolver::default().with_cname(&s.registry, CNAME);

        let err = checker(&s, resolver).run(&s.registry).await.unwrap_err();
        assert_eq!(err.outcome(), ExitOutcome::ServicePrincipalCredentialInvalid);
        assert_eq!(err.outcome().code(), 10);
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_dns_failure_skips_config() {
        let dir = tempfile::tempdir().unwrap();
        let options = CheckOptions {
            config_path: dir.path().join("missing.json"),
            ..CheckOptions::default()
        };
        let client = Client::new();
        let checker = Checker::new(
            Logger::new(0),
            StaticResolver::default(),
            AcrTokenExchanger::new(client.clone()),
            client,
            options,
        );

        let err = checker.run("nope.azurecr.io").await.unwrap_err();
        assert!(matches!(err, CheckError::Dns(_)));
        assert_eq!(err.outcome().code(), 52);
    }

    #[tokio::test]
    async fn test_cname_failure_is_dns_failure() {
        let client = Client::new();
        let checker = Checker::new(
            Logger::new(0),
            StaticResolver::default().with_cname_failure("myacr.azurecr.io"),
            AcrTokenExchanger::new(client.clone()),
            client,
            CheckOptions::default(),
        );

        let outcome = checker.execute("myacr.azurecr.io").await;
        assert_eq!(outcome, ExitOutcome::DnsResolutionFailure);
    }

    #[tokio::test]
    async fn test_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let client = Client::new();
        let checker = Checker::new(
            Logger::new(0),
            StaticResolver::default().with_cname("myacr.azurecr.io", CNAME),
            AcrTokenExchanger::new(client.clone()),
            client,
            CheckOptions {
                config_path: dir.path().join("azure.json"),
                ..CheckOptions::default()
            },
        );

        let outcome = checker.execute("myacr.azurecr.io").await;
        assert_eq!(outcome, ExitOutcome::AzureConfigNotFound);
    }

    #[tokio::test]
    async fn test_config_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"cloud\": ").unwrap();
        let client = Client::new();
        let checker = Checker::new(
            Logger::new(0),
            StaticResolver::default().with_cname("myacr.azurecr.io", CNAME),
            AcrTokenExchanger::new(client.clone()),
            client,
            CheckOptions {
                config_path: file.path().to_path_buf(),
                ..CheckOptions::default()
            },
        );

        let outcome = checker.execute("myacr.azurecr.io").await;
        assert_eq!(outcome, ExitOutcome::AzureConfigUnmarshalFailure);
    }

    #[tokio::test]
    async fn test_unknown_cloud() {
        for config in [
            serde_json::json!({"cloud": "AzureMoonCloud", "aadClientId": "msi", "aadClientSecret": "msi"}),
            serde_json::json!({"cloud": "AzureMoonCloud", "tenantId": "t", "aadClientId": "c", "aadClientSecret": "s"}),
        ] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, "{}", config).unwrap();
            let client = Client::new();
            let checker = Checker::new(
                Logger::new(0),
                StaticResolver::default().with_cname("myacr.azurecr.io", CNAME),
                AcrTokenExchanger::new(client.clone()),
                client,
                CheckOptions {
                    config_path: file.path().to_path_buf(),
                    ..CheckOptions::default()
                },
            );

            let outcome = checker.execute("myacr.azurecr.io").await;
            assert_eq!(outcome, ExitOutcome::AzureCloudUnknown);
        }
    }

    #[tokio::test]
    async fn test_region_mismatch_is_not_fatal() {
        let base = serve(cloud_router("arm-token")).await;
        let mut config = service_principal_config();
        config["location"] = serde_json::json!("westeurope");
        let s = scenario(&base, config);
        let resolver = StaticResolver::default().with_cname(&s.registry, CNAME);

        let outcome = checker(&s, resolver).execute(&s.registry).await;
        assert_eq!(outcome, ExitOutcome::Success);
    }
}
