/// Registry hostname and canonical name resolution
use async_trait::async_trait;
use thiserror::Error;
use trust_dns_resolver::proto::rr::RecordType;
use trust_dns_resolver::TokioAsyncResolver;

use crate::location::registry_region;
use crate::logger::Logger;

/// DNS lookup failures
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("failed to resolve {host}: {message}")]
    Host { host: String, message: String },

    #[error("failed to get CNAME of {host}: {message}")]
    CanonicalName { host: String, message: String },
}

/// Name resolution used by the checklist
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve a hostname, erroring when it has no address records
    async fn lookup_host(&self, host: &str) -> Result<(), String>;

    /// Canonical name of a hostname after following CNAME records
    async fn lookup_cname(&self, host: &str) -> Result<String, String>;
}

/// Resolver backed by the host's resolver configuration
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    /// Create a resolver from /etc/resolv.conf (or the platform equivalent)
    pub fn from_system_conf() -> anyhow::Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| anyhow::anyhow!("Failed to read system DNS configuration: {}", e))?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl NameResolver for SystemResolver {
    async fn lookup_host(&self, host: &str) -> Result<(), String> {
        let mut addrs = tokio::net::lookup_host((host, 443))
            .await
            .map_err(|e| e.to_string())?;

        match addrs.next() {
            Some(_) => Ok(()),
            None => Err("no addresses found".to_string()),
        }
    }

    async fn lookup_cname(&self, host: &str) -> Result<String, String> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| e.to_string())?;

        // The owner of the first address record is the end of the CNAME chain
        let canonical = lookup
            .as_lookup()
            .record_iter()
            .find(|r| matches!(r.record_type(), RecordType::A | RecordType::AAAA))
            .map(|r| r.name().to_utf8())
            .unwrap_or_else(|| host.to_string());

        Ok(canonical)
    }
}

/// Registry hostname together with what DNS revealed about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoint {
    pub host: String,
    pub canonical_name: String,
    pub region: Option<String>,
}

/// Resolve the registry host and infer its region from the canonical name
pub async fn check_registry_dns<R: NameResolver + ?Sized>(
    resolver: &R,
    host: &str,
    logger: &Logger,
) -> Result<RegistryEndpoint, DnsError> {
    if let Err(message) = resolver.lookup_host(host).await {
        logger
            .v(2)
            .info(format!("Checking host name resolution ({}): FAILED", host));
        return Err(DnsError::Host {
            host: host.to_string(),
            message,
        });
    }
    logger
        .v(2)
        .info(format!("Checking host name resolution ({}): SUCCEEDED", host));

    let canonical_name = match resolver.lookup_cname(host).await {
        Ok(cname) => cname,
        Err(message) => {
            logger.v(2).info(format!("Checking CNAME ({}): FAILED", host));
            return Err(DnsError::CanonicalName {
                host: host.to_string(),
                message,
            });
        }
    };
    logger.v(2).info(format!(
        "Canonical name for ACR ({}): {}",
        host, canonical_name
    ));

    let region = registry_region(&canonical_name).map(str::to_string);
    if let Some(region) = region
        .as_deref()
        .filter(|r| !crate::location::is_private_link(r))
    {
        logger.v(2).info(format!("ACR location: {}", region));
    }

    Ok(RegistryEndpoint {
        host: host.to_string(),
        canonical_name,
        region,
    })
}

/// In-memory resolver for tests
#[cfg(test)]
#[derive(Default)]
pub struct StaticResolver {
    entries: std::collections::HashMap<String, String>,
    cname_failures: std::collections::HashSet<String>,
}

#[cfg(test)]
impl StaticResolver {
    pub fn with_cname(mut self, host: &str, cname: &str) -> Self {
        self.entries.insert(host.to_string(), cname.to_string());
        self
    }

    pub fn with_cname_failure(mut self, host: &str) -> Self {
        self.entries.insert(host.to_string(), host.to_string());
        self.cname_failures.insert(host.to_string());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl NameResolver for StaticResolver {
    async fn lookup_host(&self, host: &str) -> Result<(), String> {
        match self.entries.get(host) {
            Some(_) => Ok(()),
            None => Err(format!("lookup {}: no such host", host)),
        }
    }

    async fn lookup_cname(&self, host: &str) -> Result<String, String> {
        if self.cname_failures.contains(host) {
            return Err(format!("lookup {}: server misbehaving", host));
        }
        self.entries
            .get(host)
            .cloned()
            .ok_or_else(|| format!("lookup {}: no such host", host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_region_from_canonical_name() {
        let resolver =
            StaticResolver::default().with_cname("myacr.azurecr.io", "myacr.eastus.cloudapp.net.");
        let endpoint = check_registry_dns(&resolver, "myacr.azurecr.io", &Logger::new(0))
            .await
            .unwrap();

        assert_eq!(endpoint.canonical_name, "myacr.eastus.cloudapp.net.");
        assert_eq!(endpoint.region.as_deref(), Some("eastus"));
    }

    #[tokio::test]
    async fn test_unknown_host() {
        let resolver = StaticResolver::default();
        let err = check_registry_dns(&resolver, "missing.azurecr.io", &Logger::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::Host { .. }));
        assert!(err.to_string().contains("missing.azurecr.io"));
    }

    #[tokio::test]
    async fn test_cname_failure() {
        let resolver = StaticResolver::default().with_cname_failure("myacr.azurecr.io");
        let err = check_registry_dns(&resolver, "myacr.azurecr.io", &Logger::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, DnsError::CanonicalName { .. }));
    }

    #[tokio::test]
    async fn test_private_link_region() {
        let resolver = StaticResolver::default()
            .with_cname("myacr.azurecr.io", "myacr.privatelink.azurecr.io.");
        let endpoint = check_registry_dns(&resolver, "myacr.azurecr.io", &Logger::new(0))
            .await
            .unwrap();
        assert_eq!(endpoint.region.as_deref(), Some("privatelink"));
    }
}
