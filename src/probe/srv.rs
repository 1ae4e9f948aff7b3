//! `_minecraft._tcp` SRV resolution for Java addresses
//!
//! Java servers are often listed by a bare hostname whose SRV record points
//! at the real host and port. Addresses that carry a port, or are IP
//! literals, skip the lookup. A missing record or a failed lookup falls back
//! to the host itself on the default port, which then resolves through A/AAAA
//! at connect time.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use std::fmt;
use std::net::IpAddr;

use super::Endpoint;
use crate::error::ProbeError;

/// One SRV answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

/// Capability to look up SRV records
#[async_trait]
pub trait SrvResolver: Send + Sync + fmt::Debug {
    /// Return every record for `name`; an empty list means none exist
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, ProbeError>;
}

/// SRV lookups through the system's DNS configuration
#[derive(Clone)]
pub struct DnsSrvResolver {
    resolver: TokioAsyncResolver,
}

impl DnsSrvResolver {
    /// Use `/etc/resolv.conf`, or public defaults when it cannot be read
    pub fn from_system() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "System DNS config unavailable, using defaults");
            TokioAsyncResolver::tokio(Default::default(), Default::default())
        });
        Self { resolver }
    }
}

impl fmt::Debug for DnsSrvResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsSrvResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl SrvResolver for DnsSrvResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, ProbeError> {
        let lookup = match self.resolver.srv_lookup(name).await {
            Ok(lookup) => lookup,
            Err(e) if matches!(e.kind(), hickory_resolver::error::ResolveErrorKind::NoRecordsFound { .. }) => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(ProbeError::Resolve(e.to_string())),
        };

        Ok(lookup
            .iter()
            .map(|srv| SrvRecord {
                priority: srv.priority(),
                weight: srv.weight(),
                port: srv.port(),
                target: srv.target().to_utf8(),
            })
            .collect())
    }
}

/// SRV name queried for a Java host
pub fn service_name(host: &str) -> String {
    format!("_minecraft._tcp.{}", host.trim_end_matches('.'))
}

/// Pick the lowest priority, then the highest weight
pub fn select(records: &[SrvRecord]) -> Option<&SrvRecord> {
    records
        .iter()
        .filter(|record| !record.target.trim_end_matches('.').is_empty())
        .min_by(|a, b| a.priority.cmp(&b.priority).then(b.weight.cmp(&a.weight)))
}

/// Where a Java endpoint should actually be contacted
pub async fn resolve_java(resolver: &dyn SrvResolver, endpoint: Endpoint) -> Endpoint {
    if endpoint.explicit_port || endpoint.host.parse::<IpAddr>().is_ok() {
        return endpoint;
    }

    let name = service_name(&endpoint.host);
    let records = match resolver.lookup_srv(&name).await {
        Ok(records) => records,
        Err(e) => {
            tracing::debug!(name = %name, error = %e, "SRV lookup failed, using host directly");
            return endpoint;
        }
    };

    match select(&records) {
        Some(record) => {
            tracing::debug!(name = %name, target = %record.target, port = record.port, "Using SRV record");
            Endpoint {
                host: record.target.trim_end_matches('.').to_string(),
                port: record.port,
                explicit_port: true,
            }
        }
        None => endpoint,
    }
}
