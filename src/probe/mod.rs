//! Status probe boundary
//!
//! A probe performs one wire-level status query against one game server and
//! returns a normalized [`StatusSnapshot`]. Probes fail fast: there is no retry
//! here, the next polling cycle is the retry.
//!
//! The protocol is picked by [`ServerKind`] with a plain `match`, so adding a
//! kind is a compile error everywhere it is not handled.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use mcpulse::models::ServerKind;
//! use mcpulse::probe::{MinecraftProbe, StatusProbe};
//!
//! # async fn example() -> Result<(), mcpulse::error::ProbeError> {
//! let probe = MinecraftProbe::new();
//! let snapshot = probe
//!     .probe("play.example.net", ServerKind::Java, Duration::from_secs(3))
//!     .await?;
//! println!("{} / {} players", snapshot.players.online, snapshot.players.max);
//! # Ok(())
//! # }
//! ```

pub mod bedrock;
pub mod java;
pub mod motd;
pub mod srv;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use srv::{DnsSrvResolver, SrvResolver};

use crate::error::{ConfigError, ProbeError};
use crate::models::{ServerKind, StatusSnapshot};

/// Capability to query a game server's live status
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Query `address` using the protocol for `kind`, giving up after `timeout`
    async fn probe(
        &self,
        address: &str,
        kind: ServerKind,
        timeout: Duration,
    ) -> Result<StatusSnapshot, ProbeError>;
}

/// Host and port of a game server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// The address named its port rather than falling back to the default
    pub explicit_port: bool,
}

impl Endpoint {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`, filling in the kind's default port
    pub fn parse(address: &str, kind: ServerKind) -> Result<Self, ConfigError> {
        let address = address.trim();
        let invalid = || ConfigError::InvalidAddress(address.to_string());

        if address.is_empty() {
            return Err(invalid());
        }

        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(invalid()),
            }
        } else if address.matches(':').count() > 1 {
            // Bare IPv6 literal
            (address, None)
        } else {
            match address.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (address, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }

        let explicit_port = port.is_some();
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => kind.default_port(),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            explicit_port,
        })
    }
}

/// Probe speaking the Java and Bedrock status protocols
#[derive(Debug, Clone)]
pub struct MinecraftProbe {
    /// Protocol version announced in the Java handshake
    protocol_version: i32,
    resolver: Arc<dyn SrvResolver>,
}

impl MinecraftProbe {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(DnsSrvResolver::from_system()))
    }

    /// Use `resolver` for Java SRV lookups
    pub fn with_resolver(resolver: Arc<dyn SrvResolver>) -> Self {
        Self {
            protocol_version: java::DEFAULT_PROTOCOL_VERSION,
            resolver,
        }
    }

    pub fn with_protocol_version(mut self, version: i32) -> Self {
        self.protocol_version = version;
        self
    }
}

impl Default for MinecraftProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusProbe for MinecraftProbe {
    async fn probe(
        &self,
        address: &str,
        kind: ServerKind,
        timeout: Duration,
    ) -> Result<StatusSnapshot, ProbeError> {
        let endpoint =
            Endpoint::parse(address, kind).map_err(|e| ProbeError::Resolve(e.to_string()))?;

        let query = async {
            match kind {
                ServerKind::Java => {
                    let endpoint = srv::resolve_java(self.resolver.as_ref(), endpoint).await;
                    java::query(&endpoint, self.protocol_version).await
                }
                ServerKind::Bedrock => bedrock::query(&endpoint).await,
            }
        };

        tokio::time::timeout(timeout, query)
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
    }
}
