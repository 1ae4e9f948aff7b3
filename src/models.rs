// Core data structures for the status poller

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::probe::Endpoint;

/// Registry identifier of a listed game server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub i64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ServerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Game server edition, which decides the status protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerKind {
    Java,
    Bedrock,
}

impl ServerKind {
    /// Registry representation (`JAVA` / `BEDROCK`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Java => "JAVA",
            Self::Bedrock => "BEDROCK",
        }
    }

    /// Port used when the address does not carry one
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Java => 25565,
            Self::Bedrock => 19132,
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::Java, Self::Bedrock]
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "JAVA" => Ok(Self::Java),
            "BEDROCK" => Ok(Self::Bedrock),
            _ => Err(ConfigError::UnknownServerKind(s.to_string())),
        }
    }
}

/// Raw row from the server registry, as owned by the CRUD layer.
///
/// Nothing here is validated yet; [`WorkItem::try_from`] is the point where a
/// misconfigured server gets rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: ServerId,
    pub address: String,
    pub kind: String,
}

impl ServerRecord {
    pub fn new(id: impl Into<ServerId>, address: &str, kind: &str) -> Self {
        Self {
            id: id.into(),
            address: address.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// One unit of polling work: probe this server once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub server_id: ServerId,
    pub address: String,
    pub kind: ServerKind,
}

impl TryFrom<&ServerRecord> for WorkItem {
    type Error = ConfigError;

    fn try_from(record: &ServerRecord) -> Result<Self, Self::Error> {
        let address = record.address.trim();
        if address.is_empty() {
            return Err(ConfigError::MissingAddress(record.id));
        }

        let kind = record.kind.parse()?;
        Endpoint::parse(address, kind)?;

        Ok(Self {
            server_id: record.id,
            address: address.to_string(),
            kind,
        })
    }
}

/// Player counts reported by a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Players {
    pub online: i64,
    pub max: i64,
}

/// Message of the day in every rendering the read API serves
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Motd {
    pub plain: String,
    pub html: String,
    pub minecraft: String,
    pub ansi: String,
}

/// Normalized result of one successful probe.
///
/// Serializes to the `stat_data` document the HTTP tier reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub online: bool,
    pub players: Players,
    /// Round-trip latency in milliseconds
    #[serde(rename = "delay")]
    pub latency: Option<f64>,
    pub version: String,
    pub motd: Motd,
    /// Favicon data URI (Java only)
    pub icon: Option<String>,
}

impl StatusSnapshot {
    /// Create an online snapshot with no MOTD or icon
    pub fn online(players: Players, version: &str, latency: f64) -> Self {
        Self {
            online: true,
            players,
            latency: Some(latency),
            version: version.to_string(),
            motd: Motd::default(),
            icon: None,
        }
    }

    pub fn with_motd(mut self, motd: Motd) -> Self {
        self.motd = motd;
        self
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }
}
