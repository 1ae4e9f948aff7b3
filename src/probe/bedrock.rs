//! Bedrock Edition status over RakNet unconnected ping
//!
//! One datagram out, one datagram back. The pong carries a `;`-separated
//! server id string:
//!
//! ```text
//! MCPE;<motd>;<protocol>;<version>;<online>;<max>;<server guid>;<map>;<gamemode>;...
//! ```

use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::net::{lookup_host, UdpSocket};

use super::{motd, Endpoint};
use crate::error::ProbeError;
use crate::models::{Players, StatusSnapshot};

/// RakNet offline message magic
pub const MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1c;

/// id + time + guid + magic + string length
const PONG_HEADER_LEN: usize = 1 + 8 + 8 + 16 + 2;

/// Fields decoded from the pong's server id string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedrockStatus {
    pub edition: String,
    pub motd: String,
    pub protocol: i64,
    pub version: String,
    pub players: Players,
    pub map: Option<String>,
    pub gamemode: Option<String>,
}

impl BedrockStatus {
    /// Parse the `;`-separated payload
    pub fn parse(payload: &str) -> Result<Self, ProbeError> {
        let fields: Vec<&str> = payload.split(';').collect();
        if fields.len() < 6 {
            return Err(ProbeError::Protocol(format!(
                "expected at least 6 fields, got {}",
                fields.len()
            )));
        }

        let number = |index: usize, name: &str| -> Result<i64, ProbeError> {
            fields[index]
                .trim()
                .parse::<i64>()
                .map_err(|_| ProbeError::Protocol(format!("{name} is not a number: {:?}", fields[index])))
        };

        let optional = |index: usize| {
            fields
                .get(index)
                .map(|s| s.to_string())
                .filter(|s| !s.is_empty())
        };

        Ok(Self {
            edition: fields[0].to_string(),
            motd: fields[1].to_string(),
            protocol: number(2, "protocol")?,
            version: fields[3].to_string(),
            players: Players {
                online: number(4, "online players")?,
                max: number(5, "max players")?,
            },
            map: optional(7),
            gamemode: optional(8),
        })
    }

    pub fn into_snapshot(self, latency_ms: f64) -> StatusSnapshot {
        StatusSnapshot::online(self.players, &self.version, latency_ms)
            .with_motd(motd::render(&motd::parse_legacy(&self.motd)))
    }
}

/// Build an unconnected ping datagram
pub fn ping_packet(timestamp: i64, client_guid: i64) -> Vec<u8> {
    let mut packet = Vec::with_capacity(1 + 8 + 16 + 8);
    packet.push(UNCONNECTED_PING);
    packet.extend_from_slice(&timestamp.to_be_bytes());
    packet.extend_from_slice(&MAGIC);
    packet.extend_from_slice(&client_guid.to_be_bytes());
    packet
}

/// Extract the server id string from an unconnected pong datagram
pub fn parse_pong(datagram: &[u8]) -> Result<String, ProbeError> {
    if datagram.len() < PONG_HEADER_LEN {
        return Err(ProbeError::Protocol(format!(
            "pong too short ({} bytes)",
            datagram.len()
        )));
    }
    if datagram[0] != UNCONNECTED_PONG {
        return Err(ProbeError::Protocol(format!(
            "expected unconnected pong, got packet {:#04x}",
            datagram[0]
        )));
    }
    if datagram[17..33] != MAGIC {
        return Err(ProbeError::Protocol("bad offline message magic".to_string()));
    }

    let len = u16::from_be_bytes([datagram[33], datagram[34]]) as usize;
    let body = datagram
        .get(PONG_HEADER_LEN..PONG_HEADER_LEN + len)
        .ok_or_else(|| ProbeError::Protocol("truncated server id string".to_string()))?;

    Ok(String::from_utf8_lossy(body).into_owned())
}

/// Run an unconnected ping against a Bedrock server
pub async fn query(endpoint: &Endpoint) -> Result<StatusSnapshot, ProbeError> {
    let target = lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| ProbeError::Resolve(format!("{}: {e}", endpoint.host)))?
        .next()
        .ok_or_else(|| ProbeError::Resolve(endpoint.host.clone()))?;

    let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(target).await?;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    let packet = ping_packet(timestamp, rand::random());

    let started = Instant::now();
    socket.send(&packet).await?;

    let mut buf = [0u8; 2048];
    let len = socket.recv(&mut buf).await?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    let payload = parse_pong(&buf[..len])?;
    Ok(BedrockStatus::parse(&payload)?.into_snapshot(latency_ms))
}
