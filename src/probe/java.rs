//! Java Edition server list ping
//!
//! Handshake (next state = status), status request, JSON status response,
//! then a ping/pong exchange whose round trip is reported as latency. Servers
//! that answer status but drop or botch the ping still count as online, with
//! the status round trip standing in for latency. Every packet is
//! `VarInt length | VarInt packet id | payload`.

use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{motd, Endpoint};
use crate::error::ProbeError;
use crate::models::{Players, StatusSnapshot};

/// Protocol number sent in the handshake; servers answer status for any version
pub const DEFAULT_PROTOCOL_VERSION: i32 = 47;

/// Largest status packet accepted (favicons are big, but not this big)
const MAX_PACKET_LEN: usize = 2 * 1024 * 1024;

const HANDSHAKE_ID: i32 = 0x00;
const STATUS_ID: i32 = 0x00;
const PING_ID: i32 = 0x01;
const NEXT_STATE_STATUS: i32 = 1;

/// How long to wait for the pong once the status response is in
const PING_TIMEOUT: Duration = Duration::from_millis(500);

/// Status response JSON
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: VersionInfo,
    #[serde(default)]
    pub players: Option<PlayersInfo>,
    #[serde(default)]
    pub description: Value,
    #[serde(default)]
    pub favicon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    #[serde(default)]
    pub protocol: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlayersInfo {
    pub online: i64,
    pub max: i64,
}

impl StatusResponse {
    pub fn into_snapshot(self, latency_ms: f64) -> StatusSnapshot {
        let players = self
            .players
            .map(|p| Players {
                online: p.online,
                max: p.max,
            })
            .unwrap_or_default();

        StatusSnapshot::online(players, &self.version.name, latency_ms)
            .with_motd(motd::render(&motd::parse_component(&self.description)))
            .with_icon(self.favicon)
    }
}

/// Run a full status query against a Java server
pub async fn query(endpoint: &Endpoint, protocol_version: i32) -> Result<StatusSnapshot, ProbeError> {
    let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    stream.set_nodelay(true)?;

    let mut handshake = Vec::with_capacity(endpoint.host.len() + 16);
    write_varint(&mut handshake, HANDSHAKE_ID);
    write_varint(&mut handshake, protocol_version);
    write_string(&mut handshake, &endpoint.host);
    handshake.extend_from_slice(&endpoint.port.to_be_bytes());
    write_varint(&mut handshake, NEXT_STATE_STATUS);
    send_packet(&mut stream, &handshake).await?;

    let mut request = Vec::with_capacity(1);
    write_varint(&mut request, STATUS_ID);
    let started = Instant::now();
    send_packet(&mut stream, &request).await?;

    let body = read_packet(&mut stream).await?;
    let status_ms = started.elapsed().as_secs_f64() * 1000.0;
    let mut cursor = body.as_slice();
    let packet_id = read_varint(&mut cursor).await?;
    if packet_id != STATUS_ID {
        return Err(ProbeError::Protocol(format!(
            "expected status response, got packet {packet_id:#04x}"
        )));
    }
    let json = read_string(&mut cursor).await?;
    let response: StatusResponse = serde_json::from_str(&json)?;

    let latency_ms = match tokio::time::timeout(PING_TIMEOUT, ping(&mut stream)).await {
        Ok(Ok(ms)) => ms,
        Ok(Err(e)) => {
            tracing::debug!(host = %endpoint.host, error = %e, "Ping failed, using status round trip");
            status_ms
        }
        Err(_) => {
            tracing::debug!(host = %endpoint.host, "Ping timed out, using status round trip");
            status_ms
        }
    };

    Ok(response.into_snapshot(latency_ms))
}

async fn ping<S>(stream: &mut S) -> Result<f64, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload: i64 = rand::random();
    let mut packet = Vec::with_capacity(9);
    write_varint(&mut packet, PING_ID);
    packet.extend_from_slice(&payload.to_be_bytes());

    let started = Instant::now();
    send_packet(stream, &packet).await?;
    let body = read_packet(stream).await?;
    let elapsed = started.elapsed();

    let mut cursor = body.as_slice();
    let packet_id = read_varint(&mut cursor).await?;
    let echoed = cursor.read_i64().await?;
    if packet_id != PING_ID || echoed != payload {
        return Err(ProbeError::Protocol("pong does not match ping".to_string()));
    }

    Ok(elapsed.as_secs_f64() * 1000.0)
}

/// Append a VarInt (LEB128 over the two's complement bits)
pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.push(value as u8);
            return;
        }
        buf.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
}

/// Read a VarInt of at most five bytes
pub async fn read_varint<R>(reader: &mut R) -> Result<i32, ProbeError>
where
    R: AsyncRead + Unpin,
{
    let mut value: u32 = 0;
    for position in 0..5 {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * position);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProbeError::Protocol("VarInt longer than 5 bytes".to_string()))
}

async fn read_string<R>(reader: &mut R) -> Result<String, ProbeError>
where
    R: AsyncRead + Unpin,
{
    let len = checked_len(read_varint(reader).await?)?;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).await?;
    String::from_utf8(bytes).map_err(|e| ProbeError::Protocol(format!("invalid UTF-8: {e}")))
}

async fn send_packet<W>(writer: &mut W, body: &[u8]) -> Result<(), ProbeError>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(body.len() + 5);
    write_varint(&mut frame, body.len() as i32);
    frame.extend_from_slice(body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_packet<R>(reader: &mut R) -> Result<Vec<u8>, ProbeError>
where
    R: AsyncRead + Unpin,
{
    let len = checked_len(read_varint(reader).await?)?;
    if len == 0 {
        return Err(ProbeError::Protocol("empty packet".to_string()));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

fn checked_len(len: i32) -> Result<usize, ProbeError> {
    usize::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_PACKET_LEN)
        .ok_or_else(|| ProbeError::Protocol(format!("bad length {len}")))
}
