//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use mcpulse::error::ProbeError;
use mcpulse::lease::{LeaderLock, MemoryCoordinator};
use mcpulse::models::{Players, ServerKind, StatusSnapshot};
use mcpulse::poller::{PollerService, ServiceSettings};
use mcpulse::probe::java::{read_varint, write_varint};
use mcpulse::probe::StatusProbe;
use mcpulse::store::MemoryStore;

pub const LEASE_KEY: &str = "mcpulse:test:leader";

/// Online snapshot with the given player count
pub fn snapshot(online: i64) -> StatusSnapshot {
    StatusSnapshot::online(Players { online, max: 100 }, "1.20.4", 20.0)
}

/// What the scripted probe does for one address
#[derive(Debug, Clone)]
pub enum Behavior {
    Online(StatusSnapshot),
    Fail,
    Slow(Duration, StatusSnapshot),
    Panic,
}

/// Probe answering from a per-address script; unknown addresses are refused
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(address.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.as_str() == address)
            .count()
    }
}

#[async_trait]
impl StatusProbe for ScriptedProbe {
    async fn probe(
        &self,
        address: &str,
        _kind: ServerKind,
        timeout: Duration,
    ) -> Result<StatusSnapshot, ProbeError> {
        self.calls.lock().unwrap().push(address.to_string());
        let behavior = self.behaviors.lock().unwrap().get(address).cloned();

        match behavior {
            Some(Behavior::Online(snapshot)) => Ok(snapshot),
            Some(Behavior::Slow(delay, snapshot)) => {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(ProbeError::Timeout(timeout));
                }
                tokio::time::sleep(delay).await;
                Ok(snapshot)
            }
            Some(Behavior::Panic) => panic!("probe of {address} panicked"),
            Some(Behavior::Fail) | None => Err(ProbeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

/// Short timings so a test sees several cycles and renewals per second
pub fn fast_settings() -> ServiceSettings {
    ServiceSettings {
        poll_interval: Duration::from_millis(60),
        worker_count: 4,
        probe_timeout: Duration::from_millis(200),
        cache_refresh: Duration::from_secs(300),
        renew_interval: Duration::from_millis(20),
        acquire_retry: Duration::from_millis(30),
    }
}

/// Service over in-memory backends
pub fn service(
    coordination: &Arc<MemoryCoordinator>,
    store: &Arc<MemoryStore>,
    probe: Arc<dyn StatusProbe>,
    settings: ServiceSettings,
) -> PollerService {
    let lock = Arc::new(LeaderLock::new(
        coordination.clone(),
        LEASE_KEY,
        Duration::from_millis(300),
    ));
    PollerService::new(settings, lock, store.clone(), store.clone(), probe)
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn read_frame(socket: &mut tokio::net::TcpStream) -> Option<Vec<u8>> {
    let len = read_varint(socket).await.ok()?;
    let mut body = vec![0u8; usize::try_from(len).ok()?];
    socket.read_exact(&mut body).await.ok()?;
    Some(body)
}

async fn write_frame(socket: &mut tokio::net::TcpStream, body: &[u8]) -> Option<()> {
    let mut frame = Vec::new();
    write_varint(&mut frame, body.len() as i32);
    frame.extend_from_slice(body);
    socket.write_all(&frame).await.ok()
}

/// Local Java status server answering every connection with `status_json`
pub async fn spawn_java_server(status_json: &str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let status_json = status_json.to_string();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let status_json = status_json.clone();
            tokio::spawn(async move {
                // Handshake, status request
                read_frame(&mut socket).await?;
                read_frame(&mut socket).await?;

                let mut response = Vec::new();
                write_varint(&mut response, 0x00);
                write_varint(&mut response, status_json.len() as i32);
                response.extend_from_slice(status_json.as_bytes());
                write_frame(&mut socket, &response).await?;

                let ping = read_frame(&mut socket).await?;
                write_frame(&mut socket, &ping).await
            });
        }
    });

    addr
}
