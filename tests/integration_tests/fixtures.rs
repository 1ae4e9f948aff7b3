//! Test fixtures for integration tests

#![allow(dead_code)]

use mcpulse::models::ServerRecord;

/// Status document a vanilla 1.20.4 server returns
pub const JAVA_STATUS_JSON: &str = r#"{
    "version": {"name": "1.20.4", "protocol": 765},
    "players": {"max": 20, "online": 3},
    "description": {"text": "A Minecraft Server", "color": "green"}
}"#;

/// `count` Java servers with ids starting at 1
pub fn java_servers(count: i64) -> Vec<ServerRecord> {
    (1..=count)
        .map(|id| ServerRecord::new(id, &format!("java-{id}.example.net"), "JAVA"))
        .collect()
}

/// Address of the Java fixture server with the given id
pub fn java_address(id: i64) -> String {
    format!("java-{id}.example.net")
}

/// One server of each kind plus three rows the scheduler must skip
pub fn mixed_fleet() -> Vec<ServerRecord> {
    vec![
        ServerRecord::new(1, "java.example.net", "JAVA"),
        ServerRecord::new(2, "bedrock.example.net", "BEDROCK"),
        ServerRecord::new(3, "   ", "JAVA"),
        ServerRecord::new(4, "legacy.example.net", "POCKET"),
        ServerRecord::new(5, "broken.example.net:notaport", "JAVA"),
    ]
}
