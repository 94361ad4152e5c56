use std::net::Ipv4Addr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Outcome of resolving a one-byte code against a catalog table.
/// Unmapped codes are kept as `Unknown` so they stay visible downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookup<T> {
    Resolved(T),
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    Practice,
    Qualifying,
    Race,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    Mixed,
    #[serde(rename = "GT3")]
    Gt3,
    #[serde(rename = "GT4")]
    Gt4,
    #[serde(rename = "GTC")]
    Gtc,
    #[serde(rename = "TCX")]
    Tcx,
}

/// Track as resolved through the track registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub id: String,
    pub name: String,
    /// Content pack the track ships in, "base" when untagged
    pub dlc: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ports {
    pub tcp: u16,
    pub udp: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSlot {
    pub kind: Lookup<SessionKind>,
    pub duration_minutes: u16,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    pub rain: Lookup<bool>,
    pub night: Lookup<bool>,
    pub variability: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub track_medals: u8,
    /// 0 means no requirement
    pub safety_rating: u8,
}

/// One advertised game server as decoded from a single snapshot.
/// Rebuilt from scratch every cycle; the stored row is what persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub ip: Ipv4Addr,
    pub port: Ports,
    pub track: TrackDescriptor,
    pub name: String,
    pub class: Lookup<VehicleClass>,
    pub hotjoin: Lookup<bool>,
    pub sessions: Vec<SessionSlot>,
    pub max_drivers: u8,
    pub connected_drivers: u8,
    pub conditions: Conditions,
    pub requirements: Requirements,
    pub current_session_index: u8,
    /// Uninterpreted byte spans in encounter order, hex encoded
    pub misc: Vec<String>,
}

impl ServerRecord {
    /// Catalog key, `<ip>:<tcp port>`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.ip, self.port.tcp)
    }

    pub fn is_full(&self) -> bool {
        self.max_drivers == self.connected_drivers
    }

    pub fn active_session(&self) -> Option<&SessionSlot> {
        self.sessions.iter().find(|s| s.active)
    }
}

/// A server as held by the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredServer {
    pub id: String,

    #[serde(flatten)]
    pub record: ServerRecord,

    pub is_full: bool,

    /// Two-letter lower-case country, "un" when lookup failed, absent until enriched
    pub country_code: Option<String>,

    /// First time this server was seen
    pub first_seen: DateTime<Utc>,

    /// Last snapshot that contained this server
    pub last_seen: DateTime<Utc>,
}
