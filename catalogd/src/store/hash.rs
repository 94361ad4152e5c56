use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::{ServerRecord, StoredServer};

/// Only fields that describe the server; first_seen/last_seen move every
/// cycle and would make the digest useless for change detection.
#[derive(Serialize)]
struct HashView<'a> {
    id: &'a str,
    record: &'a ServerRecord,
    country_code: Option<&'a str>,
}

/// Computes a SHA-256 digest of the catalog.
/// Servers are sorted by id for deterministic output.
pub fn compute_hash(servers: &[StoredServer]) -> String {
    let mut indices: Vec<usize> = (0..servers.len()).collect();
    indices.sort_by(|&a, &b| servers[a].id.cmp(&servers[b].id));

    let mut hasher = Sha256::new();
    for &i in &indices {
        let s = &servers[i];
        let view = HashView {
            id: &s.id,
            record: &s.record,
            country_code: s.country_code.as_deref(),
        };
        // Serializing plain structs and strings cannot fail
        if let Ok(json) = serde_json::to_vec(&view) {
            hasher.update(&json);
            hasher.update(b"\n");
        }
    }

    hex::encode(hasher.finalize())
}
