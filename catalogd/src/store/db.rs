use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params, OptionalExtension};
use shared::types::{
    Conditions, Ports, Requirements, ServerRecord, StoredServer, TrackDescriptor,
};

const SELECT_COLUMNS: &str =
    "SELECT id, ip, tcp_port, udp_port, track_id, track_name, track_dlc, name,
            class, hotjoin, sessions, max_drivers, connected_drivers, rain, night,
            variability, track_medals, safety_rating, current_session_index, misc,
            country_code, first_seen, last_seen
     FROM servers";

pub struct CatalogDb {
    conn: Connection,
}

impl CatalogDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS servers (
                id                    TEXT PRIMARY KEY,
                ip                    TEXT NOT NULL,
                tcp_port              INTEGER NOT NULL,
                udp_port              INTEGER NOT NULL,
                track_id              TEXT NOT NULL,
                track_name            TEXT NOT NULL,
                track_dlc             TEXT NOT NULL,
                name                  TEXT NOT NULL,
                class                 TEXT NOT NULL,
                hotjoin               TEXT NOT NULL,
                sessions              TEXT NOT NULL,
                max_drivers           INTEGER NOT NULL,
                connected_drivers     INTEGER NOT NULL,
                rain                  TEXT NOT NULL,
                night                 TEXT NOT NULL,
                variability           INTEGER NOT NULL,
                track_medals          INTEGER NOT NULL,
                safety_rating         INTEGER NOT NULL,
                current_session_index INTEGER NOT NULL,
                misc                  TEXT NOT NULL,
                country_code          TEXT,
                first_seen            TEXT NOT NULL,
                last_seen             TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_track_id ON servers(track_id);
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Insert or fully replace the decoded fields of a server.
    /// `country_code` and `first_seen` survive updates.
    pub fn upsert_server(&self, record: &ServerRecord) -> Result<StoredServer> {
        let id = record.id();
        let now = Utc::now().to_rfc3339();

        let class_json = serde_json::to_string(&record.class)
            .context("Failed to serialize class")?;
        let hotjoin_json = serde_json::to_string(&record.hotjoin)
            .context("Failed to serialize hotjoin")?;
        let sessions_json = serde_json::to_string(&record.sessions)
            .context("Failed to serialize sessions")?;
        let rain_json = serde_json::to_string(&record.conditions.rain)
            .context("Failed to serialize rain flag")?;
        let night_json = serde_json::to_string(&record.conditions.night)
            .context("Failed to serialize night flag")?;
        let misc_json = serde_json::to_string(&record.misc)
            .context("Failed to serialize misc spans")?;

        self.conn.execute(
            r#"
            INSERT INTO servers (
                id, ip, tcp_port, udp_port, track_id, track_name, track_dlc, name,
                class, hotjoin, sessions, max_drivers, connected_drivers, rain, night,
                variability, track_medals, safety_rating, current_session_index, misc,
                country_code, first_seen, last_seen
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, NULL, ?21, ?21)
            ON CONFLICT(id) DO UPDATE SET
                ip = excluded.ip,
                tcp_port = excluded.tcp_port,
                udp_port = excluded.udp_port,
                track_id = excluded.track_id,
                track_name = excluded.track_name,
                track_dlc = excluded.track_dlc,
                name = excluded.name,
                class = excluded.class,
                hotjoin = excluded.hotjoin,
                sessions = excluded.sessions,
                max_drivers = excluded.max_drivers,
                connected_drivers = excluded.connected_drivers,
                rain = excluded.rain,
                night = excluded.night,
                variability = excluded.variability,
                track_medals = excluded.track_medals,
                safety_rating = excluded.safety_rating,
                current_session_index = excluded.current_session_index,
                misc = excluded.misc,
                last_seen = excluded.last_seen
            "#,
            params![
                &id,
                record.ip.to_string(),
                record.port.tcp,
                record.port.udp,
                &record.track.id,
                &record.track.name,
                &record.track.dlc,
                &record.name,
                &class_json,
                &hotjoin_json,
                &sessions_json,
                record.max_drivers,
                record.connected_drivers,
                &rain_json,
                &night_json,
                record.conditions.variability,
                record.requirements.track_medals,
                record.requirements.safety_rating,
                record.current_session_index,
                &misc_json,
                &now,
            ],
        )
        .context("Failed to upsert server")?;

        self.get_server(&id)?
            .with_context(|| format!("Server {} missing after upsert", id))
    }

    /// Delete every server whose id is not in `keep`. Returns the number removed.
    pub fn delete_where_id_not_in(&self, keep: &HashSet<String>) -> Result<u64> {
        let tx = self.conn.unchecked_transaction()
            .context("Failed to begin prune transaction")?;

        tx.execute_batch("CREATE TEMP TABLE IF NOT EXISTS keep_ids (id TEXT PRIMARY KEY); DELETE FROM keep_ids;")
            .context("Failed to prepare prune set")?;
        {
            let mut insert = tx
                .prepare("INSERT OR IGNORE INTO keep_ids (id) VALUES (?1)")
                .context("Failed to prepare prune insert")?;
            for id in keep {
                insert.execute(params![id])
                    .context("Failed to stage id for prune")?;
            }
        }

        let count = tx.execute(
            "DELETE FROM servers WHERE id NOT IN (SELECT id FROM keep_ids)",
            [],
        )
        .context("Failed to prune servers")?;

        tx.execute_batch("DELETE FROM keep_ids;")
            .context("Failed to clear prune set")?;
        tx.commit().context("Failed to commit prune")?;

        Ok(count as u64)
    }

    /// Record a country code, unless one is already stored.
    /// Returns true if the row was updated.
    pub fn set_country_code(&self, id: &str, country_code: &str) -> Result<bool> {
        let count = self.conn.execute(
            "UPDATE servers SET country_code = ?1 WHERE id = ?2 AND country_code IS NULL",
            params![country_code, id],
        )
        .context("Failed to set country code")?;
        Ok(count > 0)
    }

    /// Get all servers
    pub fn get_all_servers(&self) -> Result<Vec<StoredServer>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))
            .context("Failed to prepare query")?;

        let servers = stmt
            .query_map([], Self::row_to_server)
            .context("Failed to query servers")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect servers")?;

        Ok(servers)
    }

    /// Get a single server by id
    pub fn get_server(&self, id: &str) -> Result<Option<StoredServer>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                Self::row_to_server,
            )
            .optional()
            .context("Failed to query server")?;

        Ok(result)
    }

    /// Helper to convert a database row to StoredServer
    fn row_to_server(row: &rusqlite::Row) -> Result<StoredServer, rusqlite::Error> {
        let ip_str: String = row.get(1)?;
        let ip: Ipv4Addr = ip_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let record = ServerRecord {
            ip,
            port: Ports {
                tcp: row.get(2)?,
                udp: row.get(3)?,
            },
            track: TrackDescriptor {
                id: row.get(4)?,
                name: row.get(5)?,
                dlc: row.get(6)?,
            },
            name: row.get(7)?,
            class: json_column(row, 8)?,
            hotjoin: json_column(row, 9)?,
            sessions: json_column(row, 10)?,
            max_drivers: row.get(11)?,
            connected_drivers: row.get(12)?,
            conditions: Conditions {
                rain: json_column(row, 13)?,
                night: json_column(row, 14)?,
                variability: row.get(15)?,
            },
            requirements: Requirements {
                track_medals: row.get(16)?,
                safety_rating: row.get(17)?,
            },
            current_session_index: row.get(18)?,
            misc: json_column(row, 19)?,
        };

        Ok(StoredServer {
            id: row.get(0)?,
            is_full: record.is_full(),
            record,
            country_code: row.get(20)?,
            first_seen: time_column(row, 21)?,
            last_seen: time_column(row, 22)?,
        })
    }
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<T, rusqlite::Error> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn time_column(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<chrono::DateTime<Utc>, rusqlite::Error> {
    let text: String = row.get(idx)?;
    Ok(chrono::DateTime::parse_from_rfc3339(&text)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc))
}
