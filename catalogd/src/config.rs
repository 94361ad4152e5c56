use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};

/// Environment variables that override the master credentials
pub const ENV_AUTH: &str = "AUTHSTRING";
pub const ENV_QUERY: &str = "QUERYSTRING";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub master: MasterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MasterConfig {
    /// WebSocket URL of the master directory
    pub url: String,
    #[serde(default = "default_subprotocol")]
    pub subprotocol: Option<String>,
    /// Credential payload, sent as a text frame on connect
    #[serde(default)]
    pub auth: String,
    /// Query payload, hex encoded, sent as a binary frame
    #[serde(default)]
    pub query_hex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_base_period")]
    pub base_period_secs: u64,
    #[serde(default = "default_offset")]
    pub offset_secs: u64,
    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,
    #[serde(default = "default_min_retry_spacing")]
    pub min_retry_spacing_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    /// IPv4 country range table, `start,end,cc` per line. The DB-IP
    /// "IP to Country Lite" CSV (https://db-ip.com/db/download/ip-to-country-lite)
    /// can be pointed at directly. Enrichment is off when unset.
    #[serde(default)]
    pub geo_ranges: Option<PathBuf>,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_subprotocol() -> Option<String> {
    Some("ws".to_string())
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/catalogd/servers.db")
}

fn default_base_period() -> u64 {
    120
}

fn default_offset() -> u64 {
    2
}

fn default_jitter() -> u64 {
    30
}

fn default_min_retry_spacing() -> u64 {
    10
}

fn default_queue_depth() -> usize {
    1024
}

fn default_listen() -> String {
    "[::]:8080".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_period_secs: default_base_period(),
            offset_secs: default_offset(),
            jitter_secs: default_jitter(),
            min_retry_spacing_secs: default_min_retry_spacing(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            geo_ranges: None,
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl MasterConfig {
    /// Decoded query payload
    pub fn query_payload(&self) -> Result<Vec<u8>> {
        hex::decode(self.query_hex.trim()).context("query_hex is not valid hex")
    }
}

impl ScheduleConfig {
    pub fn base_period(&self) -> Duration {
        Duration::from_secs(self.base_period_secs)
    }

    pub fn offset(&self) -> Duration {
        Duration::from_secs(self.offset_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs(self.jitter_secs)
    }

    pub fn min_retry_spacing(&self) -> Duration {
        Duration::from_secs(self.min_retry_spacing_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env(std::env::var(ENV_AUTH).ok(), std::env::var(ENV_QUERY).ok());
        config.validate()?;

        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self, auth: Option<String>, query: Option<String>) {
        if let Some(auth) = auth {
            self.master.auth = auth;
        }
        if let Some(query) = query {
            self.master.query_hex = query;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.master.auth.is_empty() {
            bail!("master.auth is empty and {} is not set", ENV_AUTH);
        }
        if self.master.query_hex.trim().is_empty() {
            bail!("master.query_hex is empty and {} is not set", ENV_QUERY);
        }
        self.master.query_payload()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [master]
        url = "ws://master.example:80/list"
        auth = "secret"
        query_hex = "0a0b0c"
    "#;

    #[test]
    fn test_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.master.subprotocol.as_deref(), Some("ws"));
        assert_eq!(config.master.query_payload().unwrap(), vec![0x0a, 0x0b, 0x0c]);
        assert_eq!(config.schedule.base_period(), Duration::from_secs(120));
        assert_eq!(config.schedule.offset(), Duration::from_secs(2));
        assert_eq!(config.schedule.jitter(), Duration::from_secs(30));
        assert_eq!(config.schedule.min_retry_spacing(), Duration::from_secs(10));
        assert_eq!(config.store.db_path, PathBuf::from("/var/lib/catalogd/servers.db"));
        assert!(config.enrichment.geo_ranges.is_none());
        assert_eq!(config.api.listen, "[::]:8080");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::parse(r#"
            [master]
            url = "ws://master.example:80/list"
            query_hex = "ff"

            [schedule]
            base_period_secs = 60
            jitter_secs = 0

            [enrichment]
            geo_ranges = "/srv/ranges.csv"
        "#).unwrap();

        assert_eq!(config.schedule.base_period_secs, 60);
        assert_eq!(config.schedule.jitter_secs, 0);
        assert_eq!(config.schedule.offset_secs, 2);
        assert_eq!(config.enrichment.geo_ranges, Some(PathBuf::from("/srv/ranges.csv")));
        assert_eq!(config.enrichment.queue_depth, 1024);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.apply_env(Some("from-env".to_string()), None);

        assert_eq!(config.master.auth, "from-env");
        assert_eq!(config.master.query_hex, "0a0b0c");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = Config::parse(r#"
            [master]
            url = "ws://master.example:80/list"
        "#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_query_hex_rejected() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.master.query_hex = "xyz".to_string();
        assert!(config.validate().is_err());
    }
}
