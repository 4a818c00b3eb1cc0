use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level config loaded from `farecore.toml`, with every field falling
/// back to its documented default when the file is missing or a section is
/// omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_max_offers")]
    pub max_offers: u64,
    #[serde(default = "default_max_hotels")]
    pub max_hotels: u64,
    #[serde(default)]
    pub result_cache: ResultCacheConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub ingest: IngestSourceConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_offers: default_max_offers(),
            max_hotels: default_max_hotels(),
            result_cache: ResultCacheConfig::default(),
            query: QueryConfig::default(),
            ingest: IngestSourceConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

fn default_max_offers() -> u64 {
    100_000_000
}

fn default_max_hotels() -> u64 {
    500_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultCacheConfig {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_sweep_ms")]
    pub sweep_ms: u64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self { ttl_ms: default_ttl_ms(), max_entries: default_max_entries(), sweep_ms: default_sweep_ms() }
    }
}

fn default_ttl_ms() -> u64 {
    300_000
}

fn default_max_entries() -> usize {
    10_000
}

fn default_sweep_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_max_results_best_per_hotel")]
    pub max_results_best_per_hotel: usize,
    #[serde(default = "default_max_results_per_hotel")]
    pub max_results_per_hotel: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            max_results_best_per_hotel: default_max_results_best_per_hotel(),
            max_results_per_hotel: default_max_results_per_hotel(),
        }
    }
}

fn default_deadline_ms() -> u64 {
    5_000
}

fn default_max_results_best_per_hotel() -> usize {
    100
}

fn default_max_results_per_hotel() -> usize {
    1_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSourceConfig {
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_skip_errors")]
    pub skip_errors: bool,
}

impl Default for IngestSourceConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: default_chunk_bytes(),
            workers: default_workers(),
            skip_errors: default_skip_errors(),
        }
    }
}

fn default_chunk_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn default_skip_errors() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_hotels_path")]
    pub hotels: PathBuf,
    #[serde(default = "default_offers_path")]
    pub offers: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { hotels: default_hotels_path(), offers: default_offers_path() }
    }
}

fn default_hotels_path() -> PathBuf {
    PathBuf::from("./data/hotels.csv")
}

fn default_offers_path() -> PathBuf {
    PathBuf::from("./data/offers.csv")
}

impl Config {
    /// Loads config from a TOML file. Returns defaults if the file doesn't
    /// exist — a fresh checkout should still start up and serve an empty
    /// snapshot rather than fail closed on missing configuration.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_ingest_config(&self) -> crate::engine::IngestConfig {
        crate::engine::IngestConfig {
            chunk_bytes: self.ingest.chunk_bytes,
            workers: self.ingest.workers,
            skip_errors: self.ingest.skip_errors,
            max_offers: self.max_offers,
            max_hotels: self.max_hotels,
        }
    }

    pub fn query_limits(&self) -> crate::engine::QueryLimits {
        crate::engine::QueryLimits {
            deadline: std::time::Duration::from_millis(self.query.deadline_ms),
            max_results_best_per_hotel: self.query.max_results_best_per_hotel,
            max_results_per_hotel: self.query.max_results_per_hotel,
        }
    }
}
