use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::runner::{DEFAULT_SLICE_EXTENSION, DEFAULT_TILE_EDGE};

/// Main configuration structure for the slice-map server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream metadata service
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// External pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to bind to (default: 5001)
    pub port: Option<u16>,
    /// Host to bind to (default: "0.0.0.0")
    pub host: Option<String>,
    /// Enable CORS (default: true)
    pub cors: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Base URL of the dataset API (default: "http://localhost:5000/api")
    pub url: Option<String>,
    /// Request timeout as human readable time (default: "30s")
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory path (default: "./cache")
    pub directory: Option<String>,
    /// Remove entries older than this, e.g. "7d". Unset keeps entries forever.
    pub max_age: Option<String>,
    /// How often to look for expired entries (default: "1h")
    pub sweep_interval: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline executable (default: "ufo-launch")
    pub executable: Option<String>,
    /// Edge of the slice grid packed into one tile (default: 16)
    pub tile_edge: Option<u32>,
    /// Extension of source slice files (default: "tif")
    pub slice_extension: Option<String>,
    /// Abort jobs running longer than this. Unset means no limit.
    pub job_timeout: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Some(5001),
            host: Some("0.0.0.0".to_string()),
            cors: Some(true),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: Some("http://localhost:5000/api".to_string()),
            timeout: Some("30s".to_string()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: Some("./cache".to_string()),
            max_age: None,
            sweep_interval: Some("1h".to_string()),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            executable: Some("ufo-launch".to_string()),
            tile_edge: Some(DEFAULT_TILE_EDGE),
            slice_extension: Some(DEFAULT_SLICE_EXTENSION.to_string()),
            job_timeout: None,
        }
    }
}

fn parse_optional_duration(value: Option<&str>, name: &str) -> Result<Option<Duration>> {
    value
        .map(|s| {
            humantime::parse_duration(s).with_context(|| format!("Invalid {} format: {}", name, s))
        })
        .transpose()
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml_edit::de::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml_edit::ser::to_string_pretty(self)
            .context("Failed to serialize configuration to TOML")?;

        std::fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Merge configuration with command line arguments, prioritizing CLI values
    pub fn merge_with_cli(
        &mut self,
        host: Option<String>,
        port: Option<u16>,
        cache_dir: Option<String>,
        metadata_url: Option<String>,
        executable: Option<String>,
    ) {
        if let Some(cli_host) = host {
            self.server.host = Some(cli_host);
        }

        if let Some(cli_port) = port {
            self.server.port = Some(cli_port);
        }

        if let Some(cache) = cache_dir {
            self.cache.directory = Some(cache);
        }

        if let Some(url) = metadata_url {
            self.metadata.url = Some(url);
        }

        if let Some(exe) = executable {
            self.pipeline.executable = Some(exe);
        }
    }

    /// Get the effective values with defaults applied
    pub fn get_port(&self) -> u16 {
        self.server.port.unwrap_or(5001)
    }

    pub fn get_host(&self) -> String {
        self.server
            .host
            .clone()
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn get_cors_enabled(&self) -> bool {
        self.server.cors.unwrap_or(true)
    }

    pub fn get_metadata_url(&self) -> String {
        self.metadata
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:5000/api".to_string())
    }

    pub fn get_metadata_timeout(&self) -> Duration {
        let timeout_str = self.metadata.timeout.as_deref().unwrap_or("30s");
        humantime::parse_duration(timeout_str).unwrap_or(Duration::from_secs(30))
    }

    pub fn get_cache_directory(&self) -> String {
        self.cache
            .directory
            .clone()
            .unwrap_or_else(|| "./cache".to_string())
    }

    /// Retention limit for cache entries; `None` disables the sweeper
    pub fn get_cache_max_age(&self) -> Option<Duration> {
        self.cache
            .max_age
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
    }

    pub fn get_sweep_interval(&self) -> Duration {
        let interval_str = self.cache.sweep_interval.as_deref().unwrap_or("1h");
        humantime::parse_duration(interval_str).unwrap_or(Duration::from_secs(3600))
    }

    pub fn get_executable(&self) -> String {
        self.pipeline
            .executable
            .clone()
            .unwrap_or_else(|| "ufo-launch".to_string())
    }

    pub fn get_tile_edge(&self) -> u32 {
        self.pipeline.tile_edge.unwrap_or(DEFAULT_TILE_EDGE)
    }

    pub fn get_slice_extension(&self) -> String {
        self.pipeline
            .slice_extension
            .clone()
            .unwrap_or_else(|| DEFAULT_SLICE_EXTENSION.to_string())
    }

    pub fn get_job_timeout(&self) -> Option<Duration> {
        self.pipeline
            .job_timeout
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let port = self.get_port();
        if port < 1024 {
            return Err(anyhow::anyhow!(
                "Port must be 1024 or higher, got: {}",
                port
            ));
        }

        let url = self.get_metadata_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "Metadata URL must start with http:// or https://, got: {}",
                url
            ));
        }

        if self.get_tile_edge() == 0 {
            return Err(anyhow::anyhow!("Tile edge must be greater than 0"));
        }

        if self.get_executable().trim().is_empty() {
            return Err(anyhow::anyhow!("Pipeline executable must not be empty"));
        }

        let cache_dir = self.get_cache_directory();
        let cache_path = Path::new(&cache_dir);
        if cache_path.exists() && !cache_path.is_dir() {
            return Err(anyhow::anyhow!("Cache path is not a directory: {}", cache_dir));
        }

        // Duration strings must parse; getters silently fall back otherwise
        parse_optional_duration(self.metadata.timeout.as_deref(), "metadata timeout")?;
        parse_optional_duration(self.cache.sweep_interval.as_deref(), "sweep_interval")?;
        if let Some(job_timeout) =
            parse_optional_duration(self.pipeline.job_timeout.as_deref(), "job_timeout")?
        {
            if job_timeout.is_zero() {
                return Err(anyhow::anyhow!("Pipeline job_timeout must be greater than 0"));
            }
        }
        if let Some(max_age) =
            parse_optional_duration(self.cache.max_age.as_deref(), "max_age")?
        {
            if max_age.is_zero() {
                return Err(anyhow::anyhow!("Cache max_age must be greater than 0"));
            }
        }

        if self.get_sweep_interval().is_zero() {
            return Err(anyhow::anyhow!("Cache sweep_interval must be greater than 0"));
        }

        Ok(())
    }
}
