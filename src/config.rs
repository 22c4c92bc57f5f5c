//! Pipeline configuration.
//!
//! Settings come from an optional TOML file, then environment variables:
//!
//! - `RASTERFLOW_NUMBER_OF_THREADS`: slabs per node (0 = all hardware threads)
//! - `RASTERFLOW_MAX_RAM_HINT`: megabytes available to a streamed update

use crate::core::error::{PipelineError, PipelineResult};
use crate::streaming::manager::StreamingStrategy;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_NUMBER_OF_THREADS: &str = "RASTERFLOW_NUMBER_OF_THREADS";
pub const ENV_MAX_RAM_HINT: &str = "RASTERFLOW_MAX_RAM_HINT";

/// Engine and streaming settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Slabs per node (0 = one per hardware thread).
    pub number_of_threads: usize,
    /// Memory a streamed update may use, in megabytes.
    pub available_ram_mb: u64,
    /// Division strategy; RAM-driven over `available_ram_mb` when unset.
    pub streaming: Option<StreamingStrategy>,
    pub use_cache: bool,
    pub cache_capacity: usize,
    pub cache_memory_mb: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            number_of_threads: 0,
            available_ram_mb: 256,
            streaming: None,
            use_cache: true,
            cache_capacity: 64,
            cache_memory_mb: 512,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Defaults, or the file at `path` when given, then environment overrides.
    pub fn resolve(path: Option<&Path>) -> PipelineResult<Self> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Apply `RASTERFLOW_*` environment variables.
    pub fn with_env_overrides(self) -> PipelineResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_NUMBER_OF_THREADS) {
            self.number_of_threads = parse_variable(ENV_NUMBER_OF_THREADS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RAM_HINT) {
            self.available_ram_mb = parse_variable(ENV_MAX_RAM_HINT, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// The configured strategy, or RAM-driven streaming.
    pub fn streaming_strategy(&self) -> StreamingStrategy {
        self.streaming.clone().unwrap_or(StreamingStrategy::RamDriven {
            available_ram_mb: self.available_ram_mb,
            bias: 1.0,
        })
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.available_ram_mb == 0 {
            return Err(PipelineError::configuration(
                "available_ram_mb",
                "must be at least 1",
            ));
        }
        self.streaming_strategy().validate()
    }
}

fn parse_variable<T: std::str::FromStr>(name: &str, value: &str) -> PipelineResult<T> {
    value.trim().parse().map_err(|_| {
        PipelineError::configuration(name, format!("'{}' is not a non-negative integer", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.number_of_threads, 0);
        assert_eq!(
            config.streaming_strategy(),
            StreamingStrategy::RamDriven {
                available_ram_mb: 256,
                bias: 1.0
            }
        );
    }

    #[test]
    fn test_partial_toml() {
        let config = PipelineConfig::from_toml_str(
            "number_of_threads = 8\n[streaming]\nstrategy = \"tile_size\"\nvalue = [64, 32]\n",
        )
        .unwrap();
        assert_eq!(config.number_of_threads, 8);
        assert!(config.use_cache);
        assert_eq!(config.streaming, Some(StreamingStrategy::TileSize(vec![64, 32])));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            PipelineConfig::from_toml_str("number_of_threads = \"many\""),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("available_ram_mb = 0"),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::default()
            .with_overrides(|name| match name {
                ENV_NUMBER_OF_THREADS => Some("3".to_string()),
                ENV_MAX_RAM_HINT => Some(" 1024 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.number_of_threads, 3);
        assert_eq!(config.available_ram_mb, 1024);

        let bad = PipelineConfig::default()
            .with_overrides(|name| (name == ENV_NUMBER_OF_THREADS).then(|| "-2".to_string()));
        assert!(matches!(bad, Err(PipelineError::Configuration { .. })));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache_capacity = 4\nuse_cache = false").unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.cache_capacity, 4);
        assert!(!config.use_cache);

        assert!(matches!(
            PipelineConfig::load("/nonexistent/rasterflow.toml"),
            Err(PipelineError::Io(_))
        ));
    }
}
