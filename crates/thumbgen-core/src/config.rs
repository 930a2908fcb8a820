use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The two independent concurrency bounds of the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum files concurrently in the decision phase (cache lookup,
    /// metadata fetch, staleness check). A file holds its slot until its
    /// outcome is fully resolved, including any conversion.
    pub max_queue_slots: usize,
    /// Maximum files concurrently in the conversion phase (content read,
    /// decode, resize, encode, artifact write). Typically smaller than
    /// `max_queue_slots` since conversion is CPU and memory bound.
    pub max_process_slots: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_queue_slots: 16,
            max_process_slots: 4,
        }
    }
}

/// Input-side storage backend. A closed set of variants; adding a backend
/// means adding a variant here and in [`crate::input::InputStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InputStorageConfig {
    LocalDir {
        /// Root directory to scan.
        path: PathBuf,
        /// How many directory levels below the root to descend into.
        #[serde(default = "default_max_depth")]
        max_depth: u32,
    },
}

fn default_max_depth() -> u32 {
    16
}

/// Output-side storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutputStorageConfig {
    LocalDir {
        /// Root directory artifacts are written under, mirroring input paths.
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub storage: InputStorageConfig,
    /// Lower-case file extensions accepted by the scan (e.g. ["png", "jpg"]).
    /// Empty means every file with an extension is a candidate.
    #[serde(default)]
    pub known_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub storage: OutputStorageConfig,
}

/// One converter's full effective configuration. The serialized form of a
/// variant (tag included) is what its identity digest is computed over, so
/// any parameter change invalidates cached completions for that converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConverterConfig {
    Webp {
        /// Lossy quality, 1-100.
        quality: u8,
        /// Bound on output width; 0 = unconstrained. Never upscales.
        #[serde(default)]
        max_width: u32,
        /// Bound on output height; 0 = unconstrained.
        #[serde(default)]
        max_height: u32,
    },
    Jpeg {
        /// Encoder quality, 1-100.
        quality: u8,
        #[serde(default)]
        max_width: u32,
        #[serde(default)]
        max_height: u32,
        /// Output extension without the dot (default "jpg"). Lets two jpeg
        /// converters with different sizes write side by side.
        #[serde(default)]
        extension: Option<String>,
    },
}

/// Durable skip cache settings. Omit the whole section to run without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path of the cache file. Absence of the file is not an error; an
    /// unreadable or malformed file at this path is fatal.
    pub path: PathBuf,
}

/// Full pipeline configuration, loaded from a TOML file given on the
/// command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub converters: Vec<ConverterConfig>,
    #[serde(default)]
    pub limits: Limits,
    /// Treat every file as stale regardless of provenance.
    #[serde(default)]
    pub force_rewrite: bool,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

impl Config {
    /// Load and validate configuration from `path`. Any failure here is
    /// fatal to the run.
    pub fn load(path: &Path) -> Result<Config> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: Config = toml::from_str(&data)
            .with_context(|| format!("parse config file: {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.max_queue_slots < 1 {
            anyhow::bail!("limits.max_queue_slots must be at least 1");
        }
        if self.limits.max_process_slots < 1 {
            anyhow::bail!("limits.max_process_slots must be at least 1");
        }
        if self.converters.is_empty() {
            anyhow::bail!("at least one converter must be configured");
        }
        for (i, conv) in self.converters.iter().enumerate() {
            let quality = match conv {
                ConverterConfig::Webp { quality, .. } => *quality,
                ConverterConfig::Jpeg { quality, .. } => *quality,
            };
            if !(1..=100).contains(&quality) {
                anyhow::bail!("converters[{}]: quality must be in 1..=100, got {}", i, quality);
            }
        }
        for ext in &self.input.known_extensions {
            if ext.is_empty() {
                anyhow::bail!("input.known_extensions entries must be non-empty");
            }
        }
        Ok(())
    }
}
