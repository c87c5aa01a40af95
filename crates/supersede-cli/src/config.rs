//! Configuration for the `supersede` binary.
//!
//! Loads configuration from ${SUPERSEDE_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Settings for the simulated lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Base latency of one lookup in milliseconds.
    pub latency_ms: u64,
    /// Latency removed per query character.
    pub per_char_ms: u64,
    /// Maximum matches per lookup.
    pub max_results: usize,
    /// Whether lookups observe their cancel signal.
    pub cancel_superseded: bool,
    /// Words searched by prefix; empty means the built-in list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            latency_ms: 200,
            per_char_ms: 40,
            max_results: 5,
            cancel_superseded: true,
            words: Vec::new(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fallback log filter when `SUPERSEDE_LOG` is unset.
    pub log_level: String,

    #[serde(default)]
    pub lookup: LookupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Self::DEFAULT_LOG_LEVEL.to_string(),
            lookup: LookupConfig::default(),
        }
    }
}

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! SUPERSEDE_HOME resolution order:
    //! 1. SUPERSEDE_HOME environment variable (if set)
    //! 2. ~/.config/supersede (default)

    use std::path::PathBuf;

    use anyhow::{Context, Result};

    pub fn supersede_home() -> Result<PathBuf> {
        if let Ok(home) = std::env::var("SUPERSEDE_HOME") {
            return Ok(PathBuf::from(home));
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("supersede"))
            .context("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(supersede_home()?.join("config.toml"))
    }
}

impl Config {
    const DEFAULT_LOG_LEVEL: &str = "warn";

    /// Loads configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the commented template to `path`. Fails if the file exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Renders `Config::default()` into the commented template.
    ///
    /// Used by `xtask update-default-config` to keep default_config.toml in
    /// sync with the Rust defaults.
    pub fn generate() -> Result<String> {
        use toml_edit::{DocumentMut, Item, Table};

        fn merge(target: &mut Table, source: &Table) {
            for (key, value) in source.iter() {
                match value {
                    Item::Value(v) => {
                        target[key] = Item::Value(v.clone());
                    }
                    Item::Table(src_table) => {
                        if let Some(Item::Table(target_table)) = target.get_mut(key) {
                            merge(target_table, src_table);
                        } else {
                            target[key] = Item::Table(src_table.clone());
                        }
                    }
                    Item::ArrayOfTables(arr) => {
                        target[key] = Item::ArrayOfTables(arr.clone());
                    }
                    Item::None => {}
                }
            }
        }

        let generated = toml::to_string(&Config::default())
            .context("Failed to serialize default config to TOML")?;

        let mut doc: DocumentMut = default_config_template()
            .parse()
            .context("Failed to parse default config template")?;
        let generated_doc: DocumentMut = generated
            .parse()
            .context("Failed to parse generated config")?;

        merge(doc.as_table_mut(), generated_doc.as_table());
        Ok(doc.to_string())
    }
}
