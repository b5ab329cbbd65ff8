//! Renderer configuration file
//!
//! A small TOML document the host reads before starting the renderer:
//!
//! ```toml
//! shader_dir = "shaders"
//!
//! [cvars]
//! vid_gamma = "1.0"
//! r_vsync = "0"
//!
//! [arena]
//! attribute_bytes = 8388608
//! fence_checks = true
//! ```

use crate::cvar::{CvarContext, CvarFlags};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed renderer config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("arena capacity for {0} must be non-zero")]
    ZeroArena(&'static str),
}

/// Capacities of the per-frame upload rings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub attribute_bytes: u32,
    pub index_bytes: u32,
    pub uniform_bytes: u32,
    /// Fail loudly when a wrap would overwrite data of the current frame.
    pub fence_checks: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            attribute_bytes: 8 * 1024 * 1024,
            index_bytes: 8 * 1024 * 1024,
            uniform_bytes: 1024 * 1024,
            fence_checks: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Directory holding the compiled `.gsh` shader groups.
    pub shader_dir: String,
    /// Cvar overrides applied before the renderer registers its defaults.
    pub cvars: BTreeMap<String, String>,
    pub arena: ArenaConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shader_dir: "shaders".to_string(),
            cvars: BTreeMap::new(),
            arena: ArenaConfig::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RendererConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.arena.attribute_bytes == 0 {
            return Err(ConfigError::ZeroArena("attribute"));
        }
        if self.arena.index_bytes == 0 {
            return Err(ConfigError::ZeroArena("index"));
        }
        if self.arena.uniform_bytes == 0 {
            return Err(ConfigError::ZeroArena("uniform"));
        }
        Ok(())
    }

    /// Seed the registry with the configured values. Overrides are
    /// archived so they survive a config write-out.
    pub fn apply_cvars(&self, cvars: &mut CvarContext) {
        for (name, value) in &self.cvars {
            cvars.get(name, value, CvarFlags::ARCHIVE);
            cvars.set(name, value);
            log::debug!("config: {} = \"{}\"", name, value);
        }
    }
}
