//! Plugin configuration, set once when the host pipeline is configured.

use serde::{Deserialize, Serialize};

use crate::error::TransformError;

pub const DEFAULT_RUNTIME_MODULE: &str = "tsl-uniform-gui/runtime";

/// Default persistence debounce window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Delay between a hot-reload event and reapplying the persisted snapshot,
/// leaving reloaded bindings time to re-register.
pub const HOT_RELOAD_REAPPLY_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginConfig {
    pub persistent: bool,
    pub dev_only: bool,
    pub exclude: Vec<String>,
    pub presets: bool,
    pub draggable: bool,
    pub runtime_module: String,
    /// Project root; group names become root-relative module paths.
    pub root: Option<String>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig {
            persistent: false,
            dev_only: true,
            exclude: vec!["**/node_modules/**".to_string()],
            presets: false,
            draggable: false,
            runtime_module: DEFAULT_RUNTIME_MODULE.to_string(),
            root: None,
        }
    }
}

impl PluginConfig {
    /// Parse a JSON options object; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, TransformError> {
        if json.trim().is_empty() {
            return Ok(PluginConfig::default());
        }
        Ok(serde_json::from_str(json)?)
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            persistent: self.persistent,
            presets: self.presets,
            draggable: self.draggable,
            ..RuntimeOptions::default()
        }
    }
}

/// Host build mode; `devOnly` restricts instrumentation to `Serve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Serve,
    Build,
}

/// The subset of configuration the runtime controller consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOptions {
    pub persistent: bool,
    pub presets: bool,
    pub draggable: bool,
    pub debounce_ms: u64,
    pub reapply_delay_ms: u64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            persistent: false,
            presets: false,
            draggable: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            reapply_delay_ms: HOT_RELOAD_REAPPLY_DELAY_MS,
        }
    }
}
