use crate::EditorError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tandem_common::FileSystem;

pub const DEFAULT_CONFIG_NAME: &str = "tandem.config.json";

/// Editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Undoable batches kept per document
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    /// Indent persisted documents
    #[serde(default = "default_pretty_print")]
    pub pretty_print: bool,

    /// How many times a stale diff is recomputed before giving up
    #[serde(default = "default_stale_retries")]
    pub stale_retries: usize,
}

fn default_history_depth() -> usize {
    crate::undo_stack::DEFAULT_HISTORY_DEPTH
}

fn default_pretty_print() -> bool {
    true
}

fn default_stale_retries() -> usize {
    3
}

impl EditorConfig {
    /// Load config from a directory
    pub fn load(fs: &dyn FileSystem, dir: &Path) -> Result<Self, EditorError> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if fs.exists(&config_path) {
            let content = fs.read(&config_path)?;
            let config = serde_json::from_slice(&content).map_err(tandem_common::CommonError::from)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(EditorConfig::default())
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_depth: default_history_depth(),
            pretty_print: default_pretty_print(),
            stale_retries: default_stale_retries(),
        }
    }
}
