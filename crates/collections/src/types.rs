use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::metadata::CollectionMetadata;

/// Reserved collection holding plugins added one at a time.
pub const SINGLETON_COLLECTION: &str = "_user_added_plugins";

// ── Enabled manifest ─────────────────────────────────────────────────────────

/// One enabled plugin instance, addressed by its `invoke_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledPluginEntry {
    pub collection_name: String,
    pub plugin_id: String,
    pub invoke_name: String,
    pub config_path: String,
    pub added_on: String,
}

// ── Listings ─────────────────────────────────────────────────────────────────

/// A plugin found inside a downloaded collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailablePlugin {
    pub collection: String,
    pub plugin_id: String,
    pub description: Option<String>,
    pub base_path: PathBuf,
    pub config_path: PathBuf,
    /// Singleton whose recorded source path no longer exists.
    pub source_missing: bool,
}

impl AvailablePlugin {
    /// `collection/plugin_id`, the form `enable` accepts.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.collection, self.plugin_id)
    }
}

#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub path: PathBuf,
    pub metadata: Option<CollectionMetadata>,
}

// ── Operation options and results ────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EnableOptions {
    /// Invoke name to register under; defaults to the plugin id.
    pub name: Option<String>,
    pub bypass_validation: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EnableAllOptions {
    pub prefix: Option<String>,
    pub no_prefix: bool,
    pub bypass_validation: bool,
}

/// Result of an update or batch operation. Per-item failures are recorded
/// here rather than returned as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub messages: Vec<String>,
}

impl Default for CommandOutcome {
    fn default() -> Self {
        Self {
            success: true,
            messages: Vec::new(),
        }
    }
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            messages: vec![message.into()],
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            messages: vec![message.into()],
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.success = false;
        self.messages.push(message.into());
    }

    /// Fold another outcome in; the combined outcome fails if either did.
    pub fn absorb(&mut self, other: CommandOutcome) {
        self.success &= other.success;
        self.messages.extend(other.messages);
    }
}
