//! `enabled.yaml`: every enabled plugin instance, sorted by invoke name.

use std::path::{Path, PathBuf};

use {
    mdpress_common::{Error, Result},
    serde::{Deserialize, Serialize},
};

use crate::{metadata::write_atomic, types::EnabledPluginEntry};

pub const ENABLED_MANIFEST_FILENAME: &str = "enabled.yaml";

const MAX_INVOKE_NAME_LEN: usize = 64;

/// Check an invoke name: 1 to 64 characters, an ASCII letter or digit first,
/// then ASCII letters, digits, `-` or `_`.
pub fn validate_invoke_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = name.len() <= MAX_INVOKE_NAME_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_format(format!(
            "invalid invoke name '{name}': use 1-{MAX_INVOKE_NAME_LEN} letters, digits, '-' or '_', starting with a letter or digit"
        )))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledManifest {
    #[serde(default)]
    pub enabled_plugins: Vec<EnabledPluginEntry>,
}

impl EnabledManifest {
    pub fn find(&self, invoke_name: &str) -> Option<&EnabledPluginEntry> {
        self.enabled_plugins
            .iter()
            .find(|e| e.invoke_name == invoke_name)
    }

    /// Insert keeping invoke names unique and entries sorted.
    pub fn insert(&mut self, entry: EnabledPluginEntry) -> Result<()> {
        if let Some(existing) = self.find(&entry.invoke_name) {
            return Err(Error::conflict(format!(
                "invoke name '{}' is already used by {}/{}",
                entry.invoke_name, existing.collection_name, existing.plugin_id
            )));
        }
        self.enabled_plugins.push(entry);
        self.sort();
        Ok(())
    }

    pub fn remove(&mut self, invoke_name: &str) -> Option<EnabledPluginEntry> {
        let pos = self
            .enabled_plugins
            .iter()
            .position(|e| e.invoke_name == invoke_name)?;
        Some(self.enabled_plugins.remove(pos))
    }

    /// Remove every entry enabled from `collection`, returning them.
    pub fn remove_collection(&mut self, collection: &str) -> Vec<EnabledPluginEntry> {
        let (removed, kept) = std::mem::take(&mut self.enabled_plugins)
            .into_iter()
            .partition(|e| e.collection_name == collection);
        self.enabled_plugins = kept;
        removed
    }

    pub fn for_collection<'a>(
        &'a self,
        collection: &'a str,
    ) -> impl Iterator<Item = &'a EnabledPluginEntry> + 'a {
        self.enabled_plugins
            .iter()
            .filter(move |e| e.collection_name == collection)
    }

    fn sort(&mut self) {
        self.enabled_plugins
            .sort_by(|a, b| a.invoke_name.cmp(&b.invoke_name));
    }
}

/// Persistent storage for the enabled manifest with atomic writes.
pub struct EnabledManifestStore {
    path: PathBuf,
}

impl EnabledManifestStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_root(collections_root: &Path) -> Self {
        Self::new(collections_root.join(ENABLED_MANIFEST_FILENAME))
    }

    /// Load the manifest, returning an empty one if the file is missing.
    pub fn load(&self) -> Result<EnabledManifest> {
        if !self.path.exists() {
            return Ok(EnabledManifest::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::io_at("failed to read", &self.path, e))?;
        if raw.trim().is_empty() {
            return Ok(EnabledManifest::default());
        }
        serde_yaml::from_str(&raw).map_err(|e| {
            Error::invalid_format(format!("invalid manifest {}: {e}", self.path.display()))
        })
    }

    pub fn save(&self, manifest: &EnabledManifest) -> Result<()> {
        let mut sorted = manifest.clone();
        sorted.sort();
        let data = serde_yaml::to_string(&sorted)
            .map_err(|e| Error::invalid_format(format!("cannot serialize manifest: {e}")))?;
        write_atomic(&self.path, &data)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
