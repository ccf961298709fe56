//! `.collection-metadata.yaml`, written into every collection directory.

use std::path::{Path, PathBuf};

use {
    mdpress_common::{Error, Result},
    serde::{Deserialize, Serialize},
};

pub const METADATA_FILENAME: &str = ".collection-metadata.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Git,
    Local,
    Singleton,
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Git => "git",
            Self::Local => "local",
            Self::Singleton => "singleton",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub name: String,
    pub source: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub added_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<String>,
}

pub fn metadata_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join(METADATA_FILENAME)
}

/// Read a collection's metadata; `Ok(None)` when the file does not exist.
pub fn read_metadata(collection_dir: &Path) -> Result<Option<CollectionMetadata>> {
    let path = metadata_path(collection_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| Error::io_at("failed to read", &path, e))?;
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::invalid_format(format!("invalid metadata in {}: {e}", path.display())))
}

/// Write metadata atomically via temp file + rename.
pub fn write_metadata(collection_dir: &Path, metadata: &CollectionMetadata) -> Result<()> {
    let path = metadata_path(collection_dir);
    let data = serde_yaml::to_string(metadata)
        .map_err(|e| Error::invalid_format(format!("cannot serialize metadata: {e}")))?;
    write_atomic(&path, &data)
}

pub(crate) fn write_atomic(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_at("failed to create", parent, e))?;
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, data).map_err(|e| Error::io_at("failed to write", &tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::io_at("failed to replace", path, e))?;
    Ok(())
}
