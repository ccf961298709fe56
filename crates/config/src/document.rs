//! Loaded configuration documents and their provenance.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use {
    mdpress_common::{Error, Result},
    serde_yaml::{Mapping, Value},
    tracing::{debug, warn},
};

use crate::paths::{parent_dir, resolve_against};

/// Tier a configuration document was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigTier {
    Factory,
    Bundled,
    Xdg,
    Project,
}

impl fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factory => write!(f, "factory"),
            Self::Bundled => write!(f, "bundled"),
            Self::Xdg => write!(f, "xdg"),
            Self::Project => write!(f, "project"),
        }
    }
}

/// Why a document was chosen as the primary main config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadReason {
    FactoryDefaultsOverride,
    ProjectManifest,
    XdgGlobal,
    Bundled,
    FactoryFallback,
}

impl fmt::Display for LoadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FactoryDefaultsOverride => write!(f, "factory defaults (forced)"),
            Self::ProjectManifest => write!(f, "project manifest"),
            Self::XdgGlobal => write!(f, "XDG global config"),
            Self::Bundled => write!(f, "bundled main config"),
            Self::FactoryFallback => write!(f, "factory defaults (fallback)"),
        }
    }
}

/// A parsed YAML mapping plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    pub data: Mapping,
    pub path: Option<PathBuf>,
    pub tier: ConfigTier,
}

impl ConfigDocument {
    pub fn empty(tier: ConfigTier) -> Self {
        Self {
            data: Mapping::new(),
            path: None,
            tier,
        }
    }

    pub fn new(data: Mapping, path: Option<PathBuf>, tier: ConfigTier) -> Self {
        Self { data, path, tier }
    }

    /// Load `path`, degrading to an empty document with a warning when the
    /// file is missing or unparsable. The path is kept either way.
    pub fn load_or_empty(path: &Path, tier: ConfigTier) -> Self {
        if !path.is_file() {
            debug!(path = %path.display(), %tier, "config document not present");
            return Self::new(Mapping::new(), Some(path.to_path_buf()), tier);
        }
        match load_yaml_mapping(path) {
            Ok(data) => Self::new(data, Some(path.to_path_buf()), tier),
            Err(e) => {
                warn!(path = %path.display(), %tier, error = %e, "failed to load config document, using empty mapping");
                Self::new(Mapping::new(), Some(path.to_path_buf()), tier)
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Directory relative paths inside this document resolve against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.path.as_deref().map(parent_dir)
    }

    /// `plugins:` entries whose value is a config path string.
    pub fn plugin_declarations(&self) -> Vec<(String, String)> {
        let Some(Value::Mapping(plugins)) = self.data.get("plugins") else {
            return Vec::new();
        };
        plugins
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
            .collect()
    }

    /// `plugin_directory_aliases:` as `alias -> directory`.
    pub fn directory_aliases(&self) -> BTreeMap<String, String> {
        let Some(Value::Mapping(aliases)) = self.data.get("plugin_directory_aliases") else {
            return BTreeMap::new();
        };
        aliases
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
            .collect()
    }

    /// `collections_root:` resolved against this document's directory.
    pub fn collections_root(&self) -> Option<PathBuf> {
        let raw = self.data.get("collections_root")?.as_str()?;
        let base = self.base_dir().unwrap_or_else(|| PathBuf::from("."));
        Some(resolve_against(&base, raw))
    }
}

/// Read and parse a YAML file whose top level must be a mapping.
///
/// An empty file parses to an empty mapping.
pub fn load_yaml_mapping(path: &Path) -> Result<Mapping> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::io_at("failed to read", path, e))?;
    parse_yaml_mapping(&raw)
        .map_err(|e| Error::invalid_format(format!("invalid YAML in {}: {e}", path.display())))
}

pub fn parse_yaml_mapping(raw: &str) -> std::result::Result<Mapping, String> {
    if raw.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(raw).map_err(|e| e.to_string())? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err("top level is not a mapping".to_string()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_document_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = ConfigDocument::load_or_empty(&tmp.path().join("config.yaml"), ConfigTier::Xdg);
        assert!(doc.is_empty());
        assert_eq!(doc.tier, ConfigTier::Xdg);
    }

    #[test]
    fn unparsable_document_degrades_to_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "plugins: [unclosed\n").unwrap();
        let doc = ConfigDocument::load_or_empty(&path, ConfigTier::Project);
        assert!(doc.is_empty());
        assert_eq!(doc.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn scalar_top_level_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "just a string\n").unwrap();
        let err = load_yaml_mapping(&path).unwrap_err();
        assert_eq!(err.kind(), mdpress_common::ErrorKind::InvalidFormat);
    }

    #[test]
    fn declarations_and_aliases_are_read() {
        let data = parse_yaml_mapping(
            "plugins:\n  cv: ./cv/cv.config.yaml\n  bad: 3\nplugin_directory_aliases:\n  mine: ~/plugins\n",
        )
        .unwrap();
        let doc = ConfigDocument::new(data, Some(PathBuf::from("/p/config.yaml")), ConfigTier::Project);
        assert_eq!(doc.plugin_declarations(), vec![(
            "cv".to_string(),
            "./cv/cv.config.yaml".to_string()
        )]);
        assert_eq!(doc.directory_aliases().get("mine").map(String::as_str), Some("~/plugins"));
        assert_eq!(doc.base_dir(), Some(PathBuf::from("/p")));
    }

    #[test]
    fn collections_root_resolves_relative_to_document() {
        let data = parse_yaml_mapping("collections_root: ./colls\n").unwrap();
        let doc = ConfigDocument::new(data, Some(PathBuf::from("/p/config.yaml")), ConfigTier::Xdg);
        assert_eq!(doc.collections_root(), Some(PathBuf::from("/p/./colls")));
    }
}
