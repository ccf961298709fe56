use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use {
    mdpress_common::{Error, Result},
    mdpress_config::paths::parent_dir,
};

/// Where a registration came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceType {
    Bundled,
    CollectionsManager,
    Xdg,
    Project,
    AdHoc,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => write!(f, "Bundled"),
            Self::CollectionsManager => write!(f, "Collections Manager"),
            Self::Xdg => write!(f, "XDG Global"),
            Self::Project => write!(f, "Project Manifest"),
            Self::AdHoc => write!(f, "Ad-hoc path"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRegistration {
    pub name: String,
    pub source_type: SourceType,
    /// Document or manifest that declared this plugin.
    pub defined_in: Option<PathBuf>,
    pub config_path: PathBuf,
    pub base_path: PathBuf,
    pub description: Option<String>,
}

impl PluginRegistration {
    /// Basename of the plugin directory, used for alias lookup.
    pub fn directory_name(&self) -> Option<&str> {
        self.base_path.file_name().and_then(|n| n.to_str())
    }

    pub fn source_display(&self) -> String {
        match &self.defined_in {
            Some(path) => format!("{} ({})", self.source_type, path.display()),
            None => self.source_type.to_string(),
        }
    }
}

/// Registrations keyed by name. Inserting an existing name replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRegistry {
    entries: BTreeMap<String, PluginRegistration>,
}

impl PluginRegistry {
    pub fn insert(&mut self, registration: PluginRegistration) {
        self.entries
            .insert(registration.name.clone(), registration);
    }

    pub fn get(&self, name: &str) -> Option<&PluginRegistration> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registrations in name order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginRegistration> {
        self.entries.values()
    }

    /// Look up `spec` by exact name, then by plugin directory basename.
    ///
    /// A basename shared by several registrations is a conflict; the caller
    /// has to pick one of the listed names.
    pub fn resolve(&self, spec: &str) -> Result<&PluginRegistration> {
        if let Some(found) = self.entries.get(spec) {
            return Ok(found);
        }
        let candidates: Vec<&PluginRegistration> = self
            .entries
            .values()
            .filter(|r| r.directory_name() == Some(spec))
            .collect();
        match candidates.as_slice() {
            [] => Err(Error::not_found(format!("plugin '{spec}'"))),
            [single] => Ok(*single),
            many => Err(Error::conflict(format!(
                "plugin name '{spec}' is ambiguous; candidates: {}",
                many.iter()
                    .map(|r| r.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Registered,
    EnabledCm,
    AvailableCm,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "Registered"),
            Self::EnabledCm => write!(f, "Enabled (CM)"),
            Self::AvailableCm => write!(f, "Available (CM)"),
        }
    }
}

/// One row of the plugin listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDetails {
    pub name: String,
    pub status: PluginStatus,
    pub source_display: String,
    pub description: Option<String>,
    pub config_path: PathBuf,
}

pub(crate) fn registration(
    name: impl Into<String>,
    source_type: SourceType,
    defined_in: Option<&Path>,
    config_path: PathBuf,
) -> PluginRegistration {
    let base_path = parent_dir(&config_path);
    PluginRegistration {
        name: name.into(),
        source_type,
        defined_in: defined_in.map(Path::to_path_buf),
        config_path,
        base_path,
        description: None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mdpress_common::ErrorKind};

    fn reg(name: &str, dir: &str) -> PluginRegistration {
        registration(
            name,
            SourceType::CollectionsManager,
            None,
            PathBuf::from(format!("/c/{dir}/{dir}.config.yaml")),
        )
    }

    #[test]
    fn later_insert_replaces() {
        let mut registry = PluginRegistry::default();
        registry.insert(reg("cv", "cv"));
        let mut project = reg("cv", "my-cv");
        project.source_type = SourceType::Project;
        registry.insert(project);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("cv").unwrap().source_type, SourceType::Project);
    }

    #[test]
    fn resolves_exact_then_unique_directory() {
        let mut registry = PluginRegistry::default();
        registry.insert(reg("octo-cv", "cv"));
        registry.insert(reg("letter", "letter"));
        assert_eq!(registry.resolve("letter").unwrap().name, "letter");
        assert_eq!(registry.resolve("cv").unwrap().name, "octo-cv");
    }

    #[test]
    fn ambiguous_directory_lists_candidates() {
        let mut registry = PluginRegistry::default();
        registry.insert(reg("octo-cv", "cv"));
        registry.insert(reg("team-cv", "cv"));
        let err = registry.resolve("cv").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("octo-cv, team-cv"));
    }

    #[test]
    fn unknown_spec_is_not_found() {
        let err = PluginRegistry::default().resolve("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("nope"));
    }
}
