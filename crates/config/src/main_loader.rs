//! Main configuration discovery across the factory, bundled, XDG, and project
//! tiers.

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use {
    serde_yaml::Mapping,
    tracing::{debug, info, warn},
};

use crate::document::{ConfigDocument, ConfigTier, LoadReason, parse_yaml_mapping};

/// Main config file name inside the XDG dir and the application root.
pub const MAIN_CONFIG_FILENAME: &str = "config.yaml";

/// Factory defaults file inside the application root.
pub const FACTORY_DEFAULTS_FILENAME: &str = "config.example.yaml";

/// Used when no factory defaults file ships with the application.
const BUILTIN_FACTORY_DEFAULTS: &str = "\
pdf_viewer: null
global_pdf_options:
  format: A4
  printBackground: true
  margin:
    top: 1cm
    right: 1cm
    bottom: 1cm
    left: 1cm
math:
  enabled: false
  engine: katex
plugins: {}
";

/// Inputs to main config discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainConfigOptions {
    /// Directory holding bundled assets (`config.yaml`, `config.example.yaml`, `plugins/`).
    pub app_root: PathBuf,
    /// User-global config directory.
    pub xdg_config_dir: PathBuf,
    /// Explicit project manifest, if any.
    pub project_manifest_path: Option<PathBuf>,
    /// Ignore every tier except factory defaults.
    pub use_factory_defaults: bool,
}

#[derive(Debug)]
struct LoadedMainConfigs {
    primary: ConfigDocument,
    reason: LoadReason,
    xdg: ConfigDocument,
    project: ConfigDocument,
}

/// Determines the primary main config and exposes the XDG and project
/// documents. Everything is loaded once, on first access.
#[derive(Debug)]
pub struct MainConfigLoader {
    options: MainConfigOptions,
    loaded: OnceLock<LoadedMainConfigs>,
}

impl MainConfigLoader {
    pub fn new(options: MainConfigOptions) -> Self {
        Self {
            options,
            loaded: OnceLock::new(),
        }
    }

    pub fn options(&self) -> &MainConfigOptions {
        &self.options
    }

    pub fn xdg_main_config_path(&self) -> PathBuf {
        self.options.xdg_config_dir.join(MAIN_CONFIG_FILENAME)
    }

    pub fn bundled_main_config_path(&self) -> PathBuf {
        self.options.app_root.join(MAIN_CONFIG_FILENAME)
    }

    pub fn factory_defaults_path(&self) -> PathBuf {
        self.options.app_root.join(FACTORY_DEFAULTS_FILENAME)
    }

    /// The single primary document, by precedence.
    pub fn primary_main_config(&self) -> &ConfigDocument {
        &self.loaded().primary
    }

    pub fn load_reason(&self) -> LoadReason {
        self.loaded().reason
    }

    /// XDG global document, loaded even when it is not primary.
    pub fn xdg_main_config(&self) -> &ConfigDocument {
        &self.loaded().xdg
    }

    /// Project manifest document; empty when no manifest was given.
    pub fn project_manifest_config(&self) -> &ConfigDocument {
        &self.loaded().project
    }

    /// Factory defaults, from the shipped file or the built-in document.
    pub fn factory_defaults(&self) -> ConfigDocument {
        let path = self.factory_defaults_path();
        if path.is_file() {
            return ConfigDocument::load_or_empty(&path, ConfigTier::Factory);
        }
        let data = parse_yaml_mapping(BUILTIN_FACTORY_DEFAULTS).unwrap_or_else(|e| {
            warn!(error = %e, "built-in factory defaults failed to parse");
            Mapping::new()
        });
        ConfigDocument::new(data, None, ConfigTier::Factory)
    }

    fn loaded(&self) -> &LoadedMainConfigs {
        self.loaded.get_or_init(|| self.initialize())
    }

    fn initialize(&self) -> LoadedMainConfigs {
        let xdg_path = self.xdg_main_config_path();
        let xdg = ConfigDocument::load_or_empty(&xdg_path, ConfigTier::Xdg);

        let project_path = self.options.project_manifest_path.as_deref();
        let project = match project_path {
            Some(path) => ConfigDocument::load_or_empty(path, ConfigTier::Project),
            None => ConfigDocument::empty(ConfigTier::Project),
        };

        let (primary, reason) = self.select_primary(&xdg_path, project_path, &xdg, &project);
        info!(
            reason = %reason,
            path = ?primary.path,
            "selected primary main config"
        );

        LoadedMainConfigs {
            primary,
            reason,
            xdg,
            project,
        }
    }

    fn select_primary(
        &self,
        xdg_path: &Path,
        project_path: Option<&Path>,
        xdg: &ConfigDocument,
        project: &ConfigDocument,
    ) -> (ConfigDocument, LoadReason) {
        if self.options.use_factory_defaults {
            return (self.factory_defaults(), LoadReason::FactoryDefaultsOverride);
        }
        if let Some(path) = project_path
            && path.is_file()
        {
            return (project.clone(), LoadReason::ProjectManifest);
        }
        if xdg_path.is_file() {
            return (xdg.clone(), LoadReason::XdgGlobal);
        }
        let bundled = self.bundled_main_config_path();
        if bundled.is_file() {
            return (
                ConfigDocument::load_or_empty(&bundled, ConfigTier::Bundled),
                LoadReason::Bundled,
            );
        }
        debug!("no main config found, using factory defaults");
        (self.factory_defaults(), LoadReason::FactoryFallback)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _tmp: tempfile::TempDir,
        app_root: PathBuf,
        xdg: PathBuf,
        project: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let app_root = tmp.path().join("app");
        let xdg = tmp.path().join("xdg");
        let project = tmp.path().join("project");
        for dir in [&app_root, &xdg, &project] {
            std::fs::create_dir_all(dir).unwrap();
        }
        Fixture {
            _tmp: tmp,
            app_root,
            xdg,
            project,
        }
    }

    fn loader(f: &Fixture, manifest: Option<PathBuf>, factory: bool) -> MainConfigLoader {
        MainConfigLoader::new(MainConfigOptions {
            app_root: f.app_root.clone(),
            xdg_config_dir: f.xdg.clone(),
            project_manifest_path: manifest,
            use_factory_defaults: factory,
        })
    }

    #[test]
    fn precedence_project_over_xdg_over_bundled() {
        let f = fixture();
        std::fs::write(f.app_root.join("config.yaml"), "tier: bundled\n").unwrap();
        std::fs::write(f.xdg.join("config.yaml"), "tier: xdg\n").unwrap();
        let manifest = f.project.join("mdpress.yaml");
        std::fs::write(&manifest, "tier: project\n").unwrap();

        let l = loader(&f, Some(manifest.clone()), false);
        assert_eq!(l.load_reason(), LoadReason::ProjectManifest);
        assert_eq!(l.primary_main_config().get("tier").unwrap().as_str(), Some("project"));

        std::fs::remove_file(&manifest).unwrap();
        let l = loader(&f, Some(manifest), false);
        assert_eq!(l.load_reason(), LoadReason::XdgGlobal);

        std::fs::remove_file(f.xdg.join("config.yaml")).unwrap();
        let l = loader(&f, None, false);
        assert_eq!(l.load_reason(), LoadReason::Bundled);
        assert_eq!(l.primary_main_config().tier, ConfigTier::Bundled);

        std::fs::remove_file(f.app_root.join("config.yaml")).unwrap();
        let l = loader(&f, None, false);
        assert_eq!(l.load_reason(), LoadReason::FactoryFallback);
        assert!(l.primary_main_config().get("global_pdf_options").is_some());
    }

    #[test]
    fn factory_override_wins_but_xdg_and_project_still_load() {
        let f = fixture();
        std::fs::write(f.xdg.join("config.yaml"), "tier: xdg\n").unwrap();
        let manifest = f.project.join("mdpress.yaml");
        std::fs::write(&manifest, "tier: project\n").unwrap();
        std::fs::write(f.app_root.join("config.example.yaml"), "tier: factory\n").unwrap();

        let l = loader(&f, Some(manifest), true);
        assert_eq!(l.load_reason(), LoadReason::FactoryDefaultsOverride);
        assert_eq!(l.primary_main_config().get("tier").unwrap().as_str(), Some("factory"));
        assert_eq!(l.xdg_main_config().get("tier").unwrap().as_str(), Some("xdg"));
        assert_eq!(
            l.project_manifest_config().get("tier").unwrap().as_str(),
            Some("project")
        );
    }

    #[test]
    fn results_are_memoized_after_first_access() {
        let f = fixture();
        std::fs::write(f.xdg.join("config.yaml"), "tier: xdg\n").unwrap();
        let l = loader(&f, None, false);
        assert_eq!(l.load_reason(), LoadReason::XdgGlobal);

        std::fs::write(f.xdg.join("config.yaml"), "tier: changed\n").unwrap();
        assert_eq!(l.xdg_main_config().get("tier").unwrap().as_str(), Some("xdg"));
        assert_eq!(l.primary_main_config().get("tier").unwrap().as_str(), Some("xdg"));
    }

    #[test]
    fn unparsable_primary_degrades_to_empty() {
        let f = fixture();
        std::fs::write(f.xdg.join("config.yaml"), "plugins: [oops\n").unwrap();
        let l = loader(&f, None, false);
        assert_eq!(l.load_reason(), LoadReason::XdgGlobal);
        assert!(l.primary_main_config().is_empty());
    }
}
