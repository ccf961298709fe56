//! Memoized plugin registry construction.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    mdpress_collections::{CollectionsManager, manifest::ENABLED_MANIFEST_FILENAME},
    mdpress_common::{Error, Result},
    mdpress_config::{
        ConfigDocument, ConfigTier, LoadReason, MainConfigLoader, MainConfigOptions,
        resolve_against,
    },
    mdpress_plugins::contract::{config_filename, read_description},
    tracing::{debug, info, warn},
};

use crate::types::{
    PluginDetails, PluginRegistration, PluginRegistry, PluginStatus, SourceType, registration,
};

const BUNDLED_PLUGINS_DIR: &str = "plugins";

/// Inputs the cached registry depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    use_factory_defaults: bool,
    lazy_load: bool,
    load_reason: LoadReason,
    project_manifest_path: Option<PathBuf>,
    collections_manager_id: Option<u64>,
}

pub struct PluginRegistryBuilder {
    main_loader: MainConfigLoader,
    lazy_load: bool,
    collections: Option<Arc<CollectionsManager>>,
    cache: Option<(CacheKey, PluginRegistry)>,
    build_count: usize,
}

impl PluginRegistryBuilder {
    /// Fails when `options.app_root` is empty.
    pub fn new(options: MainConfigOptions) -> Result<Self> {
        if options.app_root.as_os_str().is_empty() {
            return Err(Error::invalid_format("project root must not be empty"));
        }
        Ok(Self {
            main_loader: MainConfigLoader::new(options),
            lazy_load: false,
            collections: None,
            cache: None,
            build_count: 0,
        })
    }

    #[must_use]
    pub fn with_collections_manager(mut self, manager: Arc<CollectionsManager>) -> Self {
        self.collections = Some(manager);
        self
    }

    pub fn main_loader(&self) -> &MainConfigLoader {
        &self.main_loader
    }

    pub fn collections_manager(&self) -> Option<&Arc<CollectionsManager>> {
        self.collections.as_ref()
    }

    pub fn use_factory_defaults(&self) -> bool {
        self.main_loader.options().use_factory_defaults
    }

    pub fn set_use_factory_defaults(&mut self, value: bool) {
        if value != self.use_factory_defaults() {
            let mut options = self.main_loader.options().clone();
            options.use_factory_defaults = value;
            self.main_loader = MainConfigLoader::new(options);
        }
    }

    pub fn set_project_manifest_path(&mut self, path: Option<PathBuf>) {
        if path != self.main_loader.options().project_manifest_path {
            let mut options = self.main_loader.options().clone();
            options.project_manifest_path = path;
            self.main_loader = MainConfigLoader::new(options);
        }
    }

    pub fn set_lazy_load(&mut self, value: bool) {
        self.lazy_load = value;
    }

    pub fn set_collections_manager(&mut self, manager: Option<Arc<CollectionsManager>>) {
        self.collections = manager;
    }

    /// Drop the cached registry; the next build always runs.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Number of builds that actually ran.
    pub fn build_count(&self) -> usize {
        self.build_count
    }

    fn cache_key(&self) -> CacheKey {
        let options = self.main_loader.options();
        CacheKey {
            use_factory_defaults: options.use_factory_defaults,
            lazy_load: self.lazy_load,
            load_reason: self.main_loader.load_reason(),
            project_manifest_path: options.project_manifest_path.clone(),
            collections_manager_id: self.collections.as_ref().map(|m| m.id()),
        }
    }

    /// The merged registry, rebuilt only when a cache input changed.
    pub fn build_registry(&mut self) -> &PluginRegistry {
        let key = self.cache_key();
        let entry = match self.cache.take() {
            Some((cached, registry)) if cached == key => (cached, registry),
            _ => {
                let registry = self.build();
                self.build_count += 1;
                info!(
                    plugins = registry.len(),
                    reason = %key.load_reason,
                    lazy = key.lazy_load,
                    "built plugin registry"
                );
                (key, registry)
            },
        };
        &self.cache.insert(entry).1
    }

    fn build(&self) -> PluginRegistry {
        let mut registry = PluginRegistry::default();
        self.register_bundled(&mut registry);
        if self.use_factory_defaults() {
            debug!("factory defaults only, skipping user plugin sources");
            return registry;
        }
        self.register_collections(&mut registry);
        self.register_declared(
            &mut registry,
            self.main_loader.xdg_main_config(),
            &self.main_loader.options().xdg_config_dir,
            SourceType::Xdg,
        );
        let project = self.main_loader.project_manifest_config();
        let project_dir = project.base_dir().unwrap_or_else(|| PathBuf::from("."));
        self.register_declared(&mut registry, project, &project_dir, SourceType::Project);
        registry
    }

    fn register_bundled(&self, registry: &mut PluginRegistry) {
        let app_root = &self.main_loader.options().app_root;
        let plugins_dir = app_root.join(BUNDLED_PLUGINS_DIR);
        if let Ok(entries) = std::fs::read_dir(&plugins_dir) {
            let mut dirs: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();
            for dir in dirs {
                let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                    continue;
                };
                let config = dir.join(config_filename(&name));
                if config.is_file() {
                    self.add(
                        registry,
                        registration(name, SourceType::Bundled, Some(&plugins_dir), config),
                    );
                }
            }
        }

        let bundled_path = self.main_loader.bundled_main_config_path();
        if bundled_path.is_file() {
            let bundled = ConfigDocument::load_or_empty(&bundled_path, ConfigTier::Bundled);
            self.register_declared(registry, &bundled, app_root, SourceType::Bundled);
        }
    }

    fn register_collections(&self, registry: &mut PluginRegistry) {
        let Some(manager) = &self.collections else {
            return;
        };
        let entries = match manager.list_enabled_plugins(None) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "could not read enabled plugins, skipping collections");
                return;
            },
        };
        let manifest = manager.root().join(ENABLED_MANIFEST_FILENAME);
        for entry in entries {
            self.add(
                registry,
                registration(
                    entry.invoke_name,
                    SourceType::CollectionsManager,
                    Some(&manifest),
                    PathBuf::from(entry.config_path),
                ),
            );
        }
    }

    /// `plugins:` declarations of `doc`, relative to `base_dir`.
    fn register_declared(
        &self,
        registry: &mut PluginRegistry,
        doc: &ConfigDocument,
        base_dir: &Path,
        source_type: SourceType,
    ) {
        let aliases = doc.directory_aliases();
        for (name, raw) in doc.plugin_declarations() {
            let config = resolve_declared_path(&raw, base_dir, &aliases);
            self.add(
                registry,
                registration(name, source_type, doc.path.as_deref(), config),
            );
        }
    }

    /// Eager mode checks the config exists and reads its description.
    fn add(&self, registry: &mut PluginRegistry, mut registration: PluginRegistration) {
        if !self.lazy_load {
            if !registration.config_path.is_file() {
                warn!(
                    plugin = %registration.name,
                    source = %registration.source_type,
                    path = %registration.config_path.display(),
                    "plugin config not found, skipping registration"
                );
                return;
            }
            registration.description = read_description(&registration.config_path);
        }
        registry.insert(registration);
    }

    /// Every registered plugin plus collection plugins not yet enabled,
    /// sorted by name.
    pub fn get_all_plugin_details(&mut self) -> Vec<PluginDetails> {
        let mut details: Vec<PluginDetails> = self
            .build_registry()
            .iter()
            .map(|r| PluginDetails {
                name: r.name.clone(),
                status: if r.source_type == SourceType::CollectionsManager {
                    PluginStatus::EnabledCm
                } else {
                    PluginStatus::Registered
                },
                source_display: r.source_display(),
                description: r.description.clone(),
                config_path: r.config_path.clone(),
            })
            .collect();

        if let Some(manager) = &self.collections {
            let enabled: HashSet<(String, String)> = manager
                .list_enabled_plugins(None)
                .unwrap_or_default()
                .into_iter()
                .map(|e| (e.collection_name, e.plugin_id))
                .collect();
            match manager.list_available_plugins(None) {
                Ok(available) => {
                    for plugin in available {
                        if enabled.contains(&(plugin.collection.clone(), plugin.plugin_id.clone())) {
                            continue;
                        }
                        let mut source_display = format!("Collection '{}'", plugin.collection);
                        if plugin.source_missing {
                            source_display.push_str(" (original source missing)");
                        }
                        details.push(PluginDetails {
                            name: plugin.qualified_name(),
                            status: PluginStatus::AvailableCm,
                            source_display,
                            description: plugin.description,
                            config_path: plugin.config_path,
                        });
                    }
                },
                Err(e) => warn!(error = %e, "could not list collection plugins"),
            }
        }

        details.sort_by(|a, b| a.name.cmp(&b.name));
        details
    }
}

/// Resolve a declared config path, honoring `alias:relative/path` when
/// `alias` is a known directory alias.
fn resolve_declared_path(raw: &str, base_dir: &Path, aliases: &BTreeMap<String, String>) -> PathBuf {
    if let Some((alias, rest)) = raw.split_once(':')
        && let Some(alias_dir) = aliases.get(alias)
    {
        let dir = resolve_against(base_dir, alias_dir);
        return resolve_against(&dir, rest);
    }
    resolve_against(base_dir, raw)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        mdpress_collections::EnableOptions,
        mdpress_common::{ErrorKind, process::TokioProcessRunner},
    };

    struct Fixture {
        tmp: tempfile::TempDir,
        app: PathBuf,
        xdg: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let app = tmp.path().join("app");
            let xdg = tmp.path().join("xdg");
            std::fs::create_dir_all(&xdg).unwrap();
            write_plugin(&app.join("plugins"), "cv");
            Self { tmp, app, xdg }
        }

        fn options(&self, project: Option<PathBuf>) -> MainConfigOptions {
            MainConfigOptions {
                app_root: self.app.clone(),
                xdg_config_dir: self.xdg.clone(),
                project_manifest_path: project,
                use_factory_defaults: false,
            }
        }

        fn builder(&self, project: Option<PathBuf>) -> PluginRegistryBuilder {
            PluginRegistryBuilder::new(self.options(project)).unwrap()
        }

        fn project(&self, manifest: &str) -> PathBuf {
            let dir = self.tmp.path().join("project");
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("mdpress.yaml");
            std::fs::write(&path, manifest).unwrap();
            path
        }
    }

    fn write_plugin(parent: &Path, name: &str) -> PathBuf {
        let dir = parent.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let config = dir.join(config_filename(name));
        std::fs::write(&config, format!("description: {name} from {}\n", parent.display())).unwrap();
        config
    }

    #[test]
    fn empty_project_root_is_rejected() {
        let fixture = Fixture::new();
        let mut options = fixture.options(None);
        options.app_root = PathBuf::new();
        let err = PluginRegistryBuilder::new(options).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn memoized_until_an_input_changes() {
        let fixture = Fixture::new();
        let manifest = fixture.project("title: project\n");
        let mut builder = fixture.builder(None);

        builder.build_registry();
        builder.build_registry();
        assert_eq!(builder.build_count(), 1);

        builder.set_lazy_load(true);
        builder.build_registry();
        builder.build_registry();
        assert_eq!(builder.build_count(), 2);

        builder.set_lazy_load(true);
        builder.build_registry();
        assert_eq!(builder.build_count(), 2);

        builder.set_project_manifest_path(Some(manifest));
        builder.build_registry();
        assert_eq!(builder.build_count(), 3);

        builder.set_use_factory_defaults(true);
        builder.build_registry();
        assert_eq!(builder.build_count(), 4);

        let manager = CollectionsManager::new(
            fixture.tmp.path().join("collections"),
            Arc::new(TokioProcessRunner),
        );
        builder.set_collections_manager(Some(Arc::new(manager)));
        builder.build_registry();
        assert_eq!(builder.build_count(), 5);

        builder.invalidate();
        builder.build_registry();
        builder.build_registry();
        assert_eq!(builder.build_count(), 6);
    }

    #[test]
    fn later_sources_override_earlier_ones() {
        let fixture = Fixture::new();
        write_plugin(&fixture.xdg.join("mine"), "cv");
        std::fs::write(
            fixture.xdg.join("config.yaml"),
            "plugins:\n  cv: mine/cv/cv.config.yaml\n",
        )
        .unwrap();

        let mut builder = fixture.builder(None);
        let cv = builder.build_registry().get("cv").unwrap();
        assert_eq!(cv.source_type, SourceType::Xdg);
        assert_eq!(cv.base_path, fixture.xdg.join("mine/cv"));

        let manifest = fixture.project("plugins:\n  cv: ./local/cv/cv.config.yaml\n");
        write_plugin(&fixture.tmp.path().join("project/local"), "cv");
        builder.set_project_manifest_path(Some(manifest.clone()));
        let cv = builder.build_registry().get("cv").unwrap().clone();
        assert_eq!(cv.source_type, SourceType::Project);
        assert_eq!(cv.defined_in, Some(manifest));
        assert!(cv.description.unwrap().contains("local"));
    }

    #[test]
    fn eager_mode_drops_missing_configs_lazy_mode_keeps_them() {
        let fixture = Fixture::new();
        let manifest = fixture.project("plugins:\n  ghost: ./ghost/ghost.config.yaml\n");
        let mut builder = fixture.builder(Some(manifest));
        assert!(builder.build_registry().get("ghost").is_none());

        builder.set_lazy_load(true);
        let registry = builder.build_registry();
        let ghost = registry.get("ghost").unwrap();
        assert!(ghost.description.is_none());
        assert!(registry.get("cv").unwrap().description.is_none());
    }

    #[test]
    fn factory_defaults_only_consult_bundled_plugins() {
        let fixture = Fixture::new();
        write_plugin(&fixture.xdg, "letter");
        std::fs::write(
            fixture.xdg.join("config.yaml"),
            "plugins:\n  letter: letter/letter.config.yaml\n",
        )
        .unwrap();
        let mut builder = fixture.builder(None);
        assert!(builder.build_registry().get("letter").is_some());

        builder.set_use_factory_defaults(true);
        let registry = builder.build_registry();
        assert!(registry.get("letter").is_none());
        assert_eq!(registry.get("cv").unwrap().source_type, SourceType::Bundled);
    }

    #[test]
    fn directory_aliases_expand_in_declarations() {
        let fixture = Fixture::new();
        write_plugin(&fixture.tmp.path().join("project/shared"), "letter");
        let manifest = fixture.project(
            "plugin_directory_aliases:\n  mine: ./shared\nplugins:\n  letter: mine:letter/letter.config.yaml\n",
        );
        let mut builder = fixture.builder(Some(manifest));
        let letter = builder.build_registry().get("letter").unwrap();
        assert_eq!(letter.base_path, fixture.tmp.path().join("project/shared/letter"));
    }

    #[tokio::test]
    async fn collection_plugins_join_the_registry_and_listing() {
        let fixture = Fixture::new();
        let sources = fixture.tmp.path().join("sources");
        write_plugin(&sources, "resume");
        write_plugin(&sources, "memo");
        let manager = CollectionsManager::new(
            fixture.tmp.path().join("collections"),
            Arc::new(TokioProcessRunner),
        );
        manager
            .add_collection(&sources.display().to_string(), Some("docs"))
            .await
            .unwrap();
        manager
            .enable_plugin("docs/resume", EnableOptions {
                name: Some("my-resume".into()),
                bypass_validation: true,
            })
            .await
            .unwrap();

        let mut builder = fixture
            .builder(None)
            .with_collections_manager(Arc::new(manager));
        let registered = builder.build_registry().get("my-resume").unwrap();
        assert_eq!(registered.source_type, SourceType::CollectionsManager);
        assert_eq!(registered.directory_name(), Some("resume"));

        let details = builder.get_all_plugin_details();
        let rows: Vec<(&str, PluginStatus)> = details
            .iter()
            .map(|d| (d.name.as_str(), d.status))
            .collect();
        assert_eq!(rows, vec![
            ("cv", PluginStatus::Registered),
            ("docs/memo", PluginStatus::AvailableCm),
            ("my-resume", PluginStatus::EnabledCm),
        ]);
    }
}
