//! Collection lifecycle: add, enable, update, and remove.
//!
//! Operations check what already exists on disk before acting, so re-running
//! an interrupted add or remove recovers instead of failing.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    mdpress_common::{Error, Result, process::ProcessRunner, time::now_rfc3339},
    mdpress_config::{ConfigDocument, expand_tilde, paths::COLLECTIONS_ROOT_ENV, xdg_data_dir},
    mdpress_plugins::{
        PluginValidator,
        contract::{config_filename, find_config_file, first_config_file, plugin_id_from_config, read_description},
    },
    tracing::{debug, info, warn},
};

use crate::{
    copy::copy_tree,
    git::GitClient,
    manifest::{EnabledManifestStore, validate_invoke_name},
    metadata::{CollectionMetadata, CollectionType, read_metadata, write_metadata},
    source::{CollectionSource, default_prefix},
    types::{
        AvailablePlugin, CollectionInfo, CommandOutcome, EnableAllOptions, EnableOptions,
        EnabledPluginEntry, SINGLETON_COLLECTION,
    },
};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Pick the collections root: explicit value, then the environment variable,
/// then `collections_root` from the main config, then the XDG data dir.
pub fn resolve_collections_root(
    explicit: Option<&Path>,
    env_value: Option<String>,
    main_config: &ConfigDocument,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) {
        debug!(var = COLLECTIONS_ROOT_ENV, "collections root from environment");
        return Some(expand_tilde(raw.trim()));
    }
    if let Some(root) = main_config.collections_root() {
        return Some(root);
    }
    xdg_data_dir().map(|d| d.join("collections"))
}

pub struct CollectionsManager {
    id: u64,
    root: PathBuf,
    git: GitClient,
    validator: PluginValidator,
    manifest: EnabledManifestStore,
}

impl CollectionsManager {
    pub fn new(root: PathBuf, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            manifest: EnabledManifestStore::in_root(&root),
            git: GitClient::new(Arc::clone(&runner)),
            validator: PluginValidator::new(runner),
            root,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: PluginValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Process-unique identity of this manager instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn singleton_dir(&self, id: &str) -> PathBuf {
        self.root.join(SINGLETON_COLLECTION).join(id)
    }

    // ── Adding ───────────────────────────────────────────────────────────────

    /// Clone a git remote or copy a local directory into a new collection.
    pub async fn add_collection(
        &self,
        source: &str,
        name: Option<&str>,
    ) -> Result<CollectionMetadata> {
        let source = CollectionSource::classify(source);
        let name = match name {
            Some(n) => n.to_string(),
            None => source.default_name().ok_or_else(|| {
                Error::invalid_format(format!(
                    "cannot derive a collection name from '{}'",
                    source.recorded()
                ))
            })?,
        };
        validate_collection_name(&name)?;

        let target = self.collection_dir(&name);
        self.clear_interrupted_target(&target, &format!("collection '{name}'"))
            .await?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::io_at("failed to create", &self.root, e))?;

        let collection_type = match &source {
            CollectionSource::Git(url) => {
                if let Err(e) = self.git.clone_repo(url, &target).await {
                    discard_partial_target(&target).await;
                    return Err(e);
                }
                CollectionType::Git
            },
            CollectionSource::Local(path) => {
                if !path.is_dir() {
                    return Err(Error::not_found(format!(
                        "source directory '{}'",
                        path.display()
                    )));
                }
                if let Err(e) = copy_tree(path, &target).await {
                    discard_partial_target(&target).await;
                    return Err(e);
                }
                CollectionType::Local
            },
        };

        let metadata = CollectionMetadata {
            name: name.clone(),
            source: source.recorded(),
            collection_type,
            added_on: now_rfc3339(),
            updated_on: None,
        };
        write_metadata(&target, &metadata)?;
        info!(collection = %name, source = %metadata.source, kind = %collection_type, "added collection");
        Ok(metadata)
    }

    /// Copy a single plugin directory into the singleton collection and
    /// enable it. The copy is kept when enabling fails.
    pub async fn add_singleton_plugin(
        &self,
        source_path: &Path,
        options: EnableOptions,
    ) -> Result<CommandOutcome> {
        let source = match CollectionSource::classify(&source_path.to_string_lossy()) {
            CollectionSource::Local(path) => path,
            CollectionSource::Git(url) => {
                return Err(Error::invalid_format(format!(
                    "'{url}' is a git remote; add it as a collection instead"
                )));
            },
        };
        if !source.is_dir() {
            return Err(Error::not_found(format!(
                "plugin directory '{}'",
                source.display()
            )));
        }
        let id = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::invalid_format("plugin path has no directory name"))?;
        let config = source.join(config_filename(&id));
        if !config.is_file() {
            return Err(Error::missing_file("plugin config", config));
        }
        validate_collection_name(&id)?;

        let target = self.singleton_dir(&id);
        self.clear_interrupted_target(&target, &format!("singleton plugin '{id}'"))
            .await?;
        copy_tree(&source, &target).await?;
        write_metadata(&target, &CollectionMetadata {
            name: id.clone(),
            source: source.display().to_string(),
            collection_type: CollectionType::Singleton,
            added_on: now_rfc3339(),
            updated_on: None,
        })?;
        info!(plugin = %id, source = %source.display(), "added singleton plugin");

        let mut outcome = CommandOutcome::ok(format!("Copied '{}' to {}", id, target.display()));
        match self
            .enable_plugin(&format!("{SINGLETON_COLLECTION}/{id}"), options)
            .await
        {
            Ok(entry) => outcome.push(format!("Enabled '{}'", entry.invoke_name)),
            Err(e) => {
                warn!(plugin = %id, error = %e, "singleton plugin copied but not enabled");
                outcome.push(format!(
                    "Warning: plugin copied but not enabled: {e}"
                ));
            },
        }
        Ok(outcome)
    }

    /// An existing target with metadata is a conflict; one without is the
    /// leftover of an interrupted add and is removed.
    async fn clear_interrupted_target(&self, target: &Path, what: &str) -> Result<()> {
        if !target.exists() {
            return Ok(());
        }
        if read_metadata(target)?.is_some() {
            return Err(Error::conflict(format!("{what} already exists")));
        }
        warn!(path = %target.display(), "removing leftover of an interrupted add");
        remove_dir_if_exists(target).await
    }

    // ── Enabling ─────────────────────────────────────────────────────────────

    /// Enable `collection/plugin_id` under its plugin id or `options.name`.
    pub async fn enable_plugin(
        &self,
        qualified: &str,
        options: EnableOptions,
    ) -> Result<EnabledPluginEntry> {
        let (collection, plugin_id) = qualified.split_once('/').ok_or_else(|| {
            Error::invalid_format(format!(
                "expected <collection>/<plugin_id>, got '{qualified}'"
            ))
        })?;
        let plugin = self
            .list_available_plugins(Some(collection))?
            .into_iter()
            .find(|p| p.plugin_id == plugin_id)
            .ok_or_else(|| Error::not_found(format!("plugin '{qualified}'")))?;

        let invoke_name = options.name.unwrap_or_else(|| plugin_id.to_string());
        validate_invoke_name(&invoke_name)?;

        if options.bypass_validation {
            debug!(plugin = %qualified, "skipping validation");
        } else {
            self.validator
                .ensure_valid(&plugin.base_path, plugin_id)
                .await?;
        }

        let mut manifest = self.manifest.load()?;
        let entry = EnabledPluginEntry {
            collection_name: collection.to_string(),
            plugin_id: plugin_id.to_string(),
            invoke_name,
            config_path: plugin.config_path.display().to_string(),
            added_on: now_rfc3339(),
        };
        manifest.insert(entry.clone())?;
        self.manifest.save(&manifest)?;
        info!(plugin = %qualified, invoke_name = %entry.invoke_name, "enabled plugin");
        Ok(entry)
    }

    pub fn disable_plugin(&self, invoke_name: &str) -> Result<EnabledPluginEntry> {
        let mut manifest = self.manifest.load()?;
        let removed = manifest
            .remove(invoke_name)
            .ok_or_else(|| Error::not_found(format!("enabled plugin '{invoke_name}'")))?;
        self.manifest.save(&manifest)?;
        info!(%invoke_name, "disabled plugin");
        Ok(removed)
    }

    /// Enable every plugin of a collection, one at a time, recording each
    /// result in the outcome.
    pub async fn enable_all_plugins_in_collection(
        &self,
        name: &str,
        options: EnableAllOptions,
    ) -> Result<CommandOutcome> {
        validate_collection_ref(name)?;
        let dir = self.collection_dir(name);
        if !dir.is_dir() {
            return Err(Error::not_found(format!("collection '{name}'")));
        }
        let prefix = if options.no_prefix {
            String::new()
        } else if let Some(prefix) = options.prefix {
            prefix
        } else {
            read_metadata(&dir)?
                .and_then(|m| default_prefix(&m.source, name))
                .unwrap_or_default()
        };

        let plugins = self.list_available_plugins(Some(name))?;
        if plugins.is_empty() {
            return Ok(CommandOutcome::failed(format!(
                "No plugins found in collection '{name}'"
            )));
        }

        let mut outcome = CommandOutcome::default();
        for plugin in plugins {
            let qualified = plugin.qualified_name();
            let invoke_name = format!("{prefix}{}", plugin.plugin_id);
            let result = self
                .enable_plugin(&qualified, EnableOptions {
                    name: Some(invoke_name),
                    bypass_validation: options.bypass_validation,
                })
                .await;
            match result {
                Ok(entry) => outcome.push(format!("Enabled {qualified} as '{}'", entry.invoke_name)),
                Err(e) => outcome.fail(format!("Failed to enable {qualified}: {e}")),
            }
        }
        Ok(outcome)
    }

    // ── Updating ─────────────────────────────────────────────────────────────

    /// Bring a collection up to date with its source. A collection that is
    /// not installed is a successful no-op.
    pub async fn update_collection(&self, name: &str) -> CommandOutcome {
        if name == SINGLETON_COLLECTION {
            return self.update_all_singletons().await;
        }
        if let Err(e) = validate_collection_name(name) {
            return CommandOutcome::failed(e.to_string());
        }
        let dir = self.collection_dir(name);
        if !dir.is_dir() {
            return CommandOutcome::ok(format!(
                "Collection '{name}' is not installed; nothing to update"
            ));
        }
        let metadata = match read_metadata(&dir) {
            Ok(Some(m)) => m,
            Ok(None) => {
                return CommandOutcome::failed(format!(
                    "Collection '{name}' has no metadata; remove and add it again"
                ));
            },
            Err(e) => return CommandOutcome::failed(format!("Collection '{name}': {e}")),
        };

        let result = match metadata.collection_type {
            CollectionType::Git => self.update_git(name, &dir, metadata).await,
            CollectionType::Local | CollectionType::Singleton => {
                self.resync_copy(name, &dir, metadata).await
            },
        };
        result.unwrap_or_else(|e| CommandOutcome::failed(format!("Failed to update '{name}': {e}")))
    }

    async fn update_git(
        &self,
        name: &str,
        dir: &Path,
        mut metadata: CollectionMetadata,
    ) -> Result<CommandOutcome> {
        let branch = self.git.remote_default_branch(dir).await?;
        self.git.fetch(dir).await?;

        let changes = self.git.status_porcelain(dir).await?;
        if !changes.is_empty() {
            warn!(collection = %name, files = changes.len(), "refusing to update over local changes");
            let mut outcome = CommandOutcome::failed(format!(
                "Collection '{name}' has local changes; commit or discard them before updating"
            ));
            for line in changes {
                outcome.push(format!("  {line}"));
            }
            return Ok(outcome);
        }

        let ahead = self.git.commits_ahead(dir, &branch).await?;
        if ahead > 0 {
            return Ok(CommandOutcome::failed(format!(
                "Collection '{name}' has {ahead} local commit(s) not on origin/{branch}"
            )));
        }

        self.git.reset_hard(dir, &branch).await?;
        metadata.updated_on = Some(now_rfc3339());
        write_metadata(dir, &metadata)?;
        info!(collection = %name, %branch, "updated collection");
        Ok(CommandOutcome::ok(format!(
            "Updated '{name}' to origin/{branch}"
        )))
    }

    /// Replace a copied collection or singleton with a fresh copy of its source.
    async fn resync_copy(
        &self,
        name: &str,
        dir: &Path,
        mut metadata: CollectionMetadata,
    ) -> Result<CommandOutcome> {
        let source = PathBuf::from(&metadata.source);
        if !source.is_dir() {
            return Ok(CommandOutcome::failed(format!(
                "Source of '{name}' no longer exists: {}",
                source.display()
            )));
        }
        remove_dir_if_exists(dir).await?;
        copy_tree(&source, dir).await?;
        metadata.updated_on = Some(now_rfc3339());
        write_metadata(dir, &metadata)?;
        info!(collection = %name, source = %source.display(), "re-synced collection");
        Ok(CommandOutcome::ok(format!(
            "Re-synced '{name}' from {}",
            source.display()
        )))
    }

    async fn update_all_singletons(&self) -> CommandOutcome {
        let mut outcome = CommandOutcome::default();
        for id in subdirectories(&self.root.join(SINGLETON_COLLECTION)) {
            let dir = self.singleton_dir(&id);
            let label = format!("{SINGLETON_COLLECTION}/{id}");
            let result = match read_metadata(&dir) {
                Ok(Some(metadata)) => self.resync_copy(&label, &dir, metadata).await,
                Ok(None) => Ok(CommandOutcome::failed(format!(
                    "Singleton '{id}' has no metadata; add it again"
                ))),
                Err(e) => Err(e),
            };
            outcome.absorb(result.unwrap_or_else(|e| {
                CommandOutcome::failed(format!("Failed to update '{label}': {e}"))
            }));
        }
        outcome
    }

    /// Update every downloaded collection and every singleton, one at a time.
    pub async fn update_all_collections(&self) -> CommandOutcome {
        let mut outcome = CommandOutcome::default();
        let names = subdirectories(&self.root);
        if names.is_empty() {
            outcome.push("No collections installed");
        }
        for name in names {
            outcome.absorb(self.update_collection(&name).await);
        }
        outcome
    }

    // ── Removing ─────────────────────────────────────────────────────────────

    /// Delete a collection. Enabled plugins from it block removal unless
    /// `force`, which disables them first.
    pub async fn remove_collection(&self, name: &str, force: bool) -> Result<CommandOutcome> {
        validate_collection_ref(name)?;
        let dir = self.collection_dir(name);
        let mut manifest = self.manifest.load()?;
        let enabled: Vec<String> = manifest
            .for_collection(name)
            .map(|e| e.invoke_name.clone())
            .collect();

        if !dir.exists() && enabled.is_empty() {
            return Err(Error::not_found(format!("collection '{name}'")));
        }

        let mut outcome = CommandOutcome::default();
        if !enabled.is_empty() {
            if !force {
                return Err(Error::conflict(format!(
                    "collection '{name}' has enabled plugins ({}); disable them first or use --force",
                    enabled.join(", ")
                )));
            }
            manifest.remove_collection(name);
            self.manifest.save(&manifest)?;
            for invoke_name in &enabled {
                outcome.push(format!("Disabled '{invoke_name}'"));
            }
        }

        remove_dir_if_exists(&dir).await?;
        info!(collection = %name, force, "removed collection");
        outcome.push(format!("Removed collection '{name}'"));
        Ok(outcome)
    }

    // ── Listing ──────────────────────────────────────────────────────────────

    pub fn list_collections(&self) -> Vec<CollectionInfo> {
        subdirectories(&self.root)
            .into_iter()
            .map(|name| {
                let path = self.collection_dir(&name);
                let metadata = read_metadata(&path).unwrap_or_else(|e| {
                    warn!(collection = %name, error = %e, "unreadable collection metadata");
                    None
                });
                CollectionInfo {
                    name,
                    path,
                    metadata,
                }
            })
            .collect()
    }

    /// Plugins found in downloaded collections, sorted by collection then id.
    pub fn list_available_plugins(&self, collection: Option<&str>) -> Result<Vec<AvailablePlugin>> {
        let names = match collection {
            Some(name) => {
                validate_collection_ref(name)?;
                if !self.collection_dir(name).is_dir() {
                    return Err(Error::not_found(format!("collection '{name}'")));
                }
                vec![name.to_string()]
            },
            None => subdirectories(&self.root),
        };

        let mut plugins = Vec::new();
        for name in names {
            if name == SINGLETON_COLLECTION {
                plugins.extend(self.singleton_plugins());
            } else {
                plugins.extend(collection_plugins(&name, &self.collection_dir(&name)));
            }
        }
        plugins.sort_by(|a, b| {
            (a.collection.as_str(), a.plugin_id.as_str())
                .cmp(&(b.collection.as_str(), b.plugin_id.as_str()))
        });
        Ok(plugins)
    }

    fn singleton_plugins(&self) -> Vec<AvailablePlugin> {
        subdirectories(&self.root.join(SINGLETON_COLLECTION))
            .into_iter()
            .filter_map(|id| {
                let base = self.singleton_dir(&id);
                let config = find_config_file(&base, &id)?;
                let source_missing = match read_metadata(&base) {
                    Ok(Some(meta)) => !Path::new(&meta.source).exists(),
                    _ => false,
                };
                Some(AvailablePlugin {
                    collection: SINGLETON_COLLECTION.to_string(),
                    description: read_description(&config),
                    plugin_id: id,
                    base_path: base,
                    config_path: config,
                    source_missing,
                })
            })
            .collect()
    }

    pub fn list_enabled_plugins(&self, collection: Option<&str>) -> Result<Vec<EnabledPluginEntry>> {
        let manifest = self.manifest.load()?;
        Ok(manifest
            .enabled_plugins
            .into_iter()
            .filter(|e| collection.is_none_or(|c| e.collection_name == c))
            .collect())
    }
}

/// Plugins of one collection: each subdirectory with a config file, plus the
/// collection root itself when it holds a `*.config.yaml`.
fn collection_plugins(collection: &str, dir: &Path) -> Vec<AvailablePlugin> {
    let mut plugins = Vec::new();
    if let Some(config) = first_config_file(dir)
        && let Some(id) = plugin_id_from_config(&config)
    {
        plugins.push(AvailablePlugin {
            collection: collection.to_string(),
            plugin_id: id,
            description: read_description(&config),
            base_path: dir.to_path_buf(),
            config_path: config,
            source_missing: false,
        });
    }
    for id in subdirectories(dir) {
        let base = dir.join(&id);
        let Some(config) = find_config_file(&base, &id) else {
            continue;
        };
        plugins.push(AvailablePlugin {
            collection: collection.to_string(),
            description: read_description(&config),
            plugin_id: id,
            base_path: base,
            config_path: config,
            source_missing: false,
        });
    }
    plugins
}

/// Non-hidden subdirectory names, sorted.
fn subdirectories(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// A name that addresses exactly one directory directly under the root. The
/// singleton collection counts as one.
fn validate_collection_ref(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(Error::invalid_format(format!(
            "invalid collection name '{name}'"
        )));
    }
    Ok(())
}

/// A name a new collection may be created under.
fn validate_collection_name(name: &str) -> Result<()> {
    validate_collection_ref(name)?;
    if name == SINGLETON_COLLECTION {
        return Err(Error::invalid_format(format!(
            "collection name '{name}' is reserved"
        )));
    }
    Ok(())
}

/// Best-effort removal of a half-written collection after a failed add.
async fn discard_partial_target(target: &Path) {
    if let Err(e) = remove_dir_if_exists(target).await {
        warn!(path = %target.display(), error = %e, "failed to clean up after an unsuccessful add");
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| Error::io_at("failed to remove", dir, e))?;
    }
    Ok(())
}
