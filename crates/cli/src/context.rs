//! Shared wiring from global CLI flags to the core components.

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    mdpress_collections::{CollectionsManager, resolve_collections_root},
    mdpress_common::process::{ProcessRunner, TokioProcessRunner},
    mdpress_config::{
        MainConfigLoader, MainConfigOptions, paths::COLLECTIONS_ROOT_ENV, xdg_config_dir,
    },
    mdpress_plugins::PluginValidator,
    mdpress_registry::{ConfigResolver, PluginRegistryBuilder},
    tracing::debug,
};

use crate::GlobalArgs;

pub struct AppContext {
    pub options: MainConfigOptions,
    pub collections_root: PathBuf,
    pub runner: Arc<dyn ProcessRunner>,
}

impl AppContext {
    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        let app_root = match &args.app_root {
            Some(root) => root.clone(),
            None => default_app_root()?,
        };
        let xdg_config_dir = match &args.config_dir {
            Some(dir) => dir.clone(),
            None => xdg_config_dir().context("could not determine the user config directory")?,
        };
        let options = MainConfigOptions {
            app_root,
            xdg_config_dir,
            project_manifest_path: args.config.clone(),
            use_factory_defaults: args.factory_defaults,
        };

        let main = MainConfigLoader::new(options.clone());
        let collections_root = resolve_collections_root(
            args.coll_root.as_deref(),
            std::env::var(COLLECTIONS_ROOT_ENV).ok(),
            main.primary_main_config(),
        )
        .context("could not determine the collections root; pass --coll-root")?;
        debug!(
            app_root = %options.app_root.display(),
            collections_root = %collections_root.display(),
            "resolved application paths"
        );

        Ok(Self {
            options,
            collections_root,
            runner: Arc::new(TokioProcessRunner),
        })
    }

    pub fn collections_manager(&self) -> Arc<CollectionsManager> {
        Arc::new(CollectionsManager::new(
            self.collections_root.clone(),
            Arc::clone(&self.runner),
        ))
    }

    pub fn registry_builder(&self, lazy_load: bool) -> Result<PluginRegistryBuilder> {
        let mut builder = PluginRegistryBuilder::new(self.options.clone())?
            .with_collections_manager(self.collections_manager());
        builder.set_lazy_load(lazy_load);
        Ok(builder)
    }

    pub fn resolver(&self) -> Result<ConfigResolver> {
        Ok(ConfigResolver::new(self.registry_builder(true)?))
    }

    pub fn validator(&self) -> PluginValidator {
        PluginValidator::new(Arc::clone(&self.runner))
    }
}

/// Directory of the running executable, which ships bundled plugins.
fn default_app_root() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("could not locate the mdpress executable")?;
    exe.parent()
        .map(PathBuf::from)
        .context("executable path has no parent directory")
}
