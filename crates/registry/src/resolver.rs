//! Effective plugin configuration: registry lookup plus every config layer.

use std::path::{Path, PathBuf};

use {
    mdpress_common::{Error, Result},
    mdpress_config::{
        MergedPluginConfig, PluginConfigLoader, expand_tilde,
        paths::parent_dir,
        plugin_loader::{handler_script_name, inherit_css_of, resolve_css_paths},
        value::deep_merge,
    },
    mdpress_plugins::contract::{DEFAULT_HANDLER_SCRIPT, dir_name, find_config_file, plugin_id_from_config},
    serde_yaml::{Mapping, Value},
    tracing::debug,
};

use crate::{
    builder::PluginRegistryBuilder,
    types::{PluginRegistration, SourceType, registration},
};

/// Main config keys inherited beneath the plugin's own keys of the same shape.
const INHERITED_SECTIONS: &[(&str, &str)] = &[("global_pdf_options", "pdf_options"), ("math", "math")];

const CONFIG_SUFFIX: &str = ".config.yaml";

/// Everything needed to run one plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectivePluginConfig {
    pub plugin_specific_config: Mapping,
    pub plugin_base_path: PathBuf,
    pub handler_script_path: PathBuf,
    pub main_config: Mapping,
}

pub struct ConfigResolver {
    builder: PluginRegistryBuilder,
    plugin_loader: Option<PluginConfigLoader>,
    last_sources: Vec<String>,
}

impl ConfigResolver {
    pub fn new(builder: PluginRegistryBuilder) -> Self {
        Self {
            builder,
            plugin_loader: None,
            last_sources: Vec::new(),
        }
    }

    pub fn builder(&self) -> &PluginRegistryBuilder {
        &self.builder
    }

    /// Mutable access to the registry builder. Plugin config layers are
    /// reloaded on the next resolution.
    pub fn builder_mut(&mut self) -> &mut PluginRegistryBuilder {
        self.plugin_loader = None;
        &mut self.builder
    }

    /// Files (or inline override labels) that contributed to the last
    /// resolution, lowest precedence first.
    pub fn config_file_sources(&self) -> &[String] {
        &self.last_sources
    }

    fn loader(&mut self) -> &mut PluginConfigLoader {
        let main = self.builder.main_loader();
        self.plugin_loader.get_or_insert_with(|| {
            PluginConfigLoader::new(
                main.options().xdg_config_dir.clone(),
                main.xdg_main_config().clone(),
                main.project_manifest_config().clone(),
                main.options().use_factory_defaults,
            )
        })
    }

    /// Resolve `plugin_spec` (a registered name, a plugin directory, or a
    /// `*.config.yaml` path) to its effective configuration.
    ///
    /// `local_overrides` apply last; their CSS resolves against the markdown
    /// file's directory, else the current directory.
    pub fn get_effective_config(
        &mut self,
        plugin_spec: &str,
        local_overrides: Option<&Mapping>,
        markdown_file_path: Option<&Path>,
    ) -> Result<EffectivePluginConfig> {
        let plugin = match ad_hoc_registration(plugin_spec)? {
            Some(plugin) => plugin,
            None => self.builder.build_registry().resolve(plugin_spec)?.clone(),
        };
        debug!(spec = plugin_spec, plugin = %plugin.name, source = %plugin.source_type, "resolving plugin config");

        let name = plugin.name.clone();
        let loader = self.loader();
        let base = loader
            .load_single_config_layer(&plugin.config_path, &plugin.base_path, &name)
            .ok_or_else(|| {
                Error::missing_file(&format!("config for plugin '{name}'"), plugin.config_path.clone())
            })?;
        let sources = vec![base.actual_path.to_string_lossy().into_owned()];
        let (mut merged, mut sources) =
            loader.apply_override_layers(&name, MergedPluginConfig::from_layer(&base), sources);

        if let Some(local) = local_overrides.filter(|m| !m.is_empty()) {
            apply_local_overrides(&mut merged, local, markdown_file_path, &name);
            sources.push("local overrides".to_string());
        }

        let main_config = self.builder.main_loader().primary_main_config().data.clone();
        let mut config = merged.into_config();
        inherit_main_sections(&mut config, &main_config);

        let handler = handler_script_name(&config).unwrap_or(DEFAULT_HANDLER_SCRIPT);
        let handler_script_path = plugin.base_path.join(handler);
        if !handler_script_path.is_file() {
            return Err(Error::missing_file(
                &format!("handler script for plugin '{name}'"),
                handler_script_path,
            ));
        }

        self.last_sources = sources;
        Ok(EffectivePluginConfig {
            plugin_specific_config: config,
            plugin_base_path: plugin.base_path,
            handler_script_path,
            main_config,
        })
    }
}

/// Whether a plugin argument is written as a path rather than a bare name.
fn looks_like_path(spec: &str) -> bool {
    spec.contains(['/', '\\'])
        || spec.starts_with(['~', '.'])
        || spec.ends_with(CONFIG_SUFFIX)
}

/// A path-shaped plugin argument naming a plugin directory or config file.
/// Bare names always go through the registry, even when a directory of the
/// same name exists in the current directory.
fn ad_hoc_registration(spec: &str) -> Result<Option<PluginRegistration>> {
    if !looks_like_path(spec) {
        return Ok(None);
    }
    let path = expand_tilde(spec);
    let config = if path.is_dir() {
        let id = dir_name(&path).unwrap_or_default();
        find_config_file(&path, &id).ok_or_else(|| {
            Error::not_found(format!("plugin config in '{}'", path.display()))
        })?
    } else if path.is_file() && spec.ends_with(CONFIG_SUFFIX) {
        path
    } else {
        return Ok(None);
    };
    let config = std::path::absolute(&config).unwrap_or(config);
    let name = plugin_id_from_config(&config)
        .ok_or_else(|| Error::invalid_format(format!("cannot name plugin from '{}'", config.display())))?;
    Ok(Some(registration(name, SourceType::AdHoc, None, config)))
}

fn apply_local_overrides(
    merged: &mut MergedPluginConfig,
    local: &Mapping,
    markdown_file_path: Option<&Path>,
    plugin_name: &str,
) {
    let css_base = markdown_file_path
        .map(parent_dir)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let css = resolve_css_paths(local, &css_base, plugin_name);
    merged.apply(local, css, inherit_css_of(local));
}

/// Merge main config sections beneath the plugin's keys; plugin values win.
fn inherit_main_sections(config: &mut Mapping, main_config: &Mapping) {
    for (main_key, plugin_key) in INHERITED_SECTIONS {
        let Some(inherited @ Value::Mapping(_)) = main_config.get(*main_key) else {
            continue;
        };
        let mut section = inherited.clone();
        if let Some(own) = config.get(*plugin_key) {
            deep_merge(&mut section, own.clone());
        }
        config.insert(Value::String((*plugin_key).to_string()), section);
    }
}
