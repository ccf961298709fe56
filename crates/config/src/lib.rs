//! Configuration loading and layering.
//!
//! Main config documents are discovered across four tiers (factory defaults,
//! bundled `config.yaml`, XDG `~/.config/mdpress/config.yaml`, and an explicit
//! project manifest). Plugin configs start from the plugin's own
//! `<name>.config.yaml` and are layered with XDG and project overrides.

pub mod document;
pub mod main_loader;
pub mod paths;
pub mod plugin_loader;
pub mod value;

pub use {
    document::{ConfigDocument, ConfigTier, LoadReason, load_yaml_mapping},
    main_loader::{MainConfigLoader, MainConfigOptions},
    paths::{expand_tilde, resolve_against, xdg_config_dir, xdg_data_dir},
    plugin_loader::{ConfigLayer, MergedPluginConfig, PluginConfigLoader},
};
