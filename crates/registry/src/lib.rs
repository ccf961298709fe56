//! Plugin registry and effective-config resolution.
//!
//! [`PluginRegistryBuilder`] merges plugin registrations from the bundled
//! plugins, the collections manager, the XDG config and the project manifest,
//! later sources winning. [`ConfigResolver`] turns a plugin name or path into
//! the fully layered configuration a handler runs with.

pub mod builder;
pub mod resolver;
pub mod types;

pub use {
    builder::PluginRegistryBuilder,
    resolver::{ConfigResolver, EffectivePluginConfig},
    types::{PluginDetails, PluginRegistration, PluginRegistry, PluginStatus, SourceType},
};
