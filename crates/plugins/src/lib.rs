//! Plugin packages: the on-disk contract, the handler that converts a
//! document, and the validator that checks a directory against the contract.
//!
//! A plugin is a directory named after the plugin holding `<name>.config.yaml`,
//! a `handler.sh` entry point, an example document and a README.

pub mod contract;
pub mod frontmatter;
pub mod handler;
pub mod validator;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use {
    handler::{ConversionRequest, DocumentHandler, ScriptHandler, load_handler},
    validator::{PluginValidator, ValidationResult},
};
