//! Plugin collections: directories of plugins cloned from git or copied from
//! disk, plus the manifest of plugins enabled from them.
//!
//! Layout under the collections root:
//!
//! ```text
//! enabled.yaml
//! <collection>/.collection-metadata.yaml
//! _user_added_plugins/<id>/.collection-metadata.yaml
//! ```

mod copy;
pub mod git;
pub mod manager;
pub mod manifest;
pub mod metadata;
pub mod source;
pub mod types;

pub use {
    manager::{CollectionsManager, resolve_collections_root},
    manifest::{EnabledManifest, EnabledManifestStore, validate_invoke_name},
    metadata::{CollectionMetadata, CollectionType},
    types::{
        AvailablePlugin, CollectionInfo, CommandOutcome, EnableAllOptions, EnableOptions,
        EnabledPluginEntry, SINGLETON_COLLECTION,
    },
};
