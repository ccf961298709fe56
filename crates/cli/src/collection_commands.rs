use {
    anyhow::Result,
    clap::Subcommand,
    mdpress_collections::{CollectionInfo, EnableAllOptions},
};

use crate::{context::AppContext, print_outcome};

#[derive(Subcommand)]
pub enum CollectionAction {
    /// Clone a git repository or copy a local directory as a collection.
    Add {
        /// Git URL or local path.
        source: String,
        /// Collection name (defaults to the repository or directory name).
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a collection.
    Remove {
        name: String,
        /// Also disable plugins enabled from this collection.
        #[arg(long)]
        force: bool,
    },
    /// Update one collection, or all of them.
    Update { name: Option<String> },
    /// List downloaded collections.
    List {
        /// Also list the plugins each collection provides.
        #[arg(long)]
        plugins: bool,
    },
    /// Enable every plugin found in a collection.
    EnableAll {
        name: String,
        /// Prefix prepended to each invoke name.
        #[arg(long, conflicts_with = "no_prefix")]
        prefix: Option<String>,
        /// Use bare plugin ids as invoke names.
        #[arg(long)]
        no_prefix: bool,
        /// Skip contract validation.
        #[arg(long)]
        bypass_validation: bool,
    },
}

pub async fn handle_collection(ctx: &AppContext, action: CollectionAction) -> Result<()> {
    let manager = ctx.collections_manager();
    match action {
        CollectionAction::Add { source, name } => {
            let metadata = manager.add_collection(&source, name.as_deref()).await?;
            println!(
                "Added collection '{}' ({}) from {}.",
                metadata.name, metadata.collection_type, metadata.source
            );
        },
        CollectionAction::Remove { name, force } => {
            let outcome = manager.remove_collection(&name, force).await?;
            print_outcome(outcome)?;
        },
        CollectionAction::Update { name } => {
            let outcome = match name {
                Some(name) => manager.update_collection(&name).await,
                None => manager.update_all_collections().await,
            };
            print_outcome(outcome)?;
        },
        CollectionAction::List { plugins } => {
            let collections = manager.list_collections();
            if collections.is_empty() {
                println!("No collections in {}.", manager.root().display());
                return Ok(());
            }
            for info in &collections {
                print_collection(info);
                if plugins {
                    for plugin in manager.list_available_plugins(Some(&info.name))? {
                        let missing = if plugin.source_missing {
                            " (original source missing)"
                        } else {
                            ""
                        };
                        println!("    {}{missing}", plugin.qualified_name());
                    }
                }
            }
        },
        CollectionAction::EnableAll {
            name,
            prefix,
            no_prefix,
            bypass_validation,
        } => {
            let outcome = manager
                .enable_all_plugins_in_collection(&name, EnableAllOptions {
                    prefix,
                    no_prefix,
                    bypass_validation,
                })
                .await?;
            print_outcome(outcome)?;
        },
    }
    Ok(())
}

fn print_collection(info: &CollectionInfo) {
    match &info.metadata {
        Some(meta) => {
            let updated = meta
                .updated_on
                .as_deref()
                .map(|u| format!(", updated {u}"))
                .unwrap_or_default();
            println!(
                "  {} [{}] {} (added {}{updated})",
                info.name, meta.collection_type, meta.source, meta.added_on
            );
        },
        None => println!("  {} (no metadata)", info.name),
    }
}
