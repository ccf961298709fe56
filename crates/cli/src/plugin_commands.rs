use std::path::PathBuf;

use {
    anyhow::Result,
    clap::Subcommand,
    mdpress_collections::EnableOptions,
    mdpress_registry::{PluginDetails, PluginStatus},
};

use crate::{context::AppContext, print_outcome};

#[derive(Subcommand)]
pub enum PluginAction {
    /// List registered plugins and plugins available from collections.
    List {
        /// Only show plugins that can be invoked right now.
        #[arg(long, conflicts_with = "available")]
        enabled: bool,
        /// Only show collection plugins that are not enabled yet.
        #[arg(long)]
        available: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check a plugin directory against the plugin contract.
    Validate {
        /// Plugin directory.
        path: PathBuf,
    },
    /// Enable a collection plugin (`<collection>/<plugin_id>`).
    Enable {
        target: String,
        /// Invoke name to register the plugin under.
        #[arg(long)]
        name: Option<String>,
        /// Skip contract validation.
        #[arg(long)]
        bypass_validation: bool,
    },
    /// Disable an enabled plugin by its invoke name.
    Disable { name: String },
    /// Copy a single plugin directory into the user collection and enable it.
    Add {
        path: PathBuf,
        /// Invoke name to register the plugin under.
        #[arg(long)]
        name: Option<String>,
        /// Skip contract validation.
        #[arg(long)]
        bypass_validation: bool,
    },
}

pub async fn handle_plugin(ctx: &AppContext, action: PluginAction) -> Result<()> {
    match action {
        PluginAction::List {
            enabled,
            available,
            json,
        } => {
            let mut builder = ctx.registry_builder(false)?;
            let details: Vec<PluginDetails> = builder
                .get_all_plugin_details()
                .into_iter()
                .filter(|d| match (enabled, available) {
                    (true, _) => d.status != PluginStatus::AvailableCm,
                    (_, true) => d.status == PluginStatus::AvailableCm,
                    _ => true,
                })
                .collect();

            if json {
                let rows: Vec<serde_json::Value> = details
                    .iter()
                    .map(|d| {
                        serde_json::json!({
                            "name": d.name,
                            "status": d.status.to_string(),
                            "source": d.source_display,
                            "description": d.description,
                            "config_path": d.config_path,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if details.is_empty() {
                println!("No plugins found.");
            } else {
                print_details(&details);
            }
        },
        PluginAction::Validate { path } => {
            let result = ctx.validator().validate(&path).await;
            for warning in &result.warnings {
                println!("  warning: {warning}");
            }
            for error in &result.errors {
                println!("  error: {error}");
            }
            if !result.is_valid {
                anyhow::bail!(
                    "plugin at {} failed validation ({} error(s))",
                    path.display(),
                    result.errors.len()
                );
            }
            println!("Plugin at {} is valid.", path.display());
        },
        PluginAction::Enable {
            target,
            name,
            bypass_validation,
        } => {
            let entry = ctx
                .collections_manager()
                .enable_plugin(&target, EnableOptions {
                    name,
                    bypass_validation,
                })
                .await?;
            println!(
                "Enabled '{}/{}' as '{}'.",
                entry.collection_name, entry.plugin_id, entry.invoke_name
            );
        },
        PluginAction::Disable { name } => {
            let entry = ctx.collections_manager().disable_plugin(&name)?;
            println!(
                "Disabled '{}' ({}/{}).",
                entry.invoke_name, entry.collection_name, entry.plugin_id
            );
        },
        PluginAction::Add {
            path,
            name,
            bypass_validation,
        } => {
            let outcome = ctx
                .collections_manager()
                .add_singleton_plugin(&path, EnableOptions {
                    name,
                    bypass_validation,
                })
                .await?;
            print_outcome(outcome)?;
        },
    }
    Ok(())
}

fn print_details(details: &[PluginDetails]) {
    let name_width = details.iter().map(|d| d.name.len()).max().unwrap_or(4).max(4);
    let status_width = details
        .iter()
        .map(|d| d.status.to_string().len())
        .max()
        .unwrap_or(6)
        .max(6);
    println!("{:<name_width$}  {:<status_width$}  SOURCE", "NAME", "STATUS");
    for d in details {
        println!(
            "{:<name_width$}  {:<status_width$}  {}",
            d.name,
            d.status.to_string(),
            d.source_display
        );
        if let Some(description) = &d.description {
            println!("{:<name_width$}  {description}", "");
        }
    }
}
