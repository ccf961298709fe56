mod collection_commands;
mod config_commands;
mod context;
mod convert_commands;
mod plugin_commands;

use std::path::PathBuf;

use {
    clap::{Args, Parser, Subcommand},
    mdpress_collections::CommandOutcome,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::context::AppContext;

#[derive(Parser)]
#[command(name = "mdpress", about = "Markdown document conversion with pluggable handlers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Project manifest; takes precedence over the user config.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Ignore user and project configuration entirely.
    #[arg(long, global = true, default_value_t = false)]
    pub factory_defaults: bool,
    /// Collections root (overrides MDPRESS_COLLECTIONS_ROOT and config).
    #[arg(long, global = true)]
    pub coll_root: Option<PathBuf>,
    /// Directory with bundled plugins and config (defaults to the executable's directory).
    #[arg(long, global = true, env = "MDPRESS_APP_ROOT")]
    pub app_root: Option<PathBuf>,
    /// Custom config directory (overrides default ~/.config/mdpress/).
    #[arg(long, global = true, env = "MDPRESS_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a Markdown file with a plugin.
    Convert {
        /// Markdown input file.
        input: PathBuf,
        /// Plugin name, plugin directory, or `*.config.yaml` path.
        #[arg(short, long)]
        plugin: String,
        /// Output directory (defaults to the input's directory).
        #[arg(short, long)]
        outdir: Option<PathBuf>,
        /// YAML file merged over the resolved plugin config.
        #[arg(long)]
        overrides: Option<PathBuf>,
    },
    /// Show the main config, or a plugin's effective config.
    Config {
        #[arg(long)]
        plugin: Option<String>,
        /// Print only the YAML, without source annotations.
        #[arg(long)]
        pure: bool,
    },
    /// Plugin management.
    Plugin {
        #[command(subcommand)]
        action: plugin_commands::PluginAction,
    },
    /// Collection management.
    Collection {
        #[command(subcommand)]
        action: collection_commands::CollectionAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Print an outcome's messages and fail when the outcome did.
pub(crate) fn print_outcome(outcome: CommandOutcome) -> anyhow::Result<()> {
    for message in &outcome.messages {
        println!("{message}");
    }
    if !outcome.success {
        anyhow::bail!("operation did not complete successfully");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "mdpress starting");

    let ctx = AppContext::from_args(&cli.global)?;
    match cli.command {
        Commands::Convert {
            input,
            plugin,
            outdir,
            overrides,
        } => {
            convert_commands::handle_convert(&ctx, &input, &plugin, outdir, overrides.as_deref())
                .await
        },
        Commands::Config { plugin, pure } => {
            config_commands::handle_config(&ctx, plugin.as_deref(), pure)
        },
        Commands::Plugin { action } => plugin_commands::handle_plugin(&ctx, action).await,
        Commands::Collection { action } => {
            collection_commands::handle_collection(&ctx, action).await
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn convert_parses_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mdpress",
            "convert",
            "notes.md",
            "--plugin",
            "cv",
            "--factory-defaults",
            "--coll-root",
            "/tmp/colls",
        ])
        .unwrap();
        assert!(cli.global.factory_defaults);
        assert_eq!(cli.global.coll_root, Some(PathBuf::from("/tmp/colls")));
        match cli.command {
            Commands::Convert { input, plugin, .. } => {
                assert_eq!(input, PathBuf::from("notes.md"));
                assert_eq!(plugin, "cv");
            },
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn enable_all_rejects_prefix_with_no_prefix() {
        let result = Cli::try_parse_from([
            "mdpress",
            "collection",
            "enable-all",
            "octo",
            "--prefix",
            "x-",
            "--no-prefix",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn plugin_enable_parses_invoke_name() {
        let cli = Cli::try_parse_from([
            "mdpress",
            "plugin",
            "enable",
            "octo/cv",
            "--name",
            "resume",
            "--bypass-validation",
        ])
        .unwrap();
        match cli.command {
            Commands::Plugin {
                action:
                    plugin_commands::PluginAction::Enable {
                        target,
                        name,
                        bypass_validation,
                    },
            } => {
                assert_eq!(target, "octo/cv");
                assert_eq!(name.as_deref(), Some("resume"));
                assert!(bypass_validation);
            },
            _ => panic!("expected plugin enable"),
        }
    }

    #[test]
    fn failed_outcome_is_an_error() {
        let mut outcome = CommandOutcome::ok("first");
        assert!(print_outcome(outcome.clone()).is_ok());
        outcome.fail("second");
        assert!(print_outcome(outcome).is_err());
    }
}
