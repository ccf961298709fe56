use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    mdpress_config::load_yaml_mapping,
    mdpress_plugins::{ConversionRequest, load_handler},
    tracing::info,
};

use crate::context::AppContext;

pub async fn handle_convert(
    ctx: &AppContext,
    input: &Path,
    plugin: &str,
    outdir: Option<PathBuf>,
    overrides: Option<&Path>,
) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("input file not found: {}", input.display());
    }
    let local_overrides = overrides
        .map(load_yaml_mapping)
        .transpose()
        .context("failed to read local overrides")?;

    let mut resolver = ctx.resolver()?;
    let effective = resolver.get_effective_config(plugin, local_overrides.as_ref(), Some(input))?;

    let output_dir = match outdir {
        Some(dir) => dir,
        None => input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let handler = load_handler(&effective.handler_script_path, ctx.runner.clone())?;
    let produced = handler
        .generate(&ConversionRequest {
            input: std::path::absolute(input)?,
            output_dir: std::path::absolute(&output_dir)?,
            plugin_config: effective.plugin_specific_config,
            main_config: effective.main_config,
        })
        .await?;

    info!(plugin, output = %produced.display(), "conversion finished");
    println!("{}", produced.display());
    Ok(())
}
