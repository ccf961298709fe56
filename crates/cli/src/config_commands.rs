use anyhow::Result;

use crate::context::AppContext;

/// Print the primary main config, or one plugin's effective config.
pub fn handle_config(ctx: &AppContext, plugin: Option<&str>, pure: bool) -> Result<()> {
    match plugin {
        None => {
            let builder = ctx.registry_builder(true)?;
            let main = builder.main_loader();
            let primary = main.primary_main_config();
            if !pure {
                println!("# Load reason: {}", main.load_reason());
                match &primary.path {
                    Some(path) => println!("# Source: {}", path.display()),
                    None => println!("# Source: built-in factory defaults"),
                }
            }
            print!("{}", serde_yaml::to_string(&primary.data)?);
        },
        Some(spec) => {
            let mut resolver = ctx.resolver()?;
            let effective = resolver.get_effective_config(spec, None, None)?;
            if !pure {
                println!("# Plugin base path: {}", effective.plugin_base_path.display());
                println!("# Handler: {}", effective.handler_script_path.display());
                println!("# Contributing sources (lowest precedence first):");
                for source in resolver.config_file_sources() {
                    println!("#   {source}");
                }
            }
            print!(
                "{}",
                serde_yaml::to_string(&effective.plugin_specific_config)?
            );
        },
    }
    Ok(())
}
