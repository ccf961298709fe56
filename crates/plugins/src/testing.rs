//! Plugin fixtures for tests in this and downstream crates.

use std::path::{Path, PathBuf};

use crate::contract::{
    CONTRACT_DIR, README_FILENAME, config_filename, e2e_test_filename, example_filename,
    schema_filename, test_dir,
};

/// Write a plugin named `name` under `root` that passes every contract check.
///
/// The handler copies its input to `<output_dir>/<stem>.out`.
pub fn write_valid_plugin(root: &Path, name: &str) -> std::io::Result<PathBuf> {
    let dir = root.join(name);
    std::fs::create_dir_all(test_dir(&dir))?;
    std::fs::write(
        dir.join(config_filename(name)),
        format!("plugin_name: {name}\nprotocol: v1\ndescription: Test plugin {name}\n"),
    )?;
    std::fs::write(
        dir.join("handler.sh"),
        "base=$(basename \"$1\" .md)\ncp \"$1\" \"$2/$base.out\"\necho \"$base.out\"\n",
    )?;
    std::fs::write(dir.join(example_filename(name)), "# Example\n")?;
    std::fs::write(
        dir.join(README_FILENAME),
        "---\ncli_help: convert things\n---\n# Readme\n",
    )?;
    std::fs::write(
        dir.join(CONTRACT_DIR).join(schema_filename(name)),
        "{\"type\": \"object\"}",
    )?;
    std::fs::write(test_dir(&dir).join(e2e_test_filename(name)), "exit 0\n")?;
    Ok(dir)
}
