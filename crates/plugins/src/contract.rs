//! File layout every plugin directory follows.

use std::path::{Path, PathBuf};

use tracing::debug;

use mdpress_config::{document::load_yaml_mapping, value::get_str};

pub const DEFAULT_HANDLER_SCRIPT: &str = "handler.sh";
pub const README_FILENAME: &str = "README.md";
pub const CONTRACT_DIR: &str = ".contract";
pub const DEFAULT_PROTOCOL: &str = "v1";
pub const SUPPORTED_PROTOCOLS: &[&str] = &["v1"];

const CONFIG_SUFFIX: &str = ".config.yaml";

pub fn config_filename(name: &str) -> String {
    format!("{name}{CONFIG_SUFFIX}")
}

pub fn example_filename(name: &str) -> String {
    format!("{name}-example.md")
}

pub fn test_dir(plugin_dir: &Path) -> PathBuf {
    plugin_dir.join(CONTRACT_DIR).join("test")
}

pub fn e2e_test_filename(name: &str) -> String {
    format!("{name}-e2e.test.sh")
}

pub fn schema_filename(name: &str) -> String {
    format!("{name}.schema.json")
}

/// Directory basename, used as the plugin name.
pub fn dir_name(plugin_dir: &Path) -> Option<String> {
    plugin_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

/// Locate the config file of plugin `id` inside `dir`.
///
/// Tries `<id>.config.yaml`, then `<id>.yaml`, then the first `*.config.yaml`
/// in name order.
pub fn find_config_file(dir: &Path, id: &str) -> Option<PathBuf> {
    let preferred = dir.join(config_filename(id));
    if preferred.is_file() {
        return Some(preferred);
    }
    let plain = dir.join(format!("{id}.yaml"));
    if plain.is_file() {
        return Some(plain);
    }
    first_config_file(dir)
}

/// First `*.config.yaml` directly inside `dir`, in name order.
pub fn first_config_file(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(CONFIG_SUFFIX))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Plugin id implied by a config file name (`cv.config.yaml` → `cv`).
pub fn plugin_id_from_config(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(CONFIG_SUFFIX)
        .or_else(|| name.strip_suffix(".yaml"))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// `description` of a plugin config, if readable.
pub fn read_description(config_path: &Path) -> Option<String> {
    match load_yaml_mapping(config_path) {
        Ok(map) => get_str(&map, "description").map(str::to_string),
        Err(e) => {
            debug!(path = %config_path.display(), error = %e, "could not read plugin description");
            None
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lookup_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("zeta.config.yaml"), "").unwrap();
        std::fs::write(dir.join("alpha.config.yaml"), "").unwrap();
        assert_eq!(find_config_file(dir, "cv"), Some(dir.join("alpha.config.yaml")));

        std::fs::write(dir.join("cv.yaml"), "").unwrap();
        assert_eq!(find_config_file(dir, "cv"), Some(dir.join("cv.yaml")));

        std::fs::write(dir.join("cv.config.yaml"), "").unwrap();
        assert_eq!(find_config_file(dir, "cv"), Some(dir.join("cv.config.yaml")));
    }

    #[test]
    fn no_config_found_in_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(find_config_file(tmp.path(), "cv").is_none());
    }

    #[test]
    fn plugin_id_from_config_names() {
        assert_eq!(
            plugin_id_from_config(Path::new("/x/cv.config.yaml")).as_deref(),
            Some("cv")
        );
        assert_eq!(plugin_id_from_config(Path::new("/x/cv.yaml")).as_deref(), Some("cv"));
        assert_eq!(plugin_id_from_config(Path::new("/x/.config.yaml")), None);
    }

    #[test]
    fn description_is_read_from_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cv.config.yaml");
        std::fs::write(&path, "description: Curriculum vitae\n").unwrap();
        assert_eq!(read_description(&path).as_deref(), Some("Curriculum vitae"));
        assert_eq!(read_description(&tmp.path().join("missing.yaml")), None);
    }
}
