use std::path::{Path, PathBuf};

/// Application name used for XDG directories.
pub const APP_NAME: &str = "mdpress";

/// Environment variable overriding the collections root.
pub const COLLECTIONS_ROOT_ENV: &str = "MDPRESS_COLLECTIONS_ROOT";

/// Returns the user-global config directory (`~/.config/mdpress/`).
pub fn xdg_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory (`~/.local/share/mdpress/`).
pub fn xdg_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.data_dir().to_path_buf())
}

pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Expand a leading `~` or `~/` to the home directory.
pub fn expand_tilde(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// Resolve `raw` against `base` unless it is absolute (after `~` expansion).
pub fn resolve_against(base: &Path, raw: &str) -> PathBuf {
    let expanded = expand_tilde(raw);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Directory containing `path`, or `.` for bare file names.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
