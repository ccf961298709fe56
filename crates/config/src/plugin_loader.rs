//! Plugin configuration layers: the base config plus XDG and project
//! overrides, with explicit CSS list merging.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use {
    serde_yaml::{Mapping, Value},
    tracing::{debug, warn},
};

use crate::{
    document::{ConfigDocument, load_yaml_mapping},
    paths::{parent_dir, resolve_against},
    value::{deep_merge_mapping, get_str, string_list, without_keys},
};

pub const CSS_FILES_KEY: &str = "css_files";
pub const INHERIT_CSS_KEY: &str = "inherit_css";

/// One parsed configuration layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    pub raw_config: Mapping,
    pub resolved_css_paths: Vec<PathBuf>,
    pub inherit_css: bool,
    pub actual_path: PathBuf,
}

/// Accumulated plugin config while layers are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedPluginConfig {
    pub config: Mapping,
    pub css_paths: Vec<PathBuf>,
}

impl MergedPluginConfig {
    /// Start from a base layer.
    pub fn from_layer(layer: &ConfigLayer) -> Self {
        Self {
            config: without_keys(&layer.raw_config, &[CSS_FILES_KEY, INHERIT_CSS_KEY]),
            css_paths: dedup_paths(layer.resolved_css_paths.clone()),
        }
    }

    /// Apply one override layer: plain keys deep-merge, CSS appends when
    /// `inherit_css` is true and replaces when false.
    pub fn apply(&mut self, raw: &Mapping, css: Vec<PathBuf>, inherit_css: bool) {
        deep_merge_mapping(
            &mut self.config,
            without_keys(raw, &[CSS_FILES_KEY, INHERIT_CSS_KEY]),
        );
        if inherit_css {
            let mut merged = std::mem::take(&mut self.css_paths);
            merged.extend(css);
            self.css_paths = dedup_paths(merged);
        } else {
            self.css_paths = dedup_paths(css);
        }
    }

    pub fn apply_layer(&mut self, layer: &ConfigLayer) {
        self.apply(
            &layer.raw_config,
            layer.resolved_css_paths.clone(),
            layer.inherit_css,
        );
    }

    /// Final mapping with `css_files` holding the merged absolute paths.
    pub fn into_config(self) -> Mapping {
        let mut config = self.config;
        let css: Vec<Value> = self
            .css_paths
            .iter()
            .map(|p| Value::String(p.to_string_lossy().into_owned()))
            .collect();
        config.insert(Value::String(CSS_FILES_KEY.into()), Value::Sequence(css));
        config
    }
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for p in paths {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

/// `inherit_css` of a raw layer; absent means inherit.
pub fn inherit_css_of(raw: &Mapping) -> bool {
    raw.get(INHERIT_CSS_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Resolve `css_files` against `base`, dropping files that do not exist.
pub fn resolve_css_paths(raw: &Mapping, base: &Path, plugin_name: &str) -> Vec<PathBuf> {
    string_list(raw.get(CSS_FILES_KEY))
        .into_iter()
        .filter_map(|entry| {
            let path = resolve_against(base, &entry);
            if path.is_file() {
                Some(path)
            } else {
                warn!(plugin = plugin_name, css = %path.display(), "CSS file not found, skipping");
                None
            }
        })
        .collect()
}

/// Loads plugin config layers and applies the XDG and project overrides.
#[derive(Debug)]
pub struct PluginConfigLoader {
    xdg_base_dir: PathBuf,
    xdg_main_config: ConfigDocument,
    project_main_config: ConfigDocument,
    use_factory_defaults: bool,
    layer_cache: HashMap<(PathBuf, PathBuf), Option<ConfigLayer>>,
}

impl PluginConfigLoader {
    pub fn new(
        xdg_base_dir: PathBuf,
        xdg_main_config: ConfigDocument,
        project_main_config: ConfigDocument,
        use_factory_defaults: bool,
    ) -> Self {
        Self {
            xdg_base_dir,
            xdg_main_config,
            project_main_config,
            use_factory_defaults,
            layer_cache: HashMap::new(),
        }
    }

    /// Read one YAML layer. Cached by `(path, assets_base_path)`, misses
    /// included, so repeated calls never touch the filesystem.
    pub fn load_single_config_layer(
        &mut self,
        path: &Path,
        assets_base_path: &Path,
        plugin_name: &str,
    ) -> Option<ConfigLayer> {
        let key = (path.to_path_buf(), assets_base_path.to_path_buf());
        if let Some(cached) = self.layer_cache.get(&key) {
            return cached.clone();
        }
        let layer = read_layer(path, assets_base_path, plugin_name);
        self.layer_cache.insert(key, layer.clone());
        layer
    }

    /// Apply XDG file, XDG inline, project file, and project inline overrides,
    /// in that order. With factory defaults only, the inputs come back
    /// untouched.
    pub fn apply_override_layers(
        &mut self,
        plugin_name: &str,
        layer0: MergedPluginConfig,
        contributing_paths: Vec<String>,
    ) -> (MergedPluginConfig, Vec<String>) {
        if self.use_factory_defaults {
            return (layer0, contributing_paths);
        }
        let mut merged = layer0;
        let mut paths = contributing_paths;

        // XDG file override.
        let xdg_entry = self.xdg_main_config.get(plugin_name).cloned();
        let xdg_file = match xdg_entry {
            Some(Value::String(ref raw)) => Some(resolve_against(&self.xdg_base_dir, raw)),
            _ => {
                let conventional = self
                    .xdg_base_dir
                    .join(plugin_name)
                    .join(format!("{plugin_name}.config.yaml"));
                conventional.is_file().then_some(conventional)
            },
        };
        if let Some(file) = xdg_file {
            self.apply_file_override(plugin_name, &file, &mut merged, &mut paths);
        }

        // XDG inline override.
        if let Some(Value::Mapping(ref inline)) = xdg_entry {
            let label = self
                .xdg_main_config
                .path
                .clone()
                .unwrap_or_else(|| self.xdg_base_dir.join("config.yaml"));
            apply_inline_override(
                plugin_name,
                inline,
                &self.xdg_base_dir,
                &label,
                &mut merged,
                &mut paths,
            );
        }

        // Project overrides resolve against the manifest's directory.
        let project_entry = self.project_main_config.get(plugin_name).cloned();
        let project_dir = self
            .project_main_config
            .base_dir()
            .unwrap_or_else(|| PathBuf::from("."));

        if let Some(Value::String(ref raw)) = project_entry {
            let file = resolve_against(&project_dir, raw);
            self.apply_file_override(plugin_name, &file, &mut merged, &mut paths);
        }

        if let Some(Value::Mapping(ref inline)) = project_entry {
            let label = self
                .project_main_config
                .path
                .clone()
                .unwrap_or_else(|| project_dir.clone());
            apply_inline_override(
                plugin_name,
                inline,
                &project_dir,
                &label,
                &mut merged,
                &mut paths,
            );
        }

        (merged, paths)
    }

    fn apply_file_override(
        &mut self,
        plugin_name: &str,
        file: &Path,
        merged: &mut MergedPluginConfig,
        paths: &mut Vec<String>,
    ) {
        let assets_base = parent_dir(file);
        if let Some(layer) = self.load_single_config_layer(file, &assets_base, plugin_name) {
            debug!(plugin = plugin_name, path = %layer.actual_path.display(), "applying file override");
            merged.apply_layer(&layer);
            paths.push(layer.actual_path.to_string_lossy().into_owned());
        }
    }
}

fn apply_inline_override(
    plugin_name: &str,
    inline: &Mapping,
    css_base: &Path,
    label: &Path,
    merged: &mut MergedPluginConfig,
    paths: &mut Vec<String>,
) {
    debug!(plugin = plugin_name, from = %label.display(), "applying inline override");
    let css = resolve_css_paths(inline, css_base, plugin_name);
    merged.apply(inline, css, inherit_css_of(inline));
    paths.push(format!("inline override from {}", label.display()));
}

fn read_layer(path: &Path, assets_base_path: &Path, plugin_name: &str) -> Option<ConfigLayer> {
    if !path.is_file() {
        warn!(plugin = plugin_name, path = %path.display(), "config layer not found");
        return None;
    }
    let raw_config = match load_yaml_mapping(path) {
        Ok(map) => map,
        Err(e) => {
            warn!(plugin = plugin_name, path = %path.display(), error = %e, "failed to parse config layer, ignoring it");
            return None;
        },
    };
    let resolved_css_paths = resolve_css_paths(&raw_config, assets_base_path, plugin_name);
    let inherit_css = inherit_css_of(&raw_config);
    let actual_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    debug!(
        plugin = plugin_name,
        path = %actual_path.display(),
        css = resolved_css_paths.len(),
        "loaded config layer"
    );
    Some(ConfigLayer {
        raw_config,
        resolved_css_paths,
        inherit_css,
        actual_path,
    })
}

/// Handler script named by a config, relative to the plugin base path.
pub fn handler_script_name(config: &Mapping) -> Option<&str> {
    get_str(config, "handler_script")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::document::{ConfigTier, parse_yaml_mapping},
    };

    struct Fixture {
        _tmp: tempfile::TempDir,
        plugin_dir: PathBuf,
        xdg: PathBuf,
        project: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let plugin_dir = tmp.path().join("plugins/cv");
        let xdg = tmp.path().join("xdg");
        let project = tmp.path().join("project");
        for dir in [&plugin_dir, &xdg, &project] {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(plugin_dir.join("a.css"), "a{}").unwrap();
        std::fs::write(plugin_dir.join("b.css"), "b{}").unwrap();
        std::fs::write(
            plugin_dir.join("cv.config.yaml"),
            "description: CV\ncss_files: [a.css]\npdf_options:\n  format: A4\n  margin: 1cm\n",
        )
        .unwrap();
        Fixture {
            _tmp: tmp,
            plugin_dir,
            xdg,
            project,
        }
    }

    fn doc(src: &str, path: Option<PathBuf>, tier: ConfigTier) -> ConfigDocument {
        ConfigDocument::new(parse_yaml_mapping(src).unwrap(), path, tier)
    }

    fn base(loader: &mut PluginConfigLoader, f: &Fixture) -> MergedPluginConfig {
        let layer = loader
            .load_single_config_layer(&f.plugin_dir.join("cv.config.yaml"), &f.plugin_dir, "cv")
            .unwrap();
        MergedPluginConfig::from_layer(&layer)
    }

    #[test]
    fn css_merge_law() {
        let f = fixture();
        let a = f.plugin_dir.join("a.css");
        let b = f.plugin_dir.join("b.css");

        let layer0 = MergedPluginConfig {
            config: Mapping::new(),
            css_paths: vec![a.clone()],
        };

        let mut replaced = layer0.clone();
        replaced.apply(&Mapping::new(), vec![b.clone()], false);
        assert_eq!(replaced.css_paths, vec![b.clone()]);

        let mut appended = layer0;
        appended.apply(&Mapping::new(), vec![b.clone()], true);
        assert_eq!(appended.css_paths, vec![a, b]);
    }

    #[test]
    fn repeated_layer_loads_hit_the_cache() {
        let f = fixture();
        let mut loader = PluginConfigLoader::new(
            f.xdg.clone(),
            ConfigDocument::empty(ConfigTier::Xdg),
            ConfigDocument::empty(ConfigTier::Project),
            false,
        );
        let path = f.plugin_dir.join("cv.config.yaml");
        let first = loader
            .load_single_config_layer(&path, &f.plugin_dir, "cv")
            .unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = loader
            .load_single_config_layer(&path, &f.plugin_dir, "cv")
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.resolved_css_paths, vec![f.plugin_dir.join("a.css")]);
    }

    #[test]
    fn missing_layer_is_none() {
        let f = fixture();
        let mut loader = PluginConfigLoader::new(
            f.xdg.clone(),
            ConfigDocument::empty(ConfigTier::Xdg),
            ConfigDocument::empty(ConfigTier::Project),
            false,
        );
        assert!(
            loader
                .load_single_config_layer(&f.plugin_dir.join("nope.yaml"), &f.plugin_dir, "cv")
                .is_none()
        );
    }

    #[test]
    fn overrides_apply_in_fixed_order() {
        let f = fixture();
        std::fs::create_dir_all(f.xdg.join("cv")).unwrap();
        std::fs::write(f.xdg.join("cv/x.css"), "x{}").unwrap();
        std::fs::write(
            f.xdg.join("cv/cv.config.yaml"),
            "pdf_options:\n  format: Letter\ncss_files: [x.css]\nsource: xdg-file\n",
        )
        .unwrap();
        let xdg = doc(
            "cv:\n  source: xdg-inline\n  pdf_options:\n    margin: 2cm\n",
            Some(f.xdg.join("config.yaml")),
            ConfigTier::Xdg,
        );

        std::fs::write(f.project.join("p.css"), "p{}").unwrap();
        std::fs::write(
            f.project.join("cv-override.yaml"),
            "source: project-file\ninherit_css: false\ncss_files: [p.css]\n",
        )
        .unwrap();
        let manifest = f.project.join("mdpress.yaml");
        let project = doc("cv: ./cv-override.yaml\n", Some(manifest.clone()), ConfigTier::Project);

        let mut loader = PluginConfigLoader::new(f.xdg.clone(), xdg, project, false);
        let layer0 = base(&mut loader, &f);
        let (merged, paths) = loader.apply_override_layers("cv", layer0, vec!["base".into()]);

        assert_eq!(get_str(&merged.config, "source"), Some("project-file"));
        let pdf = merged.config.get("pdf_options").unwrap();
        assert_eq!(pdf.get("format").unwrap().as_str(), Some("Letter"));
        assert_eq!(pdf.get("margin").unwrap().as_str(), Some("2cm"));
        assert_eq!(merged.css_paths, vec![f.project.join("p.css")]);

        assert_eq!(paths.len(), 4);
        assert_eq!(paths[0], "base");
        assert!(paths[1].ends_with("cv.config.yaml"));
        assert!(paths[2].starts_with("inline override from "));
        assert!(paths[3].ends_with("cv-override.yaml"));
    }

    #[test]
    fn project_inline_override_wins_last() {
        let f = fixture();
        let xdg = doc("cv:\n  title: from-xdg\n", None, ConfigTier::Xdg);
        let project = doc(
            "cv:\n  title: from-project\n  css_files: [b.css]\n",
            Some(f.plugin_dir.join("mdpress.yaml")),
            ConfigTier::Project,
        );
        let mut loader = PluginConfigLoader::new(f.xdg.clone(), xdg, project, false);
        let layer0 = base(&mut loader, &f);
        let (merged, paths) = loader.apply_override_layers("cv", layer0, Vec::new());
        assert_eq!(get_str(&merged.config, "title"), Some("from-project"));
        assert_eq!(merged.css_paths, vec![
            f.plugin_dir.join("a.css"),
            f.plugin_dir.join("b.css")
        ]);
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn factory_defaults_skip_overrides() {
        let f = fixture();
        let xdg = doc("cv:\n  title: from-xdg\n", None, ConfigTier::Xdg);
        let mut loader =
            PluginConfigLoader::new(f.xdg.clone(), xdg, ConfigDocument::empty(ConfigTier::Project), true);
        let layer0 = base(&mut loader, &f);
        let (merged, paths) = loader.apply_override_layers("cv", layer0.clone(), vec!["base".into()]);
        assert_eq!(merged, layer0);
        assert_eq!(paths, vec!["base".to_string()]);
    }

    #[test]
    fn malformed_override_file_is_ignored() {
        let f = fixture();
        std::fs::write(f.project.join("broken.yaml"), "title: [unclosed\n").unwrap();
        let project = doc(
            "cv: broken.yaml\n",
            Some(f.project.join("mdpress.yaml")),
            ConfigTier::Project,
        );
        let mut loader =
            PluginConfigLoader::new(f.xdg.clone(), ConfigDocument::empty(ConfigTier::Xdg), project, false);
        let layer0 = base(&mut loader, &f);
        let (merged, paths) = loader.apply_override_layers("cv", layer0.clone(), Vec::new());
        assert_eq!(merged, layer0);
        assert!(paths.is_empty());
    }

    #[test]
    fn into_config_writes_css_list() {
        let f = fixture();
        let merged = MergedPluginConfig {
            config: Mapping::new(),
            css_paths: vec![f.plugin_dir.join("a.css")],
        };
        let config = merged.into_config();
        let css = string_list(config.get(CSS_FILES_KEY));
        assert_eq!(css.len(), 1);
        assert!(css[0].ends_with("a.css"));
    }
}
