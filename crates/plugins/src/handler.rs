//! Document handlers: the single conversion entry point a plugin exposes.
//!
//! A plugin's handler is a shell script. [`load_handler`] turns its path into
//! a [`DocumentHandler`]; callers never care how the handler is implemented.
//!
//! The script is invoked as `sh <handler> <input> <output_dir>` from the
//! plugin directory, with the effective plugin config as JSON in
//! `MDPRESS_PLUGIN_CONFIG` and the main config in `MDPRESS_MAIN_CONFIG`. The
//! last non-empty stdout line, if any, names the generated file.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    async_trait::async_trait,
    mdpress_common::{
        Error, Result,
        process::{ProcessRunner, ProcessSpec},
    },
    serde_yaml::Mapping,
    tracing::debug,
};

pub const PLUGIN_CONFIG_ENV: &str = "MDPRESS_PLUGIN_CONFIG";
pub const MAIN_CONFIG_ENV: &str = "MDPRESS_MAIN_CONFIG";

/// Conversions are local work; allow generous time for headless rendering.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything a handler needs to convert one document.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub plugin_config: Mapping,
    pub main_config: Mapping,
}

#[async_trait]
pub trait DocumentHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Convert `request.input`, returning the path of the generated file.
    async fn generate(&self, request: &ConversionRequest) -> Result<PathBuf>;
}

/// Runs a plugin's handler script through a [`ProcessRunner`].
pub struct ScriptHandler {
    name: String,
    script: PathBuf,
    base_path: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl ScriptHandler {
    pub fn new(script: PathBuf, runner: Arc<dyn ProcessRunner>) -> Self {
        let base_path = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = base_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            script,
            base_path,
            runner,
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

#[async_trait]
impl DocumentHandler for ScriptHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ConversionRequest) -> Result<PathBuf> {
        let plugin_json = serde_json::to_string(&request.plugin_config)
            .map_err(|e| Error::invalid_format(format!("plugin config is not JSON-compatible: {e}")))?;
        let main_json = serde_json::to_string(&request.main_config)
            .map_err(|e| Error::invalid_format(format!("main config is not JSON-compatible: {e}")))?;

        let spec = ProcessSpec::new("sh")
            .path_arg(&self.script)
            .path_arg(&request.input)
            .path_arg(&request.output_dir)
            .current_dir(&self.base_path)
            .env(PLUGIN_CONFIG_ENV, plugin_json)
            .env(MAIN_CONFIG_ENV, main_json)
            .timeout(self.timeout);

        debug!(handler = %self.name, input = %request.input.display(), "invoking document handler");
        let output = self.runner.run(&spec).await?;

        let produced = output
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .map(|line| {
                let path = PathBuf::from(line);
                if path.is_absolute() {
                    path
                } else {
                    request.output_dir.join(path)
                }
            })
            .unwrap_or_else(|| request.output_dir.clone());
        Ok(produced)
    }
}

/// Build the handler for `handler_script_path`.
pub fn load_handler(
    handler_script_path: &Path,
    runner: Arc<dyn ProcessRunner>,
) -> Result<Arc<dyn DocumentHandler>> {
    if !handler_script_path.is_file() {
        return Err(Error::missing_file(
            "handler script",
            handler_script_path.to_path_buf(),
        ));
    }
    Ok(Arc::new(ScriptHandler::new(
        handler_script_path.to_path_buf(),
        runner,
    )))
}
