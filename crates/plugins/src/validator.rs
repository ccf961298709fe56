//! Plugin contract validation.
//!
//! Checks run in a fixed order and accumulate into a [`ValidationResult`];
//! only a missing plugin directory stops validation early. Messages never
//! mention the scratch directory used for self-activation, so validating the
//! same plugin twice yields identical results.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    mdpress_common::{
        Error, Result,
        process::{ProcessRunner, ProcessSpec, SubprocessError},
    },
    mdpress_config::{document::load_yaml_mapping, plugin_loader::handler_script_name, value::get_str},
    serde_yaml::{Mapping, Value},
    tracing::{debug, info},
};

use crate::{
    contract::{
        CONTRACT_DIR, DEFAULT_HANDLER_SCRIPT, DEFAULT_PROTOCOL, README_FILENAME,
        SUPPORTED_PROTOCOLS, config_filename, dir_name, e2e_test_filename, example_filename,
        schema_filename, test_dir,
    },
    frontmatter::{FrontMatter, read_front_matter},
    handler::{ConversionRequest, DocumentHandler, ScriptHandler},
};

const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(120);
const E2E_TEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn finish(mut self) -> Self {
        self.is_valid = self.errors.is_empty();
        self
    }
}

pub struct PluginValidator {
    runner: Arc<dyn ProcessRunner>,
    activation_timeout: Duration,
    test_timeout: Duration,
}

impl PluginValidator {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            activation_timeout: ACTIVATION_TIMEOUT,
            test_timeout: E2E_TEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, activation: Duration, test: Duration) -> Self {
        self.activation_timeout = activation;
        self.test_timeout = test;
        self
    }

    /// Validate the plugin directory at `plugin_dir`, named after the directory.
    pub async fn validate(&self, plugin_dir: &Path) -> ValidationResult {
        let name = dir_name(plugin_dir).unwrap_or_default();
        self.validate_as(plugin_dir, &name).await
    }

    /// Validate `plugin_dir` as the plugin `name`.
    ///
    /// A plugin living at the root of a collection has a directory named
    /// after the collection, so its name comes from its config file instead.
    pub async fn validate_as(&self, plugin_dir: &Path, name: &str) -> ValidationResult {
        let mut result = ValidationResult::default();

        if name.is_empty() || !plugin_dir.is_dir() {
            result.error(format!("Plugin directory not found: {}", plugin_dir.display()));
            return result.finish();
        }
        debug!(plugin = %name, path = %plugin_dir.display(), "validating plugin");

        let config_name = config_filename(name);
        let config_path = plugin_dir.join(&config_name);
        let config = if config_path.is_file() {
            match load_yaml_mapping(&config_path) {
                Ok(map) => Some(map),
                Err(e) => {
                    result.error(format!("Invalid config file {config_name}: {e}"));
                    None
                },
            }
        } else {
            None
        };

        let handler_name = config
            .as_ref()
            .and_then(handler_script_name)
            .unwrap_or(DEFAULT_HANDLER_SCRIPT)
            .to_string();
        let example_name = example_filename(name);
        for required in [
            handler_name.as_str(),
            config_name.as_str(),
            example_name.as_str(),
            README_FILENAME,
        ] {
            if !plugin_dir.join(required).is_file() {
                result.error(format!("Missing required file: {required}"));
            }
        }

        let protocol_supported = match config.as_ref() {
            Some(config) => check_protocol(config, &config_name, &mut result),
            None => true,
        };

        if let Some(declared) = config.as_ref().and_then(|c| get_str(c, "plugin_name"))
            && declared != name
        {
            result.error(format!(
                "plugin_name '{declared}' does not match plugin name '{name}'"
            ));
        }

        let e2e_test = test_dir(plugin_dir).join(e2e_test_filename(name));
        if protocol_supported {
            check_optional_assets(plugin_dir, name, &mut result);
        }

        check_readme(plugin_dir, &mut result);

        if !protocol_supported {
            return result.finish();
        }

        let handler_path = plugin_dir.join(&handler_name);
        let example_path = plugin_dir.join(&example_name);
        if handler_path.is_file() && example_path.is_file() {
            self.self_activate(
                handler_path,
                example_path,
                config.clone().unwrap_or_default(),
                &mut result,
            )
            .await;
        }

        if e2e_test.is_file() {
            self.run_e2e_test(plugin_dir, &e2e_test, &mut result).await;
        }

        let result = result.finish();
        info!(
            plugin = %name,
            valid = result.is_valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "plugin validation finished"
        );
        result
    }

    /// Like [`validate_as`](Self::validate_as), but a failed validation becomes
    /// [`Error::ValidationFailed`] carrying every error.
    pub async fn ensure_valid(&self, plugin_dir: &Path, name: &str) -> Result<ValidationResult> {
        let result = self.validate_as(plugin_dir, name).await;
        if result.is_valid {
            Ok(result)
        } else {
            Err(Error::validation_failed(name, result.errors))
        }
    }

    async fn self_activate(
        &self,
        handler_path: PathBuf,
        example_path: PathBuf,
        plugin_config: Mapping,
        result: &mut ValidationResult,
    ) {
        let scratch = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                result.error(format!("Self-activation failed: could not create scratch directory: {e}"));
                return;
            },
        };

        let handler = ScriptHandler::new(handler_path, Arc::clone(&self.runner))
            .with_timeout(self.activation_timeout);
        let request = ConversionRequest {
            input: example_path,
            output_dir: scratch.path().to_path_buf(),
            plugin_config,
            main_config: Mapping::new(),
        };

        match handler.generate(&request).await {
            Ok(_) => {
                let produced = std::fs::read_dir(scratch.path())
                    .map(|mut entries| entries.next().is_some())
                    .unwrap_or(false);
                if !produced {
                    result.warning("Self-activation produced no output files");
                }
            },
            Err(Error::Subprocess(e)) => {
                result.error(format!("Self-activation failed: {}", describe_failure(&e)));
            },
            Err(e) => result.error(format!("Self-activation failed: {e}")),
        }
    }

    async fn run_e2e_test(&self, plugin_dir: &Path, test: &Path, result: &mut ValidationResult) {
        let spec = ProcessSpec::new("sh")
            .path_arg(test)
            .current_dir(plugin_dir)
            .timeout(self.test_timeout);
        if let Err(e) = self.runner.run(&spec).await {
            result.error(format!("E2E test failed: {}", describe_failure(&e)));
        }
    }
}

/// Returns whether the declared protocol is supported.
fn check_protocol(config: &Mapping, config_name: &str, result: &mut ValidationResult) -> bool {
    let protocol = match config.get("protocol") {
        None | Some(Value::Null) => {
            result.warning(format!(
                "No protocol declared in {config_name}; assuming {DEFAULT_PROTOCOL}"
            ));
            return true;
        },
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    };
    if SUPPORTED_PROTOCOLS.contains(&protocol.as_str()) {
        true
    } else {
        result.error(format!(
            "Unsupported protocol '{protocol}' (supported: {})",
            SUPPORTED_PROTOCOLS.join(", ")
        ));
        false
    }
}

fn check_optional_assets(plugin_dir: &Path, name: &str, result: &mut ValidationResult) {
    if !test_dir(plugin_dir).is_dir() {
        result.warning(format!("Missing optional directory: {CONTRACT_DIR}/test"));
    }

    let schema_rel = format!("{CONTRACT_DIR}/{}", schema_filename(name));
    let schema_path = plugin_dir.join(CONTRACT_DIR).join(schema_filename(name));
    if schema_path.is_file() {
        match std::fs::read_to_string(&schema_path) {
            Ok(raw) => {
                if let Err(e) = serde_json::from_str::<serde_json::Value>(&raw) {
                    result.error(format!("Invalid JSON in {schema_rel}: {e}"));
                }
            },
            Err(e) => result.error(format!("Unreadable {schema_rel}: {e}")),
        }
    } else {
        result.warning(format!("Missing optional file: {schema_rel}"));
    }

    if !test_dir(plugin_dir).join(e2e_test_filename(name)).is_file() {
        result.warning(format!(
            "Missing optional file: {CONTRACT_DIR}/test/{}",
            e2e_test_filename(name)
        ));
    }
}

fn check_readme(plugin_dir: &Path, result: &mut ValidationResult) {
    let Ok(content) = std::fs::read_to_string(plugin_dir.join(README_FILENAME)) else {
        return;
    };
    if let FrontMatter::Malformed(reason) = read_front_matter(&content) {
        result.warning(format!("Malformed front matter in {README_FILENAME}: {reason}"));
    }
}

/// Exit code and stderr only; command lines carry scratch paths.
fn describe_failure(error: &SubprocessError) -> String {
    match error {
        SubprocessError::Failed { code, stderr, .. } if stderr.is_empty() => {
            format!("exit code {code}")
        },
        SubprocessError::Failed { code, stderr, .. } => format!("exit code {code}: {stderr}"),
        SubprocessError::Timeout { after, .. } => format!("timed out after {after:?}"),
        SubprocessError::Spawn { source, .. } => format!("could not start: {source}"),
    }
}
