//! Narrow subprocess abstraction.
//!
//! Every external command (git, plugin handlers, contract tests) goes through
//! [`ProcessRunner`]. A non-zero exit is reported as
//! [`SubprocessError::Failed`] carrying stderr, so callers never look at raw
//! exit codes. Every command runs under a timeout and the child is killed when
//! the wait expires.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {async_trait::async_trait, thiserror::Error, tokio::process::Command, tracing::debug};

/// Wait applied when a [`ProcessSpec`] does not set its own timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `program arg1 arg2`, for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },
    #[error("`{command}` failed (exit code {code}): {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

impl SubprocessError {
    /// Stderr of a failed command, empty for spawn errors and timeouts.
    pub fn stderr(&self) -> &str {
        match self {
            Self::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, SubprocessError>;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, SubprocessError> {
        let command = spec.display();
        let timeout = spec.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = spec.cwd {
            cmd.current_dir(cwd);
        }

        debug!(%command, cwd = ?spec.cwd, "spawning subprocess");

        let child = cmd.spawn().map_err(|source| SubprocessError::Spawn {
            command: command.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| SubprocessError::Spawn {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                return Err(SubprocessError::Timeout {
                    command,
                    after: timeout,
                });
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(SubprocessError::Failed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        debug!(%command, stdout_len = stdout.len(), "subprocess completed");
        Ok(ProcessOutput { stdout, stderr })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod testing {
    //! Scripted runner for tests that must not spawn real processes.

    use std::sync::Mutex;

    use super::*;

    type Responder = Box<dyn Fn(&ProcessSpec) -> Result<ProcessOutput, SubprocessError> + Send + Sync>;

    /// Records every command it receives and answers from the first matching rule.
    /// Unmatched commands succeed with empty output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Vec<(Vec<String>, Responder)>,
        calls: Mutex<Vec<ProcessSpec>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer commands whose `program + args` start with `prefix`.
        #[must_use]
        pub fn on<F>(mut self, prefix: &[&str], respond: F) -> Self
        where
            F: Fn(&ProcessSpec) -> Result<ProcessOutput, SubprocessError> + Send + Sync + 'static,
        {
            let prefix = prefix.iter().map(|s| (*s).to_string()).collect();
            self.rules.push((prefix, Box::new(respond)));
            self
        }

        /// Answer matching commands with a fixed stdout.
        #[must_use]
        pub fn on_stdout(self, prefix: &[&str], stdout: &str) -> Self {
            let stdout = stdout.to_string();
            self.on(prefix, move |_| {
                Ok(ProcessOutput {
                    stdout: stdout.clone(),
                    stderr: String::new(),
                })
            })
        }

        /// Every command line run so far, as `program arg1 arg2`.
        pub fn commands(&self) -> Vec<String> {
            self.calls
                .lock()
                .map(|calls| calls.iter().map(ProcessSpec::display).collect())
                .unwrap_or_default()
        }

        pub fn calls(&self) -> Vec<ProcessSpec> {
            self.calls
                .lock()
                .map(|calls| calls.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, SubprocessError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(spec.clone());
            }
            let line: Vec<&str> = std::iter::once(spec.program.as_str())
                .chain(spec.args.iter().map(String::as_str))
                .collect();
            for (prefix, respond) in &self.rules {
                if line.len() >= prefix.len() && line.iter().zip(prefix).all(|(a, b)| *a == b.as_str()) {
                    return respond(spec);
                }
            }
            Ok(ProcessOutput::default())
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::{testing::ScriptedRunner, *};

    #[tokio::test]
    async fn runner_captures_stdout() {
        let out = TokioProcessRunner
            .run(&ProcessSpec::new("sh").args(["-c", "echo hello"]))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn runner_reports_non_zero_exit_with_stderr() {
        let err = TokioProcessRunner
            .run(&ProcessSpec::new("sh").args(["-c", "echo broken >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            SubprocessError::Failed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn runner_times_out() {
        let err = TokioProcessRunner
            .run(
                &ProcessSpec::new("sh")
                    .args(["-c", "sleep 5"])
                    .timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubprocessError::Timeout { .. }));
    }

    #[tokio::test]
    async fn runner_reports_missing_program() {
        let err = TokioProcessRunner
            .run(&ProcessSpec::new("mdpress-definitely-not-a-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubprocessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn scripted_runner_matches_prefix_and_records() {
        let runner = ScriptedRunner::new().on_stdout(&["git", "status"], " M README.md\n");
        let out = runner
            .run(&ProcessSpec::new("git").args(["status", "--porcelain"]))
            .await
            .unwrap();
        assert_eq!(out.stdout, " M README.md\n");
        let other = runner
            .run(&ProcessSpec::new("git").arg("fetch"))
            .await
            .unwrap();
        assert!(other.stdout.is_empty());
        assert_eq!(runner.commands(), vec![
            "git status --porcelain".to_string(),
            "git fetch".to_string()
        ]);
    }
}
