//! The few git operations collections need, run through a [`ProcessRunner`].
//!
//! Network-bound commands (`clone`, `fetch`, `remote show`) get a longer wait
//! than local ones.

use std::{path::Path, sync::Arc, time::Duration};

use {
    mdpress_common::{
        Error, Result,
        process::{ProcessRunner, ProcessSpec},
    },
    tracing::debug,
};

pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(300);
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

const REMOTE: &str = "origin";

#[derive(Clone)]
pub struct GitClient {
    runner: Arc<dyn ProcessRunner>,
}

impl GitClient {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    async fn git(&self, repo: Option<&Path>, args: &[&str], timeout: Duration) -> Result<String> {
        let mut spec = ProcessSpec::new("git").args(args.iter().copied()).timeout(timeout);
        if let Some(repo) = repo {
            spec = spec.current_dir(repo);
        }
        let output = self.runner.run(&spec).await?;
        Ok(output.stdout)
    }

    pub async fn clone_repo(&self, url: &str, target: &Path) -> Result<()> {
        let target = target.to_string_lossy();
        self.git(None, &["clone", url, &target], NETWORK_TIMEOUT)
            .await?;
        debug!(%url, %target, "cloned collection");
        Ok(())
    }

    /// Default branch advertised by the remote (`HEAD branch:` line).
    pub async fn remote_default_branch(&self, repo: &Path) -> Result<String> {
        let out = self
            .git(Some(repo), &["remote", "show", REMOTE], NETWORK_TIMEOUT)
            .await?;
        parse_head_branch(&out).ok_or_else(|| {
            Error::invalid_format(format!(
                "could not determine the default branch of {REMOTE} in {}",
                repo.display()
            ))
        })
    }

    pub async fn fetch(&self, repo: &Path) -> Result<()> {
        self.git(Some(repo), &["fetch", REMOTE], NETWORK_TIMEOUT)
            .await
            .map(drop)
    }

    /// Lines of `git status --porcelain`; empty when the tree is clean.
    pub async fn status_porcelain(&self, repo: &Path) -> Result<Vec<String>> {
        let out = self
            .git(Some(repo), &["status", "--porcelain"], LOCAL_TIMEOUT)
            .await?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Commits on `HEAD` that `origin/<branch>` does not have.
    pub async fn commits_ahead(&self, repo: &Path, branch: &str) -> Result<u64> {
        let range = format!("{REMOTE}/{branch}..HEAD");
        let out = self
            .git(Some(repo), &["rev-list", "--count", &range], LOCAL_TIMEOUT)
            .await?;
        let trimmed = out.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed
            .parse()
            .map_err(|_| Error::invalid_format(format!("unexpected rev-list output: {trimmed}")))
    }

    pub async fn reset_hard(&self, repo: &Path, branch: &str) -> Result<()> {
        let target = format!("{REMOTE}/{branch}");
        self.git(Some(repo), &["reset", "--hard", &target], LOCAL_TIMEOUT)
            .await
            .map(drop)
    }
}

fn parse_head_branch(remote_show: &str) -> Option<String> {
    remote_show
        .lines()
        .find_map(|l| l.trim().strip_prefix("HEAD branch:"))
        .map(str::trim)
        .filter(|b| !b.is_empty() && *b != "(unknown)")
        .map(str::to_string)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mdpress_common::process::testing::ScriptedRunner};

    const REMOTE_SHOW: &str = "* remote origin\n  Fetch URL: https://github.com/octo/themes.git\n  HEAD branch: main\n";

    #[test]
    fn head_branch_parsing() {
        assert_eq!(parse_head_branch(REMOTE_SHOW).as_deref(), Some("main"));
        assert_eq!(parse_head_branch("  HEAD branch: (unknown)\n"), None);
        assert_eq!(parse_head_branch(""), None);
    }

    #[tokio::test]
    async fn commands_run_in_repo() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on_stdout(&["git", "remote", "show"], REMOTE_SHOW)
                .on_stdout(&["git", "rev-list"], "2\n"),
        );
        let git = GitClient::new(runner.clone());
        let repo = Path::new("/tmp/coll");

        assert_eq!(git.remote_default_branch(repo).await.unwrap(), "main");
        assert_eq!(git.commits_ahead(repo, "main").await.unwrap(), 2);
        assert!(git.status_porcelain(repo).await.unwrap().is_empty());

        let calls = runner.calls();
        assert!(calls.iter().all(|c| c.cwd.as_deref() == Some(repo)));
        assert_eq!(calls[0].timeout, Some(NETWORK_TIMEOUT));
        assert_eq!(calls[1].args, ["rev-list", "--count", "origin/main..HEAD"]);
        assert_eq!(calls[1].timeout, Some(LOCAL_TIMEOUT));
    }
}
