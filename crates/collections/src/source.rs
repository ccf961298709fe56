//! Where a collection comes from, and the names derived from it.

use std::path::PathBuf;

use mdpress_config::expand_tilde;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionSource {
    Git(String),
    Local(PathBuf),
}

const GIT_SCHEMES: &[&str] = &["http://", "https://", "ssh://", "git://", "file://", "git@"];
const USER_HOSTS: &[&str] = &["github.com", "gitlab.com"];

impl CollectionSource {
    /// URLs and `*.git` paths are git remotes; anything else is a local path.
    pub fn classify(source: &str) -> Self {
        let trimmed = source.trim();
        if GIT_SCHEMES.iter().any(|s| trimmed.starts_with(s)) || trimmed.ends_with(".git") {
            return Self::Git(trimmed.to_string());
        }
        let path = expand_tilde(trimmed);
        Self::Local(std::path::absolute(&path).unwrap_or(path))
    }

    /// Default collection name: the last path segment without `.git`.
    pub fn default_name(&self) -> Option<String> {
        let last = match self {
            Self::Git(url) => url
                .trim_end_matches('/')
                .rsplit(['/', ':'])
                .next()
                .map(str::to_string),
            Self::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        }?;
        let name = last.strip_suffix(".git").unwrap_or(&last);
        (!name.is_empty()).then(|| name.to_string())
    }

    /// String recorded in collection metadata.
    pub fn recorded(&self) -> String {
        match self {
            Self::Git(url) => url.clone(),
            Self::Local(path) => path.display().to_string(),
        }
    }
}

/// Invoke-name prefix used when enabling a whole collection.
///
/// GitHub and GitLab remotes yield `<user>-`, other remotes
/// `<collection>-`, and local sources no prefix.
pub fn default_prefix(recorded_source: &str, collection_name: &str) -> Option<String> {
    match CollectionSource::classify(recorded_source) {
        CollectionSource::Local(_) => None,
        CollectionSource::Git(url) => Some(match hosted_user(&url) {
            Some(user) => format!("{user}-"),
            None => format!("{collection_name}-"),
        }),
    }
}

/// Account segment of a GitHub/GitLab URL in https or scp form.
fn hosted_user(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let without_user = without_scheme
        .split_once('@')
        .map_or(without_scheme, |(_, rest)| rest);
    let (host, path) = without_user.split_once(['/', ':'])?;
    if !USER_HOSTS.contains(&host) {
        return None;
    }
    let user = path.split('/').next()?;
    (!user.is_empty()).then(|| user.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_remotes_and_paths() {
        assert!(matches!(
            CollectionSource::classify("https://github.com/octo/themes.git"),
            CollectionSource::Git(_)
        ));
        assert!(matches!(
            CollectionSource::classify("git@gitlab.com:team/docs.git"),
            CollectionSource::Git(_)
        ));
        match CollectionSource::classify("/srv/plugins/my-plugin") {
            CollectionSource::Local(p) => assert_eq!(p, PathBuf::from("/srv/plugins/my-plugin")),
            other => panic!("unexpected {other:?}"),
        }
        match CollectionSource::classify("relative/dir") {
            CollectionSource::Local(p) => assert!(p.is_absolute()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn default_names() {
        let name = |s: &str| CollectionSource::classify(s).default_name();
        assert_eq!(name("https://github.com/octo/themes.git").as_deref(), Some("themes"));
        assert_eq!(name("https://example.org/x/letters/").as_deref(), Some("letters"));
        assert_eq!(name("git@gitlab.com:team/docs.git").as_deref(), Some("docs"));
        assert_eq!(name("/srv/plugins/my-plugin").as_deref(), Some("my-plugin"));
    }

    #[test]
    fn prefixes_follow_source_kind() {
        assert_eq!(
            default_prefix("https://github.com/octo/themes.git", "themes").as_deref(),
            Some("octo-")
        );
        assert_eq!(
            default_prefix("git@gitlab.com:team/docs.git", "docs").as_deref(),
            Some("team-")
        );
        assert_eq!(
            default_prefix("https://git.example.org/x/letters.git", "letters").as_deref(),
            Some("letters-")
        );
        assert_eq!(default_prefix("/srv/plugins/my-plugin", "mine"), None);
    }
}
