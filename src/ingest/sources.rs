//! External collaborator boundary
//!
//! Repository content and issue threads come from outside the core pipeline.
//! The traits here are the seam: remote hosts, issue trackers, or fixtures
//! all plug in the same way. The bundled implementations are thin local
//! adapters (a directory walk and an issues JSON file) so the CLI works
//! end-to-end without network collaborators.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Repository not found: {path}")]
    NotFound { path: String },

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Parse error: {context}: {source}")]
    Parse {
        source: serde_json::Error,
        context: String,
    },
}

/// One unit of repository content: a file path and its raw bytes.
/// Decoding is the chunker's concern; the fetcher only pre-filters
/// obviously-binary files.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// An issue thread, immutable once fetched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(alias = "number")]
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Comment texts in chronological order
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub repo_key: String,
}

impl Issue {
    /// Flattened text used when issues are chunked into the index
    pub fn full_text(&self) -> String {
        let mut text = format!("{}\n{}", self.title, self.body);
        for comment in &self.comments {
            text.push('\n');
            text.push_str(comment);
        }
        text
    }
}

/// Supplies source units for a repository identity
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    async fn fetch_units(&self) -> Result<Vec<SourceUnit>, FetchError>;
}

/// Supplies issue records for a repository identity
#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn fetch_issues(&self) -> Result<Vec<Issue>, FetchError>;
}

/// Directory-walking fetcher for local checkouts
pub struct LocalRepoFetcher {
    root: PathBuf,
    max_file_size: u64,
}

impl LocalRepoFetcher {
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            root: root.into(),
            max_file_size,
        }
    }

    fn walk(&self, dir: &Path, units: &mut Vec<SourceUnit>) -> Result<(), FetchError> {
        let entries = std::fs::read_dir(dir).map_err(|e| FetchError::Io {
            source: e,
            context: format!("Failed to read directory: {}", dir.display()),
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| FetchError::Io {
                source: e,
                context: "Failed to read directory entry".to_string(),
            })?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if name.starts_with('.') {
                continue;
            }

            if path.is_dir() {
                self.walk(&path, units)?;
                continue;
            }

            let metadata = entry.metadata().map_err(|e| FetchError::Io {
                source: e,
                context: format!("Failed to stat: {}", path.display()),
            })?;
            if metadata.len() > self.max_file_size {
                tracing::debug!("Skipping oversized file: {}", path.display());
                continue;
            }

            let bytes = std::fs::read(&path).map_err(|e| FetchError::Io {
                source: e,
                context: format!("Failed to read file: {}", path.display()),
            })?;

            // Crude binary filter; the chunker is the backstop
            if bytes.iter().take(512).any(|b| *b == 0) {
                tracing::debug!("Skipping binary file: {}", path.display());
                continue;
            }

            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");

            units.push(SourceUnit { path: rel, bytes });
        }

        Ok(())
    }
}

#[async_trait]
impl RepositoryFetcher for LocalRepoFetcher {
    async fn fetch_units(&self) -> Result<Vec<SourceUnit>, FetchError> {
        if !self.root.exists() {
            return Err(FetchError::NotFound {
                path: self.root.display().to_string(),
            });
        }

        let mut units = Vec::new();
        self.walk(&self.root, &mut units)?;

        // Deterministic traversal order
        units.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(units)
    }
}

/// Issue source backed by a JSON file (array of issue records)
pub struct JsonIssueSource {
    path: PathBuf,
    repo_key: String,
}

impl JsonIssueSource {
    pub fn new(path: impl Into<PathBuf>, repo_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            repo_key: repo_key.into(),
        }
    }
}

#[async_trait]
impl IssueSource for JsonIssueSource {
    async fn fetch_issues(&self) -> Result<Vec<Issue>, FetchError> {
        if !self.path.exists() {
            return Err(FetchError::NotFound {
                path: self.path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| FetchError::Io {
            source: e,
            context: format!("Failed to read issues file: {}", self.path.display()),
        })?;

        let mut issues: Vec<Issue> =
            serde_json::from_str(&content).map_err(|e| FetchError::Parse {
                source: e,
                context: format!("Invalid issues JSON: {}", self.path.display()),
            })?;

        for issue in &mut issues {
            issue.repo_key = self.repo_key.clone();
        }

        Ok(issues)
    }
}

/// Empty issue source for repositories without a tracker export
pub struct NoIssues;

#[async_trait]
impl IssueSource for NoIssues {
    async fn fetch_issues(&self) -> Result<Vec<Issue>, FetchError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_fetcher_walks_and_sorts() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("zebra.rs"), "z").unwrap();
        std::fs::write(temp.path().join("alpha.rs"), "a").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub/mid.rs"), "m").unwrap();
        std::fs::write(temp.path().join(".hidden"), "h").unwrap();

        let fetcher = LocalRepoFetcher::new(temp.path(), 1024 * 1024);
        let units = fetcher.fetch_units().await.unwrap();

        let paths: Vec<&str> = units.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["alpha.rs", "sub/mid.rs", "zebra.rs"]);
    }

    #[tokio::test]
    async fn test_local_fetcher_skips_binary() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("data.bin"), [0u8, 1, 2, 3]).unwrap();
        std::fs::write(temp.path().join("main.rs"), "fn main() {}").unwrap();

        let fetcher = LocalRepoFetcher::new(temp.path(), 1024 * 1024);
        let units = fetcher.fetch_units().await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].path, "main.rs");
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let fetcher = LocalRepoFetcher::new("/no/such/dir", 1024);
        let err = fetcher.fetch_units().await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_json_issue_source() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("issues.json");
        std::fs::write(
            &file,
            r#"[
                { "number": 3, "title": "Crash", "body": "It crashes", "comments": ["me too"] },
                { "id": 7, "title": "Docs", "body": "" }
            ]"#,
        )
        .unwrap();

        let source = JsonIssueSource::new(&file, "acme/widget");
        let issues = source.fetch_issues().await.unwrap();

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].id, 3);
        assert_eq!(issues[0].comments, vec!["me too"]);
        assert_eq!(issues[0].repo_key, "acme/widget");
        assert_eq!(issues[1].id, 7);
        assert!(issues[1].comments.is_empty());
    }

    #[test]
    fn test_issue_full_text_order() {
        let issue = Issue {
            id: 1,
            title: "T".to_string(),
            body: "B".to_string(),
            comments: vec!["C1".to_string(), "C2".to_string()],
            repo_key: String::new(),
        };
        assert_eq!(issue.full_text(), "T\nB\nC1\nC2");
    }
}
