//! Sources of config files.

use std::path::{Path, PathBuf};

use analysis_core::config::ExternalConfigSource;
use analysis_core::dates::from_unix_seconds;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::path::OUTCOMES_DIR;

#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },
}

/// One `.toml` file of a config repository.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    pub contents: String,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn files(&self) -> Result<Vec<ConfigFile>, ExternalError>;
}

/// Relative paths of top-level configs and `outcomes/<platform>/` snippets.
/// Hidden directories are skipped.
fn toml_files(root: &Path) -> Result<Vec<PathBuf>, ExternalError> {
    let walker = walkdir::WalkDir::new(root)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| ExternalError::Walk {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let depth = rel.components().count();
        let is_toml = rel.extension().and_then(|e| e.to_str()) == Some("toml");
        if is_toml && (depth == 1 || (depth == 3 && rel.starts_with(OUTCOMES_DIR))) {
            files.push(rel.to_path_buf());
        }
    }
    Ok(files)
}

/// A checked-out directory. Last modified comes from file metadata.
pub struct LocalConfigRepository {
    root: PathBuf,
}

impl LocalConfigRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ConfigRepository for LocalConfigRepository {
    async fn files(&self) -> Result<Vec<ConfigFile>, ExternalError> {
        let mut files = Vec::new();
        for path in toml_files(&self.root)? {
            let full = self.root.join(&path);
            let contents = tokio::fs::read_to_string(&full).await?;
            let modified = tokio::fs::metadata(&full).await?.modified()?;
            files.push(ConfigFile {
                path,
                contents,
                last_modified: DateTime::<Utc>::from(modified),
            });
        }
        debug!(root = %self.root.display(), count = files.len(), "Read local configs");
        Ok(files)
    }
}

/// Clones the repository into a temporary directory on every fetch. Last
/// modified is the commit time of the latest commit touching the file.
pub struct GitConfigRepository {
    url: String,
    branch: String,
}

impl GitConfigRepository {
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
        }
    }

    pub fn from_config(source: &ExternalConfigSource) -> Self {
        Self::new(&source.repo_url, &source.branch)
    }
}

async fn git(dir: &Path, args: &[&str]) -> Result<String, ExternalError> {
    let output = Command::new("git").current_dir(dir).args(args).output().await?;
    if !output.status.success() {
        return Err(ExternalError::Git {
            command: args.first().copied().unwrap_or_default().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

async fn last_commit_time(repo: &Path, path: &Path) -> Result<DateTime<Utc>, ExternalError> {
    let path_arg = path.to_string_lossy();
    let stdout = git(repo, &["log", "-1", "--format=%ct", "--", path_arg.as_ref()]).await?;
    stdout
        .parse::<i64>()
        .ok()
        .and_then(from_unix_seconds)
        .ok_or_else(|| ExternalError::Git {
            command: "log".to_string(),
            stderr: format!("no commit time for {}", path.display()),
        })
}

#[async_trait]
impl ConfigRepository for GitConfigRepository {
    async fn files(&self) -> Result<Vec<ConfigFile>, ExternalError> {
        let checkout = TempDir::new()?;
        let target = checkout.path().to_string_lossy().to_string();
        git(
            checkout.path(),
            &[
                "clone",
                "--quiet",
                "--branch",
                self.branch.as_str(),
                self.url.as_str(),
                target.as_str(),
            ],
        )
        .await?;
        info!(url = %self.url, branch = %self.branch, "Cloned config repository");

        let mut files = Vec::new();
        for path in toml_files(checkout.path())? {
            let contents = tokio::fs::read_to_string(checkout.path().join(&path)).await?;
            let last_modified = last_commit_time(checkout.path(), &path).await?;
            files.push(ConfigFile {
                path,
                contents,
                last_modified,
            });
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_local_repository_layout() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("my-exp.toml"), "[metrics]\nweekly = []\n").unwrap();
        fs::write(dir.path().join("README.md"), "docs").unwrap();
        fs::create_dir_all(dir.path().join("outcomes/fenix")).unwrap();
        fs::write(dir.path().join("outcomes/fenix/perf.toml"), "friendly_name = \"Perf\"\n").unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config.toml"), "").unwrap();
        fs::create_dir_all(dir.path().join("other")).unwrap();
        fs::write(dir.path().join("other/ignored.toml"), "").unwrap();

        let files = LocalConfigRepository::new(dir.path()).files().await.unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            [PathBuf::from("my-exp.toml"), PathBuf::from("outcomes/fenix/perf.toml")]
        );
        assert!(files[0].contents.contains("weekly"));
    }
}
