//! Archive cache
//!
//! Stores downloaded archives under a cache root, one directory per
//! repository:
//!
//! ```text
//! <root>/
//! ├── <site>/<user>/<name>/
//! │   ├── <commit-hash>.tar.gz   # one per cached commit
//! │   ├── access.json            # ref -> last access time
//! │   ├── map.json               # ref -> last resolved commit hash
//! │   └── .lock                  # per-repository lock file
//! ```
//!
//! An archive is evicted when the ref that pointed at it moves to a different
//! commit and no other recorded ref still points at it. Otherwise archives
//! stay until the cache is cleared.
//!
//! Concurrent processes serialize on the repository's `.lock` file. Clearing
//! does not take the lock, so clearing while another process extracts from
//! the same repository can remove an archive mid-read.

mod logs;

pub use logs::{AccessLog, HashLog, JsonLog, LogError, ACCESS_LOG_NAME, HASH_LOG_NAME};

use crate::config::Config;
use crate::repo::{ParseError, Repo};
use chrono::Utc;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Extension of cached archives
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Per-repository lock file name
pub const LOCK_FILE_NAME: &str = ".lock";

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error (file operations)
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Access log or hash map could not be read or written
    #[error(transparent)]
    Log(#[from] LogError),

    /// Clear filter is not a repository reference
    #[error(transparent)]
    InvalidFilter(#[from] ParseError),

    /// Repository lock could not be acquired
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which part of the cache a clear operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// The whole cache root
    All,
    /// One repository's directory
    Repository(Repo),
}

impl ClearScope {
    /// Interpret a clear filter: empty clears everything, anything else must
    /// be a repository reference
    pub fn parse(filter: &str) -> Result<Self, ParseError> {
        let filter = filter.trim();
        if filter.is_empty() {
            Ok(ClearScope::All)
        } else {
            Repo::parse(filter).map(ClearScope::Repository)
        }
    }
}

/// Result of a clear request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Directory was removed
    Cleared(PathBuf),
    /// Nothing cached for the scope
    NotFound(PathBuf),
    /// User answered no at the confirmation prompt
    Declined,
}

/// Yes/no gate in front of destructive cache operations
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> io::Result<bool>;
}

/// RAII guard for a repository directory lock
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Archive cache rooted at a configurable directory
#[derive(Debug, Clone)]
pub struct Cache {
    /// Root cache directory
    root: PathBuf,
}

impl Cache {
    /// Create a cache rooted at `root`. Nothing is created on disk until an
    /// archive is stored.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create a cache at the configured cache directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_dir.clone())
    }

    /// Get the cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one repository's archives and logs
    pub fn repo_dir(&self, repo: &Repo) -> PathBuf {
        self.root
            .join(repo.site.as_str())
            .join(&repo.user)
            .join(&repo.name)
    }

    /// Path of the archive for `hash`
    pub fn locate(&self, repo: &Repo, hash: &str) -> PathBuf {
        archive_path(&self.repo_dir(repo), hash)
    }

    /// Whether an archive exists at `path`
    pub fn has(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Take the exclusive lock for a repository directory, creating the
    /// directory if needed. Blocks while another process holds it.
    pub fn lock(&self, repo_dir: &Path) -> Result<RepoLock, CacheError> {
        fs::create_dir_all(repo_dir)?;

        let path = repo_dir.join(LOCK_FILE_NAME);
        let lock_err = |source| CacheError::Lock {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;

        if file.try_lock_exclusive().is_err() {
            info!(path = %path.display(), "waiting for cache lock");
            file.lock_exclusive().map_err(lock_err)?;
        }

        Ok(RepoLock { file, path })
    }

    /// Record that `reference` was used just now
    pub fn record_access(&self, repo_dir: &Path, reference: &str) -> Result<(), CacheError> {
        let mut log = AccessLog::load(&repo_dir.join(ACCESS_LOG_NAME))?;
        log.insert(reference, Utc::now());
        log.save()?;
        Ok(())
    }

    /// Record that `reference` resolved to `hash`.
    ///
    /// If the ref previously pointed at a different commit and no other ref
    /// still does, that commit's archive is deleted. Deletion is best-effort.
    /// Returns the path of the evicted archive, if one was removed.
    pub fn record_resolution(
        &self,
        repo_dir: &Path,
        reference: &str,
        hash: &str,
    ) -> Result<Option<PathBuf>, CacheError> {
        let mut log = HashLog::load(&repo_dir.join(HASH_LOG_NAME))?;
        let previous = log.insert(reference, hash.to_string());
        log.save()?;

        let Some(previous) = previous else {
            return Ok(None);
        };
        if previous == hash || log.iter().any(|(_, h)| *h == previous) {
            return Ok(None);
        }
        if !previous.chars().all(|c| c.is_ascii_hexdigit()) {
            warn!(hash = %previous, "ignoring malformed hash in cache map");
            return Ok(None);
        }

        let stale = archive_path(repo_dir, &previous);
        match fs::remove_file(&stale) {
            Ok(()) => {
                debug!(path = %stale.display(), "removed outdated archive");
                Ok(Some(stale))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                warn!(path = %stale.display(), error = %e, "failed to remove outdated archive");
                Ok(None)
            }
        }
    }

    /// Update both logs after a resolution, returning any evicted archive
    pub fn update(
        &self,
        repo_dir: &Path,
        reference: &str,
        hash: &str,
    ) -> Result<Option<PathBuf>, CacheError> {
        self.record_access(repo_dir, reference)?;
        self.record_resolution(repo_dir, reference, hash)
    }

    /// Directory a clear scope covers
    pub fn scope_dir(&self, scope: &ClearScope) -> PathBuf {
        match scope {
            ClearScope::All => self.root.clone(),
            ClearScope::Repository(repo) => self.repo_dir(repo),
        }
    }

    /// Remove the scope's directory without asking
    pub fn clear(&self, scope: &ClearScope) -> Result<ClearOutcome, CacheError> {
        let dir = self.scope_dir(scope);
        if !dir.is_dir() {
            return Ok(ClearOutcome::NotFound(dir));
        }

        fs::remove_dir_all(&dir)?;
        debug!(path = %dir.display(), "cleared cache");
        Ok(ClearOutcome::Cleared(dir))
    }

    /// Remove the scope's directory, asking `confirm` first unless `force`
    pub fn clear_confirmed(
        &self,
        scope: &ClearScope,
        force: bool,
        confirm: &dyn Confirm,
    ) -> Result<ClearOutcome, CacheError> {
        let dir = self.scope_dir(scope);
        if !dir.is_dir() {
            return Ok(ClearOutcome::NotFound(dir));
        }

        if !force {
            let prompt = match scope {
                ClearScope::All => format!(
                    "Are you sure you want to clear caches for {} repositories?",
                    self.count_repositories()?
                ),
                ClearScope::Repository(repo) => {
                    format!("Are you sure you want to clear cache for {}?", repo)
                }
            };
            if !confirm.confirm(&prompt)? {
                return Ok(ClearOutcome::Declined);
            }
        }

        self.clear(scope)
    }

    /// Number of `<site>/<user>/<name>` directories in the cache
    pub fn count_repositories(&self) -> Result<usize, CacheError> {
        if !self.root.is_dir() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in walkdir::WalkDir::new(&self.root).min_depth(3).max_depth(3) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn archive_path(repo_dir: &Path, hash: &str) -> PathBuf {
    repo_dir.join(format!("{}.{}", hash, ARCHIVE_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_layout() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::new(temp.path().to_path_buf());
        let repo = Repo::parse("gitlab:user/repo#main").unwrap();

        assert_eq!(
            cache.locate(&repo, "abc123"),
            temp.path().join("gitlab/user/repo/abc123.tar.gz")
        );
    }

    #[test]
    fn test_clear_scope_parse() {
        assert_eq!(ClearScope::parse("").unwrap(), ClearScope::All);
        assert_eq!(ClearScope::parse("  ").unwrap(), ClearScope::All);
        assert!(matches!(
            ClearScope::parse("user/repo").unwrap(),
            ClearScope::Repository(r) if r.name == "repo"
        ));
        assert!(ClearScope::parse("nope").is_err());
    }

    #[test]
    fn test_lock_creates_repo_dir() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::new(temp.path().to_path_buf());
        let dir = temp.path().join("github/user/repo");

        let lock = cache.lock(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(lock.path(), dir.join(LOCK_FILE_NAME));
    }

    #[test]
    fn test_count_repositories() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::new(temp.path().join("cache"));
        assert_eq!(cache.count_repositories().unwrap(), 0);

        fs::create_dir_all(temp.path().join("cache/github/a/one")).unwrap();
        fs::create_dir_all(temp.path().join("cache/github/a/two")).unwrap();
        fs::create_dir_all(temp.path().join("cache/gitlab/b/three")).unwrap();
        assert_eq!(cache.count_repositories().unwrap(), 3);
    }
}
