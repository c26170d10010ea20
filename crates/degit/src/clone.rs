//! Clone pipeline
//!
//! Ties the pieces together: resolve the requested ref, make sure the
//! commit's archive is cached, record the resolution, then extract.
//!
//! The repository's cache lock is held from the cache check until extraction
//! finishes, so two processes cloning the same repository never download the
//! same archive twice or read one that is being replaced.

use crate::cache::Cache;
use crate::config::Config;
use crate::error::DegitError;
use crate::extract::{extract, ExtractSummary};
use crate::fetch::{ArchiveSource, HttpFetcher};
use crate::refs::{resolve, GitLsRemote, RefLister};
use crate::repo::Repo;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Options for a single clone
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneOptions {
    /// Clone into a destination that already exists, clearing it first
    pub force: bool,
}

/// What a clone did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutcome {
    /// Commit the ref resolved to
    pub hash: String,
    /// Cached archive the tree was extracted from
    pub archive: PathBuf,
    /// Whether the archive was already cached
    pub from_cache: bool,
    /// Archive removed because its ref moved on
    pub evicted: Option<PathBuf>,
    pub summary: ExtractSummary,
}

impl CloneOutcome {
    /// True when nothing was extracted, usually a subdirectory that does not
    /// exist at the resolved commit
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
    }
}

/// Clone pipeline over a ref lister and an archive source
pub struct Degit<L = GitLsRemote, S = HttpFetcher> {
    cache: Cache,
    lister: L,
    source: S,
    cancel: CancellationToken,
}

impl Degit<GitLsRemote, HttpFetcher> {
    /// Pipeline using `git ls-remote` and HTTP downloads
    pub fn from_config(config: &Config) -> Result<Self, DegitError> {
        Ok(Self::new(
            Cache::from_config(config),
            GitLsRemote::new(),
            HttpFetcher::new(config)?,
        ))
    }
}

impl<L: RefLister, S: ArchiveSource> Degit<L, S> {
    pub fn new(cache: Cache, lister: L, source: S) -> Self {
        Self {
            cache,
            lister,
            source,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally controlled cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Token that interrupts this pipeline's network work
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve the repository's requested ref to a commit hash
    pub fn resolve(&self, repo: &Repo) -> Result<String, DegitError> {
        let refs = self.lister.list_refs(repo, &self.cancel)?;
        Ok(resolve(repo, &refs)?)
    }

    /// Clone `repo` into `dest`
    #[instrument(skip(self, repo, options), fields(repo = %repo))]
    pub fn clone(
        &self,
        repo: &Repo,
        dest: &Path,
        options: &CloneOptions,
    ) -> Result<CloneOutcome, DegitError> {
        let occupied = is_occupied(dest)?;
        if occupied && !options.force {
            return Err(DegitError::DestinationExists(dest.to_path_buf()));
        }

        let hash = self.resolve(repo)?;
        debug!(reference = %repo.reference, %hash, "resolved ref");

        let repo_dir = self.cache.repo_dir(repo);
        let _lock = self.cache.lock(&repo_dir)?;

        let archive = self.cache.locate(repo, &hash);
        let from_cache = self.cache.has(&archive);
        if from_cache {
            debug!(path = %archive.display(), "using cached archive");
        } else {
            info!(url = %repo.url, %hash, "downloading archive");
            self.source.fetch(repo, &hash, &archive, &self.cancel)?;
        }

        let evicted = self.cache.update(&repo_dir, &repo.reference, &hash)?;

        if occupied {
            debug!(dest = %dest.display(), "clearing destination");
            clear_destination(dest)?;
        }

        let summary = extract(&archive, dest, &repo.subdir, &repo.archive_root(&hash))?;

        Ok(CloneOutcome {
            hash,
            archive,
            from_cache,
            evicted,
            summary,
        })
    }
}

/// Whether anything exists at `dest`, even an empty directory
fn is_occupied(dest: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(dest) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Empty `dest`, keeping the directory itself so `.` stays valid
fn clear_destination(dest: &Path) -> io::Result<()> {
    if !fs::symlink_metadata(dest)?.is_dir() {
        return fs::remove_file(dest);
    }
    for entry in fs::read_dir(dest)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_occupied() {
        let temp = TempDir::new().unwrap();
        assert!(!is_occupied(&temp.path().join("missing")).unwrap());
        assert!(is_occupied(temp.path()).unwrap());

        fs::write(temp.path().join("file"), "x").unwrap();
        assert!(is_occupied(temp.path()).unwrap());
        assert!(is_occupied(&temp.path().join("file")).unwrap());
    }

    #[test]
    fn test_clear_destination_keeps_dir() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::write(temp.path().join("a/b/c.txt"), "x").unwrap();
        fs::write(temp.path().join("top.txt"), "x").unwrap();

        clear_destination(temp.path()).unwrap();

        assert!(temp.path().is_dir());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
