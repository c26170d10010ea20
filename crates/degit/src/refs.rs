//! Remote ref listing and resolution
//!
//! Lists the refs a remote advertises (via `git ls-remote`) and resolves a
//! requested ref to a single commit hash.
//!
//! Resolution order:
//! 1. `HEAD` resolves to the remote's default-branch pointer
//! 2. an exact branch, tag or other ref name
//! 3. a commit hash prefix of at least [`MIN_PREFIX_LEN`] characters
//!
//! Exact names always win over hash prefixes, so a branch called `abc1234`
//! is never mistaken for a commit fragment.

use crate::repo::Repo;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Shortest accepted commit hash prefix
pub const MIN_PREFIX_LEN: usize = 7;

/// How often a running `git` child is polled for exit or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Errors that can occur while listing or resolving refs
#[derive(Debug, Error)]
pub enum RefError {
    /// Remote reported a failure (missing repository, auth failure, ...)
    #[error("could not find repository {url}: {detail}")]
    RepositoryNotFound { url: String, detail: String },

    /// `git` could not be spawned or waited on
    #[error("failed to run git: {0}")]
    Git(#[from] std::io::Error),

    /// Listing contained a line that is not `<hash>\t<ref>`
    #[error("could not parse ref line `{0}`")]
    InvalidLine(String),

    /// Hash prefix below [`MIN_PREFIX_LEN`]
    #[error("commit hash {0} is too short, must be at least 7 characters")]
    PrefixTooShort(String),

    /// Nothing matched the requested ref
    #[error("could not find ref `{reference}` for repository `{url}`")]
    RefNotFound { reference: String, url: String },

    /// Listing was interrupted
    #[error("ref listing cancelled")]
    Cancelled,
}

/// Kind of an advertised ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKind {
    /// The remote's default-branch pointer (`HEAD`)
    Head,
    /// `refs/heads/*`
    Branch,
    /// `refs/tags/*`
    Tag,
    /// Any other `refs/<namespace>/*`, e.g. `pull` or `merge-requests`
    Other(String),
}

/// A single ref advertised by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub kind: RefKind,
    /// Ref name without its namespace, empty for [`RefKind::Head`]
    pub name: String,
    /// Full commit hash
    pub hash: String,
}

impl RemoteRef {
    pub fn head(hash: &str) -> Self {
        Self {
            kind: RefKind::Head,
            name: String::new(),
            hash: hash.to_string(),
        }
    }

    pub fn branch(name: &str, hash: &str) -> Self {
        Self {
            kind: RefKind::Branch,
            name: name.to_string(),
            hash: hash.to_string(),
        }
    }

    pub fn tag(name: &str, hash: &str) -> Self {
        Self {
            kind: RefKind::Tag,
            name: name.to_string(),
            hash: hash.to_string(),
        }
    }
}

/// Source of a repository's advertised refs
pub trait RefLister {
    /// List refs in the order the remote reports them
    fn list_refs(
        &self,
        repo: &Repo,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteRef>, RefError>;
}

/// [`RefLister`] backed by the system `git` binary
#[derive(Debug, Clone)]
pub struct GitLsRemote {
    program: String,
}

impl Default for GitLsRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl GitLsRemote {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Use a different `git` executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl RefLister for GitLsRemote {
    #[instrument(skip(self, cancel), fields(url = %repo.url))]
    fn list_refs(
        &self,
        repo: &Repo,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteRef>, RefError> {
        if cancel.is_cancelled() {
            return Err(RefError::Cancelled);
        }

        let mut child = Command::new(&self.program)
            .arg("ls-remote")
            .arg(&repo.url)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        debug!("spawned git ls-remote");

        // Drain both pipes on their own threads so a large listing cannot
        // block the child while we poll it.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout));
        let stderr_reader = thread::spawn(move || read_pipe(stderr));

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RefError::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout_reader.join().unwrap_or_else(|_| Ok(String::new()))?;
        let stderr = stderr_reader.join().unwrap_or_else(|_| Ok(String::new()))?;

        if !status.success() {
            return Err(RefError::RepositoryNotFound {
                url: repo.url.clone(),
                detail: format!("git ls-remote exited with {}: {}", status, stderr.trim()),
            });
        }

        let refs = parse_ls_remote(&stdout)?;
        if refs.is_empty() {
            return Err(RefError::RepositoryNotFound {
                url: repo.url.clone(),
                detail: "remote advertised no refs".to_string(),
            });
        }

        debug!(count = refs.len(), "listed remote refs");
        Ok(refs)
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Parse `git ls-remote` output into refs, keeping the listed order
pub fn parse_ls_remote(output: &str) -> Result<Vec<RemoteRef>, RefError> {
    let mut refs = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let invalid = || RefError::InvalidLine(line.to_string());
        let (hash, path) = line.split_once('\t').ok_or_else(invalid)?;
        if hash.is_empty() {
            return Err(invalid());
        }

        if path == "HEAD" {
            refs.push(RemoteRef::head(hash));
            continue;
        }

        let (namespace, name) = path
            .strip_prefix("refs/")
            .and_then(|rest| rest.split_once('/'))
            .filter(|(ns, name)| !ns.is_empty() && !name.is_empty())
            .ok_or_else(invalid)?;

        let kind = match namespace {
            "heads" => RefKind::Branch,
            "tags" => RefKind::Tag,
            other => RefKind::Other(other.to_string()),
        };

        refs.push(RemoteRef {
            kind,
            name: name.to_string(),
            hash: hash.to_string(),
        });
    }

    Ok(refs)
}

/// Resolve the repository's requested ref against an advertised ref list
pub fn resolve(repo: &Repo, refs: &[RemoteRef]) -> Result<String, RefError> {
    let not_found = || RefError::RefNotFound {
        reference: repo.reference.clone(),
        url: repo.url.clone(),
    };

    if repo.is_default_ref() {
        return refs
            .iter()
            .find(|r| r.kind == RefKind::Head)
            .map(|r| r.hash.clone())
            .ok_or_else(not_found);
    }

    if let Some(r) = refs.iter().find(|r| r.name == repo.reference) {
        return Ok(r.hash.clone());
    }

    if repo.reference.len() < MIN_PREFIX_LEN {
        return Err(RefError::PrefixTooShort(repo.reference.clone()));
    }

    refs.iter()
        .find(|r| r.hash.starts_with(&repo.reference))
        .map(|r| r.hash.clone())
        .ok_or_else(not_found)
}
