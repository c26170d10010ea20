//! degit Library
//!
//! Copies the files of a remote git repository without its history:
//! - Repository reference parsing (`user/repo/sub#ref` and URL forms)
//! - Ref resolution through `git ls-remote`
//! - Archive cache keyed by commit hash, with stale archive eviction
//! - Archive download with host-specific URLs
//! - Tarball extraction with subdirectory filtering

pub mod cache;
pub mod clone;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod refs;
pub mod repo;

pub use cache::{Cache, CacheError, ClearOutcome, ClearScope, Confirm};
pub use clone::{CloneOptions, CloneOutcome, Degit};
pub use config::{Config, ConfigError};
pub use error::{DegitError, ErrorKind};
pub use extract::{extract, ExtractError, ExtractSummary};
pub use fetch::{archive_url, ArchiveSource, FetchError, HttpFetcher};
pub use refs::{parse_ls_remote, resolve, GitLsRemote, RefError, RefKind, RefLister, RemoteRef};
pub use repo::{ParseError, Repo, Site, DEFAULT_REF};
pub use tokio_util::sync::CancellationToken;
