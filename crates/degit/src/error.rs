//! Top-level error type for the clone pipeline

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::extract::ExtractError;
use crate::fetch::FetchError;
use crate::refs::RefError;
use crate::repo::ParseError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`DegitError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input could not be parsed as a repository reference
    MalformedReference,
    /// Remote repository missing or unreachable
    RemoteUnavailable,
    /// Requested ref did not match anything
    RefNotFound,
    /// Destination exists and overwriting was not requested
    DestinationConflict,
    /// Local filesystem or cache failure
    Filesystem,
    /// Operation was interrupted
    Cancelled,
}

/// Errors that can occur while cloning or clearing
#[derive(Debug, Error)]
pub enum DegitError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Refs(#[from] RefError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Destination exists and `force` was not set
    #[error("destination {0} already exists, use --force to overwrite")]
    DestinationExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl DegitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DegitError::Parse(_) => ErrorKind::MalformedReference,
            DegitError::Refs(e) => match e {
                RefError::RepositoryNotFound { .. } | RefError::Git(_) | RefError::InvalidLine(_) => {
                    ErrorKind::RemoteUnavailable
                }
                RefError::PrefixTooShort(_) | RefError::RefNotFound { .. } => ErrorKind::RefNotFound,
                RefError::Cancelled => ErrorKind::Cancelled,
            },
            DegitError::Fetch(e) => match e {
                FetchError::IoError(_) => ErrorKind::Filesystem,
                FetchError::Cancelled => ErrorKind::Cancelled,
                _ => ErrorKind::RemoteUnavailable,
            },
            DegitError::Cache(CacheError::InvalidFilter(_)) => ErrorKind::MalformedReference,
            DegitError::DestinationExists(_) => ErrorKind::DestinationConflict,
            DegitError::Cache(_)
            | DegitError::Extract(_)
            | DegitError::Config(_)
            | DegitError::IoError(_) => ErrorKind::Filesystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err: DegitError = ParseError::Malformed("x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::MalformedReference);

        let err: DegitError = RefError::PrefixTooShort("abc".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::RefNotFound);

        let err: DegitError = FetchError::RepositoryNotFound {
            url: "https://github.com/a/b".to_string(),
            status: 404,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);

        let err: DegitError = FetchError::Cancelled.into();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let err = DegitError::DestinationExists(PathBuf::from("out"));
        assert_eq!(err.kind(), ErrorKind::DestinationConflict);
    }

    #[test]
    fn test_unsupported_host_names_host() {
        let err: DegitError = ParseError::UnsupportedHost("example".to_string()).into();
        assert!(err.to_string().contains("example"));
    }
}
