//! Archive download
//!
//! Downloads a commit's source archive from its host into the cache.
//!
//! ## Archive URLs
//!
//! - GitHub, Sourcehut: `<repo>/archive/<hash>.tar.gz`
//! - GitLab: `<repo>/repository/archive.tar.gz?ref=<hash>`
//! - Bitbucket: `<repo>/get/<hash>.tar.gz`
//!
//! The HTTP client never follows redirects itself. Each hop goes through
//! [`redirect_target`] so a host that answers with a bare ref can be mapped
//! back onto its archive URL scheme, and the hop count is capped.

use crate::config::Config;
use crate::repo::{Repo, Site};
use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

/// Size of the buffer used when streaming a response body to disk
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Errors that can occur during archive download
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Host answered with a 4xx/5xx status
    #[error("could not find repository {url} (HTTP {status})")]
    RepositoryNotFound { url: String, status: u16 },

    /// Redirect status without a usable Location header
    #[error("redirect from {url} has no Location header")]
    MissingLocation { url: String },

    /// Redirect chain longer than the configured limit
    #[error("too many redirects fetching {url} (max: {max})")]
    TooManyRedirects { url: String, max: usize },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Download was interrupted
    #[error("download cancelled")]
    Cancelled,
}

/// Something that can place a commit's archive at a path
pub trait ArchiveSource {
    /// Download the archive for `hash` to `dest`, returning the bytes written
    fn fetch(
        &self,
        repo: &Repo,
        hash: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError>;
}

/// Archive URL for a commit, following the host's conventions
pub fn archive_url(repo: &Repo, hash: &str) -> String {
    match repo.site {
        Site::GitLab => format!("{}/repository/archive.tar.gz?ref={}", repo.url, hash),
        Site::Bitbucket => format!("{}/get/{}.tar.gz", repo.url, hash),
        Site::GitHub | Site::Sourcehut => format!("{}/archive/{}.tar.gz", repo.url, hash),
    }
}

/// URL to request after a redirect from `current`.
///
/// URL- or path-shaped locations are resolved against `current`. A bare token
/// is taken as a ref and substituted into the host's archive URL.
pub fn redirect_target(repo: &Repo, current: &str, location: &str) -> Result<String, FetchError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(FetchError::MissingLocation {
            url: current.to_string(),
        });
    }

    if location.contains(['/', ':', '?']) {
        let base = Url::parse(current).map_err(|_| FetchError::InvalidUrl(current.to_string()))?;
        let next = base
            .join(location)
            .map_err(|_| FetchError::InvalidUrl(location.to_string()))?;
        Ok(next.into())
    } else {
        Ok(archive_url(repo, location))
    }
}

/// Blocking HTTP archive fetcher
pub struct HttpFetcher {
    client: Client,
    max_redirects: usize,
}

impl HttpFetcher {
    /// Create a fetcher from configuration
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .redirect(Policy::none())
            .build()?;

        Ok(Self::with_client(client, config.max_redirects))
    }

    /// Create a fetcher around an existing client. The client should not
    /// follow redirects on its own.
    pub fn with_client(client: Client, max_redirects: usize) -> Self {
        Self {
            client,
            max_redirects,
        }
    }

    /// Download starting from an explicit URL
    #[instrument(skip(self, repo, dest, cancel), fields(repo = %repo.url))]
    pub fn fetch_url(
        &self,
        repo: &Repo,
        start: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        let mut url = start.to_string();
        let mut hops = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            debug!(%url, hops, "requesting archive");
            let response = self.client.get(&url).send()?;
            let status = response.status();

            if status.as_u16() >= 400 {
                return Err(FetchError::RepositoryNotFound {
                    url: repo.url.clone(),
                    status: status.as_u16(),
                });
            }

            if status == StatusCode::OK {
                let written = write_body(response, dest, cancel)?;
                debug!(bytes = written, path = %dest.display(), "archive downloaded");
                return Ok(written);
            }

            hops += 1;
            if hops > self.max_redirects {
                return Err(FetchError::TooManyRedirects {
                    url: start.to_string(),
                    max: self.max_redirects,
                });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| FetchError::MissingLocation { url: url.clone() })?;
            url = redirect_target(repo, &url, location)?;
        }
    }
}

impl ArchiveSource for HttpFetcher {
    fn fetch(
        &self,
        repo: &Repo,
        hash: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        self.fetch_url(repo, &archive_url(repo, hash), dest, cancel)
    }
}

/// Stream `body` into `dest` through a temporary file in the same directory,
/// so `dest` only ever holds a complete archive
pub(crate) fn write_body<R: Read>(
    mut body: R,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<u64, FetchError> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        temp.write_all(&buf[..n])?;
        written += n as u64;
    }

    temp.flush()?;
    temp.persist(dest).map_err(|e| FetchError::IoError(e.error))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    const HASH: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678";

    /// Serve one canned response per accepted connection
    fn serve(responses: Vec<String>) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request);
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        (base, handle)
    }

    fn redirect(location: &str) -> String {
        format!(
            "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            location
        )
    }

    fn ok(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    fn test_fetcher(max_redirects: usize) -> HttpFetcher {
        let client = Client::builder()
            .no_proxy()
            .redirect(Policy::none())
            .build()
            .unwrap();
        HttpFetcher::with_client(client, max_redirects)
    }

    #[test]
    fn test_archive_urls() {
        let github = Repo::parse("user/repo").unwrap();
        assert_eq!(
            archive_url(&github, HASH),
            format!("https://github.com/user/repo/archive/{}.tar.gz", HASH)
        );

        let gitlab = Repo::parse("gitlab:user/repo").unwrap();
        assert_eq!(
            archive_url(&gitlab, HASH),
            format!("https://gitlab.com/user/repo/repository/archive.tar.gz?ref={}", HASH)
        );

        let bitbucket = Repo::parse("bitbucket:user/repo").unwrap();
        assert_eq!(
            archive_url(&bitbucket, HASH),
            format!("https://bitbucket.org/user/repo/get/{}.tar.gz", HASH)
        );

        let sourcehut = Repo::parse("git.sr.ht/~user/repo").unwrap();
        assert_eq!(
            archive_url(&sourcehut, HASH),
            format!("https://git.sr.ht/~user/repo/archive/{}.tar.gz", HASH)
        );
    }

    #[test]
    fn test_redirect_target_absolute() {
        let repo = Repo::parse("user/repo").unwrap();
        let next = redirect_target(
            &repo,
            "https://github.com/user/repo/archive/x.tar.gz",
            "https://codeload.github.com/user/repo/tar.gz/x",
        )
        .unwrap();
        assert_eq!(next, "https://codeload.github.com/user/repo/tar.gz/x");
    }

    #[test]
    fn test_redirect_target_relative_path() {
        let repo = Repo::parse("user/repo").unwrap();
        let next = redirect_target(&repo, "https://github.com/user/repo/archive/x.tar.gz", "/other/place")
            .unwrap();
        assert_eq!(next, "https://github.com/other/place");
    }

    #[test]
    fn test_redirect_target_bare_ref_uses_host_template() {
        let repo = Repo::parse("gitlab:user/repo").unwrap();
        let next = redirect_target(&repo, "https://gitlab.com/whatever", HASH).unwrap();
        assert_eq!(next, archive_url(&repo, HASH));
    }

    #[test]
    fn test_write_body() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("nested/archive.tar.gz");

        let written = write_body(Cursor::new(b"archive bytes"), &dest, &CancellationToken::new()).unwrap();
        assert_eq!(written, 13);
        assert_eq!(fs::read(&dest).unwrap(), b"archive bytes");
    }

    #[test]
    fn test_write_body_cancelled_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("archive.tar.gz");
        let token = CancellationToken::new();
        token.cancel();

        let result = write_body(Cursor::new(b"archive bytes"), &dest, &token);
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_fetch_follows_redirect() {
        let (base, server) = serve(vec![redirect("/final"), ok("payload")]);
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.tar.gz");
        let repo = Repo::parse("user/repo").unwrap();

        let written = test_fetcher(5)
            .fetch_url(&repo, &format!("{}/start", base), &dest, &CancellationToken::new())
            .unwrap();
        server.join().unwrap();

        assert_eq!(written, 7);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
    }

    #[test]
    fn test_fetch_not_found() {
        let (base, server) = serve(vec![
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
        ]);
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.tar.gz");
        let repo = Repo::parse("user/repo").unwrap();

        let result = test_fetcher(5).fetch_url(&repo, &base, &dest, &CancellationToken::new());
        server.join().unwrap();

        assert!(matches!(
            result,
            Err(FetchError::RepositoryNotFound { status: 404, .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_fetch_redirect_limit() {
        let (base, server) = serve(vec![redirect("/a"), redirect("/b"), redirect("/c")]);
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.tar.gz");
        let repo = Repo::parse("user/repo").unwrap();

        let result = test_fetcher(2).fetch_url(&repo, &base, &dest, &CancellationToken::new());
        server.join().unwrap();

        assert!(matches!(
            result,
            Err(FetchError::TooManyRedirects { max: 2, .. })
        ));
    }

    #[test]
    fn test_fetch_redirect_without_location() {
        let (base, server) = serve(vec![
            "HTTP/1.1 302 Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
        ]);
        let temp = TempDir::new().unwrap();
        let repo = Repo::parse("user/repo").unwrap();

        let result = test_fetcher(5).fetch_url(
            &repo,
            &base,
            &temp.path().join("out.tar.gz"),
            &CancellationToken::new(),
        );
        server.join().unwrap();

        assert!(matches!(result, Err(FetchError::MissingLocation { .. })));
    }
}
