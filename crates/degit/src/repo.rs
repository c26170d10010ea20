//! Repository references
//!
//! Parses shorthand references such as `user/repo`, `gitlab:user/repo#dev` or
//! `https://github.com/user/repo/sub/dir#v1.0.0` into a [`Repo`].
//!
//! ## Grammar
//!
//! ```text
//! reference := [host-prefix] user "/" name { "/" segment } ["/"] ["#" ref]
//! host-prefix := "https://" host "/"
//!              | "git@" host (":" | "/")
//!              | host ":"
//!              | dotted-host "/"
//! ```
//!
//! Without a host prefix the reference points at GitHub.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ref requested when the input carries no `#ref` suffix
pub const DEFAULT_REF: &str = "HEAD";

/// Errors that can occur while parsing a repository reference
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Input does not match the reference grammar
    #[error("could not parse {0}")]
    Malformed(String),

    /// Host is not one of the supported sites
    #[error("unsupported host `{0}`, degit supports GitHub, GitLab, Sourcehut and BitBucket")]
    UnsupportedHost(String),
}

/// Supported hosting sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    GitHub,
    GitLab,
    Bitbucket,
    Sourcehut,
}

impl Site {
    /// Every supported site
    pub const ALL: [Site; 4] = [Site::GitHub, Site::GitLab, Site::Bitbucket, Site::Sourcehut];

    /// Look up a site from a captured host string.
    ///
    /// A trailing `.com` and then `.org` are stripped before matching, so
    /// `github`, `github.com` and `bitbucket.org` all resolve.
    pub fn from_host(host: &str) -> Option<Self> {
        match strip_tld(host) {
            "github" => Some(Site::GitHub),
            "gitlab" => Some(Site::GitLab),
            "bitbucket" => Some(Site::Bitbucket),
            "sourcehut" | "git.sr.ht" => Some(Site::Sourcehut),
            _ => None,
        }
    }

    /// Short identifier, also used as the cache directory name
    pub fn as_str(&self) -> &'static str {
        match self {
            Site::GitHub => "github",
            Site::GitLab => "gitlab",
            Site::Bitbucket => "bitbucket",
            Site::Sourcehut => "sourcehut",
        }
    }

    /// Domain serving the site's web and git endpoints
    pub fn domain(&self) -> &'static str {
        match self {
            Site::GitHub => "github.com",
            Site::GitLab => "gitlab.com",
            Site::Bitbucket => "bitbucket.org",
            Site::Sourcehut => "git.sr.ht",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote repository at a ref (branch, tag, commit or the default branch)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    /// Hosting site
    pub site: Site,
    /// Owner of the repository
    pub user: String,
    /// Repository name, without any `.git` suffix
    pub name: String,
    /// Requested ref, [`DEFAULT_REF`] when none was given
    pub reference: String,
    /// Canonical `https://<domain>/<user>/<name>` URL
    pub url: String,
    /// `git@<domain>:<user>/<name>` URL
    pub ssh: String,
    /// Subdirectory to extract, either empty or starting with `/`
    pub subdir: String,
}

impl Repo {
    /// Parse a repository reference
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let malformed = || ParseError::Malformed(input.to_string());

        if input.is_empty() || input.chars().any(char::is_whitespace) {
            return Err(malformed());
        }

        let (host, rest) = split_host(input).ok_or_else(malformed)?;

        let (path, reference) = match rest.split_once('#') {
            Some((_, "")) => return Err(malformed()),
            Some((path, reference)) => (path, reference),
            None => (rest, DEFAULT_REF),
        };

        let path = path.strip_suffix('/').unwrap_or(path);
        let mut segments = path.split('/');

        let user = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(malformed)?;
        let name = segments
            .next()
            .map(|s| s.strip_suffix(".git").unwrap_or(s))
            .filter(|s| !s.is_empty())
            .ok_or_else(malformed)?;

        let mut subdir = String::new();
        for segment in segments {
            if segment.is_empty() {
                return Err(malformed());
            }
            subdir.push('/');
            subdir.push_str(segment);
        }

        let site = match host {
            Some(host) => {
                Site::from_host(host)
                    .ok_or_else(|| ParseError::UnsupportedHost(strip_tld(host).to_string()))?
            }
            None => Site::GitHub,
        };

        Ok(Self::new(site, user, name, reference, &subdir))
    }

    /// Build a repository descriptor from already-validated parts
    pub fn new(site: Site, user: &str, name: &str, reference: &str, subdir: &str) -> Self {
        let domain = site.domain();
        Self {
            site,
            user: user.to_string(),
            name: name.to_string(),
            reference: reference.to_string(),
            url: format!("https://{}/{}/{}", domain, user, name),
            ssh: format!("git@{}:{}/{}", domain, user, name),
            subdir: subdir.to_string(),
        }
    }

    /// Whether the default branch was requested
    pub fn is_default_ref(&self) -> bool {
        self.reference == DEFAULT_REF
    }

    /// Destination used when the caller does not name one: the subdirectory
    /// without its leading slash, else the repository name
    pub fn default_destination(&self) -> &str {
        let subdir = self.subdir.trim_start_matches('/');
        if subdir.is_empty() {
            &self.name
        } else {
            subdir
        }
    }

    /// Synthetic top-level directory hosts wrap archive contents in
    pub fn archive_root(&self, hash: &str) -> String {
        match self.site {
            Site::Bitbucket => format!("{}-{}", self.user, self.name),
            _ => format!("{}-{}", self.name, hash),
        }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}{}", self.site, self.user, self.name, self.subdir)?;
        if !self.is_default_ref() {
            write!(f, "#{}", self.reference)?;
        }
        Ok(())
    }
}

impl FromStr for Repo {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Repo::parse(s)
    }
}

/// Split the optional host prefix from the rest of the reference.
///
/// Returns `None` when a prefix is present but empty or truncated.
fn split_host(input: &str) -> Option<(Option<&str>, &str)> {
    if let Some(rest) = input.strip_prefix("https://") {
        let (host, rest) = rest.split_once('/')?;
        if host.is_empty() || host.contains(':') {
            return None;
        }
        return Some((Some(host), rest));
    }

    if let Some(rest) = input.strip_prefix("git@") {
        let idx = rest.find([':', '/'])?;
        let host = &rest[..idx];
        if host.is_empty() {
            return None;
        }
        return Some((Some(host), &rest[idx + 1..]));
    }

    // `host:` shorthand, only when the colon comes before any slash
    if let Some(idx) = input.find(':') {
        let host = &input[..idx];
        if !host.contains('/') {
            if host.is_empty() {
                return None;
            }
            return Some((Some(host), &input[idx + 1..]));
        }
    }

    // `github.com/user/repo`: a dotted first segment names the host
    if let Some((first, rest)) = input.split_once('/') {
        if is_dotted_host(first) {
            return Some((Some(first), rest));
        }
    }

    Some((None, input))
}

/// Drop a trailing `.com`, then a trailing `.org`
fn strip_tld(host: &str) -> &str {
    let host = host.strip_suffix(".com").unwrap_or(host);
    host.strip_suffix(".org").unwrap_or(host)
}

fn is_dotted_host(segment: &str) -> bool {
    segment
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < segment.len())
}
