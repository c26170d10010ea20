//! Archive extraction
//!
//! Materializes a cached `.tar.gz` archive into a destination directory in a
//! single forward pass. Host archives wrap everything in a synthetic root
//! directory (`<name>-<hash>/`), which is stripped, and an optional
//! subdirectory filter restricts what is written.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use thiserror::Error;
use tracing::{debug, trace};

/// Name git gives the pax global header carrying the commit id
const PAX_GLOBAL_HEADER: &str = "pax_global_header";

/// Errors that can occur during extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    /// IO error (reading the archive or writing the tree)
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Entry path would land outside the destination
    #[error("refusing to extract unsafe path `{0}`")]
    UnsafePath(String),
}

/// What an extraction wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Regular files and symlinks written
    pub files: usize,
    /// Directories created
    pub directories: usize,
    /// Entries outside the filter or of unsupported types
    pub skipped: usize,
}

impl ExtractSummary {
    /// True when nothing was written, usually a filter that matched nothing
    pub fn is_empty(&self) -> bool {
        self.files == 0 && self.directories == 0
    }
}

/// Extract `archive` into `dest`.
///
/// The first path component is dropped when it starts with `root_prefix`.
/// With a non-empty `subdir` only entries under it are written, relative to
/// it. Re-running over an existing tree overwrites files in place.
pub fn extract(
    archive: &Path,
    dest: &Path,
    subdir: &str,
    root_prefix: &str,
) -> Result<ExtractSummary, ExtractError> {
    debug!(archive = %archive.display(), dest = %dest.display(), subdir, "extracting archive");

    let filter = normalize_filter(subdir);
    fs::create_dir_all(dest)?;

    let file = File::open(archive)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut summary = ExtractSummary::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        let raw = entry.path()?.to_string_lossy().into_owned();

        if kind == EntryType::XGlobalHeader || raw == PAX_GLOBAL_HEADER {
            trace!(path = %raw, "skipping pax global header");
            summary.skipped += 1;
            continue;
        }

        let Some(relative) = relative_path(&raw, root_prefix, filter.as_deref()) else {
            summary.skipped += 1;
            continue;
        };
        let target = safe_join(dest, relative)?;
        if target == dest {
            continue;
        }
        reject_symlinked_parents(dest, relative)?;

        match kind {
            EntryType::Directory => {
                prepare_target(&target)?;
                fs::create_dir_all(&target)?;
                summary.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                prepare_target(&target)?;
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                set_mode(&target, entry.header().mode().ok())?;
                summary.files += 1;
            }
            EntryType::Symlink => {
                let link = match entry.link_name()? {
                    Some(link) => link.into_owned(),
                    None => {
                        summary.skipped += 1;
                        continue;
                    }
                };
                if !is_contained_link(&link) {
                    debug!(path = %raw, link = %link.display(), "skipping symlink with unsafe target");
                    summary.skipped += 1;
                    continue;
                }
                prepare_target(&target)?;
                if create_symlink(&link, &target)? {
                    summary.files += 1;
                } else {
                    summary.skipped += 1;
                }
            }
            other => {
                trace!(path = %raw, kind = ?other, "skipping unsupported entry");
                summary.skipped += 1;
            }
        }
    }

    debug!(
        files = summary.files,
        directories = summary.directories,
        skipped = summary.skipped,
        "extraction finished"
    );
    Ok(summary)
}

/// `"/a/b"` → `Some("a/b/")`, `""` or `"/"` → `None`
fn normalize_filter(subdir: &str) -> Option<String> {
    let trimmed = subdir.trim_start_matches('/');
    if trimmed.is_empty() {
        None
    } else if trimmed.ends_with('/') {
        Some(trimmed.to_string())
    } else {
        Some(format!("{}/", trimmed))
    }
}

/// Entry path relative to the destination, or `None` when it is filtered out
fn relative_path<'a>(raw: &'a str, root_prefix: &str, filter: Option<&str>) -> Option<&'a str> {
    let mut path = raw.trim_start_matches("./");

    if !root_prefix.is_empty() {
        let (first, rest) = path.split_once('/').unwrap_or((path, ""));
        if first.starts_with(root_prefix) {
            path = rest;
        }
    }

    let path = match filter {
        Some(filter) => path.strip_prefix(filter)?,
        None => path,
    };

    (!path.is_empty()).then_some(path)
}

/// Join an archive path onto `dest`, rejecting anything that could escape it
pub fn safe_join(dest: &Path, relative: &str) -> Result<PathBuf, ExtractError> {
    let mut joined = dest.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(relative.to_string()));
            }
        }
    }
    Ok(joined)
}

/// Whether a symlink target can only point at or below its own directory.
///
/// Targets with `..` or a root are refused outright: resolving them safely
/// would depend on other links in the tree, which may be created later.
fn is_contained_link(link: &Path) -> bool {
    !link.as_os_str().is_empty()
        && link
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Fail when any existing parent of `relative` under `dest` is a symlink, so
/// nothing is ever written through a link
fn reject_symlinked_parents(dest: &Path, relative: &str) -> Result<(), ExtractError> {
    let mut current = dest.to_path_buf();
    let mut parts = Path::new(relative)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .peekable();

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            break;
        }
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ExtractError::UnsafePath(relative.to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Create parent directories and clear whatever non-directory sits at `target`
fn prepare_target(target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::symlink_metadata(target) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(target),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn set_mode(target: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o7777))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_target: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link: &Path, target: &Path) -> io::Result<bool> {
    std::os::unix::fs::symlink(link, target)?;
    Ok(true)
}

#[cfg(not(unix))]
fn create_symlink(_link: &Path, _target: &Path) -> io::Result<bool> {
    Ok(false)
}
