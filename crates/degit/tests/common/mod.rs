//! Shared fixtures for integration tests

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::Path;
use tar::{Builder, EntryType, Header};

pub const HASH_A: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678";
pub const HASH_B: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f000112233";

/// Build a gzip tarball in memory. Paths ending in `/` become directories.
pub fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    for (path, content) in files {
        let mut header = Header::new_gnu();
        if path.ends_with('/') {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
        } else {
            header.set_mode(0o644);
        }
        header.set_path(path).unwrap();
        header.set_size(content.len() as u64);
        header.set_cksum();
        builder.append(&header, &content[..]).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Tarball shaped like a host archive: a pax global header followed by
/// everything under `<root>/`
pub fn host_archive(root: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    let comment = b"52 comment=a1b2c3d4e5f60718293a4b5c6d7e8f9012345678\n";
    let mut pax = Header::new_ustar();
    pax.set_entry_type(EntryType::XGlobalHeader);
    pax.set_path("pax_global_header").unwrap();
    pax.set_size(comment.len() as u64);
    pax.set_mode(0o666);
    pax.set_cksum();
    builder.append(&pax, &comment[..]).unwrap();

    let mut dir = Header::new_gnu();
    dir.set_entry_type(EntryType::Directory);
    dir.set_path(format!("{}/", root)).unwrap();
    dir.set_size(0);
    dir.set_mode(0o755);
    dir.set_cksum();
    builder.append(&dir, &b""[..]).unwrap();

    for (path, content) in files {
        let mut header = Header::new_gnu();
        header.set_path(format!("{}/{}", root, path)).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &content[..]).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Write bytes to `path`, creating parents
pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

/// One archive member for [`tarball_with`]
pub enum Entry<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8]),
    Link(&'a str, &'a str),
}

/// Build a gzip tarball that can also contain symlinks
pub fn tarball_with(entries: &[Entry]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    for entry in entries {
        let mut header = Header::new_gnu();
        let content: &[u8] = match entry {
            Entry::Dir(path) => {
                header.set_entry_type(EntryType::Directory);
                header.set_path(path).unwrap();
                header.set_mode(0o755);
                b""
            }
            Entry::File(path, content) => {
                header.set_path(path).unwrap();
                header.set_mode(0o644);
                content
            }
            Entry::Link(path, target) => {
                header.set_entry_type(EntryType::Symlink);
                header.set_path(path).unwrap();
                header.set_link_name(target).unwrap();
                header.set_mode(0o777);
                b""
            }
        };
        header.set_size(content.len() as u64);
        header.set_cksum();
        builder.append(&header, content).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}
