//! Input collaborator: enumerate candidate files, fetch their metadata, and
//! read their content. A closed set of backend variants behind one surface.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::{InputConfig, InputStorageConfig};

/// Metadata of a source file, fetched at most once per file per run.
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    /// Stable cross-run key, backend-qualified (e.g. `local-dir:sub/a.png`).
    pub identity: String,
    /// Change-detecting fingerprint of the current content. For local files
    /// this is the mtime in hex seconds; remote backends would supply their
    /// own digest.
    pub fingerprint: String,
    /// MIME type derived from the file extension.
    pub content_type: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Input storage backend. Adding a backend means adding a variant here and
/// in [`InputStorageConfig`], not editing a lookup table.
pub enum InputStorage {
    LocalDir(LocalDirInput),
}

impl InputStorage {
    pub fn from_config(cfg: &InputConfig) -> Result<Self> {
        match &cfg.storage {
            InputStorageConfig::LocalDir { path, max_depth } => {
                Ok(InputStorage::LocalDir(LocalDirInput {
                    root: path.clone(),
                    max_depth: *max_depth,
                    known_extensions: cfg
                        .known_extensions
                        .iter()
                        .map(|e| e.to_ascii_lowercase())
                        .collect(),
                }))
            }
        }
    }

    /// Enumerate candidate files as root-relative paths, in sorted order.
    /// An unreadable root is fatal to the run.
    pub fn scan(&self) -> Result<Vec<String>> {
        match self {
            InputStorage::LocalDir(c) => c.scan(),
        }
    }

    /// Stable identity for a scanned path.
    pub fn identity(&self, path: &str) -> String {
        match self {
            InputStorage::LocalDir(_) => format!("local-dir:{}", path),
        }
    }

    /// Fails if the path vanished between scan and fetch.
    pub fn fetch_metadata(&self, path: &str) -> Result<SourceMetadata> {
        match self {
            InputStorage::LocalDir(c) => c.fetch_metadata(path),
        }
    }

    /// Read the full content. Loops to EOF; a short first read is not
    /// trusted to be the whole file.
    pub fn read_content(&self, path: &str) -> Result<Vec<u8>> {
        match self {
            InputStorage::LocalDir(c) => c.read_content(path),
        }
    }
}

/// Local filesystem input rooted at a directory.
pub struct LocalDirInput {
    root: PathBuf,
    max_depth: u32,
    known_extensions: Vec<String>,
}

impl LocalDirInput {
    fn scan(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        self.scan_dir(&self.root, self.max_depth, "", &mut paths)
            .with_context(|| format!("scan input root: {}", self.root.display()))?;
        paths.sort();
        Ok(paths)
    }

    fn scan_dir(&self, dir: &Path, depth: u32, prefix: &str, out: &mut Vec<String>) -> Result<()> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("read directory: {}", dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("read directory entry in {}", dir.display()))?;
            // Lossy conversion would report a name that cannot be opened
            // again later; such entries are skipped instead.
            let name = match entry.file_name().into_string() {
                Ok(n) => n,
                Err(raw) => {
                    tracing::warn!("skipping non-utf8 name in {}: {:?}", dir.display(), raw);
                    continue;
                }
            };
            let file_type = entry
                .file_type()
                .with_context(|| format!("stat {}", entry.path().display()))?;
            if file_type.is_dir() {
                if depth > 0 {
                    let child_prefix = format!("{}{}/", prefix, name);
                    self.scan_dir(&entry.path(), depth - 1, &child_prefix, out)?;
                }
                continue;
            }
            let Some(ext) = extension_of(&name) else {
                continue;
            };
            if self.known_extensions.is_empty() || self.known_extensions.contains(&ext) {
                out.push(format!("{}{}", prefix, name));
            }
        }
        Ok(())
    }

    fn fetch_metadata(&self, path: &str) -> Result<SourceMetadata> {
        let full = self.root.join(path);
        let meta = std::fs::metadata(&full)
            .with_context(|| format!("read file info: {}", full.display()))?;
        let modified = meta
            .modified()
            .with_context(|| format!("read mtime: {}", full.display()))?;
        let mtime_secs = modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let ext = extension_of(path).unwrap_or_default();
        Ok(SourceMetadata {
            identity: format!("local-dir:{}", path),
            fingerprint: format!("{:x}", mtime_secs),
            content_type: content_type_for(&ext).to_owned(),
            size: meta.len(),
            modified,
        })
    }

    fn read_content(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        let mut file = std::fs::File::open(&full)
            .with_context(|| format!("open input file: {}", full.display()))?;
        let mut buf = Vec::with_capacity(
            file.metadata().map(|m| m.len() as usize).unwrap_or(0),
        );
        file.read_to_end(&mut buf)
            .with_context(|| format!("read input file: {}", full.display()))?;
        Ok(buf)
    }
}

fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputConfig;

    fn local_config(root: &Path, max_depth: u32, exts: &[&str]) -> InputConfig {
        InputConfig {
            storage: InputStorageConfig::LocalDir {
                path: root.to_path_buf(),
                max_depth,
            },
            known_extensions: exts.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn scan_filters_by_extension_and_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("b.JPG"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("no_extension"), b"x").unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deep")).unwrap();
        std::fs::write(dir.path().join("sub/c.png"), b"x").unwrap();
        std::fs::write(dir.path().join("sub/deep/d.png"), b"x").unwrap();

        let input =
            InputStorage::from_config(&local_config(dir.path(), 1, &["png", "jpg"])).unwrap();
        let paths = input.scan().unwrap();
        // depth 1 reaches sub/ but not sub/deep/; extension match is
        // case-insensitive.
        assert_eq!(paths, vec!["a.png", "b.JPG", "sub/c.png"]);
    }

    #[test]
    fn empty_extension_list_accepts_any_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let input = InputStorage::from_config(&local_config(dir.path(), 0, &[])).unwrap();
        let paths = input.scan().unwrap();
        assert_eq!(paths, vec!["a.png", "notes.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_skipped_not_mangled() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"b\xff.png")), b"x").unwrap();

        let input = InputStorage::from_config(&local_config(dir.path(), 0, &["png"])).unwrap();
        let paths = input.scan().unwrap();
        // The undecodable name is dropped at scan time; every reported path
        // can be fetched afterwards.
        assert_eq!(paths, vec!["a.png"]);
        assert!(input.fetch_metadata(&paths[0]).is_ok());
    }

    #[test]
    fn metadata_carries_identity_fingerprint_and_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"pngbytes").unwrap();

        let input = InputStorage::from_config(&local_config(dir.path(), 0, &["png"])).unwrap();
        let meta = input.fetch_metadata("a.png").unwrap();
        assert_eq!(meta.identity, "local-dir:a.png");
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.size, 8);
        assert!(!meta.fingerprint.is_empty());

        // Fingerprint is stable across fetches of an unchanged file.
        let again = input.fetch_metadata("a.png").unwrap();
        assert_eq!(meta.fingerprint, again.fingerprint);
    }

    #[test]
    fn fetch_metadata_fails_for_vanished_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputStorage::from_config(&local_config(dir.path(), 0, &["png"])).unwrap();
        assert!(input.fetch_metadata("gone.png").is_err());
    }

    #[test]
    fn read_content_returns_full_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let body: Vec<u8> = (0u8..=255).cycle().take(70_000).collect();
        std::fs::write(dir.path().join("big.png"), &body).unwrap();

        let input = InputStorage::from_config(&local_config(dir.path(), 0, &["png"])).unwrap();
        assert_eq!(input.read_content("big.png").unwrap(), body);
    }

    #[test]
    fn scan_fails_on_unreadable_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing-root");
        let input = InputStorage::from_config(&local_config(&missing, 0, &["png"])).unwrap();
        assert!(input.scan().is_err());
    }
}
