//! Durable skip cache: (file identity, converter identity) pairs already
//! confirmed up to date, so unchanged files cost no staleness check at all.
//!
//! Purely advisory. A missing entry means "unknown, must check"; a stale or
//! discarded cache only costs redundant work, never incorrect output. The
//! provenance record on the artifact stays authoritative.
//!
//! File format: one record per source file per line,
//! `<file identity>,<converter id>;<converter id>...`. Identities must not
//! contain `,`, `;`, or newlines. The file is rewritten wholesale at run end
//! via a temp file and rename, so a failed flush never truncates the
//! previous cache.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct SkipCache {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl SkipCache {
    /// Cache with no durable backing; `flush` is a no-op. Used when no cache
    /// file is configured, so in-run fast-path lookups still work.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load the cache from `path`. A missing file yields an empty cache; an
    /// unreadable or malformed file is an error (fatal to the run, since a
    /// broken cache at a configured path signals an environment problem).
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("read skip cache: {}", path.display()))
            }
        };

        let mut entries: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (lineno, line) in data.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let (id, rest) = line.split_once(',').with_context(|| {
                format!(
                    "malformed skip cache record at {}:{}: expected '<identity>,<converter ids>'",
                    path.display(),
                    lineno + 1
                )
            })?;
            let convs = rest
                .split(';')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            entries.insert(id.to_owned(), convs);
        }

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        })
    }

    /// Fast-path lookup: was this (file, converter) pair already confirmed
    /// done, either by a previous run or earlier in this one?
    pub fn contains(&self, file_id: &str, conv_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(file_id)
            .is_some_and(|convs| convs.contains(conv_id))
    }

    /// Record a confirmed-done pair. Additive only; entries are never
    /// removed during a run.
    pub fn mark_done(&self, file_id: &str, conv_id: &str) {
        self.entries
            .lock()
            .unwrap()
            .entry(file_id.to_owned())
            .or_default()
            .insert(conv_id.to_owned());
    }

    /// Number of file identities currently tracked.
    pub fn file_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Converter identities confirmed done for `file_id`, if any.
    pub fn converters_for(&self, file_id: &str) -> Option<BTreeSet<String>> {
        self.entries.lock().unwrap().get(file_id).cloned()
    }

    /// Rewrite the cache file with the union of loaded and newly-confirmed
    /// entries. Writes a temp file next to the target and renames it into
    /// place so the old cache survives a failed write.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut out = String::new();
        for (id, convs) in self.entries.lock().unwrap().iter() {
            out.push_str(id);
            out.push(',');
            let joined: Vec<&str> = convs.iter().map(String::as_str).collect();
            out.push_str(&joined.join(";"));
            out.push('\n');
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create skip cache dir: {}", parent.display()))?;
            }
        }
        let tmp = temp_path(path);
        std::fs::write(&tmp, out)
            .with_context(|| format!("write skip cache temp file: {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| {
            format!("rename {} to {}", tmp.display(), path.display())
        })?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".part");
    PathBuf::from(o)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SkipCache::load(&dir.path().join("nope.csv")).unwrap();
        assert_eq!(cache.file_count(), 0);
        assert!(!cache.contains("local-dir:a.png", "deadbeef"));
    }

    #[test]
    fn mark_flush_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.csv");

        let cache = SkipCache::load(&path).unwrap();
        cache.mark_done("local-dir:a.png", "aaaa");
        cache.mark_done("local-dir:a.png", "bbbb");
        cache.mark_done("local-dir:b.jpg", "aaaa");
        cache.flush().unwrap();

        let reloaded = SkipCache::load(&path).unwrap();
        assert_eq!(reloaded.file_count(), 2);
        assert!(reloaded.contains("local-dir:a.png", "aaaa"));
        assert!(reloaded.contains("local-dir:a.png", "bbbb"));
        assert!(reloaded.contains("local-dir:b.jpg", "aaaa"));
        assert!(!reloaded.contains("local-dir:b.jpg", "bbbb"));
    }

    #[test]
    fn flush_replaces_previous_contents_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.csv");
        std::fs::write(&path, "local-dir:old.png,cccc\n").unwrap();

        let cache = SkipCache::load(&path).unwrap();
        cache.mark_done("local-dir:new.png", "dddd");
        cache.flush().unwrap();

        // Union of loaded and new entries, no temp file left behind.
        let reloaded = SkipCache::load(&path).unwrap();
        assert!(reloaded.contains("local-dir:old.png", "cccc"));
        assert!(reloaded.contains("local-dir:new.png", "dddd"));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn malformed_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.csv");
        std::fs::write(&path, "no-comma-in-this-line\n").unwrap();
        assert!(SkipCache::load(&path).is_err());
    }

    #[test]
    fn in_memory_cache_flushes_to_nothing() {
        let cache = SkipCache::in_memory();
        cache.mark_done("local-dir:a.png", "aaaa");
        assert!(cache.contains("local-dir:a.png", "aaaa"));
        cache.flush().unwrap();
    }
}
