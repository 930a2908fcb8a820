//! Output collaborator: artifact existence, provenance records, and atomic
//! artifact writes.
//!
//! Provenance lives in a JSON sidecar next to each artifact
//! (`<artifact>.src.json`). Both files are written to `.part` temp paths and
//! renamed into place, sidecar first and artifact last, so an artifact that
//! exists always has its provenance already on disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::OutputStorageConfig;

/// Record of which source produced a destination artifact. The durable,
/// authoritative staleness signal; survives independently of any run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Content fingerprint of the source at conversion time.
    pub source_fingerprint: String,
    /// Identity of the source file the artifact was produced from.
    pub source_identity: String,
    /// Identity of the converter configuration that produced the artifact,
    /// so a settings change regenerates it even when the source is unchanged.
    pub converter_identity: String,
}

/// Output storage backend, one variant per supported destination kind.
pub enum OutputStorage {
    LocalDir(LocalDirOutput),
}

impl OutputStorage {
    pub fn from_config(cfg: &OutputStorageConfig) -> Result<Self> {
        match cfg {
            OutputStorageConfig::LocalDir { path } => Ok(OutputStorage::LocalDir(LocalDirOutput {
                root: path.clone(),
            })),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        match self {
            OutputStorage::LocalDir(c) => c.root.join(path).exists(),
        }
    }

    /// Read the provenance record for an artifact. `Ok(None)` when the
    /// artifact has no sidecar (treated as stale by the caller); a sidecar
    /// that exists but cannot be read or parsed is an error.
    pub fn read_provenance(&self, path: &str) -> Result<Option<Provenance>> {
        match self {
            OutputStorage::LocalDir(c) => c.read_provenance(path),
        }
    }

    /// Write the artifact bytes and their provenance record atomically with
    /// respect to `exists`: the artifact is renamed into place only after
    /// its sidecar is.
    pub fn write_artifact(&self, path: &str, bytes: &[u8], provenance: &Provenance) -> Result<()> {
        match self {
            OutputStorage::LocalDir(c) => c.write_artifact(path, bytes, provenance),
        }
    }
}

/// Local filesystem destination rooted at a directory, mirroring input paths.
pub struct LocalDirOutput {
    root: PathBuf,
}

impl LocalDirOutput {
    fn read_provenance(&self, path: &str) -> Result<Option<Provenance>> {
        let sidecar = provenance_path(&self.root.join(path));
        let bytes = match std::fs::read(&sidecar) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read provenance sidecar: {}", sidecar.display()))
            }
        };
        let provenance = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse provenance sidecar: {}", sidecar.display()))?;
        Ok(Some(provenance))
    }

    fn write_artifact(&self, path: &str, bytes: &[u8], provenance: &Provenance) -> Result<()> {
        let final_path = self.root.join(path);
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir: {}", parent.display()))?;
        }

        let sidecar = provenance_path(&final_path);
        let sidecar_tmp = temp_path(&sidecar);
        let json = serde_json::to_vec_pretty(provenance).context("serialize provenance")?;
        write_synced(&sidecar_tmp, &json)?;

        let artifact_tmp = temp_path(&final_path);
        write_synced(&artifact_tmp, bytes)?;

        // Sidecar first: once the artifact is visible, its provenance is too.
        std::fs::rename(&sidecar_tmp, &sidecar).with_context(|| {
            format!("rename {} to {}", sidecar_tmp.display(), sidecar.display())
        })?;
        std::fs::rename(&artifact_tmp, &final_path).with_context(|| {
            format!("rename {} to {}", artifact_tmp.display(), final_path.display())
        })?;
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("create temp file: {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("write temp file: {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("sync temp file: {}", path.display()))?;
    Ok(())
}

/// Sidecar path for an artifact: `thumb.webp` → `thumb.webp.src.json`.
pub fn provenance_path(artifact: &Path) -> PathBuf {
    let mut o = artifact.as_os_str().to_owned();
    o.push(".src.json");
    PathBuf::from(o)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".part");
    PathBuf::from(o)
}
