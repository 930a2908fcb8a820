//! Identity and staleness model.
//!
//! A source file is identified by a backend-qualified key and a content
//! fingerprint derived from its metadata; a converter is identified by a
//! digest of its full effective configuration. A destination artifact is up
//! to date exactly when its provenance record stores both the source's
//! current fingerprint and the identity of the configured converter.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::config::ConverterConfig;
use crate::output::OutputStorage;

/// Digest of a converter's effective configuration, computed over its
/// canonical JSON serialization (type tag included). Equal configurations
/// produce equal identities; any parameter change produces a new one.
pub fn converter_identity(cfg: &ConverterConfig) -> Result<String> {
    let canonical = serde_json::to_vec(cfg).context("serialize converter config for identity")?;
    let digest = Sha256::digest(&canonical);
    Ok(hex::encode(&digest[..8]))
}

/// Outcome of comparing a destination artifact against the current source
/// fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Artifact exists and its provenance matches the source fingerprint.
    UpToDate,
    /// Artifact exists but was produced from a different source fingerprint,
    /// or carries no provenance at all.
    Stale,
    /// No artifact at the destination path.
    DestinationMissing,
}

/// Check one (converter, destination path) pair against the current source
/// fingerprint. Up to date requires both the source fingerprint and the
/// converter identity stored in the provenance to match, so a settings
/// change regenerates the artifact even when the source is unchanged. A
/// provenance read failure on an artifact that exists is a hard error, not
/// staleness; the caller abandons the file.
pub fn check(
    output: &OutputStorage,
    out_path: &str,
    source_fingerprint: &str,
    converter_identity: &str,
) -> Result<Staleness> {
    if !output.exists(out_path) {
        return Ok(Staleness::DestinationMissing);
    }
    let provenance = output
        .read_provenance(out_path)
        .with_context(|| format!("read provenance for existing artifact: {}", out_path))?;
    match provenance {
        Some(p)
            if p.source_fingerprint == source_fingerprint
                && p.converter_identity == converter_identity =>
        {
            Ok(Staleness::UpToDate)
        }
        _ => Ok(Staleness::Stale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webp_cfg(quality: u8, max_width: u32) -> ConverterConfig {
        ConverterConfig::Webp {
            quality,
            max_width,
            max_height: 480,
        }
    }

    #[test]
    fn identical_configs_share_an_identity() {
        let a = converter_identity(&webp_cfg(80, 640)).unwrap();
        let b = converter_identity(&webp_cfg(80, 640)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn any_parameter_change_changes_the_identity() {
        let base = converter_identity(&webp_cfg(80, 640)).unwrap();
        assert_ne!(base, converter_identity(&webp_cfg(81, 640)).unwrap());
        assert_ne!(base, converter_identity(&webp_cfg(80, 641)).unwrap());
    }

    #[test]
    fn staleness_against_destination_state() {
        use crate::config::OutputStorageConfig;
        use crate::output::Provenance;

        let dir = tempfile::tempdir().unwrap();
        let output = OutputStorage::from_config(&OutputStorageConfig::LocalDir {
            path: dir.path().to_path_buf(),
        })
        .unwrap();

        assert_eq!(
            check(&output, "a.webp", "f1", "c1").unwrap(),
            Staleness::DestinationMissing
        );

        output
            .write_artifact(
                "a.webp",
                b"bytes",
                &Provenance {
                    source_fingerprint: "f1".to_owned(),
                    source_identity: "local-dir:a.png".to_owned(),
                    converter_identity: "c1".to_owned(),
                },
            )
            .unwrap();

        assert_eq!(check(&output, "a.webp", "f1", "c1").unwrap(), Staleness::UpToDate);
        // Source changed.
        assert_eq!(check(&output, "a.webp", "f2", "c1").unwrap(), Staleness::Stale);
        // Converter configuration changed.
        assert_eq!(check(&output, "a.webp", "f1", "c2").unwrap(), Staleness::Stale);
    }

    #[test]
    fn artifact_without_provenance_is_stale_not_an_error() {
        use crate::config::OutputStorageConfig;

        let dir = tempfile::tempdir().unwrap();
        let output = OutputStorage::from_config(&OutputStorageConfig::LocalDir {
            path: dir.path().to_path_buf(),
        })
        .unwrap();
        std::fs::write(dir.path().join("orphan.webp"), b"x").unwrap();

        assert_eq!(
            check(&output, "orphan.webp", "f1", "c1").unwrap(),
            Staleness::Stale
        );
    }

    #[test]
    fn converter_kind_is_part_of_the_identity() {
        let webp = converter_identity(&webp_cfg(80, 640)).unwrap();
        let jpeg = converter_identity(&ConverterConfig::Jpeg {
            quality: 80,
            max_width: 640,
            max_height: 480,
            extension: None,
        })
        .unwrap();
        assert_ne!(webp, jpeg);
    }
}
