//! The run loop: dispatch per-file workers under the queue bound, and the
//! per-file decision/conversion pipeline.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::SkipCache;
use crate::config::Limits;
use crate::control::ShutdownToken;
use crate::convert::Converter;
use crate::fingerprint::{self, Staleness};
use crate::input::{InputStorage, SourceMetadata};
use crate::output::{OutputStorage, Provenance};

use super::report::{FileStats, RunOutcome, RunReport};

/// Run one full pass: scan, decide per (file, converter) pair, convert what
/// is needed, and flush the skip cache, also after cancellation, so the
/// next run resumes from whatever finished.
///
/// Per-unit failures are logged and counted, never fatal. Scan and cache
/// flush failures are fatal.
pub async fn run(
    input: Arc<InputStorage>,
    output: Arc<OutputStorage>,
    converters: Arc<Vec<Converter>>,
    cache: Arc<SkipCache>,
    limits: &Limits,
    force_rewrite: bool,
    token: ShutdownToken,
) -> Result<RunReport> {
    let mut report = RunReport::new();

    if token.is_cancelled() {
        tracing::info!("shutdown requested before run start");
        return finish(&cache, report, RunOutcome::Cancelled);
    }

    let files = input.scan().context("scan input files")?;
    report.files_seen = files.len() as u64;
    tracing::info!(file_count = files.len(), "scanned input files");

    if token.is_cancelled() {
        tracing::info!("shutdown requested after enumeration");
        return finish(&cache, report, RunOutcome::Cancelled);
    }

    let queue_slots = Arc::new(Semaphore::new(limits.max_queue_slots.max(1)));
    let process_slots = Arc::new(Semaphore::new(limits.max_process_slots.max(1)));

    let mut join_set = JoinSet::new();
    for path in files {
        if token.is_cancelled() {
            break;
        }
        // The queue slot bounds how many files are in flight at all; the
        // worker holds it until the file's outcome is fully resolved.
        let queue_slot = Arc::clone(&queue_slots)
            .acquire_owned()
            .await
            .context("queue semaphore closed")?;
        if token.is_cancelled() {
            break;
        }

        let input = Arc::clone(&input);
        let output = Arc::clone(&output);
        let converters = Arc::clone(&converters);
        let cache = Arc::clone(&cache);
        let process_slots = Arc::clone(&process_slots);
        let token = token.clone();
        join_set.spawn(async move {
            let _queue_slot = queue_slot;
            process_file(
                &input,
                &output,
                &converters,
                &cache,
                &process_slots,
                force_rewrite,
                &token,
                path,
            )
            .await
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(stats) => report.absorb(&stats),
            Err(e) => {
                tracing::warn!(error = %e, "file worker task failed to join");
                report.unit_failures += 1;
            }
        }
    }

    let outcome = if token.is_cancelled() {
        RunOutcome::Cancelled
    } else {
        RunOutcome::Completed
    };
    let report = finish(&cache, report, outcome)?;
    tracing::info!(
        outcome = ?report.outcome,
        files_seen = report.files_seen,
        conversions_done = report.conversions_done,
        cache_hits = report.cache_hits,
        up_to_date = report.up_to_date,
        unit_failures = report.unit_failures,
        "run finished"
    );
    Ok(report)
}

fn finish(cache: &SkipCache, mut report: RunReport, outcome: RunOutcome) -> Result<RunReport> {
    report.outcome = outcome;
    cache.flush().context("flush skip cache")?;
    Ok(report)
}

/// Decision and conversion pipeline for one file. Returns counters only;
/// all failures here are per-unit and already logged.
#[allow(clippy::too_many_arguments)]
async fn process_file(
    input: &Arc<InputStorage>,
    output: &Arc<OutputStorage>,
    converters: &Arc<Vec<Converter>>,
    cache: &SkipCache,
    process_slots: &Arc<Semaphore>,
    force_rewrite: bool,
    token: &ShutdownToken,
    path: String,
) -> FileStats {
    let mut stats = FileStats::default();
    if token.is_cancelled() {
        return stats;
    }

    let file_id = input.identity(&path);
    let mut metadata: Option<SourceMetadata> = None;
    let mut needed: Vec<usize> = Vec::new();

    for (index, conv) in converters.iter().enumerate() {
        // Fast path: confirmed done by a previous run or earlier in this
        // one; no metadata or destination round trip at all.
        if cache.contains(&file_id, conv.identity()) {
            stats.cache_hits += 1;
            tracing::debug!(file = %path, converter = index, "skip: confirmed done in skip cache");
            continue;
        }

        // Metadata is fetched lazily, once per file, shared by all
        // converters.
        if metadata.is_none() {
            match input.fetch_metadata(&path) {
                Ok(m) => {
                    stats.metadata_fetches += 1;
                    metadata = Some(m);
                }
                Err(e) => {
                    tracing::warn!("failed to read input metadata for {}: {:#}", path, e);
                    stats.unit_failures += 1;
                    return stats;
                }
            }
        }
        let Some(meta) = metadata.as_ref() else {
            return stats;
        };

        if force_rewrite {
            needed.push(index);
            continue;
        }

        let out_path = conv.output_path_for(&path);
        stats.staleness_checks += 1;
        match fingerprint::check(output, &out_path, &meta.fingerprint, conv.identity()) {
            Ok(Staleness::UpToDate) => {
                cache.mark_done(&file_id, conv.identity());
                stats.up_to_date += 1;
                tracing::debug!(file = %path, converter = index, "skip: provenance matches source fingerprint");
            }
            Ok(Staleness::Stale) | Ok(Staleness::DestinationMissing) => needed.push(index),
            Err(e) => {
                tracing::warn!("failed to read provenance of {}: {:#}", out_path, e);
                stats.unit_failures += 1;
                return stats;
            }
        }
    }

    if needed.is_empty() {
        return stats;
    }
    let Some(meta) = metadata else {
        return stats;
    };

    // Conversion phase: the queue slot stays held, and a process slot is
    // additionally required so CPU-heavy work stays bounded on its own.
    let _process_slot = match Arc::clone(process_slots).acquire_owned().await {
        Ok(p) => p,
        Err(_) => return stats,
    };
    if token.is_cancelled() {
        return stats;
    }

    // Content is read once and shared by every converter that needs to run.
    // The read is blocking filesystem work, so it leaves the runtime threads
    // like the codec work below does.
    let reader = Arc::clone(input);
    let read_path = path.clone();
    let bytes = match tokio::task::spawn_blocking(move || reader.read_content(&read_path)).await {
        Ok(Ok(b)) => Arc::new(b),
        Ok(Err(e)) => {
            tracing::warn!("failed to read content of {}: {:#}", path, e);
            stats.unit_failures += 1;
            return stats;
        }
        Err(e) => {
            tracing::warn!("content read task for {} failed to join: {}", path, e);
            stats.unit_failures += 1;
            return stats;
        }
    };
    stats.content_reads += 1;
    tracing::info!(file = %path, fingerprint = %meta.fingerprint, converters = needed.len(), "converting file");

    for index in needed {
        if token.is_cancelled() {
            return stats;
        }

        let worker_converters = Arc::clone(converters);
        let content_type = meta.content_type.clone();
        let buf = Arc::clone(&bytes);
        let rendered = tokio::task::spawn_blocking(move || {
            worker_converters[index].render(&content_type, &buf)
        })
        .await;

        let conv = &converters[index];
        let out_path = conv.output_path_for(&path);
        let rendered = match rendered {
            Ok(Ok(b)) => b,
            Ok(Err(e)) => {
                tracing::warn!("conversion of {} to {} failed: {:#}", path, out_path, anyhow::Error::from(e));
                stats.unit_failures += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!("conversion task for {} failed to join: {}", path, e);
                stats.unit_failures += 1;
                continue;
            }
        };

        let provenance = Provenance {
            source_fingerprint: meta.fingerprint.clone(),
            source_identity: file_id.clone(),
            converter_identity: conv.identity().to_owned(),
        };
        let writer = Arc::clone(output);
        let write_path = out_path.clone();
        let written = tokio::task::spawn_blocking(move || {
            writer.write_artifact(&write_path, &rendered, &provenance)
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("failed to write artifact {}: {:#}", out_path, e);
                stats.unit_failures += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!("artifact write task for {} failed to join: {}", out_path, e);
                stats.unit_failures += 1;
                continue;
            }
        }

        cache.mark_done(&file_id, conv.identity());
        stats.conversions_done += 1;
        tracing::info!(file = %path, out_path = %out_path, "converted");
    }

    stats
}
