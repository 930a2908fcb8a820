/// Terminal state of a run. Cancellation is a first-class outcome, distinct
/// from success and from fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// What a run did, with call counters for each collaborator interaction so
/// work-avoidance properties are observable without mock plumbing.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Files returned by the input scan.
    pub files_seen: u64,
    /// Conversions actually performed (artifact written).
    pub conversions_done: u64,
    /// (file, converter) pairs skipped via the skip cache, no backend check.
    pub cache_hits: u64,
    /// (file, converter) pairs confirmed current by a provenance check.
    pub up_to_date: u64,
    /// Source metadata fetches (at most one per file).
    pub metadata_fetches: u64,
    /// Source content reads (at most one per file, only when needed).
    pub content_reads: u64,
    /// Provenance/staleness checks against the destination.
    pub staleness_checks: u64,
    /// Per-unit recoverable failures (file or converter abandoned, run went on).
    pub unit_failures: u64,
}

impl RunReport {
    pub(super) fn new() -> Self {
        Self {
            outcome: RunOutcome::Completed,
            files_seen: 0,
            conversions_done: 0,
            cache_hits: 0,
            up_to_date: 0,
            metadata_fetches: 0,
            content_reads: 0,
            staleness_checks: 0,
            unit_failures: 0,
        }
    }

    pub(super) fn absorb(&mut self, stats: &FileStats) {
        self.conversions_done += stats.conversions_done;
        self.cache_hits += stats.cache_hits;
        self.up_to_date += stats.up_to_date;
        self.metadata_fetches += stats.metadata_fetches;
        self.content_reads += stats.content_reads;
        self.staleness_checks += stats.staleness_checks;
        self.unit_failures += stats.unit_failures;
    }
}

/// Per-file counters returned by each worker and summed into the report.
#[derive(Debug, Default)]
pub(super) struct FileStats {
    pub conversions_done: u64,
    pub cache_hits: u64,
    pub up_to_date: u64,
    pub metadata_fetches: u64,
    pub content_reads: u64,
    pub staleness_checks: u64,
    pub unit_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_sums_worker_counters() {
        let mut report = RunReport::new();
        report.absorb(&FileStats {
            conversions_done: 2,
            cache_hits: 1,
            ..FileStats::default()
        });
        report.absorb(&FileStats {
            up_to_date: 3,
            unit_failures: 1,
            ..FileStats::default()
        });
        assert_eq!(report.conversions_done, 2);
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.up_to_date, 3);
        assert_eq!(report.unit_failures, 1);
        assert_eq!(report.outcome, RunOutcome::Completed);
    }
}
