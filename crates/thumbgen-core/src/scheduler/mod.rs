//! Incremental conversion scheduler.
//!
//! Decides, per (file, converter) pair, whether work is needed (skip cache
//! first, then provenance-based staleness) and runs only the remaining work
//! under two independent bounds: a queue bound on files in the decision
//! phase and a smaller process bound on files in the conversion phase.

mod report;
mod run;

pub use report::{RunOutcome, RunReport};
pub use run::run;
