pub mod cache;
pub mod config;
pub mod control;
pub mod convert;
pub mod fingerprint;
pub mod input;
pub mod logging;
pub mod output;
pub mod scheduler;
