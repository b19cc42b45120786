//! Start/end synthesis from raw activity records.
//!
//! Upstream emits one record per model call with no explicit begin or end.
//! The correlator stretches those records into balanced `start`/`end` pairs
//! per key, which is what status indicators in the UI consume.

mod correlator;
mod record;

pub use correlator::{ActivityCorrelator, CorrelatorConfig, Ingested, ScheduledEnd};
pub use record::ActivityRecord;
