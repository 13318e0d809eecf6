//! Hub statistics

pub mod metrics;

pub(crate) use metrics::HubCounters;
pub use metrics::HubStats;
