//! Quality Comparator (spec §4.4).

pub mod comparator;
pub mod stats;
pub mod stats_filter;
pub mod types;
pub mod vmaf;

pub use comparator::compare;
pub use types::{ComparisonSummary, MetricKind, MetricOutcome};
