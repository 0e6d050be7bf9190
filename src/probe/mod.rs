//! Probe Invoker (spec §4.1).

pub mod invoker;
pub mod raw;
pub mod validate;

pub use invoker::{probe, ProbeOutcome};
pub use raw::RawProbeResult;
