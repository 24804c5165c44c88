//! Monitoring engine
//!
//! Probes every registered endpoint once per sweep, classifies the results,
//! keeps history and uptime, and raises deduplicated alerts.

pub mod alerts;
pub mod checker;
pub mod evaluator;
pub mod history;
pub mod prober;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub use alerts::AlertDispatcher;
pub use evaluator::{Evaluator, Thresholds};
pub use history::{ExportFilter, HistoryOptions, HistoryStore};
pub use prober::{NetworkProber, Prober};
pub use registry::Registry;
pub use scheduler::{Scheduler, SchedulerOptions, SweepOutcome, SweepTrigger, TriggerOutcome};
