//! Scrape-ingest pipeline.
//!
//! - `cycle`: one listing → details → reconcile run (`ScrapePipeline`)
//! - `reconcile`: batch merge into the store (`Reconciler`)
//! - `scheduler`: interval driver with backoff (`Scheduler`)
//! - `history`: recent cycle results (`CycleHistory`)

pub mod cycle;
pub mod history;
pub mod reconcile;
pub mod scheduler;

pub use cycle::{CycleOptions, ScrapePipeline};
pub use history::CycleHistory;
pub use reconcile::{BatchItem, Reconciler};
pub use scheduler::{Scheduler, SchedulerStatus, SkipReason, TickOutcome};
