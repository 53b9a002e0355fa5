//! Commit ingestion for the strata miner.
//!
//! [`coordinator::IngestionCoordinator`] replays a branch into a
//! [`strata_store::Store`]: workers classify and parse commits in parallel,
//! and a single writer applies them in branch order, resolving renames with
//! [`lineage::LineageTracker`] and folding size deltas into
//! [`aggregate::AggregateMetricsTracker`].

pub mod aggregate;
pub mod coordinator;
pub mod issues;
pub mod lineage;
pub mod prepare;

pub use coordinator::{repository_name, FailedCommit, IngestReport, IngestionCoordinator};
