//! SQLite persistence for mined history.
//!
//! [`store::Store`] owns the database and answers the reads the ingester
//! needs before a run starts. All writes for one commit go through a
//! [`store::Session`], which commits them as a single transaction or rolls
//! them back when dropped. [`queries`] holds the read-only analytics the
//! CLI exposes.

pub mod queries;
pub mod store;

pub use queries::{ChurnReport, CommitSummary, LineageEntry, RowCounts, YearStats};
pub use store::{FileRecord, NewCommit, NewFile, NewVersion, Session, Store, VersionState};
