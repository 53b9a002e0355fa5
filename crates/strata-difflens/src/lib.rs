//! Unified-diff text parsing.
//!
//! Recovers exact per-line add/delete records, with line numbers taken from
//! the hunk headers, from the diff text the version-control backend
//! produces for one file.

pub mod parser;
