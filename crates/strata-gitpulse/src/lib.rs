//! Version-control backend for the strata miner.
//!
//! Lists a branch's commits oldest first, reports the structural diff
//! between a commit and its baseline, and renders per-path unified diff
//! text. [`mining::GitBackend`] implements the [`backend`] traits with git2;
//! [`classify`] turns the backend's raw classification into the four
//! disjoint change sets the ingester works with.

pub mod backend;
pub mod classify;
pub mod mining;
