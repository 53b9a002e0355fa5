//! Core types, configuration, and error handling for the strata miner.
//!
//! This crate provides the shared foundation used by all other strata crates:
//! - [`StrataError`]: unified error type using `thiserror`
//! - [`StrataConfig`]: configuration loaded from `.strata.toml`
//! - Shared types: [`CommitDescriptor`], [`PreviousCommit`], [`RawChange`],
//!   [`ChangeSet`], [`LineEvent`], [`Totals`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    DatabaseConfig, IssueConfig, LanguageMap, MiningConfig, RepositoryConfig, StrataConfig,
};
pub use error::StrataError;
pub use types::{
    truncate_chars, ChangeKind, ChangeSet, CommitDescriptor, FileChange, LineEvent, LineKind,
    OutputFormat, PreviousCommit, RawChange, RenamedFile, Totals, EMPTY_TREE_ID,
};

/// A convenience `Result` type for strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;
