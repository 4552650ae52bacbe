//! Masternode governance agent library code.
//!
//! Keeps a local cache of the network's governance objects in step with the
//! daemon, validates proposals and superblocks, casts this node's votes and
//! computes the deterministic proposal ranking used to build superblocks.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_lossless,
    clippy::arithmetic_side_effects,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]

pub mod address;
pub mod codec;
pub mod config;
pub mod daemon;
pub mod logging;
/// Governance objects and their typed sub-records
pub mod object;
pub mod ranking;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod time;
pub mod validation;
pub mod voting;

use thiserror::Error;

pub use crate::daemon::{DaemonClient, DaemonState};
pub use crate::object::{
    GovernanceObject, GovernanceRecord, ObjectType, Proposal, Superblock,
};
pub use crate::store::{MemStore, ObjectStore};
pub use crate::sync::{sync, SyncReport};
pub use crate::voting::{Outcome, Signal, Vote, VoteStatus};

/// Top level error of the governance agent
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Daemon error: {0}")]
    Daemon(#[from] daemon::Error),
    #[error("Storage error: {0}")]
    Store(#[from] store::Error),
    #[error("Decoding error: {0}")]
    Decode(#[from] codec::DecodeError),
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),
}

/// Result of a governance agent operation
pub type Result<T> = std::result::Result<T, Error>;
