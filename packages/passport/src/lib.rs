#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Exposure scoring and the per-user passport ledger.
//!
//! [`scoring`] turns pollutant readings into a score, risk tier, and tips —
//! a pure function with no state. [`ledger`] applies scored events to the
//! durable per-user passport (points, streaks, history) inside a single
//! SQLite transaction per log, so streak and points can never diverge from
//! the recorded event history.

mod db;
pub mod ledger;
pub mod scoring;

pub use ledger::{ExposureLog, PassportLedger};

/// Errors from the passport ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Underlying SQLite failure.
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Tips column (de)serialization failed.
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error while opening the database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Read-side request for a user that has never logged or been ensured.
    #[error("no profile exists for user {user_key}")]
    UnknownUser {
        /// The unknown user key.
        user_key: String,
    },

    /// Two concurrent writes collided twice in a row. Transient; the
    /// caller may resubmit.
    #[error("concurrent passport update conflict, retry the request")]
    Conflict,

    /// A stored row failed to parse back into its model type.
    #[error("corrupt ledger row: {message}")]
    Corrupt {
        /// Description of the unparseable column.
        message: String,
    },
}
