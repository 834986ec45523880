//! Streaks, badges and the leaderboard.
//!
//! Everything in here is storage-agnostic: the streak engine talks to a
//! [`streak::StreakStore`], and the leaderboard takes its display names from
//! whatever resolver the caller hands it.

pub mod badge;
pub mod leaderboard;
pub mod streak;

use thiserror::Error;

pub use badge::{BadgeTier, classify};
pub use leaderboard::{derive_leaderboard, PLACEHOLDER_NAME};
pub use streak::{current_streak, record_activity, StreakStore};

#[derive(Error, Debug)]
pub enum GamifyError {
    /// Reading from or writing to the record store failed. The stored record
    /// is left as it was before the call.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Could not resolve a display name for {0}")]
    NameResolutionFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for GamifyError {
    fn from(err: rusqlite::Error) -> Self {
        GamifyError::StorageFailure(err.to_string())
    }
}

pub type GamifyResult<T> = Result<T, GamifyError>;
