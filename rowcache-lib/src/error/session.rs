//! Top-level error type

use super::SourceError;
use crate::source::TableId;

/// Errors returned by session-level operations.
///
/// Single-batch failures are not returned through this type: they are
/// recorded in the session's error slot and the batch stays pending.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A row source call failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The initial schema/total request failed. The session cannot render.
    #[error("Failed to open table {table}: {source}")]
    Bootstrap {
        /// The table that could not be opened.
        table: TableId,
        /// The underlying failure.
        #[source]
        source: SourceError,
    },

    /// The session was closed.
    #[error("Session closed")]
    Closed,

    /// A session was created outside a Tokio runtime.
    #[error("No Tokio runtime available to drive batch fetches")]
    NoRuntime,

    /// A bulk stream was superseded, aborted, or outlived its dataset.
    #[error("Stream aborted")]
    Aborted,

    /// The row stream reported an error or ended in an invalid state.
    #[error("Stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Returns `true` if this error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bootstrap { .. } | Self::Closed)
    }
}
