//! Error taxonomy shared by the parameter object and both estimation engines.

use thiserror::Error;

/// Errors reported by this crate.
///
/// Every variant is a contract violation detected synchronously before any
/// computation proceeds; nothing is retried and nothing is partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A schedule parameter violates one of the construction invariants.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation received an out-of-domain argument.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The probability series cannot reach its convergence threshold, either
    /// because detection is impossible for the given parameters or because
    /// the iteration bound was exceeded.
    #[error("no convergence: {0}")]
    NoConvergence(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    pub(crate) fn query(msg: impl Into<String>) -> Self {
        Error::InvalidQuery(msg.into())
    }
}
