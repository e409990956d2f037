//! Crate error type.
//!
//! Only genuinely recoverable failures surface here. Programmer errors
//! (subscribing to a lifecycle stage that is not in the configured stage
//! list) panic immediately instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Host-object construction failed (unknown kind or bad constructor
    /// args). The adapter surfaces this per node rather than aborting the
    /// whole tree.
    #[error("failed to construct host object `{kind}`: {reason}")]
    Construction { kind: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
