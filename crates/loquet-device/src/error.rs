//! Error types for `loquet-device`.
//!
//! Flow-level outcomes (credential rejected, confirmation abandoned,
//! connectivity loss, protocol violations) are reported through
//! [`crate::rotation::FailureReason`], not as `Err` values — they are states
//! of the rotation machine. `DeviceError` covers operations that fail at the
//! call site.

use loquet_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by device protocol operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Key-material operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// New password and its repeat do not match. Purely local validation —
    /// no device contact is made and no state changes.
    #[error("new passwords don't match")]
    PasswordMismatch,

    /// A rotation flow is already active (or has finished) on this
    /// controller. One controller instance serves one attempt.
    #[error("rotation flow is not idle")]
    Busy,

    /// Key-derivation worker used out of sequence (start without configure,
    /// re-configure while a derivation is in flight, worker panic).
    #[error("derivation worker misuse: {0}")]
    WorkerState(String),

    /// The transport refused or failed to accept a command submission.
    #[error("transport error: {0}")]
    Transport(String),

    /// A stored record block could not be decoded.
    #[error("record format error: {0}")]
    RecordFormat(String),
}
