//! Error types for `loquet-crypto-core`.

use thiserror::Error;

/// Errors produced by key-material operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (parameter validation, memory allocation).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Hash-function descriptor is malformed or from a newer format.
    #[error("invalid hash-function descriptor: {0}")]
    InvalidDescriptor(String),

    /// Salt bytes have the wrong length.
    #[error("invalid salt: {0}")]
    InvalidSalt(String),

    /// Secure memory allocation or CSPRNG failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}
