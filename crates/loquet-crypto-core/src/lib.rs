//! `loquet-crypto-core` — Key-material primitives for LOQUET.
//!
//! This crate is the audit target: zero device I/O, zero threading, zero GUI
//! dependencies. It defines the hash-function descriptor the device stores,
//! the salt, the secure derived-key buffer, and the pluggable derivation
//! seam. Everything that talks to the device lives in `loquet-device`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod descriptor;

pub mod kdf;

pub use descriptor::{
    HashFunctionDescriptor, Salt, SecurityLevel, COST_BASE, DESCRIPTOR_VERSION, HASH_FN_SIZE,
    SALT_SIZE_V2,
};
pub use error::CryptoError;
pub use kdf::{Argon2Kdf, KeyDerivation};
pub use memory::DerivedKey;
