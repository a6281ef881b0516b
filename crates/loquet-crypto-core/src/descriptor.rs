//! Hash-function descriptor and salt types.
//!
//! This module provides:
//! - [`HashFunctionDescriptor`] — the 5-byte derivation parameter block the
//!   device stores and interprets literally
//! - [`SecurityLevel`] — the validated 1–8 cost selector
//! - [`Salt`] — fixed-length random salt, fresh per rotation
//!
//! # Descriptor Layout
//!
//! ```text
//! [ version | cost | algorithm | reserved | reserved ]
//! ```
//!
//! - **version**: format version tag, currently 1
//! - **cost**: `COST_BASE + level` — the firmware reads this byte literally,
//!   so the mapping must never drift
//! - **algorithm**: KDF algorithm id
//! - **reserved**: two bytes fixed by the firmware contract

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Descriptor size in bytes.
pub const HASH_FN_SIZE: usize = 5;

/// Salt size in bytes (format v2).
pub const SALT_SIZE_V2: usize = 16;

/// Current descriptor format version.
pub const DESCRIPTOR_VERSION: u8 = 1;

/// Fixed offset added to the security level to produce the cost byte.
pub const COST_BASE: u8 = 11;

/// KDF algorithm id stored in byte 2.
pub const ALGORITHM_ID: u8 = 8;

/// Values of the two trailing reserved bytes.
const RESERVED: [u8; 2] = [0, 1];

/// Lowest selectable security level.
const LEVEL_MIN: u8 = 1;

/// Highest selectable security level.
const LEVEL_MAX: u8 = 8;

// ---------------------------------------------------------------------------
// SecurityLevel
// ---------------------------------------------------------------------------

/// Derivation cost selector in the range 1–8.
///
/// Higher levels roughly double derivation time per step. Level 4 is the
/// recommended default (1–2 s unlock on typical hardware).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SecurityLevel(u8);

impl SecurityLevel {
    /// Recommended default level.
    pub const DEFAULT: Self = Self(4);

    /// Validate a raw level value.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidDescriptor`] if `level` is outside 1–8.
    pub fn new(level: u8) -> Result<Self, CryptoError> {
        if (LEVEL_MIN..=LEVEL_MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(CryptoError::InvalidDescriptor(format!(
                "security level {level} outside {LEVEL_MIN}-{LEVEL_MAX}"
            )))
        }
    }

    /// The raw level value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = CryptoError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<SecurityLevel> for u8 {
    fn from(level: SecurityLevel) -> Self {
        level.0
    }
}

// ---------------------------------------------------------------------------
// HashFunctionDescriptor
// ---------------------------------------------------------------------------

/// Fixed-size derivation parameter block, immutable once constructed.
///
/// The device compares and stores descriptors as opaque bytes; only the
/// fields named in the layout above carry meaning to this client.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HashFunctionDescriptor([u8; HASH_FN_SIZE]);

impl HashFunctionDescriptor {
    /// Build the descriptor for a security level.
    ///
    /// Level `L` maps to cost byte `COST_BASE + L` — e.g. level 4 produces
    /// `[1, 15, 8, 0, 1]`.
    #[must_use]
    pub fn for_security_level(level: SecurityLevel) -> Self {
        Self([
            DESCRIPTOR_VERSION,
            COST_BASE.saturating_add(level.get()),
            ALGORITHM_ID,
            RESERVED[0],
            RESERVED[1],
        ])
    }

    /// Parse a descriptor from stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidDescriptor`] if the length is wrong or
    /// the version tag is newer than this client understands.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; HASH_FN_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidDescriptor(format!(
                "descriptor is {} bytes (expected {HASH_FN_SIZE})",
                bytes.len()
            ))
        })?;
        if arr[0] > DESCRIPTOR_VERSION {
            return Err(CryptoError::InvalidDescriptor(format!(
                "descriptor version {} is newer than supported version {DESCRIPTOR_VERSION}",
                arr[0]
            )));
        }
        Ok(Self(arr))
    }

    /// Format version tag.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.0[0]
    }

    /// Raw cost byte, as the firmware will interpret it.
    #[must_use]
    pub const fn cost(&self) -> u8 {
        self.0[1]
    }

    /// KDF algorithm id.
    #[must_use]
    pub const fn algorithm(&self) -> u8 {
        self.0[2]
    }

    /// Recover the security level from the cost byte, if it falls inside
    /// the selectable window.
    #[must_use]
    pub fn security_level(&self) -> Option<SecurityLevel> {
        self.cost()
            .checked_sub(COST_BASE)
            .and_then(|level| SecurityLevel::new(level).ok())
    }

    /// The raw descriptor bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_FN_SIZE] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Salt
// ---------------------------------------------------------------------------

/// Fixed-length random salt. Generated fresh for every rotation attempt and
/// never reused; only persisted once the rotation commits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE_V2]);

impl Salt {
    /// Generate a fresh salt from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_SIZE_V2];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Reconstruct a salt from stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSalt`] if the length is not
    /// [`SALT_SIZE_V2`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SALT_SIZE_V2] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSalt(format!(
                "salt is {} bytes (expected {SALT_SIZE_V2})",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// The raw salt bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SALT_SIZE_V2] {
        &self.0
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Salts are not secret, but keeping them out of logs avoids
        // correlating rotation attempts across log lines.
        f.write_str("Salt(..)")
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_4_descriptor_bytes() {
        let desc = HashFunctionDescriptor::for_security_level(SecurityLevel::DEFAULT);
        assert_eq!(desc.as_bytes(), &[1, 15, 8, 0, 1]);
    }

    #[test]
    fn cost_byte_is_base_plus_level() {
        for level in 1..=8u8 {
            let desc = HashFunctionDescriptor::for_security_level(
                SecurityLevel::new(level).expect("level should be valid"),
            );
            assert_eq!(desc.cost(), 11 + level);
            assert_eq!(desc.security_level().map(SecurityLevel::get), Some(level));
        }
    }

    #[test]
    fn security_level_rejects_out_of_range() {
        assert!(SecurityLevel::new(0).is_err());
        assert!(SecurityLevel::new(9).is_err());
        assert!(SecurityLevel::new(255).is_err());
    }

    #[test]
    fn from_bytes_roundtrip() {
        let desc = HashFunctionDescriptor::for_security_level(SecurityLevel::DEFAULT);
        let parsed =
            HashFunctionDescriptor::from_bytes(desc.as_bytes()).expect("parse should succeed");
        assert_eq!(parsed, desc);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = HashFunctionDescriptor::from_bytes(&[1, 15, 8, 0])
            .expect_err("short descriptor should be rejected");
        assert!(format!("{err}").contains("4 bytes"));
    }

    #[test]
    fn from_bytes_rejects_future_version() {
        let err = HashFunctionDescriptor::from_bytes(&[2, 15, 8, 0, 1])
            .expect_err("future version should be rejected");
        assert!(format!("{err}").contains("newer than supported"));
    }

    #[test]
    fn security_level_none_for_foreign_cost_byte() {
        let desc = HashFunctionDescriptor::from_bytes(&[1, 42, 8, 0, 1])
            .expect("parse should succeed");
        assert_eq!(desc.security_level(), None);
    }

    #[test]
    fn salt_has_fixed_length() {
        assert_eq!(Salt::generate().as_bytes().len(), SALT_SIZE_V2);
    }

    #[test]
    fn salts_are_unique() {
        let a = Salt::generate();
        let b = Salt::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn salt_from_bytes_rejects_wrong_length() {
        assert!(Salt::from_bytes(&[0u8; 15]).is_err());
        assert!(Salt::from_bytes(&[0u8; 17]).is_err());
        assert!(Salt::from_bytes(&[0u8; 16]).is_ok());
    }

    #[test]
    fn salt_debug_is_opaque() {
        assert_eq!(format!("{:?}", Salt::generate()), "Salt(..)");
    }

    #[test]
    fn security_level_serde_roundtrip() {
        let level = SecurityLevel::new(6).expect("level should be valid");
        let json = serde_json::to_string(&level).expect("serialize should succeed");
        assert_eq!(json, "6");
        let back: SecurityLevel =
            serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(back, level);
    }

    #[test]
    fn security_level_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<SecurityLevel>("0").is_err());
        assert!(serde_json::from_str::<SecurityLevel>("9").is_err());
    }
}
