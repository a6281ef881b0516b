//! Pluggable password-based key derivation.
//!
//! This module provides:
//! - [`KeyDerivation`] — the seam through which all derivation runs; the
//!   descriptor selects the function, the core never hard-codes one
//! - [`Argon2Kdf`] — the default engine, delegating to the `argon2` crate
//!
//! The descriptor's cost byte is the single source of truth for derivation
//! cost: the engine maps it onto Argon2id memory cost, it is never
//! reinterpreted or clamped, and the byte itself is what the device stores.

use crate::descriptor::{HashFunctionDescriptor, Salt, ALGORITHM_ID};
use crate::error::CryptoError;
use crate::memory::DerivedKey;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default memory cost in KiB at security level 1. Doubles per level:
/// level 1 → 4 MiB, level 8 → 512 MiB.
const DEFAULT_BASE_M_COST: u32 = 4096;

/// Default iteration count.
const DEFAULT_T_COST: u32 = 3;

/// Default parallelism. Kept at 1 so a derivation's wall time depends only
/// on the descriptor, not on the host's core count.
const DEFAULT_P_COST: u32 = 1;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A password-based key derivation function selected by a descriptor.
///
/// Implementations must be pure: same inputs, same key, no side effects and
/// no persisted intermediate state. `Send + Sync` because derivation runs on
/// a background worker thread.
pub trait KeyDerivation: Send + Sync {
    /// Derive `output_len` key bytes from a password, descriptor, and salt.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidDescriptor`] if the descriptor selects
    /// parameters this function cannot honor, or
    /// [`CryptoError::KeyDerivation`] if the derivation itself fails.
    fn derive(
        &self,
        password: &[u8],
        descriptor: &HashFunctionDescriptor,
        salt: &Salt,
        output_len: usize,
    ) -> Result<DerivedKey, CryptoError>;
}

// ---------------------------------------------------------------------------
// Argon2id engine
// ---------------------------------------------------------------------------

/// Default derivation engine backed by Argon2id.
///
/// The descriptor's security level scales memory cost by doubling from
/// `base_m_cost`; iterations and parallelism are fixed per engine instance.
/// Tests construct the engine with a tiny base to keep derivations fast.
#[derive(Clone, Copy, Debug)]
pub struct Argon2Kdf {
    base_m_cost: u32,
    t_cost: u32,
    p_cost: u32,
}

impl Argon2Kdf {
    /// Engine with production cost parameters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_m_cost: DEFAULT_BASE_M_COST,
            t_cost: DEFAULT_T_COST,
            p_cost: DEFAULT_P_COST,
        }
    }

    /// Engine with a custom memory base (KiB at level 1) and a single
    /// iteration. For tests and calibration probes, not production use.
    #[must_use]
    pub const fn with_base_m_cost(base_m_cost: u32) -> Self {
        Self {
            base_m_cost,
            t_cost: 1,
            p_cost: DEFAULT_P_COST,
        }
    }

    /// Memory cost in KiB for the given descriptor.
    fn m_cost_for(&self, descriptor: &HashFunctionDescriptor) -> Result<u32, CryptoError> {
        let level = descriptor.security_level().ok_or_else(|| {
            CryptoError::InvalidDescriptor(format!(
                "cost byte {} outside the selectable window",
                descriptor.cost()
            ))
        })?;
        let shift = u32::from(level.get()).saturating_sub(1);
        self.base_m_cost.checked_shl(shift).ok_or_else(|| {
            CryptoError::KeyDerivation(format!(
                "memory cost overflow at security level {}",
                level.get()
            ))
        })
    }
}

impl Default for Argon2Kdf {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDerivation for Argon2Kdf {
    fn derive(
        &self,
        password: &[u8],
        descriptor: &HashFunctionDescriptor,
        salt: &Salt,
        output_len: usize,
    ) -> Result<DerivedKey, CryptoError> {
        if output_len == 0 {
            return Err(CryptoError::KeyDerivation(
                "requested output length is zero".into(),
            ));
        }
        if descriptor.algorithm() != ALGORITHM_ID {
            return Err(CryptoError::InvalidDescriptor(format!(
                "unsupported algorithm id {}",
                descriptor.algorithm()
            )));
        }

        let m_cost = self.m_cost_for(descriptor)?;
        let params = argon2::Params::new(m_cost, self.t_cost, self.p_cost, Some(output_len))
            .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;
        let argon2 = argon2::Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        );

        let mut output = vec![0u8; output_len];
        argon2
            .hash_password_into(password, salt.as_bytes(), &mut output)
            .map_err(|e| CryptoError::KeyDerivation(format!("argon2id derivation failed: {e}")))?;

        // The vector is moved into the key, so no unzeroed copy remains.
        Ok(DerivedKey::new(output))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
