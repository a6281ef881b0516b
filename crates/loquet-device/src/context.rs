//! Process-wide derivation parameter state.
//!
//! The "current" hash-function descriptor and salt describe how the master
//! credential on the device was derived. A rotation reads them once when it
//! starts (to re-derive the old key) and writes them exactly once, only
//! after the device reports the rotation committed. No other writer runs
//! concurrently — the single-flight rotation invariant.

use std::sync::{Mutex, PoisonError};

use loquet_crypto_core::{HashFunctionDescriptor, Salt};

/// What the rotation core needs from the surrounding application.
pub trait ApplicationContext: Send + Sync {
    /// Descriptor the current master credential was derived with.
    fn current_descriptor(&self) -> HashFunctionDescriptor;

    /// Salt the current master credential was derived with.
    fn current_salt(&self) -> Salt;

    /// Key length in bytes the device expects.
    fn derived_key_length(&self) -> usize;

    /// Record a new descriptor after a committed rotation.
    fn set_current_descriptor(&self, descriptor: HashFunctionDescriptor);

    /// Record a new salt after a committed rotation.
    fn set_current_salt(&self, salt: Salt);
}

struct ContextState {
    descriptor: HashFunctionDescriptor,
    salt: Salt,
}

/// In-process [`ApplicationContext`] shared between the rotation core and
/// the application shell.
pub struct SharedContext {
    state: Mutex<ContextState>,
    key_length: usize,
}

impl SharedContext {
    /// Context seeded with the parameters read from the device at login.
    #[must_use]
    pub fn new(descriptor: HashFunctionDescriptor, salt: Salt, key_length: usize) -> Self {
        Self {
            state: Mutex::new(ContextState { descriptor, salt }),
            key_length,
        }
    }
}

impl ApplicationContext for SharedContext {
    fn current_descriptor(&self) -> HashFunctionDescriptor {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .descriptor
    }

    fn current_salt(&self) -> Salt {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .salt
    }

    fn derived_key_length(&self) -> usize {
        self.key_length
    }

    fn set_current_descriptor(&self, descriptor: HashFunctionDescriptor) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .descriptor = descriptor;
    }

    fn set_current_salt(&self, salt: Salt) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).salt = salt;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use loquet_crypto_core::SecurityLevel;

    fn context() -> SharedContext {
        SharedContext::new(
            HashFunctionDescriptor::for_security_level(SecurityLevel::DEFAULT),
            Salt::from_bytes(&[3u8; 16]).expect("salt should be valid"),
            32,
        )
    }

    #[test]
    fn reads_return_seeded_values() {
        let ctx = context();
        assert_eq!(ctx.current_descriptor().as_bytes(), &[1, 15, 8, 0, 1]);
        assert_eq!(ctx.current_salt().as_bytes(), &[3u8; 16]);
        assert_eq!(ctx.derived_key_length(), 32);
    }

    #[test]
    fn writes_replace_descriptor_and_salt() {
        let ctx = context();
        let new_desc = HashFunctionDescriptor::for_security_level(
            SecurityLevel::new(8).expect("level should be valid"),
        );
        let new_salt = Salt::generate();

        ctx.set_current_descriptor(new_desc);
        ctx.set_current_salt(new_salt);

        assert_eq!(ctx.current_descriptor(), new_desc);
        assert_eq!(ctx.current_salt(), new_salt);
    }
}
