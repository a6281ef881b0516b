//! Secure memory for derived key material.
//!
//! [`DerivedKey`] is the only form in which key bytes leave the KDF:
//! - Zeroed on drop via [`secrecy`]'s built-in `Zeroize`
//! - Locked in RAM via `mlock` to prevent swap (soft fallback)
//! - Masked in `Debug`/`Display` so keys never reach a log line

use secrecy::{ExposeSecret, SecretSlice};
use std::fmt;

// ---------------------------------------------------------------------------
// Memory locking
// ---------------------------------------------------------------------------

/// RAII guard that unlocks a memory region on drop.
pub(crate) struct LockedRegion {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: the pointer is only handed to mlock/munlock system calls, which
// are thread-safe. The pointed-to data is owned by DerivedKey and never
// accessed through LockedRegion.
unsafe impl Send for LockedRegion {}
unsafe impl Sync for LockedRegion {}

impl LockedRegion {
    /// Attempt to lock a region. If `mlock` is unavailable or over quota the
    /// region stays unlocked and a warning is emitted once per process.
    pub(crate) fn try_lock(ptr: *const u8, len: usize) -> Self {
        let locked = platform::try_mlock(ptr, len);
        if !locked && len > 0 {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| {
                eprintln!(
                    "[loquet-crypto-core] WARNING: mlock failed — \
                     key material may be swapped to disk. \
                     Consider increasing RLIMIT_MEMLOCK."
                );
            });
        }
        Self { ptr, len, locked }
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        if self.locked {
            platform::try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// DerivedKey
// ---------------------------------------------------------------------------

/// Output of a key derivation — owned by the requester until consumed by a
/// device command submission, then dropped (and thereby zeroed).
///
/// Never serialized, never persisted, never printed.
pub struct DerivedKey {
    inner: SecretSlice<u8>,
    _lock: LockedRegion,
}

impl DerivedKey {
    /// Take ownership of freshly derived bytes.
    ///
    /// The source vector is moved in, so no unzeroed copy remains with the
    /// caller. The backing allocation is `mlock`'d best-effort.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        let inner: SecretSlice<u8> = bytes.into();
        let exposed = inner.expose_secret();
        let lock = LockedRegion::try_lock(exposed.as_ptr(), exposed.len());
        Self { inner, _lock: lock }
    }

    /// Expose the raw key bytes for a cryptographic operation or command
    /// payload. Keep the borrow short-lived.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Number of key bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// `true` if the key holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(***)")
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(***)")
    }
}

// ---------------------------------------------------------------------------
// Platform-specific implementations
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod platform {
    pub(super) fn try_mlock(ptr: *const u8, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        // SAFETY: mlock accepts any valid pointer/length pair; failure is
        // reported via the return code and handled by the caller.
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn try_munlock(ptr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        // SAFETY: munlock is safe to call; failure is non-critical.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }
}

#[cfg(not(unix))]
mod platform {
    pub(super) fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn try_munlock(_ptr: *const u8, _len: usize) {}
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stores_correct_content() {
        let key = DerivedKey::new(vec![0xAB; 32]);
        assert_eq!(key.expose(), &[0xAB; 32]);
        assert_eq!(key.len(), 32);
        assert!(!key.is_empty());
    }

    #[test]
    fn debug_is_masked() {
        let key = DerivedKey::new(vec![0xFF; 8]);
        let debug = format!("{key:?}");
        assert_eq!(debug, "DerivedKey(***)");
        assert!(!debug.contains("255"));
    }

    #[test]
    fn display_is_masked() {
        let key = DerivedKey::new(b"super secret".to_vec());
        assert_eq!(format!("{key}"), "DerivedKey(***)");
    }

    #[test]
    fn debug_is_identical_regardless_of_content() {
        let a = format!("{:?}", DerivedKey::new(vec![0xDE; 64]));
        let b = format!("{:?}", DerivedKey::new(vec![0x13; 4]));
        assert_eq!(a, b);
    }
}
