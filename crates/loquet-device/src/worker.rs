//! Background key-derivation worker.
//!
//! Derivation is the only work that runs off the interactive thread: a cost
//! level of 8 can take a minute, and the UI must stay responsive (if
//! disabled) while it runs. One worker instance serves a whole rotation —
//! configure, start, collect, then configure again for the next key.
//!
//! Cancellation is deliberately unsupported: the UI is disabled during
//! derivation, and teardown joins the in-flight thread rather than killing
//! it, so partial key material is never left referenced.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use loquet_crypto_core::{CryptoError, DerivedKey, HashFunctionDescriptor, KeyDerivation, Salt};
use zeroize::Zeroizing;

use crate::error::DeviceError;

/// Completion signal sent to the owner when a derivation finishes.
///
/// Carries no key material — the owner collects the key with
/// [`KeyDerivationWorker::take_key`] on its own thread.
#[derive(Debug)]
pub struct DerivationDone;

/// Parameters for one derivation run.
pub struct DeriveRequest {
    /// Password bytes; zeroized when the request is consumed.
    pub password: Zeroizing<Vec<u8>>,
    /// Hash-function descriptor selecting the derivation parameters.
    pub descriptor: HashFunctionDescriptor,
    /// Salt for this derivation.
    pub salt: Salt,
    /// Requested key length in bytes.
    pub output_len: usize,
}

/// Runs password-based key derivation on a background thread.
///
/// Strictly sequential use: `configure` then `start`, wait for the
/// [`DerivationDone`] signal, then `take_key` — and only then configure the
/// next run. Misuse is reported as [`DeviceError::WorkerState`].
pub struct KeyDerivationWorker {
    kdf: Arc<dyn KeyDerivation>,
    request: Option<DeriveRequest>,
    handle: Option<JoinHandle<Result<DerivedKey, CryptoError>>>,
}

impl KeyDerivationWorker {
    /// A worker deriving through the given function.
    #[must_use]
    pub fn new(kdf: Arc<dyn KeyDerivation>) -> Self {
        Self {
            kdf,
            request: None,
            handle: None,
        }
    }

    /// Stage the parameters for the next derivation.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::WorkerState`] if a derivation is still in
    /// flight or its key has not been collected yet.
    pub fn configure(&mut self, request: DeriveRequest) -> Result<(), DeviceError> {
        if self.handle.is_some() {
            return Err(DeviceError::WorkerState(
                "cannot re-configure while a derivation is outstanding".into(),
            ));
        }
        self.request = Some(request);
        Ok(())
    }

    /// Spawn the derivation thread. Completion is signaled by sending
    /// [`DerivationDone`] on `done`; the signal is sent even if the
    /// derivation failed (the failure surfaces from [`Self::take_key`]).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::WorkerState`] if no request is staged or a
    /// derivation is already in flight.
    pub fn start(&mut self, done: Sender<DerivationDone>) -> Result<(), DeviceError> {
        if self.handle.is_some() {
            return Err(DeviceError::WorkerState(
                "a derivation is already in flight".into(),
            ));
        }
        let request = self.request.take().ok_or_else(|| {
            DeviceError::WorkerState("start called without a configured request".into())
        })?;

        let kdf = Arc::clone(&self.kdf);
        let handle = std::thread::spawn(move || {
            let result = kdf.derive(
                &request.password,
                &request.descriptor,
                &request.salt,
                request.output_len,
            );
            // Password zeroized here when the request drops.
            drop(request);
            // The owner may have gone away during a long derivation;
            // the key is then discarded by the join in Drop.
            let _ = done.send(DerivationDone);
            result
        });
        self.handle = Some(handle);
        tracing::debug!("derivation started");
        Ok(())
    }

    /// `true` between `start` and `take_key`.
    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        self.handle.is_some()
    }

    /// Collect the derived key. Joins the worker thread; call after the
    /// [`DerivationDone`] signal to avoid blocking.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::WorkerState`] if no derivation is outstanding
    /// or the worker thread panicked, and propagates derivation failures as
    /// [`DeviceError::Crypto`].
    pub fn take_key(&mut self) -> Result<DerivedKey, DeviceError> {
        let handle = self.handle.take().ok_or_else(|| {
            DeviceError::WorkerState("no outstanding derivation to collect".into())
        })?;
        let result = handle
            .join()
            .map_err(|_| DeviceError::WorkerState("derivation worker panicked".into()))?;
        Ok(result?)
    }

    /// Block until any in-flight derivation finishes, discarding its key.
    /// Used on teardown; derivations are never killed mid-run.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for KeyDerivationWorker {
    fn drop(&mut self) {
        self.join();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
