//! Command/response correlation over the device channel.
//!
//! This module provides:
//! - [`CommandToken`] — opaque handle identifying one in-flight command
//! - [`ResponseCode`] — the response taxonomy, owned here so new codes
//!   never touch controller logic
//! - [`CommandCorrelator`] — issues commands, broadcasts responses
//! - [`DeviceTransport`] — the seam to the byte-stream layer underneath
//!
//! Responses are multiplexed over a single channel: every subscriber
//! receives every `(token, code)` event and must discard events whose token
//! does not match its own outstanding token. Correlation by token is
//! mandatory, not optional — unrelated commands complete concurrently and
//! their responses interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use loquet_crypto_core::{DerivedKey, HashFunctionDescriptor, Salt};

use crate::error::DeviceError;

// ---------------------------------------------------------------------------
// Wire response codes
// ---------------------------------------------------------------------------

/// Raw code: command completed successfully.
pub const WIRE_OKAY: i32 = 0;

/// Raw code: the presented credential was rejected.
pub const WIRE_BAD_CREDENTIAL: i32 = 2;

/// Raw code: the physical confirmation window elapsed.
pub const WIRE_CONFIRMATION_TIMEOUT: i32 = 3;

/// Raw code: the physical confirmation wait was abandoned on request.
pub const WIRE_CONFIRMATION_CANCELED: i32 = 4;

/// Raw code: the device was unplugged mid-command.
pub const WIRE_DEVICE_DISCONNECTED: i32 = 5;

/// Raw code: the application is shutting down and abandoned the command.
pub const WIRE_APPLICATION_QUIT: i32 = 6;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of a device command.
///
/// Exactly one response is delivered per issued token, exactly once. Codes
/// this client does not recognize land in [`Self::Other`] and are treated as
/// a contract violation by the rotation controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// Command completed; any requested state change is committed on-device.
    Okay,
    /// The old credential presented with the command was wrong.
    BadCredential,
    /// The user did not press the device button in time.
    ConfirmationTimeout,
    /// The confirmation wait was canceled from the client side.
    ConfirmationCanceled,
    /// Device unplugged — fatal to the in-flight command.
    DeviceDisconnected,
    /// Application shutdown abandoned the command.
    ApplicationQuit,
    /// Any code outside the known taxonomy.
    Other(i32),
}

impl ResponseCode {
    /// Map a raw wire code onto the taxonomy.
    #[must_use]
    pub const fn from_wire(code: i32) -> Self {
        match code {
            WIRE_OKAY => Self::Okay,
            WIRE_BAD_CREDENTIAL => Self::BadCredential,
            WIRE_CONFIRMATION_TIMEOUT => Self::ConfirmationTimeout,
            WIRE_CONFIRMATION_CANCELED => Self::ConfirmationCanceled,
            WIRE_DEVICE_DISCONNECTED => Self::DeviceDisconnected,
            WIRE_APPLICATION_QUIT => Self::ApplicationQuit,
            other => Self::Other(other),
        }
    }
}

/// Opaque handle identifying one in-flight device command.
///
/// Valid from issuance until the matching response arrives or the command is
/// abandoned. "No command pending" is `Option::<CommandToken>::None` — there
/// is no sentinel value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandToken(u64);

impl CommandToken {
    /// The raw token value, for logging and diagnostics only.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// One correlated response, as broadcast to every subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseEvent {
    /// Token of the command this response completes.
    pub token: CommandToken,
    /// Decoded response code.
    pub code: ResponseCode,
}

/// A command submitted to the device.
///
/// Key material is carried by value: submission consumes the derived keys,
/// which are zeroized when the transport drops the command.
pub enum Command {
    /// Replace the master credential. The device verifies `old_key` before
    /// committing `new_key` with its descriptor and salt.
    RotateCredential {
        /// Key derived from the old password with the current parameters.
        old_key: DerivedKey,
        /// Key derived from the new password with the new parameters.
        new_key: DerivedKey,
        /// Descriptor to store alongside the new credential.
        descriptor: HashFunctionDescriptor,
        /// Salt to store alongside the new credential.
        salt: Salt,
    },
}

impl Command {
    /// Short command name for log lines. Never includes payload bytes.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RotateCredential { .. } => "rotate_credential",
        }
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// The byte-stream layer underneath the correlator (USB/serial framing is
/// out of scope here).
///
/// # Contract
///
/// For every accepted submission the transport must eventually cause exactly
/// one [`CommandCorrelator::deliver`] call with the same token — on device
/// completion, disconnect, or application shutdown.
pub trait DeviceTransport: Send + Sync {
    /// Frame and send a command to the device.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Transport`] if the command cannot be accepted
    /// (in which case no response will be delivered for `token`).
    fn submit(&self, token: CommandToken, command: Command) -> Result<(), DeviceError>;

    /// Ask the device to abandon a pending physical-confirmation wait. The
    /// abandoned command still completes with its own response.
    fn cancel_pending_confirmation(&self);
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

/// Issues commands to the device and fans responses out to all listeners.
///
/// Thread-safe; submission happens from the interactive thread, delivery is
/// invoked by the transport glue whenever a response frame arrives.
pub struct CommandCorrelator {
    transport: Arc<dyn DeviceTransport>,
    next_token: AtomicU64,
    listeners: Mutex<Vec<Sender<ResponseEvent>>>,
}

impl CommandCorrelator {
    /// Wrap a transport. Token numbering starts at 1.
    #[must_use]
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            next_token: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Submit a command and return its freshly issued token.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Transport`] if the transport refuses the
    /// command; no token is considered outstanding in that case.
    pub fn submit(&self, command: Command) -> Result<CommandToken, DeviceError> {
        let token = CommandToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(token = token.value(), kind = command.kind(), "submitting command");
        self.transport.submit(token, command)?;
        Ok(token)
    }

    /// Register a listener. The returned receiver sees every response event;
    /// the listener filters by its own outstanding token.
    pub fn subscribe(&self) -> Receiver<ResponseEvent> {
        let (tx, rx) = mpsc::channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Broadcast a raw response from the transport glue to every listener.
    /// Listeners whose receiver has been dropped are pruned here.
    pub fn deliver(&self, token: CommandToken, wire_code: i32) {
        let code = ResponseCode::from_wire(wire_code);
        tracing::debug!(token = token.value(), ?code, "delivering response");
        let event = ResponseEvent { token, code };
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|listener| listener.send(event).is_ok());
    }

    /// Forward a confirmation-wait cancellation to the device layer.
    pub fn cancel_pending_confirmation(&self) {
        tracing::debug!("canceling pending confirmation");
        self.transport.cancel_pending_confirmation();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
