//! Master-credential rotation.
//!
//! This module orchestrates the end-to-end credential change:
//! derive old key → derive new key → submit rotation command → await the
//! physical confirmation → await the device result → commit or roll back.
//!
//! The controller is event-driven, like the rest of the interactive layer:
//! the owner forwards [`DerivationDone`] signals to [`on_key_ready`] and
//! correlator [`ResponseEvent`]s to [`on_response`]. Nothing here blocks
//! the interactive thread.
//!
//! [`on_key_ready`]: CredentialRotationController::on_key_ready
//! [`on_response`]: CredentialRotationController::on_response

use std::sync::mpsc::Sender;
use std::sync::Arc;

use loquet_crypto_core::{
    DerivedKey, HashFunctionDescriptor, KeyDerivation, Salt, SecurityLevel,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::confirmation::{ConfirmationGate, GateOutcome};
use crate::context::ApplicationContext;
use crate::correlator::{Command, CommandCorrelator, CommandToken, ResponseCode, ResponseEvent};
use crate::error::DeviceError;
use crate::worker::{DerivationDone, DeriveRequest, KeyDerivationWorker};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Why a rotation attempt did not commit.
///
/// `CredentialRejected` and `ConfirmationAbandoned` are recoverable — the
/// controller returns to `Idle` and the user may retry. The remaining
/// reasons are fatal to the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum FailureReason {
    /// The device rejected the old credential.
    CredentialRejected,
    /// The confirmation wait timed out or was canceled.
    ConfirmationAbandoned,
    /// The device was unplugged mid-flow.
    Disconnected,
    /// The application is shutting down.
    ApplicationQuit,
    /// The device answered with a code outside the agreed taxonomy —
    /// a contract violation, surfaced upward and never retried.
    Protocol {
        /// The unrecognized raw wire code.
        code: i32,
    },
}

/// Rotation lifecycle phase. Strictly sequential; at most one of the four
/// in-flight phases is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotationState {
    /// No attempt in progress; inputs enabled.
    Idle,
    /// Deriving the key for the *old* password with the current parameters.
    DerivingOldKey,
    /// Deriving the key for the *new* password with the fresh parameters.
    DerivingNewKey,
    /// Command submitted; waiting for the device button.
    AwaitingConfirmation,
    /// Button pressed; waiting for the device's verdict.
    AwaitingResult,
    /// New descriptor and salt persisted; terminal.
    Committed,
    /// Flow aborted; terminal.
    Failed(FailureReason),
}

/// Lifecycle events emitted toward the presentation layer.
///
/// `Started` marks the moment inputs must be disabled; `InputsEnabled`
/// marks when they may be re-enabled. The controller itself never touches
/// a widget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RotationNotice {
    /// Attempt accepted; inputs are now considered disabled.
    Started,
    /// Old-password derivation is running.
    DerivingOldKey,
    /// New-password derivation is running.
    DerivingNewKey,
    /// Command submitted; press the device button.
    AwaitingConfirmation,
    /// The attempt committed; the new parameters are persisted.
    Succeeded,
    /// The attempt ended without committing.
    Failed {
        /// Why the attempt ended.
        reason: FailureReason,
    },
    /// Inputs may be re-enabled.
    InputsEnabled,
}

/// User input for one rotation attempt.
pub struct RotationRequest {
    /// The current master password.
    pub old_password: Zeroizing<Vec<u8>>,
    /// The replacement master password.
    pub new_password: Zeroizing<Vec<u8>>,
    /// Repeat entry of the replacement password.
    pub new_password_repeat: Zeroizing<Vec<u8>>,
    /// Cost selector for the new credential.
    pub security_level: SecurityLevel,
}

/// Parameters generated for the attempt in flight, discarded wholesale if
/// the attempt does not commit.
struct PendingAttempt {
    new_password: Option<Zeroizing<Vec<u8>>>,
    descriptor: HashFunctionDescriptor,
    salt: Salt,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives one master-credential rotation attempt.
///
/// One controller instance serves one attempt; concurrent rotations are a
/// contract violation and [`begin`] refuses them.
///
/// [`begin`]: Self::begin
pub struct CredentialRotationController {
    state: RotationState,
    correlator: Arc<CommandCorrelator>,
    context: Arc<dyn ApplicationContext>,
    worker: KeyDerivationWorker,
    derivation_done: Sender<DerivationDone>,
    gate: ConfirmationGate,
    token: Option<CommandToken>,
    old_key: Option<DerivedKey>,
    pending: Option<PendingAttempt>,
    notices: Sender<RotationNotice>,
}

impl CredentialRotationController {
    /// A controller wired to its collaborators.
    ///
    /// The owner keeps the receiving ends of `notices` and
    /// `derivation_done`; on each [`DerivationDone`] it calls
    /// [`Self::on_key_ready`], and it forwards every subscribed
    /// [`ResponseEvent`] to [`Self::on_response`].
    #[must_use]
    pub fn new(
        correlator: Arc<CommandCorrelator>,
        context: Arc<dyn ApplicationContext>,
        kdf: Arc<dyn KeyDerivation>,
        notices: Sender<RotationNotice>,
        derivation_done: Sender<DerivationDone>,
    ) -> Self {
        Self {
            state: RotationState::Idle,
            correlator,
            context,
            worker: KeyDerivationWorker::new(kdf),
            derivation_done,
            gate: ConfirmationGate::new(),
            token: None,
            old_key: None,
            pending: None,
            notices,
        }
    }

    /// Current phase of the attempt.
    #[must_use]
    pub const fn state(&self) -> RotationState {
        self.state
    }

    /// Token of the in-flight command, if one is outstanding.
    #[must_use]
    pub const fn outstanding_token(&self) -> Option<CommandToken> {
        self.token
    }

    /// The confirmation gate, for presentation-layer inspection.
    #[must_use]
    pub const fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    /// Start a rotation attempt.
    ///
    /// Generates a fresh salt and descriptor for the new credential and
    /// kicks off the old-key derivation with the *current* parameters.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::PasswordMismatch`] if the new password and its
    ///   repeat differ — no device contact is made and the state is
    ///   unchanged.
    /// - [`DeviceError::Busy`] if the controller is not `Idle`.
    pub fn begin(&mut self, request: RotationRequest) -> Result<(), DeviceError> {
        if self.state != RotationState::Idle {
            return Err(DeviceError::Busy);
        }
        if request.new_password.as_slice() != request.new_password_repeat.as_slice() {
            return Err(DeviceError::PasswordMismatch);
        }

        let salt = Salt::generate();
        let descriptor = HashFunctionDescriptor::for_security_level(request.security_level);

        self.worker.configure(DeriveRequest {
            password: request.old_password,
            descriptor: self.context.current_descriptor(),
            salt: self.context.current_salt(),
            output_len: self.context.derived_key_length(),
        })?;
        self.worker.start(self.derivation_done.clone())?;

        self.pending = Some(PendingAttempt {
            new_password: Some(request.new_password),
            descriptor,
            salt,
        });
        self.gate = ConfirmationGate::new();
        self.state = RotationState::DerivingOldKey;
        self.emit(RotationNotice::Started);
        self.emit(RotationNotice::DerivingOldKey);
        tracing::info!(
            level = request.security_level.get(),
            "rotation started, deriving old key"
        );
        Ok(())
    }

    /// Advance after a [`DerivationDone`] signal.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::WorkerState`] if no derivation was expected in
    /// the current state (a programming error, not a runtime condition),
    /// and propagates worker collection failures.
    pub fn on_key_ready(&mut self) -> Result<(), DeviceError> {
        match self.state {
            RotationState::DerivingOldKey => {
                self.old_key = Some(self.worker.take_key()?);
                let pending = self.pending.as_mut().ok_or_else(|| {
                    DeviceError::WorkerState("no pending attempt while deriving".into())
                })?;
                let new_password = pending.new_password.take().ok_or_else(|| {
                    DeviceError::WorkerState("new password already consumed".into())
                })?;
                let descriptor = pending.descriptor;
                let salt = pending.salt;

                self.worker.configure(DeriveRequest {
                    password: new_password,
                    descriptor,
                    salt,
                    output_len: self.context.derived_key_length(),
                })?;
                self.worker.start(self.derivation_done.clone())?;
                self.state = RotationState::DerivingNewKey;
                self.emit(RotationNotice::DerivingNewKey);
                tracing::info!("old key ready, deriving new key");
                Ok(())
            }
            RotationState::DerivingNewKey => {
                let new_key = self.worker.take_key()?;
                let old_key = self.old_key.take().ok_or_else(|| {
                    DeviceError::WorkerState("old key missing at submission".into())
                })?;
                let pending = self.pending.as_ref().ok_or_else(|| {
                    DeviceError::WorkerState("no pending attempt at submission".into())
                })?;

                let token = self.correlator.submit(Command::RotateCredential {
                    old_key,
                    new_key,
                    descriptor: pending.descriptor,
                    salt: pending.salt,
                })?;
                self.gate.open(token)?;
                self.token = Some(token);
                self.state = RotationState::AwaitingConfirmation;
                self.emit(RotationNotice::AwaitingConfirmation);
                tracing::info!(token = token.value(), "rotation command submitted");
                Ok(())
            }
            _ => Err(DeviceError::WorkerState(format!(
                "unexpected derivation completion in state {:?}",
                self.state
            ))),
        }
    }

    /// Abandon the confirmation wait on the user's behalf.
    ///
    /// The only user-cancelable phase. Notifies the device layer exactly
    /// once, discards the generated parameters, and returns to `Idle` with
    /// inputs re-enabled. A no-op in any other phase.
    pub fn cancel_confirmation(&mut self) {
        if self.state != RotationState::AwaitingConfirmation {
            return;
        }
        self.gate.cancel(&self.correlator);
        // Clear the token so the device's late ConfirmationCanceled
        // response is ignored by the idempotent filter.
        self.token = None;
        tracing::info!("confirmation wait canceled by user");
        self.reset_recoverable(FailureReason::ConfirmationAbandoned);
    }

    /// Handle one correlated response event.
    ///
    /// Events whose token does not match the outstanding token are ignored
    /// — the channel is multiplexed and unrelated commands complete
    /// concurrently. On a match the token is cleared before anything else,
    /// so a re-entrant event cannot be mismatched.
    pub fn on_response(&mut self, event: ResponseEvent) {
        if self.token != Some(event.token) {
            tracing::debug!(token = event.token.value(), "ignoring unrelated response");
            return;
        }
        self.token = None;

        if self.state == RotationState::AwaitingConfirmation {
            match event.code {
                ResponseCode::ConfirmationTimeout => {
                    self.gate.resolve(GateOutcome::TimedOut);
                    tracing::info!("confirmation timed out");
                    self.reset_recoverable(FailureReason::ConfirmationAbandoned);
                    return;
                }
                ResponseCode::ConfirmationCanceled => {
                    self.gate.resolve(GateOutcome::Canceled);
                    tracing::info!("confirmation canceled");
                    self.reset_recoverable(FailureReason::ConfirmationAbandoned);
                    return;
                }
                // Any terminal verdict means the button was pressed and
                // the device proceeded: the gate is force-resolved and the
                // flow passes through AwaitingResult.
                _ => {
                    self.gate.resolve(GateOutcome::Confirmed);
                    self.state = RotationState::AwaitingResult;
                }
            }
        }

        if self.state == RotationState::AwaitingResult {
            self.apply_result(event.code);
        }
    }

    /// Apply the device's verdict per the transition table.
    fn apply_result(&mut self, code: ResponseCode) {
        match code {
            ResponseCode::Okay => {
                if let Some(pending) = self.pending.take() {
                    self.context.set_current_descriptor(pending.descriptor);
                    self.context.set_current_salt(pending.salt);
                }
                self.state = RotationState::Committed;
                self.emit(RotationNotice::Succeeded);
                self.emit(RotationNotice::InputsEnabled);
                tracing::info!("rotation committed, new parameters persisted");
            }
            ResponseCode::BadCredential => {
                tracing::info!("device rejected old credential");
                self.reset_recoverable(FailureReason::CredentialRejected);
            }
            ResponseCode::ConfirmationTimeout | ResponseCode::ConfirmationCanceled => {
                // Defensive: a confirmation verdict cannot follow a
                // confirmed gate, but if it does the attempt is abandoned.
                self.reset_recoverable(FailureReason::ConfirmationAbandoned);
            }
            ResponseCode::DeviceDisconnected => {
                self.fail(FailureReason::Disconnected);
            }
            ResponseCode::ApplicationQuit => {
                self.fail(FailureReason::ApplicationQuit);
            }
            ResponseCode::Other(code) => {
                tracing::error!(code, "unrecognized response code, aborting flow");
                self.fail(FailureReason::Protocol { code });
            }
        }
    }

    /// Recoverable end: discard the generated parameters, return to `Idle`,
    /// re-enable inputs. The rejected attempt's salt and descriptor are
    /// never persisted.
    fn reset_recoverable(&mut self, reason: FailureReason) {
        self.pending = None;
        self.old_key = None;
        self.state = RotationState::Idle;
        self.emit(RotationNotice::Failed { reason });
        self.emit(RotationNotice::InputsEnabled);
    }

    /// Fatal end: the flow terminates; the dialog is expected to close.
    fn fail(&mut self, reason: FailureReason) {
        self.pending = None;
        self.old_key = None;
        self.state = RotationState::Failed(reason);
        self.emit(RotationNotice::Failed { reason });
    }

    fn emit(&self, notice: RotationNotice) {
        // A departed listener must not wedge the flow.
        let _ = self.notices.send(notice);
    }
}

// ---------------------------------------------------------------------------
// Unit tests — full flows live in tests/rotation_flow.rs
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SharedContext;
    use crate::correlator::DeviceTransport;
    use loquet_crypto_core::CryptoError;
    use std::sync::mpsc::{self, Receiver};

    struct NullTransport;

    impl DeviceTransport for NullTransport {
        fn submit(&self, _token: CommandToken, _command: Command) -> Result<(), DeviceError> {
            Ok(())
        }

        fn cancel_pending_confirmation(&self) {}
    }

    struct InstantKdf;

    impl KeyDerivation for InstantKdf {
        fn derive(
            &self,
            password: &[u8],
            _descriptor: &HashFunctionDescriptor,
            _salt: &Salt,
            output_len: usize,
        ) -> Result<DerivedKey, CryptoError> {
            let mut out = vec![0u8; output_len];
            for (i, b) in out.iter_mut().enumerate() {
                *b = password.get(i % password.len().max(1)).copied().unwrap_or(0);
            }
            Ok(DerivedKey::new(out))
        }
    }

    fn controller() -> (
        CredentialRotationController,
        Receiver<RotationNotice>,
        Receiver<DerivationDone>,
    ) {
        let correlator = Arc::new(CommandCorrelator::new(Arc::new(NullTransport)));
        let context = Arc::new(SharedContext::new(
            HashFunctionDescriptor::for_security_level(SecurityLevel::DEFAULT),
            Salt::from_bytes(&[9u8; 16]).expect("salt"),
            32,
        ));
        let (notice_tx, notice_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let controller = CredentialRotationController::new(
            correlator,
            context,
            Arc::new(InstantKdf),
            notice_tx,
            done_tx,
        );
        (controller, notice_rx, done_rx)
    }

    fn request(old: &str, new: &str, repeat: &str) -> RotationRequest {
        RotationRequest {
            old_password: Zeroizing::new(old.as_bytes().to_vec()),
            new_password: Zeroizing::new(new.as_bytes().to_vec()),
            new_password_repeat: Zeroizing::new(repeat.as_bytes().to_vec()),
            security_level: SecurityLevel::DEFAULT,
        }
    }

    #[test]
    fn mismatched_passwords_are_rejected_in_place() {
        let (mut controller, notices, _done) = controller();
        let err = controller
            .begin(request("A", "B", "C"))
            .expect_err("mismatch should be rejected");
        assert!(matches!(err, DeviceError::PasswordMismatch));
        assert_eq!(controller.state(), RotationState::Idle);
        assert!(notices.try_recv().is_err());
    }

    #[test]
    fn begin_refuses_while_active() {
        let (mut controller, _notices, _done) = controller();
        controller
            .begin(request("A", "B", "B"))
            .expect("begin should succeed");
        let err = controller
            .begin(request("A", "B", "B"))
            .expect_err("second begin should be refused");
        assert!(matches!(err, DeviceError::Busy));
    }

    #[test]
    fn unrelated_token_is_ignored() {
        let (mut controller, _notices, _done) = controller();
        // Fabricate a response while nothing is outstanding by delivering
        // through a separate correlator instance.
        let other = CommandCorrelator::new(Arc::new(NullTransport));
        let token = other
            .submit(Command::RotateCredential {
                old_key: DerivedKey::new(vec![1; 32]),
                new_key: DerivedKey::new(vec![2; 32]),
                descriptor: HashFunctionDescriptor::for_security_level(SecurityLevel::DEFAULT),
                salt: Salt::generate(),
            })
            .expect("submit");

        controller.on_response(ResponseEvent {
            token,
            code: ResponseCode::Okay,
        });
        assert_eq!(controller.state(), RotationState::Idle);
    }

    #[test]
    fn cancel_outside_confirmation_is_a_no_op() {
        let (mut controller, notices, _done) = controller();
        controller.cancel_confirmation();
        assert_eq!(controller.state(), RotationState::Idle);
        assert!(notices.try_recv().is_err());
    }

    #[test]
    fn failure_reason_serde_shape() {
        let json = serde_json::to_string(&FailureReason::Protocol { code: 42 })
            .expect("serialize should succeed");
        assert_eq!(json, r#"{"kind":"protocol","code":42}"#);
    }

    #[test]
    fn notice_serde_shape() {
        let json = serde_json::to_string(&RotationNotice::Failed {
            reason: FailureReason::CredentialRejected,
        })
        .expect("serialize should succeed");
        assert_eq!(
            json,
            r#"{"kind":"failed","reason":{"kind":"credentialRejected"}}"#
        );
    }
}
