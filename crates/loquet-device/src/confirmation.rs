//! Physical-confirmation wait state.
//!
//! Sensitive commands complete only after the user presses the button on
//! the device. [`ConfirmationGate`] models that wait as a cancellable state
//! attached to one command token. The gate knows nothing about widgets —
//! re-enabling inputs after a cancel is the owning controller's job.

use crate::correlator::{CommandCorrelator, CommandToken};
use crate::error::DeviceError;

/// How a confirmation wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// The user pressed the device button; the command proceeds.
    Confirmed,
    /// The device's confirmation window elapsed.
    TimedOut,
    /// The wait was abandoned from the client side.
    Canceled,
}

/// Lifecycle of the confirmation wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    /// No sensitive command has been submitted yet.
    NotStarted,
    /// The device is waiting for its button to be pressed.
    WaitingForConfirmation,
    /// The wait ended; terminal.
    Resolved(GateOutcome),
}

/// Cancellable wait for the device's physical confirmation step.
#[derive(Debug)]
pub struct ConfirmationGate {
    state: GateState,
    token: Option<CommandToken>,
    cancel_sent: bool,
}

impl ConfirmationGate {
    /// A gate that has not been opened.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: GateState::NotStarted,
            token: None,
            cancel_sent: false,
        }
    }

    /// Enter the confirmation wait for a just-submitted command.
    ///
    /// Must only be called after the sensitive command has actually been
    /// submitted — the token proves it.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Busy`] if the gate was already opened.
    pub fn open(&mut self, token: CommandToken) -> Result<(), DeviceError> {
        if self.state != GateState::NotStarted {
            return Err(DeviceError::Busy);
        }
        self.state = GateState::WaitingForConfirmation;
        self.token = Some(token);
        Ok(())
    }

    /// Abandon the wait from the client side.
    ///
    /// Notifies the device layer exactly once, even if called repeatedly,
    /// and resolves the gate with [`GateOutcome::Canceled`]. A no-op unless
    /// the gate is currently waiting.
    pub fn cancel(&mut self, correlator: &CommandCorrelator) {
        if self.state != GateState::WaitingForConfirmation {
            return;
        }
        if !self.cancel_sent {
            self.cancel_sent = true;
            correlator.cancel_pending_confirmation();
        }
        self.state = GateState::Resolved(GateOutcome::Canceled);
    }

    /// Force-resolve the gate, regardless of its own wait state.
    ///
    /// Called by the owning controller when any terminal response arrives
    /// for the associated token. Already-resolved gates keep their first
    /// outcome.
    pub fn resolve(&mut self, outcome: GateOutcome) {
        if matches!(self.state, GateState::Resolved(_)) {
            return;
        }
        self.state = GateState::Resolved(outcome);
    }

    /// Current gate state.
    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    /// Token of the associated command, if the gate has been opened.
    #[must_use]
    pub const fn token(&self) -> Option<CommandToken> {
        self.token
    }

    /// `true` while the device button wait is in progress.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.state == GateState::WaitingForConfirmation
    }
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::{Command, DeviceTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CancelCounter {
        cancels: AtomicUsize,
    }

    impl DeviceTransport for CancelCounter {
        fn submit(&self, _token: CommandToken, _command: Command) -> Result<(), DeviceError> {
            Ok(())
        }

        fn cancel_pending_confirmation(&self) {
            self.cancels.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn correlator_with_counter() -> (CommandCorrelator, Arc<CancelCounter>) {
        let transport = Arc::new(CancelCounter {
            cancels: AtomicUsize::new(0),
        });
        let correlator = CommandCorrelator::new(Arc::clone(&transport) as Arc<dyn DeviceTransport>);
        (correlator, transport)
    }

    fn some_token(correlator: &CommandCorrelator) -> CommandToken {
        use loquet_crypto_core::{DerivedKey, HashFunctionDescriptor, Salt, SecurityLevel};
        correlator
            .submit(Command::RotateCredential {
                old_key: DerivedKey::new(vec![1; 32]),
                new_key: DerivedKey::new(vec![2; 32]),
                descriptor: HashFunctionDescriptor::for_security_level(SecurityLevel::DEFAULT),
                salt: Salt::generate(),
            })
            .expect("submit should succeed")
    }

    #[test]
    fn new_gate_is_not_started() {
        let gate = ConfirmationGate::new();
        assert_eq!(gate.state(), GateState::NotStarted);
        assert_eq!(gate.token(), None);
        assert!(!gate.is_waiting());
    }

    #[test]
    fn open_enters_waiting_with_token() {
        let (correlator, _) = correlator_with_counter();
        let token = some_token(&correlator);
        let mut gate = ConfirmationGate::new();
        gate.open(token).expect("open should succeed");
        assert!(gate.is_waiting());
        assert_eq!(gate.token(), Some(token));
    }

    #[test]
    fn open_twice_is_rejected() {
        let (correlator, _) = correlator_with_counter();
        let token = some_token(&correlator);
        let mut gate = ConfirmationGate::new();
        gate.open(token).expect("open should succeed");
        assert!(matches!(gate.open(token), Err(DeviceError::Busy)));
    }

    #[test]
    fn cancel_notifies_device_exactly_once() {
        let (correlator, transport) = correlator_with_counter();
        let token = some_token(&correlator);
        let mut gate = ConfirmationGate::new();
        gate.open(token).expect("open should succeed");

        gate.cancel(&correlator);
        gate.cancel(&correlator);

        assert_eq!(transport.cancels.load(Ordering::Relaxed), 1);
        assert_eq!(gate.state(), GateState::Resolved(GateOutcome::Canceled));
    }

    #[test]
    fn cancel_before_open_is_a_no_op() {
        let (correlator, transport) = correlator_with_counter();
        let mut gate = ConfirmationGate::new();
        gate.cancel(&correlator);
        assert_eq!(transport.cancels.load(Ordering::Relaxed), 0);
        assert_eq!(gate.state(), GateState::NotStarted);
    }

    #[test]
    fn resolve_forces_terminal_state() {
        let (correlator, _) = correlator_with_counter();
        let token = some_token(&correlator);
        let mut gate = ConfirmationGate::new();
        gate.open(token).expect("open should succeed");
        gate.resolve(GateOutcome::Confirmed);
        assert_eq!(gate.state(), GateState::Resolved(GateOutcome::Confirmed));
    }

    #[test]
    fn first_resolution_wins() {
        let (correlator, transport) = correlator_with_counter();
        let token = some_token(&correlator);
        let mut gate = ConfirmationGate::new();
        gate.open(token).expect("open should succeed");

        gate.cancel(&correlator);
        gate.resolve(GateOutcome::TimedOut);

        assert_eq!(gate.state(), GateState::Resolved(GateOutcome::Canceled));
        assert_eq!(transport.cancels.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cancel_after_resolution_does_not_notify_device() {
        let (correlator, transport) = correlator_with_counter();
        let token = some_token(&correlator);
        let mut gate = ConfirmationGate::new();
        gate.open(token).expect("open should succeed");

        gate.resolve(GateOutcome::Confirmed);
        gate.cancel(&correlator);

        assert_eq!(transport.cancels.load(Ordering::Relaxed), 0);
        assert_eq!(gate.state(), GateState::Resolved(GateOutcome::Confirmed));
    }
}
