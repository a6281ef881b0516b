//! `loquet-device` — Device protocol and credential rotation for LOQUET.
//!
//! This crate is the client-side core behind the GUI: token-correlated
//! command/response plumbing, the physical-confirmation gate, the
//! background key-derivation worker, the master-credential rotation state
//! machine, and the versioned record decoder consumed by the storage-sync
//! layer. Widgets, dialogs, and the USB/serial byte framing live elsewhere.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;

pub mod correlator;

pub mod confirmation;

pub mod worker;

pub mod context;

pub mod rotation;

pub mod records;

pub use confirmation::{ConfirmationGate, GateOutcome, GateState};
pub use context::{ApplicationContext, SharedContext};
pub use correlator::{
    Command, CommandCorrelator, CommandToken, DeviceTransport, ResponseCode, ResponseEvent,
};
pub use error::DeviceError;
pub use records::{encode_block, GenericField, Record, RecordId, RecordStore};
pub use rotation::{
    CredentialRotationController, FailureReason, RotationNotice, RotationRequest, RotationState,
};
pub use worker::{DerivationDone, DeriveRequest, KeyDerivationWorker};
