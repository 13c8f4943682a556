//! The storage collaborator seen by the orchestrator.
//!
//! Requests are fire-and-forget; each one produces exactly one
//! [`StorageEvent`] later, which the host feeds back through
//! `Orchestrator::dispatch` (or `pump`).

use std::fmt;

use crate::slot::{ConflictPolicy, MetadataUpdate, PickerRequest, SlotHandle, SlotSelection};

/// Failure codes reported by a storage request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Timeout,
    Internal,
    Authentication,
    BadInput,
    UserClosedUi,
}

impl RequestStatus {
    pub fn code(self) -> i32 {
        match self {
            RequestStatus::Timeout => -1,
            RequestStatus::Internal => -2,
            RequestStatus::Authentication => -3,
            RequestStatus::BadInput => -4,
            RequestStatus::UserClosedUi => 2,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Timeout => "TimeoutError",
            RequestStatus::Internal => "InternalError",
            RequestStatus::Authentication => "AuthenticationError",
            RequestStatus::BadInput => "BadInputError",
            RequestStatus::UserClosedUi => "UserClosedUI",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Which request a completion belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Authenticate,
    OpenSlot,
    SelectSlot,
    Commit,
    ReadBytes,
}

/// One completion delivered by the collaborator.
#[derive(Clone, Debug, PartialEq)]
pub enum StorageEvent {
    Authenticated(bool),
    SlotOpened(Result<SlotHandle, RequestStatus>),
    SlotSelected(Result<SlotSelection, RequestStatus>),
    Committed(Result<SlotHandle, RequestStatus>),
    BytesRead(Result<Vec<u8>, RequestStatus>),
}

impl StorageEvent {
    pub fn kind(&self) -> RequestKind {
        match self {
            StorageEvent::Authenticated(_) => RequestKind::Authenticate,
            StorageEvent::SlotOpened(_) => RequestKind::OpenSlot,
            StorageEvent::SlotSelected(_) => RequestKind::SelectSlot,
            StorageEvent::Committed(_) => RequestKind::Commit,
            StorageEvent::BytesRead(_) => RequestKind::ReadBytes,
        }
    }
}

/// Save/load/list capability set consumed by the orchestrator.
pub trait SaveStorage {
    fn authenticate(&mut self);

    fn sign_out(&mut self);

    /// Opens a slot, resolving any divergent revisions with `policy`.
    fn open_slot(&mut self, name: &str, policy: ConflictPolicy);

    fn present_slot_picker(&mut self, request: PickerRequest);

    /// Writes bytes and metadata as one atomic update.
    fn commit(&mut self, slot: &SlotHandle, update: MetadataUpdate, bytes: Vec<u8>);

    fn read_bytes(&mut self, slot: &SlotHandle);

    /// Next completion, if one is ready.
    fn poll_completion(&mut self) -> Option<StorageEvent>;
}

/// Best-effort thumbnail source for slot cover images.
pub trait CoverCapture {
    /// PNG bytes of the current frame, or `None` when capture failed.
    fn capture(&mut self) -> Option<Vec<u8>>;
}

/// Capture that never produces an image.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCover;

impl CoverCapture for NoCover {
    fn capture(&mut self) -> Option<Vec<u8>> {
        None
    }
}

impl<F> CoverCapture for F
where
    F: FnMut() -> Option<Vec<u8>>,
{
    fn capture(&mut self) -> Option<Vec<u8>> {
        self()
    }
}
