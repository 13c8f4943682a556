use miette::Diagnostic;
use thiserror::Error;

use crate::storage::RequestStatus;

pub type SaveResult<T> = Result<T, SaveError>;

/// Every failure the save/load path can surface.
///
/// None of these are fatal: the orchestrator reports them through the
/// status line and leaves the in-memory record as it was.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum SaveError {
    #[error("authentication failed")]
    #[diagnostic(code("save.authentication_failed"))]
    AuthenticationFailed,
    #[error("not signed in")]
    #[diagnostic(
        code("save.not_authenticated"),
        help("sign in before saving or loading")
    )]
    NotAuthenticated,
    #[error("another save or load is still in progress ({pending})")]
    #[diagnostic(code("save.busy"))]
    Busy { pending: &'static str },
    #[error("error opening slot '{slot}': {status}")]
    #[diagnostic(code("save.slot_open_failed"))]
    SlotOpenFailed { slot: String, status: RequestStatus },
    #[error("error selecting slot: {0}")]
    #[diagnostic(code("save.selection_failed"))]
    SelectionFailed(RequestStatus),
    #[error("error saving slot '{slot}': {status}")]
    #[diagnostic(code("save.commit_failed"))]
    CommitFailed { slot: String, status: RequestStatus },
    #[error("error reading slot '{slot}': {status}")]
    #[diagnostic(code("save.read_failed"))]
    ReadFailed { slot: String, status: RequestStatus },
    #[error("unknown serialization version: {0:?}")]
    #[diagnostic(code("save.unsupported_version"))]
    UnsupportedVersion(String),
    #[error("malformed save payload: {0}")]
    #[diagnostic(code("save.malformed_payload"))]
    MalformedPayload(String),
    #[error("record too large to encode: message is {len} bytes")]
    #[diagnostic(
        code("save.record_too_large"),
        help("messages are limited to u32::MAX bytes")
    )]
    RecordTooLarge { len: usize },
    #[error("invalid {field} input: {input:?}")]
    #[diagnostic(code("save.invalid_field_input"))]
    InvalidFieldInput { field: &'static str, input: String },
}
