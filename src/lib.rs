//! Saved-game persistence for a single application record.
//!
//! An [`Orchestrator`] owns the in-memory record, the session timer and the
//! status line, and drives save/load requests against any [`SaveStorage`]
//! collaborator. Records are written with the versioned binary [`codec`].

mod clock;
pub mod codec;
mod config;
mod error;
mod memory;
mod orchestrator;
mod record;
mod session;
mod slot;
mod status;
mod storage;
mod store;
mod version;

pub use clock::{elapsed_between, Clock, ManualClock, SystemClock};
pub use codec::{decode, decode_into, encode, DecodeOutcome, Decoded};
pub use config::{ConfigError, PickerConfig, SaveConfig};
pub use error::{SaveError, SaveResult};
pub use memory::{MemoryStorage, StoredSlot};
pub use orchestrator::{
    Completion, Operation, Orchestrator, SaveState, SessionContext, Step, Success,
};
pub use record::{ApplicationRecord, FieldEdit};
pub use session::{SessionTimer, DEFAULT_AUTOSAVE_INTERVAL};
pub use slot::{
    generate_slot_name, resolve_conflict, write_description, ConflictPolicy, MetadataUpdate,
    MetadataUpdateBuilder, PickerRequest, SlotHandle, SlotSelection,
};
pub use status::StatusReporter;
pub use storage::{
    CoverCapture, NoCover, RequestKind, RequestStatus, SaveStorage, StorageEvent,
};
pub use store::{unwrap_container, wrap_container, DirectoryStorage, SlotFile, StoreError};
pub use version::{
    RecordFormat, RECORD_TAG_LEN, SLOT_CONTAINER_MAGIC, SLOT_CONTAINER_VERSION,
};
