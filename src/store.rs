//! Directory-backed storage collaborator.
//!
//! Layout under the root:
//! - `slots/<name>.csav`: the slot's [`SlotHandle`] and record bytes in one
//!   checksummed container
//! - `covers/<name>.png`: the latest cover image, when one was attached
//!
//! A commit is a single rename of the slot file, so metadata and bytes
//! always change together. The previous slot file is kept as
//! `<name>.csav.bak`, which reads fall back to when the primary is damaged.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::slot::{ConflictPolicy, MetadataUpdate, PickerRequest, SlotHandle, SlotSelection};
use crate::storage::{RequestStatus, SaveStorage, StorageEvent};
use crate::version::{SLOT_CONTAINER_MAGIC, SLOT_CONTAINER_VERSION};

const HEADER_LEN: usize = 4 + 2 + 4 + 4 + 4;
const MAX_SLOT_NAME_LEN: usize = 64;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("save store io error: {0}")]
    #[diagnostic(code(store::io))]
    Io(#[from] std::io::Error),
    #[error("slot metadata error: {0}")]
    #[diagnostic(code(store::metadata))]
    Metadata(#[from] serde_json::Error),
    #[error("invalid slot name {0:?}")]
    #[diagnostic(
        code(store::invalid_slot_name),
        help("use letters, digits, '-', '_' or '.', at most 64 characters")
    )]
    InvalidSlotName(String),
    #[error("slot file too small")]
    #[diagnostic(code(store::too_small))]
    TooSmall,
    #[error("slot payload too large")]
    #[diagnostic(code(store::too_large))]
    TooLarge,
    #[error("invalid slot file magic bytes")]
    #[diagnostic(code(store::invalid_magic))]
    InvalidMagic,
    #[error("incompatible slot container version: found {found}, expected {expected}")]
    #[diagnostic(code(store::incompatible_version))]
    IncompatibleVersion { found: u16, expected: u16 },
    #[error("slot file length mismatch")]
    #[diagnostic(code(store::length_mismatch))]
    LengthMismatch,
    #[error("slot file checksum mismatch")]
    #[diagnostic(code(store::checksum_mismatch))]
    ChecksumMismatch,
    #[error("slot recovery failed (primary: {primary}, backup: {})", describe_backup(.backup))]
    #[diagnostic(code(store::recovery_failed))]
    RecoveryFailed {
        primary: Box<StoreError>,
        backup: Option<Box<StoreError>>,
    },
}

fn describe_backup(backup: &Option<Box<StoreError>>) -> String {
    match backup {
        Some(err) => err.to_string(),
        None => "missing".to_string(),
    }
}

/// Contents of one slot file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotFile {
    pub handle: SlotHandle,
    pub payload: Vec<u8>,
}

/// Encodes a slot file: header, then metadata JSON, then record bytes. The
/// checksum covers both bodies.
pub fn wrap_container(handle: &SlotHandle, payload: &[u8]) -> Result<Vec<u8>, StoreError> {
    let metadata = serde_json::to_vec(handle)?;
    let metadata_len = u32::try_from(metadata.len()).map_err(|_| StoreError::TooLarge)?;
    let payload_len = u32::try_from(payload.len()).map_err(|_| StoreError::TooLarge)?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&metadata);
    hasher.update(payload);
    let checksum = hasher.finalize();

    let mut output = Vec::with_capacity(HEADER_LEN + metadata.len() + payload.len());
    output.extend_from_slice(&SLOT_CONTAINER_MAGIC);
    output.extend_from_slice(&SLOT_CONTAINER_VERSION.to_le_bytes());
    output.extend_from_slice(&checksum.to_le_bytes());
    output.extend_from_slice(&metadata_len.to_le_bytes());
    output.extend_from_slice(&payload_len.to_le_bytes());
    output.extend_from_slice(&metadata);
    output.extend_from_slice(payload);
    Ok(output)
}

/// Validates magic, version, lengths and checksum before decoding anything.
pub fn unwrap_container(input: &[u8]) -> Result<SlotFile, StoreError> {
    if input.len() < HEADER_LEN {
        return Err(StoreError::TooSmall);
    }
    if input[0..4] != SLOT_CONTAINER_MAGIC {
        return Err(StoreError::InvalidMagic);
    }
    let version = u16::from_le_bytes([input[4], input[5]]);
    if version != SLOT_CONTAINER_VERSION {
        return Err(StoreError::IncompatibleVersion {
            found: version,
            expected: SLOT_CONTAINER_VERSION,
        });
    }
    let checksum = u32::from_le_bytes([input[6], input[7], input[8], input[9]]);
    let metadata_len = u32::from_le_bytes([input[10], input[11], input[12], input[13]]) as usize;
    let payload_len = u32::from_le_bytes([input[14], input[15], input[16], input[17]]) as usize;
    let body = &input[HEADER_LEN..];
    if metadata_len.checked_add(payload_len) != Some(body.len()) {
        return Err(StoreError::LengthMismatch);
    }
    if crc32fast::hash(body) != checksum {
        return Err(StoreError::ChecksumMismatch);
    }
    let (metadata, payload) = body.split_at(metadata_len);
    Ok(SlotFile {
        handle: serde_json::from_slice(metadata)?,
        payload: payload.to_vec(),
    })
}

pub struct DirectoryStorage {
    root: PathBuf,
    clock: Box<dyn Clock>,
    pending: VecDeque<StorageEvent>,
    selections: VecDeque<Result<SlotSelection, RequestStatus>>,
    signed_in: bool,
}

impl DirectoryStorage {
    pub fn new(root: PathBuf) -> Self {
        Self::with_clock(root, SystemClock)
    }

    pub fn with_clock(root: PathBuf, clock: impl Clock + 'static) -> Self {
        Self {
            root,
            clock: Box::new(clock),
            pending: VecDeque::new(),
            selections: VecDeque::new(),
            signed_in: false,
        }
    }

    /// The picker has no UI here; its answers are queued by the host.
    pub fn queue_selection(&mut self, selection: Result<SlotSelection, RequestStatus>) {
        self.selections.push_back(selection);
    }

    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.root.join("slots"))?;
        fs::create_dir_all(self.root.join("covers"))?;
        Ok(())
    }

    /// Current metadata of `name`, or a fresh handle when it was never
    /// written.
    pub fn open(&self, name: &str) -> Result<SlotHandle, StoreError> {
        Ok(match self.load(name)? {
            Some(file) => file.handle,
            None => SlotHandle::new(name),
        })
    }

    /// Commits bytes and metadata with one rename. The cover is written
    /// afterwards and a failure there does not undo the commit.
    pub fn write_slot(
        &self,
        name: &str,
        update: &MetadataUpdate,
        payload: &[u8],
    ) -> Result<SlotHandle, StoreError> {
        validate_slot_name(name)?;
        self.ensure_layout()?;
        let mut handle = match self.load(name) {
            Ok(Some(file)) => file.handle,
            Ok(None) => SlotHandle::new(name),
            Err(err) => {
                warn!(slot = name, %err, "previous revision unreadable, overwriting");
                SlotHandle::new(name)
            }
        };
        handle.apply(update, self.clock.now());

        atomic_write(&self.slot_path(name), &wrap_container(&handle, payload)?, true)?;
        if let Some(png) = &update.cover_image {
            if let Err(err) = atomic_write(&self.cover_path(name), png, false) {
                warn!(slot = name, %err, "cover image not written");
            }
        }
        Ok(handle)
    }

    /// Record bytes of `name`; empty when the slot was never written.
    pub fn read_slot(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        Ok(self
            .load(name)?
            .map(|file| file.payload)
            .unwrap_or_default())
    }

    pub fn cover_image(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_slot_name(name)?;
        let path = self.cover_path(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    /// Written slots, most recently modified first. Files that cannot be
    /// read are skipped.
    pub fn list_slots(&self) -> Result<Vec<SlotHandle>, StoreError> {
        let slot_dir = self.root.join("slots");
        if !slot_dir.exists() {
            return Ok(Vec::new());
        }
        let mut slots = Vec::new();
        for entry in fs::read_dir(slot_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("csav") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                warn!(path = %path.display(), "skipping slot file with a non-utf-8 name");
                continue;
            };
            if let Err(err) = validate_slot_name(name) {
                warn!(%err, "skipping slot file");
                continue;
            }
            match self.load(name) {
                Ok(Some(mut file)) => {
                    file.handle.name = name.to_string();
                    slots.push(file.handle);
                }
                Ok(None) => {}
                Err(err) => warn!(slot = name, %err, "skipping unreadable slot"),
            }
        }
        slots.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(slots)
    }

    pub fn remove_slot(&self, name: &str) -> Result<(), StoreError> {
        validate_slot_name(name)?;
        let slot = self.slot_path(name);
        for path in [with_suffix(&slot, ".bak"), slot, self.cover_path(name)] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// The slot file of `name`, falling back to its backup when the primary
    /// is damaged. `None` when the slot was never written.
    fn load(&self, name: &str) -> Result<Option<SlotFile>, StoreError> {
        validate_slot_name(name)?;
        let primary = self.slot_path(name);
        if !primary.exists() {
            return Ok(None);
        }
        let primary_err = match read_container(&primary) {
            Ok(file) => return Ok(Some(file)),
            Err(err) => err,
        };
        warn!(slot = name, err = %primary_err, "primary slot file unreadable, trying backup");
        match read_container(&with_suffix(&primary, ".bak")) {
            Ok(file) => Ok(Some(file)),
            Err(StoreError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::RecoveryFailed {
                    primary: Box::new(primary_err),
                    backup: None,
                })
            }
            Err(backup_err) => Err(StoreError::RecoveryFailed {
                primary: Box::new(primary_err),
                backup: Some(Box::new(backup_err)),
            }),
        }
    }

    fn slot_path(&self, name: &str) -> PathBuf {
        self.root.join("slots").join(format!("{name}.csav"))
    }

    fn cover_path(&self, name: &str) -> PathBuf {
        self.root.join("covers").join(format!("{name}.png"))
    }

    fn run<T>(
        &self,
        request: impl FnOnce(&Self) -> Result<T, StoreError>,
    ) -> Result<T, RequestStatus> {
        if !self.signed_in {
            return Err(RequestStatus::Authentication);
        }
        request(self).map_err(|err| {
            warn!(%err, "directory storage request failed");
            match err {
                StoreError::InvalidSlotName(_) => RequestStatus::BadInput,
                _ => RequestStatus::Internal,
            }
        })
    }
}

impl SaveStorage for DirectoryStorage {
    fn authenticate(&mut self) {
        // Local storage has no accounts; signing in only unlocks requests.
        self.signed_in = true;
        self.pending.push_back(StorageEvent::Authenticated(true));
    }

    fn sign_out(&mut self) {
        self.signed_in = false;
    }

    fn open_slot(&mut self, name: &str, policy: ConflictPolicy) {
        // A directory holds one revision per slot, so there is never
        // anything for `policy` to resolve.
        debug!(slot = name, ?policy, "opening slot");
        let result = self.run(|store| store.open(name));
        self.pending.push_back(StorageEvent::SlotOpened(result));
    }

    fn present_slot_picker(&mut self, request: PickerRequest) {
        debug!(title = %request.title, "slot picker requested");
        let result = if self.signed_in {
            self.selections
                .pop_front()
                .unwrap_or(Err(RequestStatus::UserClosedUi))
        } else {
            Err(RequestStatus::Authentication)
        };
        self.pending.push_back(StorageEvent::SlotSelected(result));
    }

    fn commit(&mut self, slot: &SlotHandle, update: MetadataUpdate, bytes: Vec<u8>) {
        let result = self.run(|store| store.write_slot(&slot.name, &update, &bytes));
        self.pending.push_back(StorageEvent::Committed(result));
    }

    fn read_bytes(&mut self, slot: &SlotHandle) {
        let result = self.run(|store| store.read_slot(&slot.name));
        self.pending.push_back(StorageEvent::BytesRead(result));
    }

    fn poll_completion(&mut self) -> Option<StorageEvent> {
        self.pending.pop_front()
    }
}

fn validate_slot_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_SLOT_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSlotName(name.to_string()))
    }
}

fn read_container(path: &Path) -> Result<SlotFile, StoreError> {
    let bytes = fs::read(path)?;
    unwrap_container(&bytes)
}

fn atomic_write(path: &Path, bytes: &[u8], keep_backup: bool) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target path has no parent",
        ))
    })?;
    fs::create_dir_all(parent)?;
    let tmp_path = with_suffix(path, ".tmp");
    fs::write(&tmp_path, bytes)?;
    if keep_backup && path.exists() {
        fs::copy(path, with_suffix(path, ".bak"))?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut output = path.as_os_str().to_os_string();
    output.push(suffix);
    PathBuf::from(output)
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
