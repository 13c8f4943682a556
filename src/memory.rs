//! In-process storage collaborator.
//!
//! Completions are queued and handed out by `poll_completion`, so a host
//! loop sees the same request/callback split a remote service gives it.
//! Failures, picker choices and divergent revisions can be scripted.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::slot::{
    resolve_conflict, ConflictPolicy, MetadataUpdate, PickerRequest, SlotHandle, SlotSelection,
};
use crate::storage::{RequestKind, RequestStatus, SaveStorage, StorageEvent};

/// One stored revision of a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSlot {
    pub handle: SlotHandle,
    pub bytes: Vec<u8>,
    pub cover_image: Option<Vec<u8>>,
}

impl StoredSlot {
    pub fn new(handle: SlotHandle, bytes: Vec<u8>) -> Self {
        Self {
            handle,
            bytes,
            cover_image: None,
        }
    }
}

pub struct MemoryStorage {
    slots: BTreeMap<String, StoredSlot>,
    conflicts: BTreeMap<String, StoredSlot>,
    pending: VecDeque<StorageEvent>,
    failures: HashMap<RequestKind, RequestStatus>,
    selections: VecDeque<Result<SlotSelection, RequestStatus>>,
    picker_requests: Vec<PickerRequest>,
    auth_result: bool,
    signed_in: bool,
    clock: Box<dyn Clock>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl MemoryStorage {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            slots: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            pending: VecDeque::new(),
            failures: HashMap::new(),
            selections: VecDeque::new(),
            picker_requests: Vec::new(),
            auth_result: true,
            signed_in: false,
            clock: Box::new(clock),
        }
    }

    /// Stores a slot as if an earlier session had written it.
    pub fn seed_slot(&mut self, name: &str, played_time: Duration, bytes: Vec<u8>) {
        let mut handle = SlotHandle::new(name);
        handle.played_time = played_time;
        handle.last_modified = Some(self.clock.now());
        self.slots
            .insert(name.to_string(), StoredSlot::new(handle, bytes));
    }

    /// Records a second, divergent revision for `name`; the next open
    /// resolves it against the stored one.
    pub fn inject_conflict(&mut self, name: &str, unmerged: StoredSlot) {
        self.conflicts.insert(name.to_string(), unmerged);
    }

    /// Makes the next request of `kind` fail with `status`.
    pub fn fail_next(&mut self, kind: RequestKind, status: RequestStatus) {
        self.failures.insert(kind, status);
    }

    /// Scripts the next picker response.
    pub fn queue_selection(&mut self, selection: Result<SlotSelection, RequestStatus>) {
        self.selections.push_back(selection);
    }

    pub fn set_auth_result(&mut self, ok: bool) {
        self.auth_result = ok;
    }

    pub fn slot(&self, name: &str) -> Option<&StoredSlot> {
        self.slots.get(name)
    }

    pub fn picker_requests(&self) -> &[PickerRequest] {
        &self.picker_requests
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in
    }

    fn check(&mut self, kind: RequestKind) -> Result<(), RequestStatus> {
        if let Some(status) = self.failures.remove(&kind) {
            return Err(status);
        }
        if kind != RequestKind::Authenticate && !self.signed_in {
            return Err(RequestStatus::Authentication);
        }
        Ok(())
    }

    fn open(&mut self, name: &str, policy: ConflictPolicy) -> SlotHandle {
        let original = self
            .slots
            .remove(name)
            .unwrap_or_else(|| StoredSlot::new(SlotHandle::new(name), Vec::new()));
        let resolved = match self.conflicts.remove(name) {
            Some(unmerged) => {
                let (_, winner) = resolve_conflict(
                    policy,
                    (original.handle.clone(), original),
                    (unmerged.handle.clone(), unmerged),
                );
                debug!(slot = name, ?policy, "resolved divergent revisions");
                winner
            }
            None => original,
        };
        let handle = resolved.handle.clone();
        self.slots.insert(name.to_string(), resolved);
        handle
    }
}

impl SaveStorage for MemoryStorage {
    fn authenticate(&mut self) {
        let ok = self.check(RequestKind::Authenticate).is_ok() && self.auth_result;
        self.signed_in = ok;
        self.pending.push_back(StorageEvent::Authenticated(ok));
    }

    fn sign_out(&mut self) {
        self.signed_in = false;
    }

    fn open_slot(&mut self, name: &str, policy: ConflictPolicy) {
        let result = self
            .check(RequestKind::OpenSlot)
            .map(|()| self.open(name, policy));
        self.pending.push_back(StorageEvent::SlotOpened(result));
    }

    fn present_slot_picker(&mut self, request: PickerRequest) {
        self.picker_requests.push(request);
        let result = self.check(RequestKind::SelectSlot).and_then(|()| {
            self.selections
                .pop_front()
                .unwrap_or(Err(RequestStatus::UserClosedUi))
        });
        self.pending.push_back(StorageEvent::SlotSelected(result));
    }

    fn commit(&mut self, slot: &SlotHandle, update: MetadataUpdate, bytes: Vec<u8>) {
        let now = self.clock.now();
        let result = self.check(RequestKind::Commit).and_then(|()| {
            let stored = self
                .slots
                .get_mut(&slot.name)
                .ok_or(RequestStatus::BadInput)?;
            stored.handle.apply(&update, now);
            stored.bytes = bytes;
            if update.cover_image.is_some() {
                stored.cover_image = update.cover_image;
            }
            Ok(stored.handle.clone())
        });
        self.pending.push_back(StorageEvent::Committed(result));
    }

    fn read_bytes(&mut self, slot: &SlotHandle) {
        let result = self.check(RequestKind::ReadBytes).and_then(|()| {
            self.slots
                .get(&slot.name)
                .map(|stored| stored.bytes.clone())
                .ok_or(RequestStatus::BadInput)
        });
        self.pending.push_back(StorageEvent::BytesRead(result));
    }

    fn poll_completion(&mut self) -> Option<StorageEvent> {
        self.pending.pop_front()
    }
}
