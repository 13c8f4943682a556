//! Save/load orchestration.
//!
//! Every request walks `Idle -> [Authenticating | SelectingSlot] ->
//! OpeningSlot -> Writing | Reading -> Idle`. Each arrow out of a waiting
//! state is taken by exactly one [`StorageEvent`] passed to
//! [`Orchestrator::dispatch`].
//!
//! Unlike a plain callback chain, a request issued while another one is in
//! flight is rejected with [`SaveError::Busy`] instead of interleaving with
//! it.

use std::mem;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::codec::{self, DecodeOutcome};
use crate::config::SaveConfig;
use crate::error::{SaveError, SaveResult};
use crate::record::{ApplicationRecord, FieldEdit};
use crate::session::SessionTimer;
use crate::slot::{
    generate_slot_name, write_description, MetadataUpdate, SlotHandle, SlotSelection,
};
use crate::status::StatusReporter;
use crate::storage::{CoverCapture, NoCover, RequestStatus, SaveStorage, StorageEvent};

/// The four user-facing flows, plus sign-in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    SignIn,
    SaveAutomatic,
    SaveManual,
    LoadAutomatic,
    LoadManual,
}

impl Operation {
    pub fn is_save(self) -> bool {
        matches!(self, Operation::SaveAutomatic | Operation::SaveManual)
    }
}

/// Where the orchestrator is in its current request.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SaveState {
    #[default]
    Idle,
    Authenticating,
    SelectingSlot {
        operation: Operation,
        cover: Option<Vec<u8>>,
    },
    OpeningSlot {
        operation: Operation,
        slot: String,
        cover: Option<Vec<u8>>,
    },
    Writing {
        operation: Operation,
        slot: SlotHandle,
    },
    Reading {
        operation: Operation,
        slot: SlotHandle,
    },
}

impl SaveState {
    pub fn label(&self) -> &'static str {
        match self {
            SaveState::Idle => "idle",
            SaveState::Authenticating => "authenticating",
            SaveState::SelectingSlot { .. } => "selecting slot",
            SaveState::OpeningSlot { .. } => "opening slot",
            SaveState::Writing { .. } => "writing",
            SaveState::Reading { .. } => "reading",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SaveState::Idle)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Success {
    SignedIn,
    Saved { slot: SlotHandle },
    Loaded { slot: SlotHandle },
    /// The slot exists but was never written; the record was left alone.
    NewSlot { slot: SlotHandle },
}

/// Terminal result of one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub operation: Operation,
    pub result: Result<Success, SaveError>,
}

/// What one dispatched event did.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Another completion is awaited.
    Pending,
    Finished(Completion),
    /// The event does not belong to the current state and was dropped.
    Ignored,
}

/// Record, timer and status line of one running application.
#[derive(Clone, Debug)]
pub struct SessionContext {
    record: ApplicationRecord,
    timer: SessionTimer,
    status: StatusReporter,
}

impl SessionContext {
    pub fn new(timer: SessionTimer) -> Self {
        Self {
            record: ApplicationRecord::default(),
            timer,
            status: StatusReporter::default(),
        }
    }

    pub fn record(&self) -> &ApplicationRecord {
        &self.record
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }
}

pub struct Orchestrator<S: SaveStorage> {
    storage: S,
    config: SaveConfig,
    clock: Box<dyn Clock>,
    cover: Box<dyn CoverCapture>,
    session: SessionContext,
    state: SaveState,
}

impl<S: SaveStorage> Orchestrator<S> {
    pub fn new(storage: S, config: SaveConfig, clock: impl Clock + 'static) -> Self {
        let timer = SessionTimer::new(clock.now(), config.autosave_interval());
        Self {
            storage,
            config,
            clock: Box::new(clock),
            cover: Box::new(NoCover),
            session: SessionContext::new(timer),
            state: SaveState::Idle,
        }
    }

    pub fn with_cover_capture(mut self, cover: impl CoverCapture + 'static) -> Self {
        self.cover = Box::new(cover);
        self
    }

    #[instrument(skip_all)]
    pub fn sign_in(&mut self) -> SaveResult<()> {
        self.ensure_idle()?;
        self.state = SaveState::Authenticating;
        self.session.status.set("Signing in...");
        self.storage.authenticate();
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn sign_out(&mut self) -> SaveResult<()> {
        self.ensure_idle()?;
        self.storage.sign_out();
        self.session.timer.set_authenticated(false);
        self.session.status.set("Signed out");
        info!("signed out");
        Ok(())
    }

    pub fn apply_edit(&mut self, edit: FieldEdit) {
        edit.apply(&mut self.session.record);
        self.session.timer.on_field_changed();
    }

    pub fn set_numeric_value(&mut self, value: f32) {
        self.apply_edit(FieldEdit::NumericValue(value));
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.apply_edit(FieldEdit::Message(message.into()));
    }

    pub fn set_counter(&mut self, value: i32) {
        self.apply_edit(FieldEdit::Counter(value));
    }

    /// Applies decimal widget text. Returns whether the field changed.
    pub fn edit_numeric_text(&mut self, text: &str) -> SaveResult<bool> {
        let edit =
            FieldEdit::numeric_from_text(text).inspect_err(|err| self.report_rejection(err))?;
        Ok(self.apply_optional(edit))
    }

    pub fn edit_message_text(&mut self, text: &str) {
        self.apply_edit(FieldEdit::message_from_text(text));
    }

    /// Applies integer widget text. Returns whether the field changed.
    pub fn edit_counter_text(&mut self, text: &str) -> SaveResult<bool> {
        let edit =
            FieldEdit::counter_from_text(text).inspect_err(|err| self.report_rejection(err))?;
        Ok(self.apply_optional(edit))
    }

    fn apply_optional(&mut self, edit: Option<FieldEdit>) -> bool {
        match edit {
            Some(edit) => {
                self.apply_edit(edit);
                true
            }
            None => false,
        }
    }

    /// Advances the session timer and starts an automatic save when one is
    /// due. Returns whether a save was started.
    pub fn tick(&mut self, delta: Duration) -> bool {
        self.session.timer.tick(delta);
        if !self.session.timer.should_autosave() || !self.state.is_idle() {
            return false;
        }
        match self.save_automatic() {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "autosave not started");
                false
            }
        }
    }

    #[instrument(skip_all)]
    pub fn save_automatic(&mut self) -> SaveResult<()> {
        self.ensure_ready()?;
        let cover = self.cover.capture();
        let slot = self.config.autosave_slot.clone();
        self.begin_open(Operation::SaveAutomatic, slot, cover);
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn save_manual(&mut self) -> SaveResult<()> {
        self.ensure_ready()?;
        let cover = self.cover.capture();
        self.begin_select(Operation::SaveManual, cover);
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn load_automatic(&mut self) -> SaveResult<()> {
        self.ensure_ready()?;
        let slot = self.config.autosave_slot.clone();
        self.begin_open(Operation::LoadAutomatic, slot, None);
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn load_manual(&mut self) -> SaveResult<()> {
        self.ensure_ready()?;
        self.begin_select(Operation::LoadManual, None);
        Ok(())
    }

    /// Drives the state machine with one completion.
    pub fn dispatch(&mut self, event: StorageEvent) -> Step {
        let state = mem::take(&mut self.state);
        match (state, event) {
            (SaveState::Authenticating, StorageEvent::Authenticated(ok)) => {
                self.on_authenticated(ok)
            }
            (SaveState::SelectingSlot { operation, cover }, StorageEvent::SlotSelected(result)) => {
                self.on_slot_selected(operation, cover, result)
            }
            (
                SaveState::OpeningSlot {
                    operation,
                    slot,
                    cover,
                },
                StorageEvent::SlotOpened(result),
            ) => self.on_slot_opened(operation, slot, cover, result),
            (SaveState::Writing { operation, slot }, StorageEvent::Committed(result)) => {
                self.on_committed(operation, slot, result)
            }
            (SaveState::Reading { operation, slot }, StorageEvent::BytesRead(result)) => {
                self.on_bytes_read(operation, slot, result)
            }
            (state, event) => {
                warn!(
                    state = state.label(),
                    event = ?event.kind(),
                    "dropping completion that does not match the pending request"
                );
                self.state = state;
                Step::Ignored
            }
        }
    }

    /// Feeds every ready completion through [`Self::dispatch`].
    pub fn pump(&mut self) -> Vec<Completion> {
        let mut finished = Vec::new();
        while let Some(event) = self.storage.poll_completion() {
            if let Step::Finished(completion) = self.dispatch(event) {
                finished.push(completion);
            }
        }
        finished
    }

    fn on_authenticated(&mut self, ok: bool) -> Step {
        self.session.timer.set_authenticated(ok);
        if !ok {
            return self.finish(Operation::SignIn, Err(SaveError::AuthenticationFailed));
        }
        let step = self.finish(Operation::SignIn, Ok(Success::SignedIn));
        if let Err(err) = self.load_automatic() {
            warn!(%err, "could not load the automatic slot after sign-in");
        }
        step
    }

    fn on_slot_selected(
        &mut self,
        operation: Operation,
        cover: Option<Vec<u8>>,
        result: Result<SlotSelection, RequestStatus>,
    ) -> Step {
        let selection = match result {
            Ok(selection) => selection,
            Err(status) => return self.finish(operation, Err(SaveError::SelectionFailed(status))),
        };
        let slot = match selection {
            SlotSelection::Existing(handle) => handle.name,
            SlotSelection::Create { .. } if !operation.is_save() => {
                return self.finish(
                    operation,
                    Err(SaveError::SelectionFailed(RequestStatus::BadInput)),
                );
            }
            SlotSelection::Create { name } => match name {
                Some(name) if !name.trim().is_empty() => name,
                _ => generate_slot_name(&self.config.manual_slot_prefix, self.clock.now()),
            },
        };
        self.begin_open(operation, slot, cover);
        Step::Pending
    }

    fn on_slot_opened(
        &mut self,
        operation: Operation,
        requested: String,
        cover: Option<Vec<u8>>,
        result: Result<SlotHandle, RequestStatus>,
    ) -> Step {
        let slot = match result {
            Ok(slot) => slot,
            Err(status) => {
                return self.finish(
                    operation,
                    Err(SaveError::SlotOpenFailed {
                        slot: requested,
                        status,
                    }),
                );
            }
        };
        if operation.is_save() {
            return self.begin_write(operation, slot, cover);
        }
        self.begin_read(operation, slot);
        Step::Pending
    }

    fn on_committed(
        &mut self,
        operation: Operation,
        slot: SlotHandle,
        result: Result<SlotHandle, RequestStatus>,
    ) -> Step {
        match result {
            Ok(committed) => {
                self.session.timer.on_save_completed();
                self.finish(operation, Ok(Success::Saved { slot: committed }))
            }
            Err(status) => self.finish(
                operation,
                Err(SaveError::CommitFailed {
                    slot: slot.name,
                    status,
                }),
            ),
        }
    }

    fn on_bytes_read(
        &mut self,
        operation: Operation,
        slot: SlotHandle,
        result: Result<Vec<u8>, RequestStatus>,
    ) -> Step {
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(status) => {
                return self.finish(
                    operation,
                    Err(SaveError::ReadFailed {
                        slot: slot.name,
                        status,
                    }),
                );
            }
        };
        let outcome = match codec::decode_into(&mut self.session.record, &bytes) {
            Ok(outcome) => outcome,
            Err(err) => return self.finish(operation, Err(err)),
        };
        let now = self.clock.now();
        self.session.timer.on_load_completed(now, slot.played_time);
        let success = match outcome {
            DecodeOutcome::Loaded => {
                self.session.timer.mark_clean();
                Success::Loaded { slot }
            }
            DecodeOutcome::NewSlot => Success::NewSlot { slot },
        };
        self.finish(operation, Ok(success))
    }

    fn begin_select(&mut self, operation: Operation, cover: Option<Vec<u8>>) {
        let request = if operation.is_save() {
            self.config.save_picker()
        } else {
            self.config.load_picker()
        };
        debug!(title = %request.title, ?operation, "presenting slot picker");
        self.state = SaveState::SelectingSlot { operation, cover };
        self.session.status.set("Selecting slot...");
        self.storage.present_slot_picker(request);
    }

    fn begin_open(&mut self, operation: Operation, slot: String, cover: Option<Vec<u8>>) {
        debug!(%slot, ?operation, "opening slot");
        self.session.status.set(format!("Opening {slot}..."));
        self.storage.open_slot(&slot, self.config.conflict_policy);
        self.state = SaveState::OpeningSlot {
            operation,
            slot,
            cover,
        };
    }

    fn begin_write(
        &mut self,
        operation: Operation,
        slot: SlotHandle,
        cover: Option<Vec<u8>>,
    ) -> Step {
        let now = self.clock.now();
        let bytes = match codec::encode(&self.session.record) {
            Ok(bytes) => bytes,
            Err(err) => return self.finish(operation, Err(err)),
        };
        let played_time = self.session.timer.played_time_at(now);
        let automatic = self.config.is_automatic_slot(&slot.name);

        let mut builder = MetadataUpdate::builder()
            .with_played_time(played_time)
            .with_description(write_description(automatic, now));
        match cover {
            Some(png) => {
                debug!(len = png.len(), "attaching cover image");
                builder = builder.with_cover_image(png);
            }
            None => debug!("no cover image available"),
        }

        self.session.status.set("Opened, writing...");
        info!(slot = %slot.name, bytes = bytes.len(), "writing slot");
        self.storage.commit(&slot, builder.build(), bytes);
        self.state = SaveState::Writing { operation, slot };
        Step::Pending
    }

    fn begin_read(&mut self, operation: Operation, slot: SlotHandle) {
        self.session.status.set("Opened, reading...");
        info!(slot = %slot.name, "reading slot");
        self.storage.read_bytes(&slot);
        self.state = SaveState::Reading { operation, slot };
    }

    fn finish(&mut self, operation: Operation, result: Result<Success, SaveError>) -> Step {
        self.state = SaveState::Idle;
        match &result {
            Ok(success) => {
                let message = match success {
                    Success::SignedIn => "Signed in".to_string(),
                    Success::Saved { slot } => format!("Game {} written!", slot.description),
                    Success::Loaded { .. } => "Loaded saved data".to_string(),
                    Success::NewSlot { .. } => "New saved file, no data".to_string(),
                };
                info!(?operation, "{message}");
                self.session.status.set(message);
            }
            Err(err @ (SaveError::UnsupportedVersion(_) | SaveError::MalformedPayload(_))) => {
                error!(?operation, %err, "stored data could not be decoded");
                self.session.status.set(err.to_string());
            }
            Err(err) => {
                warn!(?operation, %err, "request failed");
                self.session.status.set(err.to_string());
            }
        }
        Step::Finished(Completion { operation, result })
    }

    fn ensure_idle(&mut self) -> SaveResult<()> {
        if self.state.is_idle() {
            return Ok(());
        }
        let err = SaveError::Busy {
            pending: self.state.label(),
        };
        self.report_rejection(&err);
        Err(err)
    }

    fn ensure_ready(&mut self) -> SaveResult<()> {
        self.ensure_idle()?;
        if self.session.timer.is_authenticated() {
            return Ok(());
        }
        let err = SaveError::NotAuthenticated;
        self.report_rejection(&err);
        Err(err)
    }

    fn report_rejection(&mut self, err: &SaveError) {
        warn!(%err, "request rejected");
        self.session.status.set(err.to_string());
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn record(&self) -> &ApplicationRecord {
        &self.session.record
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.session.timer
    }

    pub fn status(&self) -> &str {
        self.session.status.message()
    }

    pub fn display_line(&self) -> String {
        self.session
            .status
            .display_line(self.session.timer.is_authenticated())
    }

    pub fn state(&self) -> &SaveState {
        &self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}
