//! Slot identity, metadata updates and conflict policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resolved, opened slot as reported by the storage collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotHandle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub played_time: Duration,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl SlotHandle {
    /// A slot that has never been written.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            played_time: Duration::ZERO,
            last_modified: None,
        }
    }

    /// Applies a committed metadata update.
    pub fn apply(&mut self, update: &MetadataUpdate, committed_at: DateTime<Utc>) {
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(played_time) = update.played_time {
            self.played_time = played_time;
        }
        self.last_modified = Some(committed_at);
    }
}

/// Metadata written alongside the bytes of one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub description: Option<String>,
    pub played_time: Option<Duration>,
    pub cover_image: Option<Vec<u8>>,
}

impl MetadataUpdate {
    pub fn builder() -> MetadataUpdateBuilder {
        MetadataUpdateBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct MetadataUpdateBuilder {
    update: MetadataUpdate,
}

impl MetadataUpdateBuilder {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.update.description = Some(description.into());
        self
    }

    pub fn with_played_time(mut self, played_time: Duration) -> Self {
        self.update.played_time = Some(played_time);
        self
    }

    pub fn with_cover_image(mut self, png: Vec<u8>) -> Self {
        self.update.cover_image = Some(png);
        self
    }

    pub fn build(self) -> MetadataUpdate {
        self.update
    }
}

/// How the collaborator reconciles divergent revisions of one slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    LongestPlaytime,
    MostRecentlySaved,
    Original,
    Unmerged,
}

/// Picks the surviving revision. Ties keep `original`.
pub fn resolve_conflict<T>(
    policy: ConflictPolicy,
    original: (SlotHandle, T),
    unmerged: (SlotHandle, T),
) -> (SlotHandle, T) {
    let take_unmerged = match policy {
        ConflictPolicy::LongestPlaytime => unmerged.0.played_time > original.0.played_time,
        ConflictPolicy::MostRecentlySaved => unmerged.0.last_modified > original.0.last_modified,
        ConflictPolicy::Original => false,
        ConflictPolicy::Unmerged => true,
    };
    if take_unmerged {
        unmerged
    } else {
        original
    }
}

/// Parameters for the collaborator's slot picker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickerRequest {
    pub title: String,
    pub max_slots: u32,
    pub allow_create: bool,
    pub allow_delete: bool,
}

/// What the user picked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotSelection {
    Existing(SlotHandle),
    /// A new slot; `None` or a blank name asks for a generated one.
    Create { name: Option<String> },
}

/// `<prefix>-<YYYYMMDDHHMMSS><nanoseconds>`, unique per clock reading.
pub fn generate_slot_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}-{}", now.format("%Y%m%d%H%M%S%f"))
}

pub fn write_description(is_automatic: bool, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y-%m-%d %H:%M:%S UTC");
    if is_automatic {
        format!("Autosaved at {stamp}")
    } else {
        format!("Saved game at {stamp}")
    }
}
