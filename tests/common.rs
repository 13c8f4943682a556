#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use cloud_autosave::{
    encode, ApplicationRecord, Completion, ManualClock, MemoryStorage, Orchestrator, SaveConfig,
};

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).expect("valid timestamp")
}

/// An orchestrator over in-memory storage, with a clock the test controls.
pub struct Harness {
    pub orchestrator: Orchestrator<MemoryStorage>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new(config: SaveConfig) -> Self {
        let clock = ManualClock::new(start_time());
        let storage = MemoryStorage::new(clock.clone());
        Self {
            orchestrator: Orchestrator::new(storage, config, clock.clone()),
            clock,
        }
    }

    /// Signs in and drains the automatic load that follows.
    pub fn signed_in(config: SaveConfig) -> Self {
        let mut harness = Self::new(config);
        harness.orchestrator.sign_in().expect("sign in");
        let completions = harness.orchestrator.pump();
        assert_eq!(completions.len(), 2, "sign-in then autoload");
        harness
    }

    pub fn storage(&mut self) -> &mut MemoryStorage {
        self.orchestrator.storage_mut()
    }

    pub fn pump_one(&mut self) -> Completion {
        let mut completions = self.orchestrator.pump();
        assert_eq!(completions.len(), 1, "expected exactly one completion");
        completions.remove(0)
    }

    pub fn seed(&mut self, slot: &str, played: Duration, record: &ApplicationRecord) {
        self.storage().seed_slot(slot, played, encode(record).expect("encode"));
    }
}

pub fn sample_record() -> ApplicationRecord {
    ApplicationRecord::new(3.5, "hello", 7)
}
