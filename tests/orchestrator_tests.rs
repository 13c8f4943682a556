mod common;

use std::time::Duration;

use cloud_autosave::{
    decode, encode, ApplicationRecord, ConflictPolicy, Decoded, ManualClock, MemoryStorage,
    Operation, Orchestrator, RequestKind, RequestStatus, SaveConfig, SaveError, SaveState,
    SaveStorage, SlotHandle, SlotSelection, Step, StorageEvent, StoredSlot, Success,
};
use common::{sample_record, Harness};

fn stored_record(harness: &mut Harness, slot: &str) -> ApplicationRecord {
    let bytes = harness
        .storage()
        .slot(slot)
        .expect("slot should exist")
        .bytes
        .clone();
    match decode(&bytes).expect("stored bytes decode") {
        Decoded::Record(record) => record,
        Decoded::NewSlot => panic!("slot {slot} was never written"),
    }
}

fn saved_slot(result: Result<Success, SaveError>) -> SlotHandle {
    match result {
        Ok(Success::Saved { slot }) => slot,
        other => panic!("expected a save, got {other:?}"),
    }
}

#[test]
fn sign_in_loads_automatic_slot() {
    let mut harness = Harness::new(SaveConfig::default());
    harness.seed("AutoSave", Duration::from_secs(600), &sample_record());

    harness.orchestrator.sign_in().expect("sign in");
    let completions = harness.orchestrator.pump();

    assert_eq!(completions.len(), 2);
    assert_eq!(completions[0].operation, Operation::SignIn);
    assert_eq!(completions[0].result, Ok(Success::SignedIn));
    assert_eq!(completions[1].operation, Operation::LoadAutomatic);
    assert!(matches!(
        completions[1].result,
        Ok(Success::Loaded { .. })
    ));

    let orchestrator = &harness.orchestrator;
    assert_eq!(orchestrator.record(), &sample_record());
    assert_eq!(orchestrator.timer().played_at_load(), Duration::from_secs(600));
    assert!(!orchestrator.timer().is_dirty());
    assert_eq!(
        orchestrator.display_line(),
        "Authenticated Loaded saved data"
    );
}

#[test]
fn first_run_reports_new_slot() {
    let mut harness = Harness::new(SaveConfig::default());
    harness.orchestrator.set_counter(4);

    harness.orchestrator.sign_in().expect("sign in");
    let completions = harness.orchestrator.pump();

    assert!(matches!(
        completions[1].result,
        Ok(Success::NewSlot { .. })
    ));
    assert_eq!(harness.orchestrator.record().counter, 4);
    assert!(harness.orchestrator.timer().is_dirty());
    assert_eq!(harness.orchestrator.status(), "New saved file, no data");
}

#[test]
fn failed_sign_in_is_reported() {
    let mut harness = Harness::new(SaveConfig::default());
    harness.storage().set_auth_result(false);

    harness.orchestrator.sign_in().expect("request issued");
    let completions = harness.orchestrator.pump();

    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].result, Err(SaveError::AuthenticationFailed));
    assert!(!harness.orchestrator.timer().is_authenticated());
    assert_eq!(
        harness.orchestrator.display_line(),
        "Not Authenticated authentication failed"
    );
}

#[test]
fn autosave_waits_for_interval_then_writes() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.set_numeric_value(3.5);
    harness.orchestrator.set_message("hello");
    harness.orchestrator.set_counter(7);

    assert!(!harness.orchestrator.tick(Duration::from_secs(29)));
    assert!(harness.orchestrator.state().is_idle());

    assert!(harness.orchestrator.tick(Duration::from_secs(2)));
    assert_eq!(harness.orchestrator.state().label(), "opening slot");

    let completion = harness.pump_one();
    assert_eq!(completion.operation, Operation::SaveAutomatic);
    let slot = saved_slot(completion.result);
    assert_eq!(slot.name, "AutoSave");
    assert!(slot.description.starts_with("Autosaved at"));

    assert_eq!(stored_record(&mut harness, "AutoSave"), sample_record());
    assert!(!harness.orchestrator.timer().is_dirty());
    assert_eq!(
        harness.orchestrator.timer().since_autosave(),
        Duration::ZERO
    );
    assert_eq!(
        harness.orchestrator.status(),
        format!("Game {} written!", slot.description)
    );
}

#[test]
fn clean_session_never_autosaves() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    assert!(!harness.orchestrator.tick(Duration::from_secs(120)));
    assert!(harness.orchestrator.state().is_idle());
}

#[test]
fn signed_out_session_never_autosaves() {
    let mut harness = Harness::new(SaveConfig::default());
    harness.orchestrator.set_counter(1);
    assert!(!harness.orchestrator.tick(Duration::from_secs(120)));
    assert_eq!(
        harness.orchestrator.save_automatic(),
        Err(SaveError::NotAuthenticated)
    );
}

#[test]
fn commit_failure_leaves_record_and_timer_untouched() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.set_message("unsaved");
    harness.orchestrator.tick(Duration::from_secs(5));
    harness.clock.advance(Duration::from_secs(5));
    let record_before = harness.orchestrator.record().clone();
    let timer_before = harness.orchestrator.timer().clone();

    harness
        .storage()
        .fail_next(RequestKind::Commit, RequestStatus::Timeout);
    harness.orchestrator.save_automatic().expect("request issued");
    let completion = harness.pump_one();

    assert_eq!(
        completion.result,
        Err(SaveError::CommitFailed {
            slot: "AutoSave".to_string(),
            status: RequestStatus::Timeout,
        })
    );
    assert_eq!(harness.orchestrator.record(), &record_before);
    assert_eq!(harness.orchestrator.timer(), &timer_before);
    assert!(harness.orchestrator.status().contains("TimeoutError (-1)"));
    assert!(harness.orchestrator.state().is_idle());
}

#[test]
fn open_failure_is_reported_with_slot_name() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness
        .storage()
        .fail_next(RequestKind::OpenSlot, RequestStatus::Internal);

    harness.orchestrator.save_automatic().expect("request issued");
    let completion = harness.pump_one();

    assert_eq!(
        completion.result,
        Err(SaveError::SlotOpenFailed {
            slot: "AutoSave".to_string(),
            status: RequestStatus::Internal,
        })
    );
    assert_eq!(
        harness.orchestrator.status(),
        "error opening slot 'AutoSave': InternalError (-2)"
    );
}

#[test]
fn played_time_grows_by_session_span() {
    let mut harness = Harness::new(SaveConfig::default());
    harness.seed("AutoSave", Duration::from_secs(100), &sample_record());
    harness.orchestrator.sign_in().expect("sign in");
    harness.orchestrator.pump();

    harness.clock.advance(Duration::from_secs(50));
    harness.orchestrator.set_counter(8);
    harness.orchestrator.save_automatic().expect("save");
    let slot = saved_slot(harness.pump_one().result);
    assert_eq!(slot.played_time, Duration::from_secs(150));

    harness.clock.advance(Duration::from_secs(25));
    harness.orchestrator.save_automatic().expect("save again");
    let slot = saved_slot(harness.pump_one().result);
    assert_eq!(slot.played_time, Duration::from_secs(175));
}

#[test]
fn cover_image_is_attached_when_capture_succeeds() {
    let clock = ManualClock::new(common::start_time());
    let storage = MemoryStorage::new(clock.clone());
    let mut orchestrator = Orchestrator::new(storage, SaveConfig::default(), clock)
        .with_cover_capture(|| Some(vec![0x89, b'P', b'N', b'G']));
    orchestrator.sign_in().expect("sign in");
    orchestrator.pump();

    orchestrator.save_automatic().expect("save");
    let completions = orchestrator.pump();
    assert_eq!(completions.len(), 1);

    let stored = orchestrator.storage().slot("AutoSave").expect("slot");
    assert_eq!(stored.cover_image, Some(vec![0x89, b'P', b'N', b'G']));
}

#[test]
fn failed_capture_still_saves_without_cover() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.set_counter(2);

    harness.orchestrator.save_automatic().expect("save");
    saved_slot(harness.pump_one().result);

    let stored = harness.storage().slot("AutoSave").expect("slot");
    assert_eq!(stored.cover_image, None);
    assert_eq!(stored_record(&mut harness, "AutoSave").counter, 2);
}

#[test]
fn manual_save_without_name_generates_one() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.set_message("manual");
    harness
        .storage()
        .queue_selection(Ok(SlotSelection::Create { name: None }));

    harness.orchestrator.save_manual().expect("save manual");
    let completion = harness.pump_one();

    assert_eq!(completion.operation, Operation::SaveManual);
    let slot = saved_slot(completion.result);
    assert!(slot.name.starts_with("Save-"), "got {}", slot.name);
    assert!(slot.description.starts_with("Saved game at"));
    assert_eq!(stored_record(&mut harness, &slot.name).message, "manual");

    let picker = &harness.storage().picker_requests()[0];
    assert!(picker.allow_create);
    assert_eq!(picker.max_slots, 4);
}

#[test]
fn generated_names_one_tick_apart_do_not_collide() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    let mut names = Vec::new();
    for _ in 0..2 {
        harness
            .storage()
            .queue_selection(Ok(SlotSelection::Create {
                name: Some("   ".to_string()),
            }));
        harness.orchestrator.save_manual().expect("save manual");
        names.push(saved_slot(harness.pump_one().result).name);
        harness.clock.advance(Duration::from_nanos(1));
    }
    assert_ne!(names[0], names[1]);
    assert!(harness.storage().slot(&names[0]).is_some());
    assert!(harness.storage().slot(&names[1]).is_some());
}

#[test]
fn manual_save_to_named_slot() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.set_counter(99);
    harness
        .storage()
        .queue_selection(Ok(SlotSelection::Create {
            name: Some("Checkpoint".to_string()),
        }));

    harness.orchestrator.save_manual().expect("save manual");
    let slot = saved_slot(harness.pump_one().result);

    assert_eq!(slot.name, "Checkpoint");
    assert_eq!(stored_record(&mut harness, "Checkpoint").counter, 99);
}

#[test]
fn manual_save_onto_automatic_slot_reads_as_autosave() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness
        .storage()
        .queue_selection(Ok(SlotSelection::Existing(SlotHandle::new("AutoSave"))));

    harness.orchestrator.save_manual().expect("save manual");
    let slot = saved_slot(harness.pump_one().result);

    assert!(slot.description.starts_with("Autosaved at"));
}

#[test]
fn manual_load_reads_selected_slot() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    let checkpoint = ApplicationRecord::new(-2.0, "from checkpoint", 12);
    harness.seed("Checkpoint", Duration::from_secs(30), &checkpoint);
    harness
        .storage()
        .queue_selection(Ok(SlotSelection::Existing(SlotHandle::new("Checkpoint"))));

    harness.orchestrator.load_manual().expect("load manual");
    let completion = harness.pump_one();

    assert_eq!(completion.operation, Operation::LoadManual);
    assert!(matches!(completion.result, Ok(Success::Loaded { .. })));
    assert_eq!(harness.orchestrator.record(), &checkpoint);
    assert_eq!(
        harness.orchestrator.timer().played_at_load(),
        Duration::from_secs(30)
    );
    assert!(!harness.storage().picker_requests()[0].allow_create);
}

#[test]
fn create_request_while_loading_is_rejected() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness
        .storage()
        .queue_selection(Ok(SlotSelection::Create { name: None }));

    harness.orchestrator.load_manual().expect("load manual");
    let completion = harness.pump_one();

    assert_eq!(
        completion.result,
        Err(SaveError::SelectionFailed(RequestStatus::BadInput))
    );
}

#[test]
fn closed_picker_is_a_selection_failure() {
    let mut harness = Harness::signed_in(SaveConfig::default());

    harness.orchestrator.save_manual().expect("save manual");
    let completion = harness.pump_one();

    assert_eq!(
        completion.result,
        Err(SaveError::SelectionFailed(RequestStatus::UserClosedUi))
    );
    assert!(harness.orchestrator.state().is_idle());
}

#[test]
fn unknown_version_leaves_record_alone() {
    let mut harness = Harness::new(SaveConfig::default());
    let mut bytes = encode(&sample_record()).expect("encode");
    bytes[0..2].copy_from_slice(b"V9");
    harness
        .storage()
        .seed_slot("AutoSave", Duration::from_secs(77), bytes);
    harness.orchestrator.set_counter(5);

    harness.orchestrator.sign_in().expect("sign in");
    let completions = harness.orchestrator.pump();

    assert_eq!(
        completions[1].result,
        Err(SaveError::UnsupportedVersion("V9".to_string()))
    );
    assert_eq!(
        harness.orchestrator.record(),
        &ApplicationRecord::new(0.0, "", 5)
    );
    assert_eq!(harness.orchestrator.timer().played_at_load(), Duration::ZERO);
    assert!(harness.orchestrator.status().contains("V9"));
}

#[test]
fn read_failure_leaves_record_alone() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.set_counter(3);
    harness.seed("Checkpoint", Duration::ZERO, &sample_record());
    harness
        .storage()
        .queue_selection(Ok(SlotSelection::Existing(SlotHandle::new("Checkpoint"))));
    harness
        .storage()
        .fail_next(RequestKind::ReadBytes, RequestStatus::Timeout);

    harness.orchestrator.load_manual().expect("load manual");
    let completion = harness.pump_one();

    assert_eq!(
        completion.result,
        Err(SaveError::ReadFailed {
            slot: "Checkpoint".to_string(),
            status: RequestStatus::Timeout,
        })
    );
    assert_eq!(harness.orchestrator.record().counter, 3);
}

#[test]
fn overlapping_requests_are_rejected() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.set_counter(1);

    harness.orchestrator.save_automatic().expect("first save");
    assert_eq!(
        harness.orchestrator.save_manual(),
        Err(SaveError::Busy {
            pending: "opening slot"
        })
    );
    assert_eq!(
        harness.orchestrator.load_automatic(),
        Err(SaveError::Busy {
            pending: "opening slot"
        })
    );
    assert!(!harness.orchestrator.tick(Duration::from_secs(60)));

    let completion = harness.pump_one();
    assert_eq!(completion.operation, Operation::SaveAutomatic);
    saved_slot(completion.result);
}

#[test]
fn stray_completion_is_ignored() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    let step = harness
        .orchestrator
        .dispatch(StorageEvent::Committed(Ok(SlotHandle::new("AutoSave"))));
    assert_eq!(step, Step::Ignored);
    assert_eq!(harness.orchestrator.state(), &SaveState::Idle);
}

#[test]
fn dispatch_walks_states_one_event_at_a_time() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.set_counter(11);
    harness.orchestrator.save_automatic().expect("save");

    let opened = harness.storage().poll_completion().expect("completion queued");
    assert_eq!(harness.orchestrator.dispatch(opened), Step::Pending);
    assert_eq!(harness.orchestrator.state().label(), "writing");

    let committed = harness.storage().poll_completion().expect("completion queued");
    match harness.orchestrator.dispatch(committed) {
        Step::Finished(completion) => saved_slot(completion.result),
        other => panic!("expected completion, got {other:?}"),
    };
    assert!(harness.orchestrator.state().is_idle());
}

#[test]
fn text_edits_follow_widget_rules() {
    let mut harness = Harness::signed_in(SaveConfig::default());

    assert_eq!(harness.orchestrator.edit_numeric_text(""), Ok(false));
    assert!(!harness.orchestrator.timer().is_dirty());

    let err = harness
        .orchestrator
        .edit_counter_text("seven")
        .expect_err("not an integer");
    assert!(matches!(err, SaveError::InvalidFieldInput { .. }));
    assert!(harness.orchestrator.status().contains("invalid counter input"));
    assert!(!harness.orchestrator.timer().is_dirty());

    assert_eq!(harness.orchestrator.edit_numeric_text("2.5"), Ok(true));
    harness.orchestrator.edit_message_text("a|b");
    assert_eq!(harness.orchestrator.record().numeric_value, 2.5);
    assert_eq!(harness.orchestrator.record().message, "a|b");
    assert!(harness.orchestrator.timer().is_dirty());
}

#[test]
fn sign_out_blocks_storage_requests() {
    let mut harness = Harness::signed_in(SaveConfig::default());
    harness.orchestrator.sign_out().expect("sign out");

    assert!(!harness.storage().is_signed_in());
    assert_eq!(
        harness.orchestrator.load_manual(),
        Err(SaveError::NotAuthenticated)
    );
    assert_eq!(
        harness.orchestrator.display_line(),
        "Not Authenticated not signed in"
    );

    let session = harness.orchestrator.session();
    assert!(!session.timer().is_authenticated());
    assert_eq!(session.status().message(), "not signed in");
    assert_eq!(session.record(), &ApplicationRecord::default());
}

#[test]
fn conflicts_resolve_to_longest_playtime() {
    let mut harness = Harness::new(SaveConfig::default());
    harness.seed("AutoSave", Duration::from_secs(100), &sample_record());
    let mut longer = SlotHandle::new("AutoSave");
    longer.played_time = Duration::from_secs(500);
    let other = ApplicationRecord::new(1.0, "from another device", 1);
    harness
        .storage()
        .inject_conflict(
            "AutoSave",
            StoredSlot::new(longer, encode(&other).expect("encode")),
        );

    harness.orchestrator.sign_in().expect("sign in");
    harness.orchestrator.pump();

    assert_eq!(harness.orchestrator.record(), &other);
    assert_eq!(
        harness.orchestrator.timer().played_at_load(),
        Duration::from_secs(500)
    );
}

#[test]
fn conflict_policy_comes_from_config() {
    let config = SaveConfig {
        conflict_policy: ConflictPolicy::Original,
        ..SaveConfig::default()
    };
    let mut harness = Harness::new(config);
    harness.seed("AutoSave", Duration::from_secs(100), &sample_record());
    let mut longer = SlotHandle::new("AutoSave");
    longer.played_time = Duration::from_secs(500);
    harness.storage().inject_conflict(
        "AutoSave",
        StoredSlot::new(longer, encode(&ApplicationRecord::default()).expect("encode")),
    );

    harness.orchestrator.sign_in().expect("sign in");
    harness.orchestrator.pump();

    assert_eq!(harness.orchestrator.record(), &sample_record());
}
