//! End-to-end duplicate workflow tests.
//!
//! Drives `DuplicateManager` through scan, review, merge and dismiss against
//! real `SQLite` databases:
//! - Reference scenarios (name + phone, organization only)
//! - Merge union and inheritance rules
//! - Dismissal lifecycle and resurfacing
//! - Persistence across restarts
//! - Concurrent merges and the contact-set watcher

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::NaiveDate;
use contact_dedup::models::{
    Contact, ContactEvent, ContactId, DuplicateMatchReason, SeverityBand, SuggestionStatus,
};
use contact_dedup::observability::EventBus;
use contact_dedup::{
    AppConfig, ContactRepository, DismissalPolicy, DuplicateManager, Error, LabeledValue,
    StorageFactory, SuggestionId, SuggestionStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn in_memory_manager(config: &AppConfig) -> DuplicateManager {
    let handles = StorageFactory::create_in_memory(config).unwrap();
    DuplicateManager::from_handles(handles, config, EventBus::new(64))
}

fn on_disk_config(dir: &TempDir) -> AppConfig {
    AppConfig::default().with_data_dir(dir.path())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn anna_pair() -> Vec<Contact> {
    vec![
        Contact::new("Anna", "Larsson")
            .with_id("anna-1")
            .with_phone("mobile", "070-1234567"),
        Contact::new("Anna", "Larsson")
            .with_id("anna-2")
            .with_phone("mobile", "070-1234567")
            .with_email("home", "anna@x.com"),
    ]
}

// ============================================================================
// Reference Scenarios
// ============================================================================

#[test]
fn test_same_name_and_phone_is_one_high_suggestion() {
    let manager = in_memory_manager(&AppConfig::default());
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();

    let pending = manager.load_pending_suggestions().unwrap();
    assert_eq!(pending.len(), 1);
    let suggestion = &pending[0];
    assert!(suggestion.score >= 80);
    assert_eq!(suggestion.severity(), SeverityBand::High);
    assert!(suggestion.match_reasons.contains(&DuplicateMatchReason::SameName));
    assert!(suggestion.match_reasons.contains(&DuplicateMatchReason::Phone));
}

#[test]
fn test_shared_organization_alone_is_not_a_duplicate() {
    let manager = in_memory_manager(&AppConfig::default());
    manager
        .import_contacts(&[
            Contact::new("Anna", "Larsson")
                .with_id("a")
                .with_organization("Acme AB")
                .with_phone("mobile", "070-1111111")
                .with_email("work", "anna@acme.se"),
            Contact::new("Erik", "Holm")
                .with_id("b")
                .with_organization("Acme AB")
                .with_phone("mobile", "073-9999999")
                .with_email("work", "erik@acme.se"),
        ])
        .unwrap();

    let report = manager.scan_for_duplicates().unwrap();
    assert_eq!(report.detected, 0);
    assert!(manager.load_pending_suggestions().unwrap().is_empty());
}

#[test]
fn test_empty_contact_book_scans_cleanly() {
    let manager = in_memory_manager(&AppConfig::default());
    let report = manager.scan_for_duplicates().unwrap();
    assert_eq!(report.contacts, 0);
    assert_eq!(report.pending, 0);
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn test_merge_unions_phones_and_deletes_secondary() {
    let manager = in_memory_manager(&AppConfig::default());
    manager
        .import_contacts(&[
            Contact::new("Anna", "Larsson")
                .with_id("p")
                .with_phone("mobile", "070-1111111")
                .with_phone("home", "08-2222222"),
            Contact::new("Anna", "Larsson")
                .with_id("s")
                .with_phone("home", "08-2222222")
                .with_phone("work", "08-3333333"),
        ])
        .unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);

    let primary = ContactId::new("p");
    let secondary = ContactId::new("s");
    let merged = manager
        .merge_contacts(&primary, &secondary, &suggestion.id)
        .unwrap();

    let values: Vec<&str> = merged.phones.iter().map(|p| p.value.as_str()).collect();
    assert_eq!(values, vec!["070-1111111", "08-2222222", "08-3333333"]);
    assert!(manager.contacts().get(&secondary).unwrap().is_none());
    assert_eq!(
        manager.contacts().get(&primary).unwrap().unwrap().phones.len(),
        3
    );
}

#[test]
fn test_merge_birthday_inheritance() {
    let d = date(1990, 4, 12);
    let manager = in_memory_manager(&AppConfig::default());
    manager
        .import_contacts(&[
            Contact::new("Anna", "Larsson")
                .with_id("p")
                .with_email("home", "anna@x.com"),
            Contact::new("Anna", "Larsson")
                .with_id("s")
                .with_email("home", "ANNA@x.com")
                .with_birthday(d)
                .with_image(vec![0xff, 0xd8, 0xff]),
        ])
        .unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);

    let merged = manager
        .merge_contacts(&ContactId::new("p"), &ContactId::new("s"), &suggestion.id)
        .unwrap();
    assert_eq!(merged.birthday, Some(d));
    assert!(merged.has_photo());
    assert_eq!(merged.emails.len(), 1);
}

#[test]
fn test_merge_keeps_primary_birthday() {
    let d1 = date(1990, 4, 12);
    let d2 = date(1985, 1, 2);
    let manager = in_memory_manager(&AppConfig::default());
    manager
        .import_contacts(&[
            Contact::new("Anna", "Larsson")
                .with_id("p")
                .with_phone("m", "0701234567")
                .with_birthday(d1),
            Contact::new("Anna", "Larsson")
                .with_id("s")
                .with_phone("m", "0701234567")
                .with_birthday(d2),
        ])
        .unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);

    let merged = manager
        .merge_contacts(&ContactId::new("p"), &ContactId::new("s"), &suggestion.id)
        .unwrap();
    assert_eq!(merged.birthday, Some(d1));
}

#[test]
fn test_merge_marks_suggestion_merged_and_hides_it() {
    let manager = in_memory_manager(&AppConfig::default());
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);

    manager.merge_suggestion(&suggestion.id, None).unwrap();

    let stored = manager.suggestions().get(&suggestion.id).unwrap().unwrap();
    assert_eq!(stored.status, SuggestionStatus::Merged);
    assert!(manager.load_pending_suggestions().unwrap().is_empty());

    // A rescan of the surviving contact never reopens the merged pair.
    manager.scan_for_duplicates().unwrap();
    assert_eq!(manager.pending_count().unwrap(), 0);
}

#[test]
fn test_merge_self_is_rejected_before_mutation() {
    let manager = in_memory_manager(&AppConfig::default());
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);

    let id = ContactId::new("anna-1");
    let err = manager.merge_contacts(&id, &id, &suggestion.id).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(manager.contacts().count().unwrap(), 2);
    assert_eq!(manager.pending_count().unwrap(), 1);
}

#[test]
fn test_merge_after_contact_deleted_fails_without_changes() {
    let manager = in_memory_manager(&AppConfig::default());
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);

    manager.contacts().delete(&ContactId::new("anna-2")).unwrap();
    let err = manager
        .merge_contacts(
            &ContactId::new("anna-1"),
            &ContactId::new("anna-2"),
            &suggestion.id,
        )
        .unwrap_err();
    assert!(err.is_not_found());

    let survivor = manager
        .contacts()
        .get(&ContactId::new("anna-1"))
        .unwrap()
        .unwrap();
    assert!(survivor.emails.is_empty());
}

#[test]
fn test_concurrent_merges_of_same_pair() {
    let manager = Arc::new(in_memory_manager(&AppConfig::default()));
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let id = suggestion.id.clone();
            std::thread::spawn(move || manager.merge_suggestion(&id, None))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(
            matches!(err, Error::Conflict(_) | Error::NotFound { .. }),
            "unexpected error: {err}"
        );
    }
    assert_eq!(manager.contacts().count().unwrap(), 1);
}

// ============================================================================
// Dismissal
// ============================================================================

#[test]
fn test_dismiss_is_idempotent() {
    let manager = in_memory_manager(&AppConfig::default());
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);

    assert!(manager.dismiss_suggestion(&suggestion.id).unwrap());
    assert!(!manager.dismiss_suggestion(&suggestion.id).unwrap());
    assert_eq!(
        manager.suggestions().get(&suggestion.id).unwrap().unwrap().status,
        SuggestionStatus::Dismissed
    );
    assert_eq!(manager.pending_count().unwrap(), 0);
}

#[test]
fn test_dismiss_unknown_is_not_found() {
    let manager = in_memory_manager(&AppConfig::default());
    let err = manager
        .dismiss_suggestion(&SuggestionId::new("missing"))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_dismissed_pair_resurfaces_only_after_material_change() {
    let manager = in_memory_manager(&AppConfig::default());
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);
    manager.dismiss_suggestion(&suggestion.id).unwrap();

    let report = manager.scan_for_duplicates().unwrap();
    assert_eq!(report.recorded.suppressed, 1);
    assert_eq!(report.pending, 0);

    let mut edited = manager
        .contacts()
        .get(&ContactId::new("anna-1"))
        .unwrap()
        .unwrap();
    edited.emails.push(LabeledValue::new("home", "anna@x.com"));
    manager.contacts().update(&edited).unwrap();

    let report = manager.scan_for_duplicates().unwrap();
    assert_eq!(report.recorded.resurfaced, 1);
    let pending = manager.load_pending_suggestions().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, suggestion.id);
    assert!(pending[0].match_reasons.contains(&DuplicateMatchReason::Email));
}

#[test]
fn test_permanent_dismissal_policy() {
    let config = AppConfig::default().with_dismissal(DismissalPolicy {
        resurface_on_change: false,
    });
    let manager = in_memory_manager(&config);
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();
    let suggestion = manager.load_pending_suggestions().unwrap().remove(0);
    manager.dismiss_suggestion(&suggestion.id).unwrap();

    let mut edited = manager
        .contacts()
        .get(&ContactId::new("anna-1"))
        .unwrap()
        .unwrap();
    edited.emails.push(LabeledValue::new("home", "anna@x.com"));
    manager.contacts().update(&edited).unwrap();

    manager.scan_for_duplicates().unwrap();
    assert_eq!(manager.pending_count().unwrap(), 0);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_suggestion_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = on_disk_config(&dir);

    let dismissed_id = {
        let manager = DuplicateManager::open(&config).unwrap();
        let mut contacts = anna_pair();
        contacts.push(Contact::new("Erik", "Holm").with_id("erik-1").with_email("h", "erik@y.se"));
        contacts.push(Contact::new("Eric", "Holm").with_id("erik-2").with_email("w", "erik@y.se"));
        manager.import_contacts(&contacts).unwrap();
        manager.scan_for_duplicates().unwrap();

        let pending = manager.load_pending_suggestions().unwrap();
        assert_eq!(pending.len(), 2);
        let erik = pending
            .iter()
            .find(|s| s.involves(&ContactId::new("erik-1")))
            .unwrap();
        manager.dismiss_suggestion(&erik.id).unwrap();
        erik.id.clone()
    };

    let manager = DuplicateManager::open(&config).unwrap();
    assert_eq!(manager.contacts().count().unwrap(), 4);
    let pending = manager.load_pending_suggestions().unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].involves(&ContactId::new("anna-1")));
    assert_eq!(
        manager.suggestions().get(&dismissed_id).unwrap().unwrap().status,
        SuggestionStatus::Dismissed
    );

    manager.scan_for_duplicates().unwrap();
    assert_eq!(manager.pending_count().unwrap(), 1);
}

// ============================================================================
// Watcher
// ============================================================================

#[tokio::test]
async fn test_watcher_rescans_on_count_change() {
    let manager = Arc::new(in_memory_manager(&AppConfig::default()));
    let (mut pending_rx, _handle) = manager.spawn_watcher();
    assert!(pending_rx.borrow().is_empty());

    manager.import_contacts(&anna_pair()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), pending_rx.changed())
        .await
        .expect("watcher should publish after a count change")
        .unwrap();
    assert_eq!(pending_rx.borrow_and_update().len(), 1);

    // Same count again: no rescan, nothing published.
    manager.events().publish(ContactEvent::contact_set_changed(2));
    let unchanged = tokio::time::timeout(Duration::from_millis(200), pending_rx.changed()).await;
    assert!(unchanged.is_err());
}

#[tokio::test]
async fn test_watcher_clears_pending_after_merge() {
    let manager = Arc::new(in_memory_manager(&AppConfig::default()));
    manager.import_contacts(&anna_pair()).unwrap();
    manager.scan_for_duplicates().unwrap();

    let (mut pending_rx, _handle) = manager.spawn_watcher();
    assert_eq!(pending_rx.borrow().len(), 1);
    let id = pending_rx.borrow()[0].id.clone();

    manager.merge_suggestion(&id, None).unwrap();
    tokio::time::timeout(Duration::from_secs(5), pending_rx.changed())
        .await
        .expect("watcher should publish after a merge")
        .unwrap();
    assert!(pending_rx.borrow().is_empty());
}
