use file_types::release::ReleaseFiles;
use time::macros::datetime;

use super::*;

fn temp_store() -> ReleaseStore {
    let dir = tempfile::tempdir().unwrap().into_path();
    ReleaseStore::open(dir, 10 * 1024 * 1024, datetime!(2024-01-01 0:00 UTC)).unwrap()
}

#[test]
fn opening_an_empty_store_bootstraps_a_created_release() {
    let store = temp_store();
    let active = store.get_active_release().unwrap().unwrap();
    assert_eq!(active.phase, ReleasePhase::Created);
}

#[test]
fn calculating_is_reachable_from_created() {
    let store = temp_store();
    let result = store.begin_calculating_active_release().unwrap();
    assert!(result.updated);
    assert_eq!(result.release.phase, ReleasePhase::Calculating);
    assert_eq!(result.previous_phase, ReleasePhase::Created);
}

#[test]
fn begin_calculating_twice_in_a_row_is_refused_without_erroring() {
    let store = temp_store();
    store.begin_calculating_active_release().unwrap();
    let second = store.begin_calculating_active_release().unwrap();
    assert!(!second.updated);
    assert_eq!(second.release.phase, ReleasePhase::Calculating);
}

#[test]
fn finish_calculating_stamps_calculated_at_and_advances_phase() {
    let store = temp_store();
    store.begin_calculating_active_release().unwrap();
    let release = store.finish_calculating_active_release(datetime!(2024-01-02 0:00 UTC)).unwrap();
    assert_eq!(release.phase, ReleasePhase::Calculated);
    assert!(release.calculated_at.is_some());
}

#[test]
fn finish_calculating_outside_calculating_is_a_state_conflict() {
    let store = temp_store();
    let err = store.finish_calculating_active_release(datetime!(2024-01-02 0:00 UTC)).unwrap_err();
    assert_eq!(err.code, Code::StateConflict);
}

#[test]
fn error_during_calculating_maps_to_error_calculate() {
    let store = temp_store();
    store.begin_calculating_active_release().unwrap();
    let release = store.set_active_release_error("upstream exploded").unwrap();
    assert_eq!(release.phase, ReleasePhase::ErrorCalculate);
    assert_eq!(release.error.as_deref(), Some("upstream exploded"));
}

#[test]
fn error_outside_an_ing_phase_is_rejected() {
    let store = temp_store();
    let err = store.set_active_release_error("nope").unwrap_err();
    assert_eq!(err.code, Code::StateConflict);
}

#[test]
fn updating_files_recomputes_version() {
    let store = temp_store();
    store.begin_calculating_active_release().unwrap();
    let before = store.get_active_release().unwrap().unwrap().version;
    assert!(before.is_none());
    let release = store
        .update_active_release_files(ReleaseFiles { kept: vec!["O1".into()], added: vec![], removed: vec![] })
        .unwrap();
    assert!(release.version.is_some());
}

#[test]
fn publishing_spawns_a_fresh_active_release() {
    let store = temp_store();
    let first_id = store.get_active_release().unwrap().unwrap().id;

    store.begin_calculating_active_release().unwrap();
    store.finish_calculating_active_release(datetime!(2024-01-02 0:00 UTC)).unwrap();
    store.begin_building_active_release().unwrap();
    store.finish_building_active_release(datetime!(2024-01-03 0:00 UTC)).unwrap();
    store.begin_publishing_active_release().unwrap();
    let published = store.finish_publishing_active_release(datetime!(2024-01-04 0:00 UTC)).unwrap();

    assert_eq!(published.phase, ReleasePhase::Published);
    assert_eq!(published.id, first_id);

    let new_active = store.get_active_release().unwrap().unwrap();
    assert_eq!(new_active.phase, ReleasePhase::Created);
    assert_ne!(new_active.id, first_id);
}

#[test]
fn get_releases_includes_published_history() {
    let store = temp_store();
    store.begin_calculating_active_release().unwrap();
    store.finish_calculating_active_release(datetime!(2024-01-02 0:00 UTC)).unwrap();
    store.begin_building_active_release().unwrap();
    store.finish_building_active_release(datetime!(2024-01-03 0:00 UTC)).unwrap();
    store.begin_publishing_active_release().unwrap();
    store.finish_publishing_active_release(datetime!(2024-01-04 0:00 UTC)).unwrap();

    let all = store.get_releases().unwrap();
    assert_eq!(all.len(), 2);
    let latest = store.get_latest_release().unwrap().unwrap();
    assert_eq!(latest.phase, ReleasePhase::Created);
}
