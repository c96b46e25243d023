use file_types::file::NewFile;
use file_types::{FileFilter, FilterSet, SongPublishStatus};
use time::macros::datetime;

use crate::FileStore;

fn temp_store() -> FileStore {
    let dir = tempfile::tempdir().unwrap();
    FileStore::open(dir.into_path(), 10 * 1024 * 1024).unwrap()
}

fn new_file(object_id: &str, program_id: &str) -> NewFile {
    NewFile {
        object_id: object_id.to_string(),
        repo_id: "DC1".to_string(),
        program_id: program_id.to_string(),
        donor_id: "D1".to_string(),
        analysis_id: "A1".to_string(),
        status: SongPublishStatus::Published,
        first_published: datetime!(2020-01-01 0:00 UTC),
    }
}

#[test]
fn first_created_file_gets_fl1() {
    let store = temp_store();
    let file = store.get_or_create_by_object_id(new_file("O1", "PRG1")).unwrap();
    assert_eq!(file.file_id.to_string(), "FL1");
}

#[test]
fn get_or_create_is_idempotent_per_object_id() {
    let store = temp_store();
    let first = store.get_or_create_by_object_id(new_file("O1", "PRG1")).unwrap();
    let second = store.get_or_create_by_object_id(new_file("O1", "PRG1")).unwrap();
    assert_eq!(first.file_id, second.file_id);

    let other = store.get_or_create_by_object_id(new_file("O2", "PRG1")).unwrap();
    assert_ne!(first.file_id, other.file_id);
}

#[test]
fn filters_by_program_with_include_exclude_intersection() {
    let store = temp_store();
    store.get_or_create_by_object_id(new_file("O1", "PRG1")).unwrap();
    store.get_or_create_by_object_id(new_file("O2", "PRG2")).unwrap();
    store.get_or_create_by_object_id(new_file("O3", "PRG1")).unwrap();

    let filter = FileFilter {
        include: Some(FilterSet { programs: Some(vec!["PRG1".into()]), ..Default::default() }),
        exclude: Some(FilterSet { object_ids: Some(vec!["O3".into()]), ..Default::default() }),
    };
    let matched: Vec<_> = store.get_files(filter).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].object_id, "O1");
}

#[test]
fn delete_by_ids_removes_from_secondary_indices() {
    let store = temp_store();
    let file = store.get_or_create_by_object_id(new_file("O1", "PRG1")).unwrap();
    assert_eq!(store.delete_by_ids(&[file.file_id]).unwrap(), 1);
    assert!(store.get_by_object_id("O1").unwrap().is_none());
    assert_eq!(store.count_files(FileFilter::default()).unwrap(), 0);
}

#[test]
fn add_or_update_label_rejects_comma_key() {
    let store = temp_store();
    let file = store.get_or_create_by_object_id(new_file("O1", "PRG1")).unwrap();
    let labels = std::collections::BTreeMap::from([("X, Y".to_string(), vec!["v".to_string()])]);
    assert!(store.add_or_update_label(file.file_id, labels).is_err());
}

#[test]
fn add_or_update_label_normalizes_key() {
    let store = temp_store();
    let file = store.get_or_create_by_object_id(new_file("O1", "PRG1")).unwrap();
    let labels = std::collections::BTreeMap::from([("Donor_Age".to_string(), vec!["40".to_string()])]);
    let updated = store.add_or_update_label(file.file_id, labels).unwrap();
    assert_eq!(updated.labels.get("donor_age"), Some(["40".to_string()].as_slice()));
}
