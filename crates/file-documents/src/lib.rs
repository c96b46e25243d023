/*!
The file-centric document builder (§4.4): merges a [`File`](file_types::File)
record with the upstream file fragment returned by the analysis-to-file
transform service into the document the indexer (§4.5/§4.6) writes.

Upstream fragments carry open-ended extra keys (§9 design note); we parse
into a known-schema head plus a passthrough bag via `#[serde(flatten)]` and
validate only the fields the core reads. Every key, at every nesting level,
is rewritten from camelCase to snake_case before the document leaves this
module, because the index side speaks snake_case exclusively.
*/

use convert_case::{Case, Casing};
use file_types::{Code, Error, File, Result};
use serde_json::{Map, Value};

/// A donor attribution on a file fragment. `donor_id` is the only field the
/// core reads; everything else upstream sends rides along unexamined.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorFragment {
    pub donor_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The file fragment returned per `objectId` by the analysis-to-file
/// transform service (§6). `analysis` and `metrics` are left as raw JSON:
/// the builder only inspects `data_type`/`workflow` to decide whether
/// `metrics` is eligible, it never interprets their contents.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFragment {
    pub object_id: String,
    pub analysis: Value,
    pub donors: Vec<DonorFragment>,
    pub study_id: Option<String>,
    pub data_type: Option<String>,
    pub workflow: Option<String>,
    pub metrics: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const ALIGNMENT_DATA_TYPE: &str = "Aligned Reads";
const ALIGNMENT_WORKFLOW: &str = "DNA Seq Alignment";

/// Builds the file-centric document for `db_file` out of `fragment`.
///
/// Fails with [`Code::Upstream`] if the fragment has no donors attached --
/// the one piece of fragment shape the core actually depends on being
/// present. A fragment with more than one donor is accepted (the first
/// donor wins `donorId` attribution) but logged as a warning, since it
/// usually signals a data quality issue upstream rather than a client bug.
pub fn build_document(db_file: &File, fragment: FileFragment) -> Result<Value> {
    let Some(primary_donor) = fragment.donors.first() else {
        return Err(Error::new(
            Code::Upstream,
            format!("file fragment for objectId {:?} has no donors attached", fragment.object_id),
        ));
    };
    if fragment.donors.len() > 1 {
        tracing::warn!(
            object_id = %fragment.object_id,
            donor_count = fragment.donors.len(),
            "file fragment has multiple donors attached; the first is used for donorId attribution"
        );
    }

    let primary_donor_id = primary_donor.donor_id.clone();

    let include_metrics = fragment.data_type.as_deref() == Some(ALIGNMENT_DATA_TYPE)
        && fragment.workflow.as_deref() == Some(ALIGNMENT_WORKFLOW);

    let mut doc = Map::new();
    doc.insert("objectId".into(), Value::String(fragment.object_id.clone()));
    doc.insert("analysis".into(), fragment.analysis);
    doc.insert(
        "donors".into(),
        Value::Array(fragment.donors.into_iter().map(donor_to_value).collect()),
    );
    doc.insert("donorId".into(), Value::String(primary_donor_id));
    if let Some(study_id) = fragment.study_id {
        doc.insert("studyId".into(), Value::String(study_id));
    }
    if include_metrics {
        if let Some(metrics) = fragment.metrics {
            doc.insert("metrics".into(), metrics);
        }
    }
    for (key, value) in fragment.extra {
        doc.entry(key).or_insert(value);
    }

    doc.insert("fileId".into(), Value::String(db_file.file_id.to_string()));
    doc.insert("embargoStage".into(), to_value(db_file.embargo_stage)?);
    doc.insert("releaseState".into(), to_value(db_file.release_state)?);
    doc.insert(
        "meta".into(),
        serde_json::json!({
            "embargoStage": db_file.embargo_stage,
            "releaseState": db_file.release_state,
        }),
    );

    let mut value = Value::Object(doc);
    snake_case_keys(&mut value);
    Ok(value)
}

fn donor_to_value(donor: DonorFragment) -> Value {
    let mut map = donor.extra;
    map.insert("donorId".into(), Value::String(donor.donor_id));
    Value::Object(map)
}

/// Recursively rewrites every object key from camelCase to snake_case.
/// Arrays are walked without renaming (they have no keys); scalars are
/// left untouched.
pub fn snake_case_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let old = std::mem::take(map);
            for (key, mut nested) in old {
                snake_case_keys(&mut nested);
                map.insert(key.to_case(Case::Snake), nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                snake_case_keys(item);
            }
        }
        _ => {}
    }
}

fn to_value(v: impl serde::Serialize) -> Result<Value> {
    serde_json::to_value(v).map_err(|e| Error::fatal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_types::file::{FileId, NewFile};
    use file_types::{EmbargoStage, ReleaseState, SongPublishStatus};
    use time::macros::datetime;

    fn db_file() -> File {
        let mut file = File::from_new(
            FileId::new(1),
            NewFile {
                object_id: "O1".into(),
                repo_id: "DC1".into(),
                program_id: "PRG1".into(),
                donor_id: "D1".into(),
                analysis_id: "A1".into(),
                status: SongPublishStatus::Published,
                first_published: datetime!(2020-01-01 0:00 UTC),
            },
        );
        file.embargo_stage = EmbargoStage::AssociateAccess;
        file.release_state = ReleaseState::Queued;
        file
    }

    fn fragment_with_donors(donor_ids: Vec<&str>) -> FileFragment {
        FileFragment {
            object_id: "O1".into(),
            analysis: serde_json::json!({"analysisId": "A1", "workflowEngineParams": {"foo": 1}}),
            donors: donor_ids
                .into_iter()
                .map(|id| DonorFragment { donor_id: id.to_string(), extra: Map::new() })
                .collect(),
            study_id: Some("PRG1".into()),
            data_type: Some(ALIGNMENT_DATA_TYPE.into()),
            workflow: Some(ALIGNMENT_WORKFLOW.into()),
            metrics: Some(serde_json::json!({"pairsOnDifferentChr": 12})),
            extra: Map::new(),
        }
    }

    #[test]
    fn rejects_fragment_with_no_donors() {
        let err = build_document(&db_file(), fragment_with_donors(vec![])).unwrap_err();
        assert_eq!(err.code, Code::Upstream);
    }

    #[test]
    fn first_donor_wins_attribution() {
        let doc = build_document(&db_file(), fragment_with_donors(vec!["D1", "D2"])).unwrap();
        assert_eq!(doc["donor_id"], "D1");
    }

    #[test]
    fn carries_file_record_fields_and_meta_mirror() {
        let doc = build_document(&db_file(), fragment_with_donors(vec!["D1"])).unwrap();
        assert_eq!(doc["file_id"], "FL1");
        assert_eq!(doc["embargo_stage"], "ASSOCIATE_ACCESS");
        assert_eq!(doc["release_state"], "QUEUED");
        assert_eq!(doc["meta"]["embargo_stage"], "ASSOCIATE_ACCESS");
        assert_eq!(doc["meta"]["release_state"], "QUEUED");
    }

    #[test]
    fn includes_metrics_only_for_aligned_reads_dna_seq_alignment() {
        let doc = build_document(&db_file(), fragment_with_donors(vec!["D1"])).unwrap();
        assert!(doc.get("metrics").is_some());

        let mut fragment = fragment_with_donors(vec!["D1"]);
        fragment.workflow = Some("Variant Calling".into());
        let doc = build_document(&db_file(), fragment).unwrap();
        assert!(doc.get("metrics").is_none());
    }

    #[test]
    fn nested_keys_are_snake_cased() {
        let doc = build_document(&db_file(), fragment_with_donors(vec!["D1"])).unwrap();
        assert!(doc["analysis"].get("workflow_engine_params").is_some());
        assert!(doc["analysis"]["workflow_engine_params"].get("foo").is_some());
    }
}
