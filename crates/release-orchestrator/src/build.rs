use std::collections::{HashMap, HashSet};

use elasticsearch::snapshot::SnapshotCreateParts;
use file_types::{EmbargoStage, Error, File, Release, ReleaseState, Result};
use search_index::FileDoc;
use time::OffsetDateTime;

use crate::ReleaseOrchestrator;

impl ReleaseOrchestrator {
    /// `POST /release/build/:version/:label` (§4.9).
    pub async fn build(&self, version: &str, label: &str) -> Result<Release> {
        if label.trim().is_empty() {
            return Err(Error::invalid_argument("label must not be empty"));
        }
        let active = self
            .release_store
            .get_active_release()?
            .ok_or_else(|| Error::fatal("no active release exists"))?;
        if active.version.as_deref() != Some(version) {
            return Err(Error::invalid_argument("Active release's version does not match the provided version."));
        }

        let begin = self.release_store.begin_building_active_release()?;
        if !begin.updated {
            return Err(Error::state_conflict(begin.message));
        }
        self.release_store.set_active_release_label(label)?;
        self.start_new_release_phase().await;

        match self.build_inner(&begin.release, label).await {
            Ok(release) => Ok(release),
            Err(e) => {
                self.release_store.set_active_release_error(e.message.clone())?;
                Err(e)
            }
        }
    }

    async fn build_inner(&self, release: &Release, label: &str) -> Result<Release> {
        let indexer = self.current_indexer().await;
        indexer.delete_indices(&release.indices).await?;
        self.release_store.set_active_release_indices(Vec::new())?;

        let kept = self.resolve_files(&release.files.kept)?;
        let added = self.resolve_files(&release.files.added)?;
        let touched = &self.resolve_files(&release.files.removed)?;
        let programs = touched_programs(&[&kept, &added, touched.as_slice()]);

        let public_indices = indexer.create_empty_public_indices(&programs).await?;
        self.release_store.set_active_release_indices(public_indices.clone())?;

        let public_docs = self.rebuild_as_public(kept.into_iter().chain(added).collect()).await?;
        indexer.index_public_file_docs(public_docs).await?;

        let now = OffsetDateTime::now_utc();
        let snapshot_name = format!("release_{label}_{}", now.unix_timestamp() * 1000 + i64::from(now.millisecond()));
        self.take_snapshot(&snapshot_name, &public_indices).await?;
        self.release_store.set_active_release_snapshot(snapshot_name)?;

        self.release_store.finish_building_active_release(now)
    }

    /// Re-fetches the upstream file fragment for every file via the
    /// analysis-to-file transform service, grouped by data center and
    /// de-duplicated by analysisId, then rebuilds each document with
    /// `embargoStage`/`releaseState` forced to PUBLIC -- the public index
    /// only ever holds documents that look published, even for a file whose
    /// store record is still QUEUED pending this very build.
    async fn rebuild_as_public(&self, files: Vec<File>) -> Result<Vec<FileDoc>> {
        let mut by_data_center: HashMap<String, Vec<&File>> = HashMap::new();
        for file in &files {
            by_data_center.entry(file.repo_id.clone()).or_default().push(file);
        }

        let mut docs = Vec::with_capacity(files.len());
        for (repo_id, files_in_center) in by_data_center {
            let analysis_ids: Vec<String> = {
                let mut seen = HashSet::new();
                files_in_center
                    .iter()
                    .filter(|f| seen.insert(f.analysis_id.clone()))
                    .map(|f| f.analysis_id.clone())
                    .collect()
            };
            let fragments_by_object = self.transform.transform(&analysis_ids, &repo_id).await?;

            for file in files_in_center {
                let Some(fragment) = fragments_by_object.get(&file.object_id).and_then(|fs| fs.first()).cloned() else {
                    tracing::warn!(object_id = %file.object_id, "no file fragment returned for build-time rebuild, skipping");
                    continue;
                };
                let mut body = file_documents::build_document(file, fragment)?;
                force_public(&mut body);
                docs.push(FileDoc {
                    object_id: file.object_id.clone(),
                    program_id: file.program_id.clone(),
                    release_state: ReleaseState::Public,
                    status: file.status,
                    body,
                });
            }
        }
        Ok(docs)
    }

    async fn take_snapshot(&self, snapshot_name: &str, indices: &[String]) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        self.es
            .snapshot()
            .create(SnapshotCreateParts::RepositorySnapshot(&self.snapshot_repository, snapshot_name))
            .body(serde_json::json!({
                "indices": indices.join(","),
                "wait_for_completion": true,
            }))
            .send()
            .await
            .map_err(|e| Error::upstream(e.to_string()))?
            .error_for_status_code()
            .map_err(|e| Error::upstream(e.to_string()))?;
        Ok(())
    }
}

fn touched_programs(groups: &[&[File]]) -> Vec<String> {
    let mut programs: Vec<String> = groups.iter().flat_map(|g| g.iter().map(|f| f.program_id.clone())).collect();
    programs.sort();
    programs.dedup();
    programs
}

fn force_public(doc: &mut serde_json::Value) {
    let stage = serde_json::to_value(EmbargoStage::Public).unwrap_or(serde_json::Value::Null);
    let state = serde_json::to_value(ReleaseState::Public).unwrap_or(serde_json::Value::Null);
    doc["embargo_stage"] = stage.clone();
    doc["release_state"] = state.clone();
    doc["meta"]["embargo_stage"] = stage;
    doc["meta"]["release_state"] = state;
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_types::file::{FileId, NewFile};
    use file_types::SongPublishStatus;

    fn file(program_id: &str) -> File {
        File::from_new(
            FileId::new(1),
            NewFile {
                object_id: "O1".into(),
                repo_id: "DC1".into(),
                program_id: program_id.into(),
                donor_id: "D1".into(),
                analysis_id: "A1".into(),
                status: SongPublishStatus::Published,
                first_published: OffsetDateTime::UNIX_EPOCH,
            },
        )
    }

    #[test]
    fn touched_programs_is_sorted_and_deduplicated() {
        let a = [file("PRG2")];
        let b = [file("PRG1"), file("PRG2")];
        assert_eq!(touched_programs(&[&a, &b]), vec!["PRG1".to_string(), "PRG2".to_string()]);
    }

    #[test]
    fn force_public_overwrites_stage_and_state_everywhere() {
        let mut doc = serde_json::json!({
            "embargo_stage": "MEMBER_ACCESS",
            "release_state": "QUEUED",
            "meta": {"embargo_stage": "MEMBER_ACCESS", "release_state": "QUEUED"},
        });
        force_public(&mut doc);
        assert_eq!(doc["embargo_stage"], "PUBLIC");
        assert_eq!(doc["release_state"], "PUBLIC");
        assert_eq!(doc["meta"]["embargo_stage"], "PUBLIC");
        assert_eq!(doc["meta"]["release_state"], "PUBLIC");
    }
}
