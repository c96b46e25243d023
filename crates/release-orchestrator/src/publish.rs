use file_store::ReleaseProperties;
use file_types::{EmbargoStage, Error, File, Release, ReleaseState, Result};
use search_index::FileDoc;
use time::OffsetDateTime;

use crate::events::{group_donors_by_program, PublicReleaseEvent};
use crate::ReleaseOrchestrator;

impl ReleaseOrchestrator {
    /// `POST /release/publish/:version` (§4.9).
    pub async fn publish(&self, version: &str) -> Result<Release> {
        let active = self
            .release_store
            .get_active_release()?
            .ok_or_else(|| Error::fatal("no active release exists"))?;
        if active.version.as_deref() != Some(version) {
            return Err(Error::invalid_argument("Active release's version does not match the provided version."));
        }

        let begin = self.release_store.begin_publishing_active_release()?;
        if !begin.updated {
            return Err(Error::state_conflict(begin.message));
        }

        match self.publish_inner(&begin.release).await {
            Ok(release) => Ok(release),
            Err(e) => {
                self.release_store.set_active_release_error(e.message.clone())?;
                Err(e)
            }
        }
    }

    async fn publish_inner(&self, release: &Release) -> Result<Release> {
        let indexer = self.current_indexer().await;
        let added = self.resolve_files(&release.files.added)?;
        let removed = self.resolve_files(&release.files.removed)?;

        if !added.is_empty() {
            let docs: Vec<FileDoc> = added
                .iter()
                .map(|f| FileDoc { object_id: f.object_id.clone(), program_id: f.program_id.clone(), release_state: ReleaseState::Restricted, status: f.status, body: serde_json::Value::Null })
                .collect();
            indexer.remove_restricted_file_docs(docs).await?;
        }

        if !removed.is_empty() {
            let docs = self.rebuild_removed_as_restricted(&removed).await?;
            indexer.index_restricted_file_docs(docs).await?;
        }

        indexer.release(true, &release.indices).await?;

        for file in &added {
            self.file_store.update_release_properties(
                &file.object_id,
                ReleaseProperties {
                    embargo_stage: Some(EmbargoStage::Public),
                    release_state: Some(ReleaseState::Public),
                    ..Default::default()
                },
            )?;
        }

        let now = OffsetDateTime::now_utc();
        let published = self.release_store.finish_publishing_active_release(now)?;

        let mut grouped_in = added.clone();
        grouped_in.extend(removed.clone());
        let event = PublicReleaseEvent {
            id: published.id.clone(),
            published_at: now,
            label: published.label.clone().unwrap_or_default(),
            programs: group_donors_by_program(&grouped_in),
        };
        if let Err(e) = self.event_publisher.publish(&event).await {
            tracing::error!(release_id = %published.id, error = %e, "failed to emit publicRelease event");
        }

        Ok(published)
    }

    /// Future-feature path for a withdraw flow: rebuilds a removed file's
    /// document at its actual (non-public) state and pushes it into a fresh
    /// restricted generation. `removed` is always empty today (§4.9).
    async fn rebuild_removed_as_restricted(&self, removed: &[File]) -> Result<Vec<FileDoc>> {
        let mut docs = Vec::with_capacity(removed.len());
        for file in removed {
            let analysis_ids = vec![file.analysis_id.clone()];
            let fragments = self.transform.transform(&analysis_ids, &file.repo_id).await?;
            let Some(fragment) = fragments.get(&file.object_id).and_then(|fs| fs.first()).cloned() else {
                continue;
            };
            let body = file_documents::build_document(file, fragment)?;
            docs.push(FileDoc {
                object_id: file.object_id.clone(),
                program_id: file.program_id.clone(),
                release_state: ReleaseState::Restricted,
                status: file.status,
                body,
            });
        }
        Ok(docs)
    }
}
