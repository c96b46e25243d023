/*!
The file manager (§4.7): orchestrates upsert-or-update of file records,
embargo/release-state recalculation, and downstream indexing. It is the one
place that calls the embargo calculator (`embargo`), the document builder
(`file-documents`), the file store (`file-store`) and the indexer
(`search-index`) together.
*/

pub mod clients;
pub mod collaborators;

use std::sync::Arc;

use file_documents::FileFragment;
use file_store::{FileStore, PublishStatusUpdate, ReleaseProperties};
use file_types::file::NewFile;
use file_types::{EmbargoStage, File, ReleaseState, Result, SongPublishStatus};
use search_index::{FileDoc, Indexer};
use time::OffsetDateTime;

pub use collaborators::{AnalysisCatalog, AnalysisPage, AnalysisTransform, ClinicalRegistry, DataCenter, DataCenterRegistry, SampleGateway};

/// One upstream file fragment plus the record-level attributes the store
/// needs to place it, bundled by the event-ingestion handler that already
/// has both the raw event and the transform service's response.
pub struct RdpcFragment {
    pub fragment: FileFragment,
    pub analysis_id: String,
    pub program_id: String,
    pub status: SongPublishStatus,
    pub first_published: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct SaveAndIndexResult {
    pub indexed: Vec<String>,
    pub removed: Vec<String>,
}

pub struct FileManager {
    store: FileStore,
    catalog: Arc<dyn AnalysisCatalog>,
    gateway: Arc<dyn SampleGateway>,
    clinical: Arc<dyn ClinicalRegistry>,
}

impl FileManager {
    pub fn new(
        store: FileStore,
        catalog: Arc<dyn AnalysisCatalog>,
        gateway: Arc<dyn SampleGateway>,
        clinical: Arc<dyn ClinicalRegistry>,
    ) -> Self {
        FileManager { store, catalog, gateway, clinical }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// The recalculation entry point used by all admin/clinical paths. The
    /// song server and study to query are the file's own `repoId`/`programId`
    /// -- a file record always knows where it came from.
    pub async fn update_file_from_external_sources(&self, mut file: File) -> Result<File> {
        let analysis = self.catalog.get_analysis(&file.repo_id, &file.program_id, &file.analysis_id).await?;
        let matched_pairs = self.gateway.matched_sample_pairs(&file.donor_id).await?;
        let clinical_donor = self.clinical.get_donor(&file.program_id, &file.donor_id).await?;

        let now = OffsetDateTime::now_utc();

        let new_start = embargo::calculate_embargo_start_date(embargo::EmbargoStartInputs {
            file: &file,
            song_analysis: &analysis,
            matched_sample_pairs: &matched_pairs,
            clinical_donor: clinical_donor.as_ref(),
        });
        if new_start != file.embargo_start {
            file = self.store.update_release_properties(
                &file.object_id,
                ReleaseProperties { embargo_start: Some(new_start), ..Default::default() },
            )?;
        }

        let calculated_stage = embargo::calculate_stage(&file, now);
        let (next_stage, next_state) = decide_release_state(&file, calculated_stage);
        if next_stage != file.embargo_stage || next_state != file.release_state {
            file = self.store.update_release_properties(
                &file.object_id,
                ReleaseProperties {
                    embargo_stage: Some(next_stage),
                    release_state: Some(next_state),
                    ..Default::default()
                },
            )?;
        }

        Ok(file)
    }

    /// Ingests a batch of upstream file fragments for one data center:
    /// upserts/patches the file record for each, recalculates, builds the
    /// file-centric document, and routes it to the restricted index (a
    /// delete if the upstream analysis is no longer PUBLISHED, an upsert
    /// otherwise).
    pub async fn save_and_index_files_from_rdpc_data(
        &self,
        fragments: Vec<RdpcFragment>,
        data_center_id: &str,
        indexer: &Indexer,
    ) -> Result<SaveAndIndexResult> {
        let mut indexed = Vec::new();
        let mut removed = Vec::new();
        let mut index_docs = Vec::new();
        let mut remove_docs = Vec::new();

        for item in fragments {
            let RdpcFragment { fragment, analysis_id, program_id, status, first_published } = item;
            let object_id = fragment.object_id.clone();
            let Some(primary_donor) = fragment.donors.first() else {
                tracing::warn!(object_id = %object_id, "dropping rdpc fragment with no donors attached");
                continue;
            };
            let donor_id = primary_donor.donor_id.clone();

            let mut file = self.store.get_or_create_by_object_id(NewFile {
                object_id: object_id.clone(),
                repo_id: data_center_id.to_string(),
                program_id: program_id.clone(),
                donor_id,
                analysis_id: analysis_id.clone(),
                status,
                first_published,
            })?;

            if file.status != status || file.first_published != first_published {
                file = self.store.update_song_publish_status(
                    &object_id,
                    PublishStatusUpdate { status: Some(status), first_published: Some(first_published) },
                )?;
            }

            file = self.update_file_from_external_sources(file).await?;

            let doc = file_documents::build_document(&file, fragment)?;
            let file_doc = FileDoc::new(&file, doc);

            if status == SongPublishStatus::Published {
                indexed.push(object_id);
                index_docs.push(file_doc);
            } else {
                removed.push(object_id);
                remove_docs.push(file_doc);
            }
        }

        if !index_docs.is_empty() {
            indexer.index_restricted_file_docs(index_docs).await?;
        }
        if !remove_docs.is_empty() {
            indexer.remove_restricted_file_docs(remove_docs).await?;
        }

        Ok(SaveAndIndexResult { indexed, removed })
    }
}

/// The release-state decision invariants from §4.7: a file already PUBLIC
/// never regresses; a file whose calculated stage reaches PUBLIC is staged
/// as QUEUED (pending the next release), never flipped straight to PUBLIC
/// outside a publish.
fn decide_release_state(file: &File, calculated_stage: EmbargoStage) -> (EmbargoStage, ReleaseState) {
    if file.release_state == ReleaseState::Public {
        (calculated_stage, ReleaseState::Public)
    } else if calculated_stage == EmbargoStage::Public {
        (EmbargoStage::AssociateAccess, ReleaseState::Queued)
    } else {
        (calculated_stage, ReleaseState::Restricted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_types::file::{ClinicalExemptionReason, FileId};

    fn file_with(release_state: ReleaseState, embargo_stage: EmbargoStage) -> File {
        let mut file = File::from_new(
            FileId::new(1),
            NewFile {
                object_id: "O1".into(),
                repo_id: "DC1".into(),
                program_id: "PRG1".into(),
                donor_id: "D1".into(),
                analysis_id: "A1".into(),
                status: SongPublishStatus::Published,
                first_published: OffsetDateTime::UNIX_EPOCH,
            },
        );
        file.release_state = release_state;
        file.embargo_stage = embargo_stage;
        file
    }

    #[test]
    fn public_release_state_never_regresses() {
        let file = file_with(ReleaseState::Public, EmbargoStage::Public);
        let (stage, state) = decide_release_state(&file, EmbargoStage::ProgramOnly);
        assert_eq!(state, ReleaseState::Public);
        assert_eq!(stage, EmbargoStage::ProgramOnly);
    }

    #[test]
    fn public_calculated_stage_queues_instead_of_publishing_directly() {
        let file = file_with(ReleaseState::Restricted, EmbargoStage::AssociateAccess);
        let (stage, state) = decide_release_state(&file, EmbargoStage::Public);
        assert_eq!(stage, EmbargoStage::AssociateAccess);
        assert_eq!(state, ReleaseState::Queued);
    }

    #[test]
    fn non_public_calculated_stage_is_restricted() {
        let file = file_with(ReleaseState::Unreleased, EmbargoStage::Unreleased);
        let (stage, state) = decide_release_state(&file, EmbargoStage::MemberAccess);
        assert_eq!(stage, EmbargoStage::MemberAccess);
        assert_eq!(state, ReleaseState::Restricted);
    }

    #[test]
    fn clinical_exemption_reason_round_trips_through_the_file_record() {
        let mut file = file_with(ReleaseState::Unreleased, EmbargoStage::Unreleased);
        file.clinical_exemption = Some(ClinicalExemptionReason("CONSENT_WITHDRAWN".into()));
        assert!(file.clinical_exemption.is_some());
    }
}
