use file_types::release::ReleaseFiles;
use file_types::{File, Release, ReleaseState, Result};
use time::OffsetDateTime;

use crate::ReleaseOrchestrator;

impl ReleaseOrchestrator {
    /// `POST /release/calculate` (§4.9): snapshots the current PUBLIC and
    /// QUEUED file sets onto the active release. There is no withdraw path
    /// yet, so `removed` is always empty.
    pub async fn calculate(&self) -> Result<Release> {
        let begin = self.release_store.begin_calculating_active_release()?;
        if !begin.updated {
            return Err(file_types::Error::state_conflict(begin.message));
        }

        let outcome = self.calculate_inner().await;
        match outcome {
            Ok(release) => Ok(release),
            Err(e) => {
                self.release_store.set_active_release_error(e.message.clone())?;
                Err(e)
            }
        }
    }

    async fn calculate_inner(&self) -> Result<Release> {
        let mut kept = Vec::new();
        let mut added = Vec::new();
        for file in self.file_store.get_all_files()? {
            let file = file?;
            match file.release_state {
                ReleaseState::Public => kept.push(file.object_id),
                ReleaseState::Queued => added.push(file.object_id),
                _ => {}
            }
        }

        self.release_store.update_active_release_files(ReleaseFiles { kept, added, removed: Vec::new() })?;
        self.release_store.finish_calculating_active_release(OffsetDateTime::now_utc())
    }

    /// Resolves a release's `kept`/`added` object ids back to full [`File`]
    /// records, dropping any that no longer exist in the store.
    pub(crate) fn resolve_files(&self, object_ids: &[String]) -> Result<Vec<File>> {
        self.file_store.get_by_object_ids(object_ids)
    }
}
