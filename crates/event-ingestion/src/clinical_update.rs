use std::sync::Arc;

use file_manager::FileManager;
use file_types::{File, FileFilter, FilterSet, ReleaseState, Result};
use search_index::Indexer;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::messages::ClinicalUpdateMessage;

pub struct ClinicalUpdateContext {
    pub file_manager: Arc<FileManager>,
    pub indexer: Arc<Indexer>,
    pub recalculation_concurrency: usize,
}

/// Handles one `clinicalUpdates` message: re-derives release state for every
/// unreleased file belonging to the affected donors.
///
/// A `FilterSet` with both `donors` and `programs` populated would match
/// their union, not their intersection, so donors and program are narrowed
/// in two steps: the store filters by donor, and the program is checked
/// here afterward.
pub async fn handle(msg: &ClinicalUpdateMessage, ctx: &ClinicalUpdateContext) -> Result<()> {
    let Some(donor_ids) = msg.donor_ids.as_ref().filter(|ids| !ids.is_empty()) else {
        return Ok(());
    };

    let store = ctx.file_manager.store();
    let filter = FileFilter {
        include: Some(FilterSet { donors: Some(donor_ids.clone()), ..Default::default() }),
        exclude: None,
    };

    let candidates: Vec<File> = store
        .get_files(filter)?
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|f| f.program_id == msg.program_id && f.release_state == ReleaseState::Unreleased)
        .collect();

    let semaphore = Arc::new(Semaphore::new(ctx.recalculation_concurrency.max(1)));
    let recalculations = candidates.into_iter().map(|file| {
        let semaphore = semaphore.clone();
        let file_manager = ctx.file_manager.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| file_types::Error::fatal(e.to_string()))?;
            file_manager.update_file_from_external_sources(file).await
        }
    });
    let updated = futures::future::try_join_all(recalculations).await?;

    let newly_restricted: Vec<File> = updated.into_iter().filter(|f| f.release_state != ReleaseState::Unreleased).collect();

    let updates = newly_restricted.iter().map(|file| ctx.indexer.update_restricted_file(file, &Value::Null));
    futures::future::try_join_all(updates).await?;
    Ok(())
}
