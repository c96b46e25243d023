use std::sync::Arc;

use file_manager::FileManager;
use file_types::{ReleaseState, Result};
use search_index::Indexer;
use serde_json::Value;

/// The periodic recalculation sweep (§4.8): every file in the store is
/// re-derived against its current embargo/clinical inputs, one at a time, and
/// any resulting state change is pushed to the restricted index immediately.
/// Unlike the Kafka consumers, a failure here is not retried or DLQ'd -- it
/// is logged and the sweep moves on to the next file.
pub async fn run(file_manager: &Arc<FileManager>, indexer: &Arc<Indexer>) -> Result<()> {
    let files = file_manager.store().get_all_files()?;
    let mut recalculated = 0usize;
    let mut failed = 0usize;

    for file in files {
        let file = match file {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, "recalculation sweep failed to read a file");
                failed += 1;
                continue;
            }
        };
        let object_id = file.object_id.clone();
        let before_stage = file.embargo_stage;
        let before_state = file.release_state;

        match file_manager.update_file_from_external_sources(file).await {
            Ok(updated) => {
                if updated.embargo_stage != before_stage || updated.release_state != before_state {
                    if let Err(e) = indexer.update_restricted_file(&updated, &Value::Null).await {
                        tracing::error!(object_id = %object_id, error = %e, "recalculation indexing failed");
                        failed += 1;
                        continue;
                    }
                    if updated.release_state == ReleaseState::Unreleased {
                        tracing::debug!(object_id = %object_id, "recalculation removed file from restricted index");
                    }
                }
                recalculated += 1;
            }
            Err(e) => {
                tracing::error!(object_id = %object_id, error = %e, "recalculation failed for file");
                failed += 1;
            }
        }
    }

    tracing::info!(recalculated, failed, "recalculation sweep complete");
    Ok(())
}
