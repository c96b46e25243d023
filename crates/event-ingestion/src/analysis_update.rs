use std::sync::Arc;

use file_manager::{AnalysisTransform, FileManager, RdpcFragment};
use file_store::PublishStatusUpdate;
use file_types::{Error, Result, SongPublishStatus};
use search_index::{FileDoc, Indexer};
use time::OffsetDateTime;
use tokio::sync::Semaphore;

use crate::messages::AnalysisUpdateMessage;

pub struct AnalysisUpdateContext {
    pub file_manager: Arc<FileManager>,
    pub transform: Arc<dyn AnalysisTransform>,
    pub indexer: Arc<Indexer>,
    /// Store bulk update concurrency cap for the non-PUBLISHED branch (§5
    /// default: 10).
    pub status_update_concurrency: usize,
}

/// Handles one `analysisUpdates` message (§4.8).
pub async fn handle(msg: &AnalysisUpdateMessage, ctx: &AnalysisUpdateContext) -> Result<()> {
    if msg.state == "PUBLISHED" {
        save_and_index(msg, ctx).await
    } else {
        unpublish(msg, ctx).await
    }
}

async fn save_and_index(msg: &AnalysisUpdateMessage, ctx: &AnalysisUpdateContext) -> Result<()> {
    let fragments_by_object = ctx.transform.transform(&[msg.analysis_id.clone()], &msg.song_server_id).await?;
    let first_published = msg.analysis.first_published_at.unwrap_or_else(OffsetDateTime::now_utc);

    let rdpc_fragments: Vec<RdpcFragment> = fragments_by_object
        .into_values()
        .flatten()
        .map(|fragment| RdpcFragment {
            fragment,
            analysis_id: msg.analysis_id.clone(),
            program_id: msg.study_id.clone(),
            status: SongPublishStatus::Published,
            first_published,
        })
        .collect();

    ctx.file_manager.save_and_index_files_from_rdpc_data(rdpc_fragments, &msg.song_server_id, &ctx.indexer).await?;
    Ok(())
}

async fn unpublish(msg: &AnalysisUpdateMessage, ctx: &AnalysisUpdateContext) -> Result<()> {
    let status = parse_status(&msg.state)?;
    let store = ctx.file_manager.store();
    let files = store.get_by_analysis_id(&msg.analysis_id)?;

    let semaphore = Arc::new(Semaphore::new(ctx.status_update_concurrency.max(1)));
    let updates = files.into_iter().map(|file| {
        let semaphore = semaphore.clone();
        let store = store.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| Error::fatal(e.to_string()))?;
            store.update_song_publish_status(&file.object_id, PublishStatusUpdate { status: Some(status), first_published: None })
        }
    });
    let updated = futures::future::try_join_all(updates).await?;

    let restricted_docs: Vec<FileDoc> = updated.iter().filter(|f| f.is_restricted()).map(FileDoc::for_delete).collect();
    if !restricted_docs.is_empty() {
        ctx.indexer.remove_restricted_file_docs(restricted_docs).await?;
    }
    Ok(())
}

fn parse_status(state: &str) -> Result<SongPublishStatus> {
    match state {
        "PUBLISHED" => Ok(SongPublishStatus::Published),
        "UNPUBLISHED" => Ok(SongPublishStatus::Unpublished),
        "SUPPRESSED" => Ok(SongPublishStatus::Suppressed),
        other => Err(Error::invalid_argument(format!("unrecognized analysis state {other:?}"))),
    }
}
