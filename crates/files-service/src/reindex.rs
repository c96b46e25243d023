//! The `POST /admin/index/:datacenter` job (§6): walks every published
//! analysis a data center's song server knows about and routes it through
//! the same save-and-index path the `analysisUpdate` consumer uses.

use std::collections::HashMap;

use file_manager::clients::AnalysisCatalogClient;
use file_manager::collaborators::AnalysisCatalog;
use file_manager::RdpcFragment;
use file_types::{Result, SongPublishStatus};
use time::OffsetDateTime;

use crate::state::AppState;

const PAGE_SIZE: u64 = 200;

pub async fn reindex_data_center(state: &AppState, data_center_id: &str, study: Option<String>) -> Result<()> {
    let data_center = state.data_centers.get_data_center(data_center_id).await?;
    let catalog = AnalysisCatalogClient::new(state.http.clone(), data_center.song_url.clone());

    let studies = match study {
        Some(s) => vec![s],
        None => catalog.list_studies(&data_center.center_id).await?,
    };

    for study_id in studies {
        reindex_study(state, &catalog, &data_center.center_id, &study_id).await?;
    }
    Ok(())
}

async fn reindex_study(state: &AppState, catalog: &AnalysisCatalogClient, center_id: &str, study_id: &str) -> Result<()> {
    let mut offset = 0u64;
    loop {
        let page = catalog.list_analyses(center_id, study_id, offset, PAGE_SIZE).await?;
        if page.analyses.is_empty() {
            break;
        }

        let analysis_ids: Vec<String> = page.analyses.iter().map(|a| a.analysis_id.clone()).collect();
        let first_published: HashMap<&str, OffsetDateTime> = page
            .analyses
            .iter()
            .map(|a| (a.analysis_id.as_str(), a.first_published_at.unwrap_or_else(OffsetDateTime::now_utc)))
            .collect();

        let fragments_by_object = state.transform.transform(&analysis_ids, center_id).await?;
        let mut rdpc_fragments = Vec::new();
        for fragments in fragments_by_object.into_values() {
            for fragment in fragments {
                let Some(analysis_id) = fragment.analysis.get("analysisId").and_then(|v| v.as_str()) else {
                    tracing::warn!(object_id = %fragment.object_id, "transform fragment missing analysisId, skipping");
                    continue;
                };
                let analysis_id = analysis_id.to_string();
                let published_at = first_published.get(analysis_id.as_str()).copied().unwrap_or_else(OffsetDateTime::now_utc);
                rdpc_fragments.push(RdpcFragment {
                    fragment,
                    analysis_id,
                    program_id: study_id.to_string(),
                    status: SongPublishStatus::Published,
                    first_published: published_at,
                });
            }
        }

        if !rdpc_fragments.is_empty() {
            let result = state.file_manager.save_and_index_files_from_rdpc_data(rdpc_fragments, center_id, &state.indexer).await?;
            tracing::info!(center_id, study_id, indexed = result.indexed.len(), removed = result.removed.len(), "re-indexed analysis page");
        }

        offset += page.analyses.len() as u64;
        if offset >= page.total_analyses {
            break;
        }
    }
    Ok(())
}
