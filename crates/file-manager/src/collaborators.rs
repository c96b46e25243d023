//! Narrow trait interfaces for the upstream collaborators §4.7 recalculation
//! depends on (§6). The file manager is written against these traits, not
//! concrete HTTP clients, so recalculation can be tested without a network;
//! [`crate::clients`] supplies the real implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use file_documents::FileFragment;
use file_types::upstream::{ClinicalDonor, MatchedSamplePair, SongAnalysis};
use file_types::Result;
use serde::Deserialize;

/// One page of a catalog listing (§6): `{analyses, totalAnalyses,
/// currentTotalAnalyses}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPage {
    pub analyses: Vec<SongAnalysis>,
    pub total_analyses: u64,
    pub current_total_analyses: u64,
}

/// The analysis catalog: `GET /studies/{s}/analysis/{a}`, plus the
/// paginated study listing the re-index job walks.
#[async_trait]
pub trait AnalysisCatalog: Send + Sync {
    async fn get_analysis(&self, song_server_id: &str, study_id: &str, analysis_id: &str) -> Result<SongAnalysis>;

    async fn list_analyses(&self, song_server_id: &str, study_id: &str, offset: u64, limit: u64) -> Result<AnalysisPage>;

    async fn list_studies(&self, song_server_id: &str) -> Result<Vec<String>>;
}

/// `GET /data-centers/{id}` → `{centerId, songUrl}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCenter {
    pub center_id: String,
    pub song_url: String,
}

#[async_trait]
pub trait DataCenterRegistry: Send + Sync {
    async fn get_data_center(&self, id: &str) -> Result<DataCenter>;
}

/// The gateway's GraphQL `matchedSamplePairs` query.
#[async_trait]
pub trait SampleGateway: Send + Sync {
    async fn matched_sample_pairs(&self, donor_id: &str) -> Result<Vec<MatchedSamplePair>>;
}

/// The clinical registry: `GET /clinical/program/{p}/donor/{d}`.
#[async_trait]
pub trait ClinicalRegistry: Send + Sync {
    async fn get_donor(&self, program_id: &str, donor_id: &str) -> Result<Option<ClinicalDonor>>;
}

/// The analysis-to-file transform service: `POST {analyses, repoCode}` →
/// `{objectId: [fileFragment, …]}`.
#[async_trait]
pub trait AnalysisTransform: Send + Sync {
    async fn transform(&self, analysis_ids: &[String], repo_code: &str) -> Result<HashMap<String, Vec<FileFragment>>>;
}
