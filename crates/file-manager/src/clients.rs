//! Concrete reqwest-backed implementations of the [`crate::collaborators`]
//! traits, grounded on `search-index`'s rollcall client: one struct per
//! collaborator, each talking JSON over HTTP to a narrow slice of an
//! external service (§6).

use std::collections::HashMap;

use async_trait::async_trait;
use file_documents::FileFragment;
use file_types::upstream::{ClinicalDonor, MatchedSamplePair, SongAnalysis};
use file_types::{Code, Error, Result};
use serde_json::json;

use crate::collaborators::{AnalysisCatalog, AnalysisPage, AnalysisTransform, ClinicalRegistry, DataCenter, DataCenterRegistry, SampleGateway};

fn upstream_err(e: reqwest::Error) -> Error {
    Error::new(Code::Upstream, e.to_string())
}

/// `GET /studies/{s}/analysis/{a}?analysisStates=PUBLISHED,UNPUBLISHED,SUPPRESSED`
/// against a data center's song server, base-urled by the caller (the file
/// manager does not itself resolve `songServerId` to a URL; that is the
/// data-center registry's job, out of this crate's scope per §1).
pub struct AnalysisCatalogClient {
    http: reqwest::Client,
    song_base_url: String,
}

impl AnalysisCatalogClient {
    pub fn new(http: reqwest::Client, song_base_url: impl Into<String>) -> Self {
        Self { http, song_base_url: song_base_url.into() }
    }
}

#[async_trait]
impl AnalysisCatalog for AnalysisCatalogClient {
    async fn get_analysis(&self, _song_server_id: &str, study_id: &str, analysis_id: &str) -> Result<SongAnalysis> {
        let resp = self
            .http
            .get(format!("{}/studies/{study_id}/analysis/{analysis_id}", self.song_base_url))
            .query(&[("analysisStates", "PUBLISHED,UNPUBLISHED,SUPPRESSED")])
            .send()
            .await
            .map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("song GET analysis {analysis_id} returned {}", resp.status())));
        }
        resp.json().await.map_err(upstream_err)
    }

    async fn list_analyses(&self, _song_server_id: &str, study_id: &str, offset: u64, limit: u64) -> Result<AnalysisPage> {
        let resp = self
            .http
            .get(format!("{}/studies/{study_id}/analysis/paginated", self.song_base_url))
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string())])
            .query(&[("analysisStates", "PUBLISHED")])
            .send()
            .await
            .map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("song GET paginated analyses for {study_id} returned {}", resp.status())));
        }
        resp.json().await.map_err(upstream_err)
    }

    async fn list_studies(&self, _song_server_id: &str) -> Result<Vec<String>> {
        let resp = self.http.get(format!("{}/studies/all", self.song_base_url)).send().await.map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("song GET /studies/all returned {}", resp.status())));
        }
        resp.json().await.map_err(upstream_err)
    }
}

/// The gateway's GraphQL endpoint, queried for `matchedSamplePairs(donorId)`.
pub struct GatewayClient {
    http: reqwest::Client,
    graphql_url: String,
}

impl GatewayClient {
    pub fn new(http: reqwest::Client, graphql_url: impl Into<String>) -> Self {
        Self { http, graphql_url: graphql_url.into() }
    }
}

#[async_trait]
impl SampleGateway for GatewayClient {
    async fn matched_sample_pairs(&self, donor_id: &str) -> Result<Vec<MatchedSamplePair>> {
        const QUERY: &str = "query($donorId: String!) { matchedSamplePairs(donorId: $donorId) { normal { firstPublishedAt } tumour { firstPublishedAt } } }";
        let body = json!({ "query": QUERY, "variables": { "donorId": donor_id } });
        let resp = self.http.post(&self.graphql_url).json(&body).send().await.map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("gateway matchedSamplePairs returned {}", resp.status())));
        }
        let payload: GraphQlResponse = resp.json().await.map_err(upstream_err)?;
        if let Some(errors) = payload.errors {
            let message = errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; ");
            return Err(Error::upstream(format!("gateway matchedSamplePairs errors: {message}")));
        }
        Ok(payload.data.map(|d| d.matched_sample_pairs).unwrap_or_default())
    }
}

#[derive(Debug, serde::Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlData {
    matched_sample_pairs: Vec<MatchedSamplePair>,
}

#[derive(Debug, serde::Deserialize)]
struct GraphQlError {
    message: String,
}

/// `GET /clinical/program/{p}/donor/{d}`.
pub struct ClinicalRegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClinicalRegistryClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

#[async_trait]
impl ClinicalRegistry for ClinicalRegistryClient {
    async fn get_donor(&self, program_id: &str, donor_id: &str) -> Result<Option<ClinicalDonor>> {
        let resp = self
            .http
            .get(format!("{}/clinical/program/{program_id}/donor/{donor_id}", self.base_url))
            .send()
            .await
            .map_err(upstream_err)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("clinical registry GET donor {donor_id} returned {}", resp.status())));
        }
        Ok(Some(resp.json().await.map_err(upstream_err)?))
    }
}

/// `POST {analyses, repoCode}` against the analysis-to-file transform
/// service.
pub struct AnalysisTransformClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalysisTransformClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

#[async_trait]
impl AnalysisTransform for AnalysisTransformClient {
    async fn transform(&self, analysis_ids: &[String], repo_code: &str) -> Result<HashMap<String, Vec<FileFragment>>> {
        let body = json!({ "analyses": analysis_ids, "repoCode": repo_code });
        let resp = self.http.post(format!("{}/transform", self.base_url)).json(&body).send().await.map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("transform service returned {}", resp.status())));
        }
        resp.json().await.map_err(upstream_err)
    }
}

/// `GET /data-centers/{id}`.
pub struct DataCenterRegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl DataCenterRegistryClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

#[async_trait]
impl DataCenterRegistry for DataCenterRegistryClient {
    async fn get_data_center(&self, id: &str) -> Result<DataCenter> {
        let resp = self.http.get(format!("{}/data-centers/{id}", self.base_url)).send().await.map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("data center registry GET {id} returned {}", resp.status())));
        }
        resp.json().await.map_err(upstream_err)
    }
}
