//! Narrow client for the "rollcall" index alias resolver service (§6): the
//! only collaborator allowed to mint new index names and flip the alias.

use file_types::index_name::{IndexGeneration, Visibility};
use file_types::{Code, Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct RollcallClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    entity: &'a str,
    r#type: &'a str,
    shard_prefix: Visibility,
    shard: &'a str,
    clone_from: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedIndex {
    entity: String,
    r#type: String,
    shard_prefix: Visibility,
    shard: String,
    release_prefix: String,
    release: u32,
    valid: bool,
}

impl From<ResolvedIndex> for IndexGeneration {
    fn from(r: ResolvedIndex) -> Self {
        IndexGeneration {
            entity: r.entity,
            r#type: r.r#type,
            shard_prefix: r.shard_prefix,
            shard: r.shard,
            release_prefix: r.release_prefix,
            release: r.release,
            valid: r.valid,
        }
    }
}

impl RollcallClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    /// `GET /indices/resolved`: every known generation across all
    /// shards/visibilities, newest first within a series.
    pub async fn resolved(&self) -> Result<Vec<IndexGeneration>> {
        let resp = self
            .http
            .get(format!("{}/indices/resolved", self.base_url))
            .send()
            .await
            .map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("rollcall GET /indices/resolved returned {}", resp.status())));
        }
        let resolved: Vec<ResolvedIndex> = resp.json().await.map_err(upstream_err)?;
        Ok(resolved.into_iter().map(Into::into).collect())
    }

    /// `POST /indices/create`, optionally cloning the settings/mapping (not
    /// the documents) of the previous generation in the series.
    pub async fn create(
        &self,
        entity: &str,
        r#type: &str,
        shard: &str,
        visibility: Visibility,
        clone_from: Option<&str>,
    ) -> Result<IndexGeneration> {
        let body = CreateRequest { entity, r#type, shard_prefix: visibility, shard, clone_from };
        let resp = self
            .http
            .post(format!("{}/indices/create", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("rollcall POST /indices/create returned {}", resp.status())));
        }
        let created: ResolvedIndex = resp.json().await.map_err(upstream_err)?;
        Ok(created.into())
    }

    /// `POST /aliases/release`: atomically swap the shared alias onto
    /// `index_names`. A failure here is per-index; callers log and continue
    /// rather than aborting the remaining releases (§4.6 failure policy).
    pub async fn release(&self, index_names: &[String]) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/aliases/release", self.base_url))
            .json(&serde_json::json!({ "indices": index_names }))
            .send()
            .await
            .map_err(upstream_err)?;
        if !resp.status().is_success() {
            return Err(Error::upstream(format!("rollcall POST /aliases/release returned {}", resp.status())));
        }
        Ok(())
    }
}

fn upstream_err(e: reqwest::Error) -> Error {
    Error::new(Code::Upstream, e.to_string())
}
