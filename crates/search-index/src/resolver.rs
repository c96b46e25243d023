use elasticsearch::indices::{IndicesCloseParts, IndicesOpenParts, IndicesPutMappingParts, IndicesPutSettingsParts};
use elasticsearch::Elasticsearch;
use file_types::index_name::{IndexGeneration, Visibility};
use file_types::{Code, Error, Result};
use serde_json::Value;

use crate::rollcall::RollcallClient;
use crate::single_flight::SingleFlight;

/// Canonical settings + mapping applied to every newly minted generation,
/// regardless of visibility: the shape of a file-centric document never
/// changes between restricted and public, only which documents are allowed
/// into it.
#[derive(Clone)]
pub struct IndexTemplate {
    pub settings: Value,
    pub mapping: Value,
}

/// Obtains, on demand, the current and "next" index for a `(program,
/// visibility)` pair (§4.5). A single resolver instance backs one release
/// phase: its memoization must not survive past that phase, so it is
/// constructed fresh per phase rather than kept as a long-lived singleton.
pub struct IndexGenerationResolver {
    rollcall: RollcallClient,
    es: Elasticsearch,
    entity: String,
    doc_type: String,
    template: IndexTemplate,
    next: SingleFlight<(String, Visibility), Result<IndexGeneration>>,
}

impl IndexGenerationResolver {
    pub fn new(rollcall: RollcallClient, es: Elasticsearch, entity: impl Into<String>, doc_type: impl Into<String>, template: IndexTemplate) -> Self {
        Self {
            rollcall,
            es,
            entity: entity.into(),
            doc_type: doc_type.into(),
            template,
            next: SingleFlight::default(),
        }
    }

    /// The currently aliased generation for `(program, visibility)`, or
    /// `None` if the program has never been indexed under that visibility.
    pub async fn current(&self, program_id: &str, visibility: Visibility) -> Result<Option<IndexGeneration>> {
        let shard = file_types::index_name::normalize_shard(program_id);
        let resolved = self.rollcall.resolved().await?;
        Ok(resolved
            .into_iter()
            .filter(|g| g.entity == self.entity && g.r#type == self.doc_type && g.shard == shard && g.shard_prefix == visibility && g.valid)
            .max_by_key(|g| g.release))
    }

    /// The "next" generation for `(program, visibility)`: created once per
    /// resolver instance and memoized thereafter, with concurrent callers
    /// for the same key coalesced onto a single rollcall round trip.
    pub async fn next(&self, program_id: &str, visibility: Visibility, clone_previous: bool) -> Result<IndexGeneration> {
        let shard = file_types::index_name::normalize_shard(program_id);
        let key = (shard.clone(), visibility);
        self.next
            .get_or_init(key, || async move {
                let clone_from = if clone_previous {
                    self.current(program_id, visibility).await.ok().flatten().map(|g| g.index_name())
                } else {
                    None
                };
                let generation = self
                    .rollcall
                    .create(&self.entity, &self.doc_type, &shard, visibility, clone_from.as_deref())
                    .await?;
                self.apply_template(&generation.index_name()).await?;
                Ok(generation)
            })
            .await
    }

    /// close / put settings / put mapping / open, in that order -- a
    /// settings update on most Elasticsearch versions requires the index be
    /// closed first.
    async fn apply_template(&self, index_name: &str) -> Result<()> {
        self.es
            .indices()
            .close(IndicesCloseParts::Index(&[index_name]))
            .send()
            .await
            .map_err(es_err)?
            .error_for_status_code()
            .map_err(es_err)?;

        self.es
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&[index_name]))
            .body(self.template.settings.clone())
            .send()
            .await
            .map_err(es_err)?
            .error_for_status_code()
            .map_err(es_err)?;

        self.es
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index_name]))
            .body(self.template.mapping.clone())
            .send()
            .await
            .map_err(es_err)?
            .error_for_status_code()
            .map_err(es_err)?;

        self.es
            .indices()
            .open(IndicesOpenParts::Index(&[index_name]))
            .send()
            .await
            .map_err(es_err)?
            .error_for_status_code()
            .map_err(es_err)?;

        Ok(())
    }

    /// Every generation minted by this resolver instance so far, for the
    /// release step to attach to the alias.
    pub async fn tracked_next_indices(&self) -> Vec<IndexGeneration> {
        self.next.snapshot().await.into_iter().filter_map(|(_, v)| v.ok()).collect()
    }

    pub async fn reset(&self) {
        self.next.clear().await;
    }

    /// Forwards to the rollcall client's alias release. Kept on the
    /// resolver, rather than handing the indexer its own rollcall handle,
    /// so the resolver remains the only thing in this crate that talks to
    /// rollcall.
    pub async fn release_alias(&self, index_names: &[String]) -> Result<()> {
        self.rollcall.release(index_names).await
    }

    /// Purges any tracked "next" entry naming one of `index_names`, used by
    /// `DeleteIndices` to keep the memoization map consistent with the
    /// cluster after a generation is dropped out from under it.
    pub async fn forget(&self, index_names: &[String]) {
        self.next
            .retain_values(|result| match result {
                Ok(generation) => !index_names.contains(&generation.index_name()),
                Err(_) => true,
            })
            .await;
    }
}

pub(crate) fn es_err(e: impl std::fmt::Display) -> Error {
    Error::new(Code::Upstream, e.to_string())
}
