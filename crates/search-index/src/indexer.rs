use std::collections::BTreeMap;
use std::sync::Arc;

use elasticsearch::http::request::JsonBody;
use elasticsearch::indices::IndicesDeleteParts;
use elasticsearch::{BulkParts, DeleteParts, Elasticsearch, UpdateParts};
use file_types::index_name::{IndexGeneration, Visibility};
use file_types::{Code, Error, File, ReleaseState, Result, SongPublishStatus};
use futures::future::try_join_all;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::resolver::{es_err, IndexGenerationResolver, IndexTemplate};
use crate::rollcall::RollcallClient;

/// Maximum documents per bulk request (§4.5).
const BULK_CHUNK_SIZE: usize = 5_000;
/// Maximum concurrent bulk requests per indexer instance (§4.5, §5).
const MAX_CONCURRENT_BULK: usize = 5;
/// Maximum concurrent index-generation creations (§4.5, §5).
const MAX_CONCURRENT_GENERATION_CREATES: usize = 5;

/// A file-centric document paired with the store fields the indexer needs
/// to decide routing and eligibility, so bulk operations never have to
/// re-parse the JSON body to find out whether a document belongs in this
/// batch.
#[derive(Debug, Clone)]
pub struct FileDoc {
    pub object_id: String,
    pub program_id: String,
    pub release_state: ReleaseState,
    pub status: SongPublishStatus,
    pub body: Value,
}

impl FileDoc {
    pub fn new(file: &File, body: Value) -> Self {
        FileDoc {
            object_id: file.object_id.clone(),
            program_id: file.program_id.clone(),
            release_state: file.release_state,
            status: file.status,
            body,
        }
    }

    /// A document destined only for `RemoveRestrictedFileDocs`, which never
    /// reads `body` -- the delete bulk op addresses by id alone.
    pub fn for_delete(file: &File) -> Self {
        FileDoc::new(file, Value::Null)
    }
}

/// Bulk upsert/delete of file-centric documents into restricted/public
/// index generations, with per-program fan-out and the release-to-alias
/// step (§4.6). One instance is scoped to a single release phase: its
/// resolver's memoization must not outlive the phase.
pub struct Indexer {
    es: Elasticsearch,
    resolver: IndexGenerationResolver,
    bulk_semaphore: Arc<Semaphore>,
    generation_semaphore: Arc<Semaphore>,
    released: std::sync::atomic::AtomicBool,
}

impl Indexer {
    pub fn new(es: Elasticsearch, resolver: IndexGenerationResolver) -> Self {
        Indexer {
            es,
            resolver,
            bulk_semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_BULK)),
            generation_semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_GENERATION_CREATES)),
            released: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Partial-updates or deletes a single file's restricted document.
    ///
    /// Skipped entirely unless the file is upstream-PUBLISHED and currently
    /// RESTRICTED -- a QUEUED or PUBLIC file has no restricted document left
    /// to partially update (build/publish already moved or is about to move
    /// it into the public generation). A RESTRICTED file that has moved to
    /// `UNRELEASED` is deleted from the restricted index it used to live in;
    /// any other release state reachable here (i.e. still RESTRICTED) gets a
    /// partial update of just the embargo/release fields.
    pub async fn update_restricted_file(&self, file: &File, doc: &Value) -> Result<()> {
        if !file.is_upstream_published() {
            return Ok(());
        }
        if file.release_state != ReleaseState::Restricted && file.release_state != ReleaseState::Unreleased {
            return Ok(());
        }
        let Some(index) = self.resolver.current(&file.program_id, Visibility::Restricted).await? else {
            return Ok(());
        };

        if file.release_state == ReleaseState::Unreleased {
            let _ = doc;
            return self.delete_one(&index.index_name(), &file.object_id).await;
        }

        let partial = serde_json::json!({
            "doc": {
                "embargo_stage": file.embargo_stage,
                "release_state": file.release_state,
                "meta": { "embargo_stage": file.embargo_stage, "release_state": file.release_state },
            }
        });
        self.es
            .update(UpdateParts::IndexId(&index.index_name(), &file.object_id))
            .body(partial)
            .send()
            .await
            .map_err(es_err)?
            .error_for_status_code()
            .map_err(es_err)?;
        Ok(())
    }

    /// Indexes `docs` restricted to files that are RESTRICTED and
    /// upstream-PUBLISHED, each into its program's next restricted
    /// generation.
    pub async fn index_restricted_file_docs(&self, docs: Vec<FileDoc>) -> Result<()> {
        let eligible = docs
            .into_iter()
            .filter(|d| d.release_state == ReleaseState::Restricted && d.status == SongPublishStatus::Published)
            .collect();
        self.bulk_by_program(eligible, Visibility::Restricted, BulkOp::Index).await
    }

    /// Removes `docs` restricted to RESTRICTED files from their program's
    /// next restricted generation.
    pub async fn remove_restricted_file_docs(&self, docs: Vec<FileDoc>) -> Result<()> {
        let eligible = docs.into_iter().filter(|d| d.release_state == ReleaseState::Restricted).collect();
        self.bulk_by_program(eligible, Visibility::Restricted, BulkOp::Delete).await
    }

    /// Indexes `docs` restricted to PUBLIC + upstream-PUBLISHED files, into
    /// the build step's freshly minted public generations.
    pub async fn index_public_file_docs(&self, docs: Vec<FileDoc>) -> Result<()> {
        let eligible = docs
            .into_iter()
            .filter(|d| {
                d.release_state == ReleaseState::Public && d.status == SongPublishStatus::Published
            })
            .collect();
        self.bulk_by_program(eligible, Visibility::Public, BulkOp::Index).await
    }

    /// Mints an empty generation per program (no clone) for each
    /// visibility, bounded by `MAX_CONCURRENT_GENERATION_CREATES`.
    pub async fn create_empty_restricted_indices(&self, programs: &[String]) -> Result<Vec<String>> {
        self.create_empty(programs, Visibility::Restricted).await
    }

    pub async fn create_empty_public_indices(&self, programs: &[String]) -> Result<Vec<String>> {
        self.create_empty(programs, Visibility::Public).await
    }

    async fn create_empty(&self, programs: &[String], visibility: Visibility) -> Result<Vec<String>> {
        let futures = programs.iter().map(|program_id| {
            let permit = self.generation_semaphore.clone();
            async move {
                let _permit = permit.acquire_owned().await.map_err(|e| Error::fatal(e.to_string()))?;
                let generation = self.resolver.next(program_id, visibility, false).await?;
                Result::<String>::Ok(generation.index_name())
            }
        });
        try_join_all(futures).await
    }

    /// Attaches every tracked "next" generation to the shared alias --
    /// restricted generations always, public generations only when
    /// `public_release` is set -- plus any `additional_indices` (e.g. a
    /// fresh restricted generation minted during publish for removed
    /// files). Releasing the same set of tracked generations twice is
    /// rejected: the tracked map is cleared on success, and the second call
    /// would otherwise silently release nothing.
    pub async fn release(&self, public_release: bool, additional_indices: &[String]) -> Result<()> {
        if self.released.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::state_conflict("this indexer instance's generation has already been released"));
        }

        let tracked = self.resolver.tracked_next_indices().await;
        let mut names: Vec<String> = tracked
            .into_iter()
            .filter(|g| public_release || g.shard_prefix == Visibility::Restricted)
            .map(|g| g.index_name())
            .collect();
        names.extend(additional_indices.iter().cloned());

        if let Err(e) = self.resolver.release_alias(&names).await {
            tracing::error!(indices = ?names, error = %e, "rollcall alias release failed");
            self.resolver.reset().await;
            return Err(e);
        }

        self.resolver.reset().await;
        Ok(())
    }

    pub async fn delete_indices(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.es
            .indices()
            .delete(IndicesDeleteParts::Index(&refs))
            .send()
            .await
            .map_err(es_err)?
            .error_for_status_code()
            .map_err(es_err)?;
        self.resolver.forget(names).await;
        Ok(())
    }

    async fn delete_one(&self, index_name: &str, object_id: &str) -> Result<()> {
        self.es
            .delete(DeleteParts::IndexId(index_name, object_id))
            .send()
            .await
            .map_err(es_err)?
            .error_for_status_code()
            .map_err(es_err)?;
        Ok(())
    }

    async fn bulk_by_program(&self, docs: Vec<FileDoc>, visibility: Visibility, op: BulkOp) -> Result<()> {
        let mut by_program: BTreeMap<String, Vec<FileDoc>> = BTreeMap::new();
        for doc in docs {
            by_program.entry(doc.program_id.clone()).or_default().push(doc);
        }

        let futures = by_program.into_iter().map(|(program_id, docs)| {
            let visibility = visibility;
            let op = op;
            async move {
                let clone_previous = visibility == Visibility::Restricted;
                let generation = self.resolver.next(&program_id, visibility, clone_previous).await?;
                for chunk in docs.chunks(BULK_CHUNK_SIZE) {
                    self.bulk_chunk(&generation, chunk, op).await?;
                }
                Result::<()>::Ok(())
            }
        });
        try_join_all(futures).await?;
        Ok(())
    }

    async fn bulk_chunk(&self, generation: &IndexGeneration, docs: &[FileDoc], op: BulkOp) -> Result<()> {
        let _permit = self.bulk_semaphore.acquire().await.map_err(|e| Error::fatal(e.to_string()))?;

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(docs.len() * 2);
        for doc in docs {
            match op {
                BulkOp::Index => {
                    body.push(
                        serde_json::json!({"index": {"_index": generation.index_name(), "_id": doc.object_id}})
                            .into(),
                    );
                    body.push(doc.body.clone().into());
                }
                BulkOp::Delete => {
                    body.push(
                        serde_json::json!({"delete": {"_index": generation.index_name(), "_id": doc.object_id}})
                            .into(),
                    );
                }
            }
        }

        let response = self.es.bulk(BulkParts::None).body(body).send().await.map_err(es_err)?;
        let response = response.error_for_status_code().map_err(es_err)?;
        let parsed: Value = response.json().await.map_err(es_err)?;
        if parsed["errors"].as_bool().unwrap_or(false) {
            return Err(Error::new(Code::Upstream, format!("bulk {op:?} into {} reported item-level errors", generation.index_name())));
        }
        Ok(())
    }
}

/// Builds a fresh [`Indexer`] on demand. An `Indexer` memoizes "next"
/// generations and latches `released` once per instance, so anything that
/// runs more than one release phase over its lifetime (the release
/// orchestrator) must mint a new instance per phase rather than reuse one
/// forever; callers that only ever push restricted updates and never call
/// `release` (event ingestion) can keep a single built instance instead.
#[derive(Clone)]
pub struct IndexerFactory {
    es: Elasticsearch,
    rollcall: RollcallClient,
    entity: String,
    doc_type: String,
    template: IndexTemplate,
}

impl IndexerFactory {
    pub fn new(
        es: Elasticsearch,
        rollcall: RollcallClient,
        entity: impl Into<String>,
        doc_type: impl Into<String>,
        template: IndexTemplate,
    ) -> Self {
        IndexerFactory { es, rollcall, entity: entity.into(), doc_type: doc_type.into(), template }
    }

    pub fn build(&self) -> Indexer {
        let resolver = IndexGenerationResolver::new(
            self.rollcall.clone(),
            self.es.clone(),
            self.entity.clone(),
            self.doc_type.clone(),
            self.template.clone(),
        );
        Indexer::new(self.es.clone(), resolver)
    }
}

#[derive(Debug, Clone, Copy)]
enum BulkOp {
    Index,
    Delete,
}
