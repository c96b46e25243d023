/*!
The event ingestion pipeline (§4.8, §5): consumes `analysisUpdates` and
`clinicalUpdates` from Kafka with bounded retry and dead-letter forwarding,
plus a periodic `recalculateEmbargo` sweep with no retry/DLQ of its own.
*/

pub mod analysis_update;
pub mod clinical_update;
pub mod consumer;
pub mod messages;
pub mod offsets;
pub mod recalculate;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use file_manager::{AnalysisTransform, FileManager};
use file_types::{Error, Result};
use search_index::Indexer;

pub use analysis_update::{handle as handle_analysis_update, AnalysisUpdateContext};
pub use clinical_update::{handle as handle_clinical_update, ClinicalUpdateContext};
pub use consumer::ConsumerConfig;
pub use messages::{AnalysisUpdateMessage, ClinicalUpdateMessage};
pub use offsets::SlidingWindowCommitter;

/// Everything the pipeline needs, wired once at startup.
pub struct EventIngestionPipeline {
    pub analysis_updates: ConsumerConfig,
    pub clinical_updates: ConsumerConfig,
    pub recalculate_trigger: Option<ConsumerConfig>,
    pub analysis_update_context: AnalysisUpdateContext,
    pub clinical_update_context: ClinicalUpdateContext,
}

impl EventIngestionPipeline {
    pub fn new(
        analysis_updates: ConsumerConfig,
        clinical_updates: ConsumerConfig,
        file_manager: Arc<FileManager>,
        transform: Arc<dyn AnalysisTransform>,
        indexer: Arc<Indexer>,
        status_update_concurrency: usize,
        recalculation_concurrency: usize,
    ) -> Self {
        EventIngestionPipeline {
            analysis_updates,
            clinical_updates,
            recalculate_trigger: None,
            analysis_update_context: AnalysisUpdateContext {
                file_manager: file_manager.clone(),
                transform,
                indexer: indexer.clone(),
                status_update_concurrency,
            },
            clinical_update_context: ClinicalUpdateContext { file_manager, indexer, recalculation_concurrency },
        }
    }

    /// Attaches a `recalculateEmbargo` trigger consumer (§4.8, §6): every
    /// message on this topic, body ignored, fires one full recalculation
    /// sweep. Optional -- a deployment may instead schedule the sweep on a
    /// timer, since the topic's payload carries no information either way.
    pub fn with_recalculate_trigger(mut self, config: ConsumerConfig) -> Self {
        self.recalculate_trigger = Some(config);
        self
    }

    /// Runs the `analysisUpdates` consumer loop. Intended to be spawned as
    /// its own task; returns only on an unrecoverable setup error.
    pub async fn run_analysis_updates(&self) -> Result<()> {
        let consumer = self.analysis_updates.build_consumer()?;
        let producer = self.analysis_updates.build_producer()?;
        let committer = SlidingWindowCommitter::new(
            self.analysis_updates.commit_max_messages,
            self.analysis_updates.commit_max_interval,
        );

        consumer::run(&self.analysis_updates, &consumer, Some(&producer), &committer, |payload| async move {
            let msg: AnalysisUpdateMessage =
                serde_json::from_str(&payload).map_err(|e| Error::invalid_argument(e.to_string()))?;
            handle_analysis_update(&msg, &self.analysis_update_context).await
        })
        .await
    }

    /// Runs the `clinicalUpdates` consumer loop.
    pub async fn run_clinical_updates(&self) -> Result<()> {
        let consumer = self.clinical_updates.build_consumer()?;
        let producer = self.clinical_updates.build_producer()?;
        let committer = SlidingWindowCommitter::new(
            self.clinical_updates.commit_max_messages,
            self.clinical_updates.commit_max_interval,
        );

        consumer::run(&self.clinical_updates, &consumer, Some(&producer), &committer, |payload| async move {
            let msg: ClinicalUpdateMessage =
                serde_json::from_str(&payload).map_err(|e| Error::invalid_argument(e.to_string()))?;
            handle_clinical_update(&msg, &self.clinical_update_context).await
        })
        .await
    }

    /// Runs the `recalculateEmbargo` sweep once. Callers schedule repeated
    /// invocations (cron, or a consumer on a trigger-only topic whose body
    /// is ignored); there is no retry/DLQ wrapper here (§7).
    pub async fn run_recalculation(&self) -> Result<()> {
        recalculate::run(&self.analysis_update_context.file_manager, &self.analysis_update_context.indexer).await
    }

    /// Runs the `recalculateEmbargo` trigger consumer, if one was attached
    /// via [`Self::with_recalculate_trigger`]. Each message, regardless of
    /// payload, fires [`Self::run_recalculation`].
    pub async fn run_recalculate_trigger(&self) -> Result<()> {
        let Some(config) = &self.recalculate_trigger else {
            return Ok(());
        };
        let consumer = config.build_consumer()?;
        let committer = SlidingWindowCommitter::new(config.commit_max_messages, config.commit_max_interval);

        consumer::run(config, &consumer, None, &committer, |_payload| self.run_recalculation()).await
    }
}

pub const DEFAULT_COMMIT_MAX_MESSAGES: u32 = 10;
pub const DEFAULT_COMMIT_MAX_INTERVAL: Duration = Duration::from_secs(5);
