/*!
The release orchestrator (§4.9): drives the active release through
Calculate → Build → Publish, reading file state from [`file_store`],
persisting the state machine in [`release_store`], and materializing public
indices through [`search_index`].
*/

pub mod build;
pub mod calculate;
pub mod events;
pub mod publish;

use std::sync::Arc;

use elasticsearch::Elasticsearch;
use file_manager::AnalysisTransform;
use file_store::FileStore;
use release_store::ReleaseStore;
use search_index::{Indexer, IndexerFactory};
use tokio::sync::RwLock;

pub use events::{KafkaReleaseEventPublisher, ProgramRelease, PublicReleaseEvent, ReleaseEventPublisher};

pub struct ReleaseOrchestrator {
    file_store: FileStore,
    release_store: ReleaseStore,
    indexer_factory: IndexerFactory,
    indexer: RwLock<Arc<Indexer>>,
    es: Elasticsearch,
    transform: Arc<dyn AnalysisTransform>,
    event_publisher: Arc<dyn ReleaseEventPublisher>,
    snapshot_repository: String,
}

impl ReleaseOrchestrator {
    pub fn new(
        file_store: FileStore,
        release_store: ReleaseStore,
        indexer_factory: IndexerFactory,
        es: Elasticsearch,
        transform: Arc<dyn AnalysisTransform>,
        event_publisher: Arc<dyn ReleaseEventPublisher>,
        snapshot_repository: impl Into<String>,
    ) -> Self {
        let indexer = RwLock::new(Arc::new(indexer_factory.build()));
        ReleaseOrchestrator {
            file_store,
            release_store,
            indexer_factory,
            indexer,
            es,
            transform,
            event_publisher,
            snapshot_repository: snapshot_repository.into(),
        }
    }

    pub fn release_store(&self) -> &ReleaseStore {
        &self.release_store
    }

    /// The indexer backing whichever release phase is currently in flight.
    /// `build` mints a fresh one via `start_new_release_phase` at the top of
    /// each release cycle; `publish` reuses that same instance so the
    /// generations build tracked are still tracked when `release()` runs.
    pub(crate) async fn current_indexer(&self) -> Arc<Indexer> {
        self.indexer.read().await.clone()
    }

    /// Replaces the current-phase indexer with a freshly built one, so a new
    /// release cycle never inherits a prior cycle's latched `released` flag
    /// or memoized "next" generations (§4.6, §5).
    pub(crate) async fn start_new_release_phase(&self) {
        let fresh = Arc::new(self.indexer_factory.build());
        *self.indexer.write().await = fresh;
    }
}
