use std::sync::Arc;

use elasticsearch::http::transport::Transport;
use elasticsearch::Elasticsearch;
use event_ingestion::{ConsumerConfig, EventIngestionPipeline};
use file_manager::clients::{AnalysisCatalogClient, AnalysisTransformClient, ClinicalRegistryClient, DataCenterRegistryClient, GatewayClient};
use file_manager::{AnalysisTransform, DataCenterRegistry, FileManager};
use file_store::FileStore;
use file_types::{Error, Result};
use release_orchestrator::{KafkaReleaseEventPublisher, ReleaseOrchestrator};
use release_store::ReleaseStore;
use search_index::{IndexTemplate, Indexer, IndexerFactory, RollcallClient};
use time::OffsetDateTime;

use crate::config::Opt;

/// Everything a request handler needs, built once at startup and shared via
/// `actix_web::web::Data`.
pub struct AppState {
    pub file_store: FileStore,
    pub release_store: ReleaseStore,
    pub file_manager: Arc<FileManager>,
    pub indexer: Arc<Indexer>,
    pub release_orchestrator: Arc<ReleaseOrchestrator>,
    pub data_centers: Arc<dyn DataCenterRegistry>,
    pub transform: Arc<dyn AnalysisTransform>,
    pub event_ingestion: Arc<EventIngestionPipeline>,
    pub http: reqwest::Client,
}

const DOC_ENTITY: &str = "file";
const DOC_TYPE: &str = "centric";

fn default_index_template() -> IndexTemplate {
    IndexTemplate {
        settings: serde_json::json!({ "index": { "number_of_shards": 1, "number_of_replicas": 1 } }),
        mapping: serde_json::json!({ "properties": { "object_id": { "type": "keyword" } } }),
    }
}

impl AppState {
    pub fn bootstrap(opt: &Opt) -> anyhow::Result<Self> {
        let now = OffsetDateTime::now_utc();
        let file_store = FileStore::open(&opt.file_store_path, opt.file_store_map_size)?;
        let release_store = ReleaseStore::open(&opt.release_store_path, opt.release_store_map_size, now)?;

        let http = reqwest::Client::new();
        let transport = Transport::single_node(&opt.elasticsearch_url).map_err(|e| Error::fatal(e.to_string()))?;
        let es = Elasticsearch::new(transport);

        let rollcall = RollcallClient::new(http.clone(), opt.rollcall_url.clone());
        let indexer_factory = IndexerFactory::new(es.clone(), rollcall, DOC_ENTITY, DOC_TYPE, default_index_template());
        // The event pipeline never runs a release phase (it never calls
        // `Indexer::release`), so one long-lived instance is fine for it;
        // the release orchestrator gets the factory itself and mints a
        // fresh instance per release cycle (see `ReleaseOrchestrator`).
        let indexer = Arc::new(indexer_factory.build());

        let gateway = Arc::new(GatewayClient::new(http.clone(), opt.gateway_graphql_url.clone()));
        let clinical = Arc::new(ClinicalRegistryClient::new(http.clone(), opt.clinical_base_url.clone()));
        let transform: Arc<dyn AnalysisTransform> = Arc::new(AnalysisTransformClient::new(http.clone(), opt.transform_base_url.clone()));
        let data_centers: Arc<dyn DataCenterRegistry> = Arc::new(DataCenterRegistryClient::new(http.clone(), opt.data_center_registry_url.clone()));

        // The catalog client is re-created per data center once its song
        // server URL is known (see `reindex`); this placeholder backs the
        // file manager's recalculation path, which always has a file's own
        // `repoId` to resolve first.
        let catalog = Arc::new(AnalysisCatalogClient::new(http.clone(), String::new()));
        let file_manager = Arc::new(FileManager::new(file_store.clone(), catalog, gateway, clinical));

        let event_publisher_producer = build_kafka_producer(&opt.kafka_brokers)?;
        let event_publisher = Arc::new(KafkaReleaseEventPublisher::new(event_publisher_producer, opt.public_release_topic.clone()));
        let release_orchestrator = Arc::new(ReleaseOrchestrator::new(
            file_store.clone(),
            release_store.clone(),
            indexer_factory,
            es.clone(),
            transform.clone(),
            event_publisher,
            opt.snapshot_repository.clone(),
        ));

        let analysis_updates = ConsumerConfig {
            brokers: opt.kafka_brokers.clone(),
            group_id: opt.kafka_group_id.clone(),
            topic: opt.analysis_updates_topic.clone(),
            dlq_topic: Some(opt.analysis_updates_dlq_topic()),
            commit_max_messages: event_ingestion::DEFAULT_COMMIT_MAX_MESSAGES,
            commit_max_interval: event_ingestion::DEFAULT_COMMIT_MAX_INTERVAL,
        };
        let clinical_updates = ConsumerConfig {
            brokers: opt.kafka_brokers.clone(),
            group_id: opt.kafka_group_id.clone(),
            topic: opt.clinical_updates_topic.clone(),
            dlq_topic: Some(opt.clinical_updates_dlq_topic()),
            commit_max_messages: event_ingestion::DEFAULT_COMMIT_MAX_MESSAGES,
            commit_max_interval: event_ingestion::DEFAULT_COMMIT_MAX_INTERVAL,
        };
        let mut event_ingestion = EventIngestionPipeline::new(
            analysis_updates,
            clinical_updates,
            file_manager.clone(),
            transform.clone(),
            indexer.clone(),
            10,
            5,
        );
        if let Some(topic) = &opt.recalculate_topic {
            event_ingestion = event_ingestion.with_recalculate_trigger(ConsumerConfig {
                brokers: opt.kafka_brokers.clone(),
                group_id: opt.kafka_group_id.clone(),
                topic: topic.clone(),
                dlq_topic: None,
                commit_max_messages: event_ingestion::DEFAULT_COMMIT_MAX_MESSAGES,
                commit_max_interval: event_ingestion::DEFAULT_COMMIT_MAX_INTERVAL,
            });
        }
        let event_ingestion = Arc::new(event_ingestion);

        Ok(AppState {
            file_store,
            release_store,
            file_manager,
            indexer,
            release_orchestrator,
            data_centers,
            transform,
            event_ingestion,
            http,
        })
    }
}

fn build_kafka_producer(brokers: &str) -> Result<rdkafka::producer::FutureProducer> {
    rdkafka::config::ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()
        .map_err(|e| Error::fatal(format!("failed to create kafka producer: {e}")))
}
