use std::net::SocketAddr;

use clap::Parser;

fn default_http_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}

/// Launch options for the files service (§6), one flag per external
/// collaborator or store path. Every flag doubles as an environment
/// variable so the service can be configured purely from its deployment
/// manifest.
#[derive(Debug, Clone, Parser)]
#[clap(version, about = "File-centric indexing and release service")]
pub struct Opt {
    #[clap(long, env = "FILES_HTTP_ADDR", default_value_t = default_http_addr())]
    pub http_addr: SocketAddr,

    #[clap(long, env = "FILES_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[clap(long, env = "FILES_LOG_JSON")]
    pub log_json: bool,

    #[clap(long, env = "FILES_DB_PATH", default_value = "./data/files")]
    pub file_store_path: String,

    #[clap(long, env = "FILES_DB_MAP_SIZE", default_value_t = 10 * 1024 * 1024 * 1024)]
    pub file_store_map_size: usize,

    #[clap(long, env = "FILES_RELEASE_DB_PATH", default_value = "./data/release")]
    pub release_store_path: String,

    #[clap(long, env = "FILES_RELEASE_DB_MAP_SIZE", default_value_t = 1024 * 1024 * 1024)]
    pub release_store_map_size: usize,

    #[clap(long, env = "FILES_ELASTICSEARCH_URL", default_value = "http://localhost:9200")]
    pub elasticsearch_url: String,

    #[clap(long, env = "FILES_SNAPSHOT_REPOSITORY", default_value = "file_releases")]
    pub snapshot_repository: String,

    #[clap(long, env = "FILES_ROLLCALL_URL", default_value = "http://localhost:9001")]
    pub rollcall_url: String,

    #[clap(long, env = "FILES_GATEWAY_GRAPHQL_URL")]
    pub gateway_graphql_url: String,

    #[clap(long, env = "FILES_CLINICAL_URL")]
    pub clinical_base_url: String,

    #[clap(long, env = "FILES_TRANSFORM_URL")]
    pub transform_base_url: String,

    #[clap(long, env = "FILES_DATA_CENTER_REGISTRY_URL")]
    pub data_center_registry_url: String,

    #[clap(long, env = "FILES_KAFKA_BROKERS", default_value = "localhost:9092")]
    pub kafka_brokers: String,

    #[clap(long, env = "FILES_KAFKA_GROUP_ID", default_value = "files-service")]
    pub kafka_group_id: String,

    #[clap(long, env = "FILES_ANALYSIS_UPDATES_TOPIC", default_value = "analysisUpdates")]
    pub analysis_updates_topic: String,

    #[clap(long, env = "FILES_CLINICAL_UPDATES_TOPIC", default_value = "clinicalUpdates")]
    pub clinical_updates_topic: String,

    #[clap(long, env = "FILES_PUBLIC_RELEASE_TOPIC", default_value = "publicRelease")]
    pub public_release_topic: String,

    /// Topic for the `recalculateEmbargo` trigger consumer (§4.8, §6). Unset
    /// disables the Kafka-triggered sweep in favor of the periodic timer
    /// driven by `recalculation-interval-secs`.
    #[clap(long, env = "FILES_RECALCULATE_TOPIC")]
    pub recalculate_topic: Option<String>,

    #[clap(long, env = "FILES_DLQ_SUFFIX", default_value = "-dlq")]
    pub dlq_suffix: String,

    #[clap(long, env = "FILES_RECALCULATION_INTERVAL_SECS", default_value_t = 3600)]
    pub recalculation_interval_secs: u64,
}

impl Opt {
    pub fn analysis_updates_dlq_topic(&self) -> String {
        format!("{}{}", self.analysis_updates_topic, self.dlq_suffix)
    }

    pub fn clinical_updates_dlq_topic(&self) -> String {
        format!("{}{}", self.clinical_updates_topic, self.dlq_suffix)
    }
}
