use std::future::Future;
use std::time::Duration;

use file_types::Error;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::offsets::SlidingWindowCommitter;
use crate::retry::with_bounded_retry;

/// Retry attempts per message before a terminal failure is forwarded to the
/// DLQ (§7: "retry 3x, factor 1").
const RETRY_ATTEMPTS: usize = 3;
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

pub struct ConsumerConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
    /// Topic to forward terminally-failed messages to. `None` disables DLQ
    /// forwarding -- the message is logged and dropped.
    pub dlq_topic: Option<String>,
    pub commit_max_messages: u32,
    pub commit_max_interval: Duration,
}

impl ConsumerConfig {
    pub fn build_consumer(&self) -> file_types::Result<StreamConsumer> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| Error::fatal(format!("failed to create kafka consumer: {e}")))
    }

    pub fn build_producer(&self) -> file_types::Result<FutureProducer> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| Error::fatal(format!("failed to create kafka producer: {e}")))
    }
}

/// Runs one topic's consume loop until the process is asked to shut down:
/// for every message, retries `handle` up to `RETRY_ATTEMPTS` times, forwards
/// to the DLQ on terminal failure, and commits offsets on the sliding
/// window. Offset advancement happens unconditionally, per message, whether
/// the handler succeeded, retried into success, or was forwarded to the DLQ.
pub async fn run<F, Fut>(
    config: &ConsumerConfig,
    consumer: &StreamConsumer,
    producer: Option<&FutureProducer>,
    committer: &SlidingWindowCommitter,
    mut handle: F,
) -> file_types::Result<()>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = file_types::Result<()>>,
{
    consumer
        .subscribe(&[config.topic.as_str()])
        .map_err(|e| Error::fatal(format!("failed to subscribe to {}: {e}", config.topic)))?;

    loop {
        let message = match consumer.recv().await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(topic = %config.topic, error = %e, "kafka recv failed");
                continue;
            }
        };

        let payload = message.payload().map(|bytes| String::from_utf8_lossy(bytes).into_owned());
        let Some(payload) = payload else {
            tracing::warn!(topic = %config.topic, "skipping message with empty payload");
            committer.record(consumer).await;
            continue;
        };

        let result = with_bounded_retry(RETRY_ATTEMPTS, RETRY_INTERVAL, || handle(payload.clone())).await;

        if let Err(e) = result {
            tracing::error!(topic = %config.topic, error = %e, "message failed after all retries, routing to dlq");
            forward_to_dlq(config, producer, &payload).await;
        }

        committer.record(consumer).await;
    }
}

async fn forward_to_dlq(config: &ConsumerConfig, producer: Option<&FutureProducer>, payload: &str) {
    let (Some(producer), Some(dlq_topic)) = (producer, config.dlq_topic.as_deref()) else {
        tracing::warn!(topic = %config.topic, "no dlq configured, dropping message");
        return;
    };

    let record = FutureRecord::<(), str>::to(dlq_topic).payload(payload);
    if let Err((e, _)) = producer.send(record, Duration::from_secs(5)).await {
        tracing::error!(topic = %config.topic, dlq_topic, error = %e, "dlq send failed, offset still advances");
    }
}
