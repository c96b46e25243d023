use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use tokio::sync::Mutex;

/// Commits consumer offsets on a sliding window (§5): every `max_messages`
/// messages, or every `max_interval` elapsed, whichever comes first. Offset
/// advancement happens unconditionally -- the caller records a message here
/// whether its handler succeeded, retried, or was forwarded to the DLQ.
pub struct SlidingWindowCommitter {
    max_messages: u32,
    max_interval: Duration,
    count: AtomicU32,
    window_start: Mutex<Instant>,
}

impl SlidingWindowCommitter {
    pub fn new(max_messages: u32, max_interval: Duration) -> Self {
        SlidingWindowCommitter { max_messages, max_interval, count: AtomicU32::new(0), window_start: Mutex::new(Instant::now()) }
    }

    pub async fn record(&self, consumer: &StreamConsumer) {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut window_start = self.window_start.lock().await;
        if count >= self.max_messages || window_start.elapsed() >= self.max_interval {
            if let Err(e) = consumer.commit_consumer_state(CommitMode::Async) {
                tracing::error!(error = %e, "failed to commit consumer offsets");
            }
            self.count.store(0, Ordering::SeqCst);
            *window_start = Instant::now();
        }
    }
}
