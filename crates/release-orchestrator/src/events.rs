//! The outbound `publicRelease` event (§6). Emission failure is logged, not
//! propagated -- a release that published successfully must not roll back
//! because a downstream notification failed to send.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use file_types::Result;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRelease {
    pub id: String,
    pub donors_updated: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicReleaseEvent {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: time::OffsetDateTime,
    pub label: String,
    pub programs: Vec<ProgramRelease>,
}

#[async_trait]
pub trait ReleaseEventPublisher: Send + Sync {
    async fn publish(&self, event: &PublicReleaseEvent) -> Result<()>;
}

/// Publishes to the `publicRelease` Kafka topic, mirroring the inbound
/// consumers' own broker configuration.
pub struct KafkaReleaseEventPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaReleaseEventPublisher {
    pub fn new(producer: FutureProducer, topic: impl Into<String>) -> Self {
        KafkaReleaseEventPublisher { producer, topic: topic.into() }
    }
}

#[async_trait]
impl ReleaseEventPublisher for KafkaReleaseEventPublisher {
    async fn publish(&self, event: &PublicReleaseEvent) -> Result<()> {
        let payload = serde_json::to_string(event).map_err(|e| file_types::Error::fatal(e.to_string()))?;
        let record = FutureRecord::<(), str>::to(&self.topic).payload(&payload);
        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| file_types::Error::upstream(e.to_string()))?;
        Ok(())
    }
}

/// Groups added + removed object ids' donors by program, for the outbound
/// event's `programs[].donorsUpdated`.
pub fn group_donors_by_program(files: &[file_types::File]) -> Vec<ProgramRelease> {
    let mut by_program: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in files {
        let donors = by_program.entry(file.program_id.clone()).or_default();
        if !donors.contains(&file.donor_id) {
            donors.push(file.donor_id.clone());
        }
    }
    by_program
        .into_iter()
        .map(|(id, mut donors_updated)| {
            donors_updated.sort();
            ProgramRelease { id, donors_updated }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_types::file::{FileId, NewFile};
    use file_types::SongPublishStatus;
    use time::OffsetDateTime;

    fn file(program_id: &str, donor_id: &str) -> file_types::File {
        file_types::File::from_new(
            FileId::new(1),
            NewFile {
                object_id: "O1".into(),
                repo_id: "DC1".into(),
                program_id: program_id.into(),
                donor_id: donor_id.into(),
                analysis_id: "A1".into(),
                status: SongPublishStatus::Published,
                first_published: OffsetDateTime::UNIX_EPOCH,
            },
        )
    }

    #[test]
    fn donors_deduplicate_within_a_program_and_group_sorted() {
        let files = vec![file("PRG1", "D2"), file("PRG1", "D1"), file("PRG1", "D1"), file("PRG2", "D3")];
        let grouped = group_donors_by_program(&files);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].id, "PRG1");
        assert_eq!(grouped[0].donors_updated, vec!["D1".to_string(), "D2".to_string()]);
        assert_eq!(grouped[1].id, "PRG2");
        assert_eq!(grouped[1].donors_updated, vec!["D3".to_string()]);
    }
}
