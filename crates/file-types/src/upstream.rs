//! Shapes of the fragments the embargo calculator and file manager read off
//! upstream collaborators (§6). These are deliberately thin: only the
//! fields the core actually reads are named, everything else upstream sends
//! is carried as an opaque JSON bag by the caller that fetched it.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongAnalysis {
    pub analysis_id: String,
    pub analysis_state: String,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub first_published_at: Option<OffsetDateTime>,
    pub study_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleFile {
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub first_published_at: Option<OffsetDateTime>,
}

/// A normal/tumour pair of matched samples, as returned by the gateway's
/// GraphQL `matchedSamplePairs` query. A pair lacking one side contributes
/// nothing to candidate C in §4.3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedSamplePair {
    pub normal: Option<SampleFile>,
    pub tumour: Option<SampleFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStats {
    pub core_completion_percentage: f64,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub core_completion_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalDonor {
    pub donor_id: String,
    pub program_id: String,
    pub completion_stats: CompletionStats,
}
