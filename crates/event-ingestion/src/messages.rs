use file_types::upstream::SongAnalysis;
use serde::Deserialize;

/// `analysisUpdates` message (§4.8). Deserialization itself enforces the
/// "all five string fields must be strings" / "analysisId and analysisState
/// must be strings" validation rules: a field of the wrong JSON type fails
/// to parse into a typed `String`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisUpdateMessage {
    pub analysis_id: String,
    pub study_id: String,
    pub state: String,
    pub action: String,
    pub song_server_id: String,
    pub analysis: SongAnalysis,
}

/// `clinicalUpdates` message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalUpdateMessage {
    pub program_id: String,
    #[serde(default)]
    pub donor_ids: Option<Vec<String>>,
}
