use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque identifier for a release record.
pub type ReleaseId = String;

/// The nine states of the release machine. Declaration order is irrelevant
/// here (unlike [`crate::EmbargoStage`]); legality of a transition is
/// decided entirely by [`ReleasePhase::allowed_sources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleasePhase {
    Created,
    Calculating,
    Calculated,
    Building,
    Built,
    Publishing,
    Published,
    ErrorCalculate,
    ErrorBuild,
    ErrorPublish,
}

impl ReleasePhase {
    /// The transition table from §4.2, encoded as data rather than scattered
    /// conditionals: for each target phase, the source phases a transition
    /// into it may start from.
    pub fn allowed_sources(&self) -> &'static [ReleasePhase] {
        use ReleasePhase::*;
        match self {
            Calculating => &[Created, Calculated, Built, ErrorBuild, ErrorCalculate, ErrorPublish],
            Calculated => &[Calculating],
            ErrorCalculate => &[Calculating],
            Building => &[Calculated, Built, ErrorBuild, ErrorPublish],
            Built => &[Building],
            ErrorBuild => &[Building],
            Publishing => &[Built, ErrorPublish],
            Published => &[Publishing],
            ErrorPublish => &[Publishing],
            Created => &[],
        }
    }

    pub fn can_transition_from(&self, source: ReleasePhase) -> bool {
        self.allowed_sources().contains(&source)
    }

    /// The ERROR_* phase a failure during this *ING phase maps onto. Only
    /// defined for the three in-progress phases.
    pub fn error_phase(&self) -> Option<ReleasePhase> {
        match self {
            ReleasePhase::Calculating => Some(ReleasePhase::ErrorCalculate),
            ReleasePhase::Building => Some(ReleasePhase::ErrorBuild),
            ReleasePhase::Publishing => Some(ReleasePhase::ErrorPublish),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, ReleasePhase::Published)
    }
}

/// A release's file-set diff against the previous published release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFiles {
    pub kept: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReleaseFiles {
    /// `md5(sort(kept) ∥ "kept" ∥ sort(added) ∥ "added" ∥ sort(removed) ∥
    /// "removed")`. The literal separators are required so that, e.g., an
    /// object id migrating from `added` to `kept` changes the digest even
    /// when the total multiset of bytes would otherwise coincide.
    pub fn version(&self) -> String {
        let mut kept = self.kept.clone();
        let mut added = self.added.clone();
        let mut removed = self.removed.clone();
        kept.sort();
        added.sort();
        removed.sort();

        let mut buf = Vec::new();
        buf.extend(kept.join("").as_bytes());
        buf.extend(b"kept");
        buf.extend(added.join("").as_bytes());
        buf.extend(b"added");
        buf.extend(removed.join("").as_bytes());
        buf.extend(b"removed");

        format!("{:x}", md5::compute(buf))
    }
}

/// Single active-release record. Exactly one record with `phase !=
/// Published` exists at any time; see [`crate::error::Code::StateConflict`]
/// for how the store surfaces a violation of that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: ReleaseId,
    pub phase: ReleasePhase,
    pub error: Option<String>,
    pub files: ReleaseFiles,
    pub version: Option<String>,
    pub label: Option<String>,
    pub indices: Vec<String>,
    pub snapshot: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub calculated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub built_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub published_at: Option<OffsetDateTime>,
}

impl Release {
    pub fn created(id: ReleaseId, now: OffsetDateTime) -> Self {
        Release {
            id,
            phase: ReleasePhase::Created,
            error: None,
            files: ReleaseFiles::default(),
            version: None,
            label: None,
            indices: Vec::new(),
            snapshot: None,
            created_at: now,
            calculated_at: None,
            built_at: None,
            published_at: None,
        }
    }

    pub fn set_files(&mut self, files: ReleaseFiles) {
        self.version = Some(files.version());
        self.files = files;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_order_independent() {
        let a = ReleaseFiles {
            kept: vec!["O4".into(), "O5".into()],
            added: vec!["O1".into(), "O2".into(), "O3".into()],
            removed: vec![],
        };
        let b = ReleaseFiles {
            kept: vec!["O5".into(), "O4".into()],
            added: vec!["O3".into(), "O1".into(), "O2".into()],
            removed: vec![],
        };
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn calculating_is_reachable_from_every_non_in_progress_phase_but_created_is_source_only() {
        assert!(ReleasePhase::Calculating.can_transition_from(ReleasePhase::ErrorPublish));
        assert!(!ReleasePhase::Created.can_transition_from(ReleasePhase::Calculating));
    }

    #[test]
    fn publishing_only_reachable_from_built_or_error_publish() {
        assert!(ReleasePhase::Publishing.can_transition_from(ReleasePhase::Built));
        assert!(ReleasePhase::Publishing.can_transition_from(ReleasePhase::ErrorPublish));
        assert!(!ReleasePhase::Publishing.can_transition_from(ReleasePhase::Calculated));
    }
}
