use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::labels::Labels;

/// Auto-assigned numeric identifier, surfaced externally as `"FL" + number`.
///
/// `FileId::from_str` is the single place that enforces the `FL` prefix and
/// the non-zero, parseable numeric suffix the specification's boundary
/// behaviors require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(u64);

impl FileId {
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FL{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let suffix = s
            .strip_prefix("FL")
            .ok_or_else(|| Error::invalid_argument(format!("fileId {s:?} must start with \"FL\"")))?;
        let n: u64 = suffix
            .parse()
            .map_err(|_| Error::invalid_argument(format!("fileId {s:?} has a non-numeric suffix")))?;
        if n == 0 {
            return Err(Error::invalid_argument(format!("fileId {s:?} must not be FL0")));
        }
        Ok(FileId(n))
    }
}

impl TryFrom<String> for FileId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.to_string()
    }
}

/// Upstream publish state of a data object, as reported by the analysis
/// catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SongPublishStatus {
    Published,
    Unpublished,
    Suppressed,
}

/// Time-gated access tier of a file. Declaration order doubles as the
/// ordering required by the specification (`UNRELEASED < PROGRAM_ONLY <
/// MEMBER_ACCESS < ASSOCIATE_ACCESS < PUBLIC`); do not reorder the variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbargoStage {
    Unreleased,
    ProgramOnly,
    MemberAccess,
    AssociateAccess,
    Public,
}

/// Whether a file has been, is queued to be, or has not been made public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseState {
    Unreleased,
    Restricted,
    Queued,
    Public,
}

/// Reason a donor is exempt from the clinical-completeness precondition on
/// embargo start calculation. The source system treats this as an open
/// enumeration of case-manager supplied free text; we keep it as a thin
/// newtype rather than inventing a closed taxonomy the spec never states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClinicalExemptionReason(pub String);

/// Administrative overrides layered on top of the calculated embargo stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminControls {
    pub admin_promote: Option<EmbargoStage>,
    pub admin_demote: Option<EmbargoStage>,
    #[serde(default)]
    pub admin_hold: bool,
}

/// The authoritative record for one data object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub file_id: FileId,
    pub object_id: String,

    pub repo_id: String,
    pub program_id: String,
    pub donor_id: String,
    pub analysis_id: String,

    pub status: SongPublishStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub first_published: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339::option", default)]
    pub embargo_start: Option<OffsetDateTime>,
    pub embargo_stage: EmbargoStage,
    pub release_state: ReleaseState,

    #[serde(flatten)]
    pub admin: AdminControls,

    pub clinical_exemption: Option<ClinicalExemptionReason>,

    #[serde(default)]
    pub labels: Labels,
}

/// Fields accepted when a new file record is first observed for an
/// `objectId`. Release-state fields start at their defaults and are derived
/// afterwards by the embargo calculator.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub object_id: String,
    pub repo_id: String,
    pub program_id: String,
    pub donor_id: String,
    pub analysis_id: String,
    pub status: SongPublishStatus,
    pub first_published: OffsetDateTime,
}

impl File {
    pub fn from_new(file_id: FileId, new: NewFile) -> Self {
        File {
            file_id,
            object_id: new.object_id,
            repo_id: new.repo_id,
            program_id: new.program_id,
            donor_id: new.donor_id,
            analysis_id: new.analysis_id,
            status: new.status,
            first_published: new.first_published,
            embargo_start: None,
            embargo_stage: EmbargoStage::Unreleased,
            release_state: ReleaseState::Unreleased,
            admin: AdminControls::default(),
            clinical_exemption: None,
            labels: Labels::new(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self.release_state, ReleaseState::Restricted)
    }

    pub fn is_public(&self) -> bool {
        matches!(self.release_state, ReleaseState::Public)
    }

    pub fn is_upstream_published(&self) -> bool {
        matches!(self.status, SongPublishStatus::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_round_trips() {
        let id = FileId::new(42);
        assert_eq!(id.to_string(), "FL42");
        assert_eq!("FL42".parse::<FileId>().unwrap(), id);
    }

    #[test]
    fn file_id_rejects_missing_prefix() {
        assert!("42".parse::<FileId>().is_err());
    }

    #[test]
    fn file_id_rejects_non_numeric_suffix() {
        assert!("FLx".parse::<FileId>().is_err());
    }

    #[test]
    fn file_id_rejects_zero() {
        assert!("FL0".parse::<FileId>().is_err());
    }

    #[test]
    fn embargo_stage_ordering_matches_spec() {
        use EmbargoStage::*;
        assert!(Unreleased < ProgramOnly);
        assert!(ProgramOnly < MemberAccess);
        assert!(MemberAccess < AssociateAccess);
        assert!(AssociateAccess < Public);
    }
}
