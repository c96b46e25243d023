use serde::{Deserialize, Serialize};

use crate::file::FileId;

/// One side (`include` or `exclude`) of a [`FileFilter`]. Every populated
/// list is a set-membership disjunction: a file matches the set if it
/// matches any populated list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSet {
    pub analyses: Option<Vec<String>>,
    pub donors: Option<Vec<String>>,
    pub programs: Option<Vec<String>>,
    pub file_ids: Option<Vec<FileId>>,
    pub object_ids: Option<Vec<String>>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.analyses.is_none()
            && self.donors.is_none()
            && self.programs.is_none()
            && self.file_ids.is_none()
            && self.object_ids.is_none()
    }
}

/// `include`/`exclude` intersect: a file must match `include` (or `include`
/// must be empty) and must not match `exclude`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileFilter {
    pub include: Option<FilterSet>,
    pub exclude: Option<FilterSet>,
}

impl FileFilter {
    pub fn matches_any_program(&self, programs: &[String]) -> Self {
        FileFilter {
            include: Some(FilterSet { programs: Some(programs.to_vec()), ..Default::default() }),
            exclude: None,
        }
    }

    pub fn by_object_ids(object_ids: &[String]) -> Self {
        FileFilter {
            include: Some(FilterSet {
                object_ids: Some(object_ids.to_vec()),
                ..Default::default()
            }),
            exclude: None,
        }
    }

    pub fn by_analysis(analysis_id: &str) -> Self {
        FileFilter {
            include: Some(FilterSet {
                analyses: Some(vec![analysis_id.to_string()]),
                ..Default::default()
            }),
            exclude: None,
        }
    }
}
