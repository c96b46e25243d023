use std::fmt;

use serde::{Deserialize, Serialize};

/// A document's visibility tier: whether it lives behind the restricted
/// generation or the public one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Restricted,
    Public,
}

impl Visibility {
    pub fn shard_prefix(&self) -> &'static str {
        match self {
            Visibility::Restricted => "restricted",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.shard_prefix())
    }
}

/// Normalizes a `programId` into the shard component of an index name:
/// strip hyphens, trim, lowercase.
pub fn normalize_shard(program_id: &str) -> String {
    program_id.trim().to_lowercase().replace('-', "")
}

/// One generation of a per-program index, per the naming convention
/// `entity_type_shardPrefix_shard_releasePrefix_release`. Generations for
/// the same `(shard, shard_prefix)` are totally ordered by `release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexGeneration {
    pub entity: String,
    pub r#type: String,
    pub shard_prefix: Visibility,
    pub shard: String,
    pub release_prefix: String,
    pub release: u32,
    pub valid: bool,
}

impl IndexGeneration {
    pub fn new(entity: &str, r#type: &str, program_id: &str, visibility: Visibility, release: u32) -> Self {
        IndexGeneration {
            entity: entity.to_string(),
            r#type: r#type.to_string(),
            shard_prefix: visibility,
            shard: normalize_shard(program_id),
            release_prefix: "re".to_string(),
            release,
            valid: true,
        }
    }

    pub fn index_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}",
            self.entity, self.r#type, self.shard_prefix, self.shard, self.release_prefix, self.release
        )
    }

    /// Returns true if `self` and `other` name the same shard and
    /// visibility, i.e. are two generations of the same logical index.
    pub fn same_series(&self, other: &IndexGeneration) -> bool {
        self.entity == other.entity
            && self.r#type == other.r#type
            && self.shard_prefix == other.shard_prefix
            && self.shard == other.shard
    }
}

impl PartialOrd for IndexGeneration {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.same_series(other) {
            Some(self.release.cmp(&other.release))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_canonical_name() {
        let gen = IndexGeneration::new("file", "centric", "PRG-1", Visibility::Restricted, 3);
        assert_eq!(gen.index_name(), "file_centric_restricted_prg1_re_3");
    }

    #[test]
    fn generations_of_same_series_are_ordered_by_release() {
        let a = IndexGeneration::new("file", "centric", "PRG1", Visibility::Public, 1);
        let b = IndexGeneration::new("file", "centric", "PRG1", Visibility::Public, 2);
        assert!(a < b);
    }
}
