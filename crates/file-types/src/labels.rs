use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A file's set of (key, string-list) label pairs, keyed by the normalized
/// key so uniqueness after normalization is an invariant of the type rather
/// than something every caller has to re-check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, Vec<String>>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(&normalize_key(key)).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `incoming` into `self`, overwriting any existing value for a
    /// key that collides after normalization. Fails closed: on the first
    /// invalid key nothing is merged.
    pub fn merge(&mut self, incoming: BTreeMap<String, Vec<String>>) -> Result<()> {
        let mut normalized = BTreeMap::new();
        for (key, values) in incoming {
            let key = validate_key(&key)?;
            normalized.insert(key, values);
        }
        self.0.extend(normalized);
        Ok(())
    }

    pub fn remove(&mut self, keys: &[String]) {
        for key in keys {
            self.0.remove(&normalize_key(key));
        }
    }
}

pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Normalizes `key` and rejects it if the normalized form contains a comma,
/// which would make label keys ambiguous when flattened into comma-joined
/// query parameters on the HTTP surface.
pub fn validate_key(key: &str) -> Result<String> {
    let normalized = normalize_key(key);
    if normalized.is_empty() {
        return Err(Error::invalid_argument("label key must not be empty"));
    }
    if normalized.contains(',') {
        return Err(Error::invalid_argument(format!(
            "label key {key:?} must not contain a comma"
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_key(" Donor_Age "), "donor_age");
    }

    #[test]
    fn rejects_comma_in_key() {
        assert!(validate_key("X, Y").is_err());
    }

    #[test]
    fn merge_overwrites_by_normalized_key() {
        let mut labels = Labels::new();
        labels.merge(BTreeMap::from([("Donor_Age".to_string(), vec!["40".to_string()])])).unwrap();
        labels
            .merge(BTreeMap::from([("donor_age".to_string(), vec!["41".to_string()])]))
            .unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("DONOR_AGE"), Some(["41".to_string()].as_slice()));
    }
}
