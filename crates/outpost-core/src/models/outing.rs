use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Server-assigned outing identifier.
///
/// Numeric ids in the payload are accepted and normalised to their string
/// form, which is also how rosters are keyed in the bulk response.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(transparent)]
pub struct OutingId(String);

impl OutingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OutingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OutingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for OutingId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => OutingId(s),
            RawId::Number(n) => OutingId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Outing {
    pub id: OutingId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "startDate", default)]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outing_id_accepts_numbers_and_strings() {
        let outing: Outing = serde_json::from_str(r#"{"id":42,"name":"Camporee"}"#).unwrap();
        assert_eq!(outing.id.as_str(), "42");

        let outing: Outing = serde_json::from_str(r#"{"id":"ck9x","name":"Hike"}"#).unwrap();
        assert_eq!(outing.id, OutingId::from("ck9x"));
    }

    #[test]
    fn test_outing_keeps_unmodelled_fields() {
        let json = r#"{"id":"1","name":"Canoe","startDate":"2026-06-01","cost":25}"#;
        let outing: Outing = serde_json::from_str(json).unwrap();
        assert_eq!(outing.start_date.as_deref(), Some("2026-06-01"));
        assert_eq!(outing.extra.get("cost"), Some(&serde_json::json!(25)));
    }
}
