//! Persisted record shape and the legacy-to-current normalization.
//!
//! Records written before multi-angle support carry a single `descriptor`
//! field; current records carry a `descriptors` list. Both are read through
//! [`StoredRecord`] and normalized once, at the storage boundary, into an
//! [`IdentityDraft`] whose descriptor list is never empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::store::IdentityDraft;
use crate::types::{
    Answer, FaceDescriptor, IdentityId, IdentityName, IdentityRecord, RepresentativeImage,
};

/// A persisted record in either schema generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StoredRecord {
    Current(CurrentRecord),
    Legacy(LegacyRecord),
}

/// Multi-angle record shape (`descriptors: [[...], ...]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<IdentityId>,
    pub descriptors: Vec<FaceDescriptor>,
    #[serde(default)]
    pub image_data: RepresentativeImage,
    #[serde(default)]
    pub name: IdentityName,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub quiz_answers: Vec<Answer>,
}

/// Single-descriptor record shape (`descriptor: [...]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<IdentityId>,
    pub descriptor: FaceDescriptor,
    #[serde(default)]
    pub image_data: RepresentativeImage,
    #[serde(default)]
    pub name: IdentityName,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub quiz_answers: Vec<Answer>,
}

impl StoredRecord {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::InvalidInput(format!("unreadable record: {e}")))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidInput(format!("unreadable record: {e}")))
    }

    /// Id carried inside the document, if the export included one.
    pub fn id(&self) -> Option<IdentityId> {
        match self {
            StoredRecord::Current(r) => r.id,
            StoredRecord::Legacy(r) => r.id,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredRecord::Legacy(_))
    }

    /// Convert to the list form. Pure; applying it to an already-current
    /// record returns the same values.
    pub fn normalize(self) -> Result<IdentityDraft, Error> {
        let draft = match self {
            StoredRecord::Current(r) => IdentityDraft {
                descriptors: r.descriptors,
                image: r.image_data,
                name: r.name,
                created_at: r.timestamp,
                answers: r.quiz_answers,
            },
            StoredRecord::Legacy(r) => IdentityDraft {
                descriptors: vec![r.descriptor],
                image: r.image_data,
                name: r.name,
                created_at: r.timestamp,
                answers: r.quiz_answers,
            },
        };
        draft.validate()?;
        Ok(draft)
    }
}

impl From<&IdentityDraft> for CurrentRecord {
    fn from(draft: &IdentityDraft) -> Self {
        Self {
            id: None,
            descriptors: draft.descriptors.clone(),
            image_data: draft.image.clone(),
            name: draft.name.clone(),
            timestamp: draft.created_at,
            quiz_answers: draft.answers.clone(),
        }
    }
}

impl From<&IdentityRecord> for CurrentRecord {
    /// The id is left out; it lives in the store's key.
    fn from(record: &IdentityRecord) -> Self {
        Self {
            id: None,
            descriptors: record.descriptors.clone(),
            image_data: record.image.clone(),
            name: record.name.clone(),
            timestamp: record.created_at,
            quiz_answers: record.answers.clone(),
        }
    }
}

impl From<IdentityDraft> for StoredRecord {
    fn from(draft: IdentityDraft) -> Self {
        StoredRecord::Current(CurrentRecord::from(&draft))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
        "id": 7,
        "descriptor": [0.25, -0.5, 0.125],
        "imageData": "data:image/jpeg;base64,/9j/",
        "name": "unknown",
        "timestamp": 1700000000000,
        "quizAnswers": [{"answer": "Ken", "timestamp": 1700000001000}]
    }"#;

    const CURRENT: &str = r#"{
        "id": 7,
        "descriptors": [[0.25, -0.5, 0.125]],
        "imageData": "data:image/jpeg;base64,/9j/",
        "name": "unknown",
        "timestamp": 1700000000000,
        "quizAnswers": [{"answer": "Ken", "timestamp": 1700000001000}]
    }"#;

    #[test]
    fn test_legacy_detected() {
        let record = StoredRecord::from_json(LEGACY).unwrap();
        assert!(record.is_legacy());
        assert_eq!(record.id(), Some(7));
        assert!(!StoredRecord::from_json(CURRENT).unwrap().is_legacy());
    }

    #[test]
    fn test_legacy_equivalent_to_current() {
        let legacy = StoredRecord::from_json(LEGACY).unwrap().normalize().unwrap();
        let current = StoredRecord::from_json(CURRENT).unwrap().normalize().unwrap();
        assert_eq!(legacy, current);
        assert_eq!(legacy.descriptors.len(), 1);
        assert_eq!(legacy.descriptors[0].values(), &[0.25, -0.5, 0.125]);
        assert_eq!(legacy.answers[0].text, "Ken");
        assert_eq!(legacy.created_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = StoredRecord::from_json(LEGACY).unwrap().normalize().unwrap();
        let json = serde_json::to_string(&CurrentRecord::from(&once)).unwrap();
        let twice = StoredRecord::from_json(&json).unwrap().normalize().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_multi_angle_record_untouched() {
        let json = r#"{
            "descriptors": [[1.0, 0.0], [0.9, 0.1], [0.8, 0.2]],
            "name": "Yuki",
            "timestamp": 1700000000000
        }"#;
        let draft = StoredRecord::from_json(json).unwrap().normalize().unwrap();
        assert_eq!(draft.descriptors.len(), 3);
        assert_eq!(draft.descriptors[2].values(), &[0.8, 0.2]);
        assert_eq!(draft.name, IdentityName::Known("Yuki".into()));
        assert!(draft.answers.is_empty());
        assert!(draft.image.is_empty());
    }

    #[test]
    fn test_missing_name_is_unknown() {
        let json = r#"{"descriptor": [1.0], "timestamp": 0}"#;
        let draft = StoredRecord::from_json(json).unwrap().normalize().unwrap();
        assert_eq!(draft.name, IdentityName::Unknown);
    }

    #[test]
    fn test_empty_descriptor_list_rejected() {
        let json = r#"{"descriptors": [], "timestamp": 0}"#;
        let err = StoredRecord::from_json(json).unwrap().normalize().unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_no_descriptor_field_unreadable() {
        let json = r#"{"name": "Ken", "timestamp": 0}"#;
        assert!(StoredRecord::from_json(json).is_err());
    }
}
