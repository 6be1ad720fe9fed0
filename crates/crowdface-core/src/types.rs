use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Store-assigned identity key. Never reused after deletion.
pub type IdentityId = u64;

/// Persisted name of an identity nobody has named yet.
pub const UNKNOWN_NAME: &str = "unknown";

/// Prefix used when a still image is persisted as a data URL.
const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Euclidean distance between two descriptor slices.
///
/// Fails instead of truncating when the lengths differ, since that only
/// happens when the detector and the store disagree on dimensionality.
pub fn distance(a: &[f32], b: &[f32]) -> Result<f32, Error> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt())
}

/// Face descriptor produced by the external embedding model
/// (128-dimensional for the models this was built against, but not assumed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceDescriptor {
    values: Vec<f32>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance to another descriptor. Lower = more similar.
    pub fn distance(&self, other: &FaceDescriptor) -> Result<f32, Error> {
        distance(&self.values, &other.values)
    }
}

impl From<Vec<f32>> for FaceDescriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Pixel region of a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One face reported by the external detector for a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub descriptor: FaceDescriptor,
    pub bounding_box: BoundingBox,
}

/// Display name of an identity: the unresolved sentinel or a free-text label.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum IdentityName {
    #[default]
    Unknown,
    Known(String),
}

impl IdentityName {
    /// Parse a stored name. Missing, empty and `"unknown"` all mean unresolved.
    pub fn from_stored(name: &str) -> Self {
        if name.is_empty() || name == UNKNOWN_NAME {
            IdentityName::Unknown
        } else {
            IdentityName::Known(name.to_string())
        }
    }

    /// Build a name from user input, rejecting blank text.
    pub fn label(name: &str) -> Result<Self, Error> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("name must not be blank".into()));
        }
        Ok(Self::from_stored(trimmed))
    }

    pub fn is_known(&self) -> bool {
        matches!(self, IdentityName::Known(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            IdentityName::Unknown => UNKNOWN_NAME,
            IdentityName::Known(name) => name,
        }
    }
}

impl std::fmt::Display for IdentityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Option<String>> for IdentityName {
    fn from(name: Option<String>) -> Self {
        name.as_deref().map(Self::from_stored).unwrap_or_default()
    }
}

impl From<IdentityName> for String {
    fn from(name: IdentityName) -> Self {
        match name {
            IdentityName::Unknown => UNKNOWN_NAME.to_string(),
            IdentityName::Known(name) => name,
        }
    }
}

/// Encoded still image of the first captured angle (JPEG bytes).
///
/// Serialized as a `data:image/jpeg;base64,...` URL so persisted records stay
/// readable by anything that consumed the historical export format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepresentativeImage(Vec<u8>);

impl RepresentativeImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        format!("{JPEG_DATA_URL_PREFIX}{}", STANDARD.encode(&self.0))
    }

    /// Decode a data URL (any media type) or a bare base64 payload.
    pub fn from_data_url(url: &str) -> Result<Self, Error> {
        if url.is_empty() {
            return Ok(Self::default());
        }
        let payload = match url.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(',')
                .map(|(_, payload)| payload)
                .ok_or_else(|| Error::InvalidInput("image data URL has no payload".into()))?,
            None => url,
        };
        STANDARD
            .decode(payload.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("image data is not base64: {e}")))
    }
}

impl Serialize for RepresentativeImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for RepresentativeImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let url = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Self::from_data_url(&url).map_err(serde::de::Error::custom)
    }
}

/// One guess submitted through the quiz flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "answer")]
    pub text: String,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
}

/// A persisted identity: every observed angle plus its naming history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub id: IdentityId,
    /// Observed angles, oldest first. Never empty.
    pub descriptors: Vec<FaceDescriptor>,
    #[serde(rename = "imageData", default)]
    pub image: RepresentativeImage,
    #[serde(default)]
    pub name: IdentityName,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "quizAnswers", default)]
    pub answers: Vec<Answer>,
}

impl IdentityRecord {
    /// Dimensionality shared by every angle of this record.
    pub fn dimension(&self) -> Option<usize> {
        self.descriptors.first().map(FaceDescriptor::len)
    }

    pub fn summary(&self) -> FaceSummary {
        FaceSummary {
            id: self.id,
            name: self.name.clone(),
            angles: self.descriptors.len(),
            answers: self.answers.len(),
            created_at: self.created_at,
        }
    }
}

/// Image-free view of a record for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceSummary {
    pub id: IdentityId,
    pub name: IdentityName,
    pub angles: usize,
    pub answers: usize,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(values: &[f32]) -> FaceDescriptor {
        FaceDescriptor::new(values.to_vec())
    }

    #[test]
    fn test_distance_identical_is_zero() {
        let a = desc(&[0.1, -0.4, 0.9]);
        assert_eq!(a.distance(&a).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = desc(&[0.3, 0.1, -0.7, 0.25]);
        let b = desc(&[-0.2, 0.6, 0.05, 0.4]);
        assert_eq!(a.distance(&b).unwrap(), b.distance(&a).unwrap());
    }

    #[test]
    fn test_distance_euclidean() {
        let a = desc(&[0.0, 0.0]);
        let b = desc(&[3.0, 4.0]);
        assert!((a.distance(&b).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_grows_with_dissimilarity() {
        let origin = desc(&[0.0, 0.0, 0.0]);
        let near = desc(&[0.1, 0.0, 0.0]);
        let far = desc(&[0.5, 0.0, 0.0]);
        assert!(origin.distance(&near).unwrap() < origin.distance(&far).unwrap());
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = desc(&[1.0, 2.0, 3.0]);
        let b = desc(&[1.0, 2.0]);
        let err = a.distance(&b).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, got: 2 }));
    }

    #[test]
    fn test_name_sentinel() {
        assert_eq!(IdentityName::from_stored("unknown"), IdentityName::Unknown);
        assert_eq!(IdentityName::from_stored(""), IdentityName::Unknown);
        assert_eq!(
            IdentityName::from_stored("Hanako"),
            IdentityName::Known("Hanako".into())
        );
        assert_eq!(IdentityName::Unknown.as_str(), UNKNOWN_NAME);
    }

    #[test]
    fn test_name_label_rejects_blank() {
        assert!(IdentityName::label("   ").unwrap_err().is_invalid_input());
        assert_eq!(
            IdentityName::label("  Taro ").unwrap(),
            IdentityName::Known("Taro".into())
        );
    }

    #[test]
    fn test_name_null_deserializes_unknown() {
        let name: IdentityName = serde_json::from_str("null").unwrap();
        assert_eq!(name, IdentityName::Unknown);
        assert_eq!(serde_json::to_string(&IdentityName::Unknown).unwrap(), "\"unknown\"");
    }

    #[test]
    fn test_image_data_url() {
        let image = RepresentativeImage::new(vec![0xff, 0xd8, 0xff, 0xe0]);
        let url = image.to_data_url();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(RepresentativeImage::from_data_url(&url).unwrap(), image);
    }

    #[test]
    fn test_image_png_data_url_accepted() {
        let image = RepresentativeImage::from_data_url("data:image/png;base64,AAEC").unwrap();
        assert_eq!(image.as_bytes(), &[0, 1, 2]);
    }

    #[test]
    fn test_image_empty() {
        assert!(RepresentativeImage::from_data_url("").unwrap().is_empty());
        assert_eq!(RepresentativeImage::default().to_data_url(), "");
    }

    #[test]
    fn test_image_garbage_rejected() {
        assert!(RepresentativeImage::from_data_url("data:image/jpeg;base64,!!!").is_err());
        assert!(RepresentativeImage::from_data_url("data:image/jpeg").is_err());
    }
}
