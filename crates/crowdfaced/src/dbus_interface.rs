use crowdface_core::schema::CurrentRecord;
use crowdface_core::{Detection, Error, Frame, IdentityId, IdentityRecord};
use serde::Serialize;
use zbus::interface;

use crate::engine::{EngineError, EngineHandle, ListFilter};
use crate::store::SqliteStore;

/// D-Bus interface for the crowdface daemon.
///
/// Bus name: org.crowdface.Crowdface1
/// Object path: /org/crowdface/Crowdface1
///
/// Structured results are returned as JSON strings.
pub struct CrowdfaceService {
    pub engine: EngineHandle<SqliteStore>,
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    match e {
        EngineError::Core(Error::NotFound(id)) => {
            zbus::fdo::Error::UnknownObject(format!("identity {id} not found"))
        }
        EngineError::Core(e @ (Error::InvalidInput(_) | Error::DimensionMismatch { .. })) => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn parse_frame(
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    detections: &str,
) -> zbus::fdo::Result<(Frame, Vec<Detection>)> {
    let frame = Frame::new(width, height, rgb)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
    let detections: Vec<Detection> = serde_json::from_str(detections)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid detections: {e}")))?;
    Ok((frame, detections))
}

/// Full record as sent to clients; the image stays a data URL.
#[derive(Serialize)]
struct RecordView {
    id: IdentityId,
    #[serde(flatten)]
    body: CurrentRecord,
}

impl From<&IdentityRecord> for RecordView {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            id: record.id,
            body: record.into(),
        }
    }
}

#[interface(name = "org.crowdface.Crowdface1")]
impl CrowdfaceService {
    /// Run one recognition tick over a frame and its detections.
    async fn submit_frame(
        &self,
        width: u32,
        height: u32,
        rgb: Vec<u8>,
        detections: &str,
    ) -> zbus::fdo::Result<String> {
        let (frame, detections) = parse_frame(width, height, rgb, detections)?;
        tracing::debug!(width, height, faces = detections.len(), "submit_frame requested");
        let labels = self
            .engine
            .process_frame(frame, detections)
            .await
            .map_err(to_fdo)?;
        to_json(&labels)
    }

    /// Add a frame's faces to the enrollment session. Returns the session size.
    async fn capture(
        &self,
        width: u32,
        height: u32,
        rgb: Vec<u8>,
        detections: &str,
    ) -> zbus::fdo::Result<u32> {
        let (frame, detections) = parse_frame(width, height, rgb, detections)?;
        tracing::info!(faces = detections.len(), "capture requested");
        let size = self.engine.capture(frame, detections).await.map_err(to_fdo)?;
        Ok(size as u32)
    }

    async fn captured_faces(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.captured().await.map_err(to_fdo)?)
    }

    async fn remove_captured(&self, index: u32) -> zbus::fdo::Result<()> {
        self.engine
            .remove_captured(index as usize)
            .await
            .map_err(to_fdo)
    }

    async fn clear_captured(&self) -> zbus::fdo::Result<()> {
        self.engine.clear_captured().await.map_err(to_fdo)
    }

    /// Save the enrollment session under `name`. Returns the new ids.
    async fn register(&self, name: &str) -> zbus::fdo::Result<Vec<u64>> {
        tracing::info!(name, "register requested");
        self.engine
            .register(name.to_string())
            .await
            .map_err(to_fdo)
    }

    /// `filter` is one of `all`, `named` or `unknown`.
    async fn list_faces(&self, filter: &str) -> zbus::fdo::Result<String> {
        let filter: ListFilter = filter
            .parse()
            .map_err(|e: Error| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        to_json(&self.engine.list(filter).await.map_err(to_fdo)?)
    }

    async fn get_face(&self, id: u64) -> zbus::fdo::Result<String> {
        let record = self.engine.get(id).await.map_err(to_fdo)?;
        to_json(&RecordView::from(&record))
    }

    /// Record a quiz answer. Returns the identity's name afterwards.
    async fn record_answer(&self, id: u64, answer: &str) -> zbus::fdo::Result<String> {
        tracing::info!(id, "record_answer requested");
        let record = self
            .engine
            .record_answer(id, answer.to_string())
            .await
            .map_err(to_fdo)?;
        Ok(record.name.to_string())
    }

    async fn rename(&self, id: u64, name: &str) -> zbus::fdo::Result<()> {
        tracing::info!(id, name, "rename requested");
        self.engine
            .rename(id, name.to_string())
            .await
            .map(|_| ())
            .map_err(to_fdo)
    }

    async fn reset_name(&self, id: u64) -> zbus::fdo::Result<()> {
        tracing::info!(id, "reset_name requested");
        self.engine.reset_name(id).await.map(|_| ()).map_err(to_fdo)
    }

    async fn remove_face(&self, id: u64) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "remove_face requested");
        self.engine.remove(id).await.map_err(to_fdo)
    }

    async fn clear_all(&self) -> zbus::fdo::Result<()> {
        tracing::warn!("clear_all requested");
        self.engine.clear_all().await.map_err(to_fdo)
    }

    async fn recent(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.recent().await.map_err(to_fdo)?)
    }

    /// Import a JSON array of exported records.
    async fn import(&self, records: &str) -> zbus::fdo::Result<String> {
        let documents: Vec<serde_json::Value> = serde_json::from_str(records)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("expected a JSON array: {e}")))?;
        tracing::info!(count = documents.len(), "import requested");
        to_json(&self.engine.import(documents).await.map_err(to_fdo)?)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.status().await.map_err(to_fdo)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            to_fdo(EngineError::Core(Error::NotFound(4))),
            zbus::fdo::Error::UnknownObject(_)
        ));
        assert!(matches!(
            to_fdo(EngineError::Core(Error::DimensionMismatch { expected: 128, got: 3 })),
            zbus::fdo::Error::InvalidArgs(_)
        ));
        assert!(matches!(
            to_fdo(EngineError::ChannelClosed),
            zbus::fdo::Error::Failed(_)
        ));
    }

    #[test]
    fn test_parse_frame() {
        let detections = r#"[{"descriptor": [0.1, 0.2],
            "boundingBox": {"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}}]"#;
        let (frame, detections) = parse_frame(2, 2, vec![0; 12], detections).unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(detections[0].descriptor.len(), 2);

        assert!(parse_frame(2, 2, vec![0; 5], "[]").is_err());
        assert!(parse_frame(2, 2, vec![0; 12], "{").is_err());
    }

    #[test]
    fn test_record_view_carries_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = crowdface_core::IdentityStore::create(
            &store,
            crowdface_core::FaceDescriptor::new(vec![0.5]),
            Default::default(),
            crowdface_core::IdentityName::Unknown,
        )
        .unwrap();
        let record = crowdface_core::IdentityStore::get(&store, id).unwrap();
        let json: serde_json::Value = serde_json::to_value(RecordView::from(&record)).unwrap();
        assert_eq!(json["id"], id);
        assert_eq!(json["descriptors"][0][0], 0.5);
        assert_eq!(json["name"], "unknown");
    }
}
