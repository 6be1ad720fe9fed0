use std::str::FromStr;
use std::sync::Arc;

use crowdface_core::snapshot::capture_face;
use crowdface_core::{
    CaptureSession, Classification, ConsensusEngine, Detection, Error, FaceSummary, Frame,
    IdentityId, IdentityName, IdentityRecord, IdentityStore, MatchingEngine, SnapshotSettings,
    StoredRecord, Thresholds,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::{Config, EnrollPolicy};
use crate::sightings::{RecentSightings, Sighting};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] Error),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Tunables the engine reads on every operation.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub thresholds: Thresholds,
    pub capture_threshold: f32,
    pub append_angle_on_loose_match: bool,
    pub enroll_policy: EnrollPolicy,
    pub snapshot: SnapshotSettings,
    pub max_recent: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds(),
            capture_threshold: config.capture_threshold,
            append_angle_on_loose_match: config.append_angle_on_loose_match,
            enroll_policy: config.enroll_policy,
            snapshot: config.snapshot(),
            max_recent: config.max_recent,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How one detection of a recognition tick was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Strict,
    Loose,
    Created,
}

/// Per-detection result of a recognition tick, in detection order.
#[derive(Debug, Clone, Serialize)]
pub struct FaceLabel {
    pub id: IdentityId,
    pub name: IdentityName,
    pub confidence: u8,
    pub outcome: Outcome,
    /// Overlay text, e.g. `Hanako (87%)` or `unknown (new)`.
    pub label: String,
}

impl FaceLabel {
    fn new(record: &IdentityRecord, confidence: u8, outcome: Outcome) -> Self {
        let label = match outcome {
            Outcome::Created => format!("{} (new)", record.name),
            Outcome::Strict | Outcome::Loose => format!("{} ({confidence}%)", record.name),
        };
        Self {
            id: record.id,
            name: record.name.clone(),
            confidence,
            outcome,
            label,
        }
    }
}

/// Which records a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Named,
    Unknown,
}

impl FromStr for ListFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(ListFilter::All),
            "named" => Ok(ListFilter::Named),
            "unknown" => Ok(ListFilter::Unknown),
            other => Err(Error::InvalidInput(format!("unknown list filter {other:?}"))),
        }
    }
}

/// A face waiting in the enrollment session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedSummary {
    pub index: usize,
    pub dimension: usize,
    pub image_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub imported: Vec<IdentityId>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub version: &'static str,
    pub faces: usize,
    pub named: usize,
    pub unknown: usize,
    pub captured: usize,
    pub thresholds: Thresholds,
    pub capture_threshold: f32,
}

/// All identity operations, run serially against one store handle.
pub struct Engine<S: IdentityStore> {
    store: Arc<S>,
    matching: MatchingEngine<S>,
    consensus: ConsensusEngine<S>,
    session: CaptureSession,
    recent: RecentSightings,
    settings: EngineSettings,
}

impl<S: IdentityStore> Engine<S> {
    /// Build an engine over `store`, seeding recent sightings from it.
    pub fn new(store: Arc<S>, settings: EngineSettings) -> Result<Self, Error> {
        let mut recent = RecentSightings::new(settings.max_recent);
        recent.seed(store.list()?);
        Ok(Self {
            matching: MatchingEngine::new(store.clone()),
            consensus: ConsensusEngine::new(store.clone()),
            session: CaptureSession::new(settings.capture_threshold),
            store,
            recent,
            settings,
        })
    }

    /// Resolve every detection of one frame: strict match, else loose match,
    /// else a new unresolved identity with a snapshot of the face.
    ///
    /// Detections are handled in order, so a person detected twice in the
    /// same frame matches the identity created for the first detection.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
    ) -> Result<Vec<FaceLabel>, Error> {
        let mut labels = Vec::with_capacity(detections.len());
        for detection in detections {
            let classification = self
                .matching
                .classify(&detection.descriptor, &self.settings.thresholds)?;
            let label = match classification {
                Classification::Strict(m) => {
                    let confidence = m.confidence_percent();
                    self.recent.observe(&m.record, confidence);
                    FaceLabel::new(&m.record, confidence, Outcome::Strict)
                }
                Classification::Loose(m) => {
                    let confidence = m.confidence_percent();
                    let record = if self.settings.append_angle_on_loose_match {
                        let updated = self
                            .store
                            .append_descriptor(m.record.id, detection.descriptor.clone())?;
                        tracing::info!(
                            id = updated.id,
                            angles = updated.descriptors.len(),
                            distance = m.distance,
                            "new angle appended"
                        );
                        updated
                    } else {
                        m.record
                    };
                    self.recent.observe(&record, confidence);
                    FaceLabel::new(&record, confidence, Outcome::Loose)
                }
                Classification::Unmatched => {
                    let image =
                        capture_face(frame, &detection.bounding_box, &self.settings.snapshot)?;
                    let id = self.store.create(
                        detection.descriptor.clone(),
                        image,
                        IdentityName::Unknown,
                    )?;
                    let record = self.store.get(id)?;
                    tracing::info!(id, "new identity created");
                    self.recent.observe(&record, 0);
                    FaceLabel::new(&record, 0, Outcome::Created)
                }
            };
            labels.push(label);
        }
        Ok(labels)
    }

    /// Add the frame's faces to the enrollment session, skipping any face
    /// already captured in it. Returns the session size.
    pub fn capture(&mut self, frame: &Frame, detections: &[Detection]) -> Result<usize, Error> {
        let snapshot = self.settings.snapshot;
        let mut accepted = 0;
        for detection in detections {
            if self.session.offer_with(detection.descriptor.clone(), || {
                capture_face(frame, &detection.bounding_box, &snapshot)
            })? {
                accepted += 1;
            }
        }
        tracing::info!(
            detected = detections.len(),
            accepted,
            session = self.session.len(),
            "capture"
        );
        Ok(self.session.len())
    }

    pub fn captured(&self) -> Vec<CapturedSummary> {
        self.session
            .faces()
            .iter()
            .enumerate()
            .map(|(index, face)| CapturedSummary {
                index,
                dimension: face.descriptor.len(),
                image_bytes: face.image.as_bytes().len(),
            })
            .collect()
    }

    pub fn remove_captured(&mut self, index: usize) -> Result<(), Error> {
        self.session
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| Error::InvalidInput(format!("no captured face at index {index}")))
    }

    pub fn clear_captured(&mut self) {
        self.session.clear();
    }

    /// Save every captured face under `name` and empty the session.
    ///
    /// Faces leave the session one at a time as they are saved, so a failed
    /// register can be retried without saving anything twice.
    pub fn register(&mut self, name: &str) -> Result<Vec<IdentityId>, Error> {
        let name = IdentityName::label(name)?;
        if self.session.is_empty() {
            return Err(Error::InvalidInput("no captured faces to register".into()));
        }

        let mut ids = Vec::with_capacity(self.session.len());
        while let Some(face) = self.session.faces().first().cloned() {
            let existing = match self.settings.enroll_policy {
                EnrollPolicy::AlwaysCreate => None,
                EnrollPolicy::MergeStrictMatch => self
                    .matching
                    .find_match(&face.descriptor, self.settings.thresholds.strict)?,
            };
            let id = match existing {
                Some(m) => {
                    // Angle and name land in one write.
                    let mut record = m.record;
                    record.descriptors.push(face.descriptor);
                    record.name = name.clone();
                    self.store.replace(&record)?;
                    let id = record.id;
                    tracing::info!(id, name = %name, "enrolled face merged into existing identity");
                    id
                }
                None => {
                    let id = self.store.create(face.descriptor, face.image, name.clone())?;
                    tracing::info!(id, name = %name, "enrolled new identity");
                    id
                }
            };
            self.session.remove(0);
            self.recent.rename(id, &name);
            ids.push(id);
        }
        Ok(ids)
    }

    pub fn list(&self, filter: ListFilter) -> Result<Vec<FaceSummary>, Error> {
        let records = match filter {
            ListFilter::All => self.store.list()?,
            ListFilter::Named => self.store.list_named()?,
            ListFilter::Unknown => self.store.list_unknown()?,
        };
        Ok(records.iter().map(IdentityRecord::summary).collect())
    }

    pub fn get(&self, id: IdentityId) -> Result<IdentityRecord, Error> {
        self.store.get(id)
    }

    pub fn record_answer(&mut self, id: IdentityId, text: &str) -> Result<IdentityRecord, Error> {
        let record = self.consensus.record_answer(id, text)?;
        self.recent.rename(id, &record.name);
        Ok(record)
    }

    /// Manual correction of a name.
    pub fn rename(&mut self, id: IdentityId, name: &str) -> Result<IdentityRecord, Error> {
        let name = IdentityName::label(name)?;
        let record = self.store.set_name(id, name)?;
        tracing::info!(id, name = %record.name, "identity renamed");
        self.recent.rename(id, &record.name);
        Ok(record)
    }

    /// Send an identity back to the quiz pool.
    pub fn reset_name(&mut self, id: IdentityId) -> Result<IdentityRecord, Error> {
        let record = self.store.set_name(id, IdentityName::Unknown)?;
        tracing::info!(id, "identity name reset");
        self.recent.rename(id, &record.name);
        Ok(record)
    }

    pub fn remove(&mut self, id: IdentityId) -> Result<bool, Error> {
        let removed = self.store.delete(id)?;
        if removed {
            tracing::info!(id, "identity deleted");
            self.recent.forget(id);
        }
        Ok(removed)
    }

    pub fn clear_all(&mut self) -> Result<(), Error> {
        self.store.clear()?;
        self.recent.clear();
        tracing::info!("all identities deleted");
        Ok(())
    }

    pub fn recent(&self) -> Vec<Sighting> {
        self.recent.entries()
    }

    /// Insert exported records (either schema generation) under fresh ids.
    /// Unreadable documents are skipped.
    pub fn import(&mut self, documents: Vec<serde_json::Value>) -> Result<ImportReport, Error> {
        let mut report = ImportReport {
            imported: Vec::new(),
            skipped: 0,
        };
        for (position, document) in documents.into_iter().enumerate() {
            let draft = match StoredRecord::from_value(document).and_then(StoredRecord::normalize) {
                Ok(draft) => draft,
                Err(e) => {
                    tracing::warn!(position, error = %e, "import: skipping record");
                    report.skipped += 1;
                    continue;
                }
            };
            report.imported.push(self.store.insert(draft)?);
        }
        tracing::info!(
            imported = report.imported.len(),
            skipped = report.skipped,
            "import finished"
        );
        Ok(report)
    }

    pub fn status(&self) -> Result<Status, Error> {
        let records = self.store.list()?;
        let named = records.iter().filter(|r| r.name.is_known()).count();
        Ok(Status {
            version: env!("CARGO_PKG_VERSION"),
            faces: records.len(),
            named,
            unknown: records.len() - named,
            captured: self.session.len(),
            thresholds: self.settings.thresholds,
            capture_threshold: self.settings.capture_threshold,
        })
    }
}

type Job<S> = Box<dyn FnOnce(&mut Engine<S>) + Send>;

/// Clone-safe handle to the engine thread.
pub struct EngineHandle<S: IdentityStore> {
    tx: mpsc::Sender<Job<S>>,
}

impl<S: IdentityStore> Clone for EngineHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: IdentityStore + 'static> EngineHandle<S> {
    /// Run `op` on the engine thread and wait for its result.
    async fn call<T, F>(&self, op: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine<S>) -> Result<T, Error> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<S> = Box::new(move |engine| {
            let _ = reply_tx.send(op(engine));
        });
        self.tx
            .send(job)
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub async fn process_frame(
        &self,
        frame: Frame,
        detections: Vec<Detection>,
    ) -> Result<Vec<FaceLabel>, EngineError> {
        self.call(move |e| e.process_frame(&frame, &detections)).await
    }

    pub async fn capture(
        &self,
        frame: Frame,
        detections: Vec<Detection>,
    ) -> Result<usize, EngineError> {
        self.call(move |e| e.capture(&frame, &detections)).await
    }

    pub async fn captured(&self) -> Result<Vec<CapturedSummary>, EngineError> {
        self.call(|e| Ok(e.captured())).await
    }

    pub async fn remove_captured(&self, index: usize) -> Result<(), EngineError> {
        self.call(move |e| e.remove_captured(index)).await
    }

    pub async fn clear_captured(&self) -> Result<(), EngineError> {
        self.call(|e| {
            e.clear_captured();
            Ok(())
        })
        .await
    }

    pub async fn register(&self, name: String) -> Result<Vec<IdentityId>, EngineError> {
        self.call(move |e| e.register(&name)).await
    }

    pub async fn list(&self, filter: ListFilter) -> Result<Vec<FaceSummary>, EngineError> {
        self.call(move |e| e.list(filter)).await
    }

    pub async fn get(&self, id: IdentityId) -> Result<IdentityRecord, EngineError> {
        self.call(move |e| e.get(id)).await
    }

    pub async fn record_answer(
        &self,
        id: IdentityId,
        text: String,
    ) -> Result<IdentityRecord, EngineError> {
        self.call(move |e| e.record_answer(id, &text)).await
    }

    pub async fn rename(&self, id: IdentityId, name: String) -> Result<IdentityRecord, EngineError> {
        self.call(move |e| e.rename(id, &name)).await
    }

    pub async fn reset_name(&self, id: IdentityId) -> Result<IdentityRecord, EngineError> {
        self.call(move |e| e.reset_name(id)).await
    }

    pub async fn remove(&self, id: IdentityId) -> Result<bool, EngineError> {
        self.call(move |e| e.remove(id)).await
    }

    pub async fn clear_all(&self) -> Result<(), EngineError> {
        self.call(|e| e.clear_all()).await
    }

    pub async fn recent(&self) -> Result<Vec<Sighting>, EngineError> {
        self.call(|e| Ok(e.recent())).await
    }

    pub async fn import(
        &self,
        documents: Vec<serde_json::Value>,
    ) -> Result<ImportReport, EngineError> {
        self.call(move |e| e.import(documents)).await
    }

    pub async fn status(&self) -> Result<Status, EngineError> {
        self.call(|e| e.status()).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Requests are handled one at a time in arrival order, so each frame's
/// detections are fully resolved before the next request is looked at.
pub fn spawn_engine<S: IdentityStore + 'static>(
    mut engine: Engine<S>,
) -> Result<EngineHandle<S>, EngineError> {
    let (tx, mut rx) = mpsc::channel::<Job<S>>(16);

    std::thread::Builder::new()
        .name("crowdface-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(job) = rx.blocking_recv() {
                job(&mut engine);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdface_core::{BoundingBox, FaceDescriptor, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn frame() -> Frame {
        Frame::new(64, 64, vec![90; 64 * 64 * 3]).unwrap()
    }

    fn detection(values: &[f32]) -> Detection {
        Detection {
            descriptor: FaceDescriptor::new(values.to_vec()),
            bounding_box: BoundingBox {
                x: 16.0,
                y: 16.0,
                width: 24.0,
                height: 24.0,
            },
        }
    }

    fn engine_with(settings: EngineSettings) -> (Arc<MemoryStore>, Engine<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(store.clone(), settings).unwrap();
        (store, engine)
    }

    fn engine() -> (Arc<MemoryStore>, Engine<MemoryStore>) {
        engine_with(EngineSettings::default())
    }

    #[test]
    fn test_unseen_face_creates_unknown_identity() {
        let (store, mut engine) = engine();
        let labels = engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].outcome, Outcome::Created);
        assert_eq!(labels[0].label, "unknown (new)");

        let record = store.get(labels[0].id).unwrap();
        assert_eq!(record.name, IdentityName::Unknown);
        assert!(!record.image.is_empty());
    }

    #[test]
    fn test_seen_face_matches_strictly() {
        let (store, mut engine) = engine();
        engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap();
        let labels = engine.process_frame(&frame(), &[detection(&[0.1, 0.0])]).unwrap();
        assert_eq!(labels[0].outcome, Outcome::Strict);
        assert_eq!(labels[0].label, "unknown (90%)");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_loose_match_labels_without_growing() {
        let (store, mut engine) = engine();
        let id = engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap()[0].id;

        let labels = engine.process_frame(&frame(), &[detection(&[0.5, 0.0])]).unwrap();
        assert_eq!(labels[0].outcome, Outcome::Loose);
        assert_eq!(labels[0].id, id);
        assert_eq!(store.get(id).unwrap().descriptors.len(), 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_drifting_probes_do_not_chain_into_one_identity() {
        let (store, mut engine) = engine();
        let first = engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap()[0].id;
        for step in 1..=6 {
            let x = step as f32 * 0.5;
            engine.process_frame(&frame(), &[detection(&[x, 0.0])]).unwrap();
        }

        let far = engine.process_frame(&frame(), &[detection(&[3.0, 0.0])]).unwrap();
        assert_ne!(far[0].id, first);
        assert_eq!(store.get(first).unwrap().descriptors.len(), 1);
        assert!(store.len().unwrap() > 1);
    }

    #[test]
    fn test_loose_match_adds_angle_when_enabled() {
        let settings = EngineSettings {
            append_angle_on_loose_match: true,
            ..EngineSettings::default()
        };
        let (store, mut engine) = engine_with(settings);
        let id = engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap()[0].id;

        engine.process_frame(&frame(), &[detection(&[0.5, 0.0])]).unwrap();
        assert_eq!(store.get(id).unwrap().descriptors.len(), 2);

        // The new angle now carries a further-turned view to a strict match.
        let labels = engine.process_frame(&frame(), &[detection(&[0.9, 0.0])]).unwrap();
        assert_eq!(labels[0].outcome, Outcome::Strict);
    }

    #[test]
    fn test_same_person_twice_in_one_frame() {
        let (store, mut engine) = engine();
        let labels = engine
            .process_frame(&frame(), &[detection(&[0.0, 0.0]), detection(&[0.05, 0.0])])
            .unwrap();
        assert_eq!(labels[0].outcome, Outcome::Created);
        assert_eq!(labels[1].outcome, Outcome::Strict);
        assert_eq!(labels[0].id, labels[1].id);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_bad_descriptor_fails_tick() {
        let (store, mut engine) = engine();
        engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap();
        let err = engine
            .process_frame(&frame(), &[detection(&[0.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_capture_dedups_and_register_names() {
        let (store, mut engine) = engine();
        let count = engine
            .capture(&frame(), &[detection(&[0.0, 0.0]), detection(&[0.1, 0.0])])
            .unwrap();
        assert_eq!(count, 1);
        let count = engine.capture(&frame(), &[detection(&[2.0, 2.0])]).unwrap();
        assert_eq!(count, 2);
        assert_eq!(engine.captured().len(), 2);

        let ids = engine.register(" Haru ").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(engine.captured().is_empty());
        for id in ids {
            assert_eq!(store.get(id).unwrap().name, IdentityName::Known("Haru".into()));
        }
    }

    #[test]
    fn test_register_requires_name_and_faces() {
        let (_, mut engine) = engine();
        assert!(engine.register("Haru").unwrap_err().is_invalid_input());
        engine.capture(&frame(), &[detection(&[0.0, 0.0])]).unwrap();
        assert!(engine.register("  ").unwrap_err().is_invalid_input());
        assert_eq!(engine.captured().len(), 1);
    }

    #[test]
    fn test_register_merge_strict_match() {
        let settings = EngineSettings {
            enroll_policy: EnrollPolicy::MergeStrictMatch,
            ..EngineSettings::default()
        };
        let (store, mut engine) = engine_with(settings);
        let id = engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap()[0].id;

        engine.capture(&frame(), &[detection(&[0.2, 0.0])]).unwrap();
        assert_eq!(engine.register("Nao").unwrap(), vec![id]);

        let record = store.get(id).unwrap();
        assert_eq!(record.descriptors.len(), 2);
        assert_eq!(record.name, IdentityName::Known("Nao".into()));
        assert_eq!(store.len().unwrap(), 1);
    }

    /// Counts `replace` calls on top of a [`MemoryStore`].
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        replaces: AtomicUsize,
    }

    impl IdentityStore for CountingStore {
        fn insert(&self, draft: crowdface_core::IdentityDraft) -> Result<IdentityId, Error> {
            self.inner.insert(draft)
        }
        fn list(&self) -> Result<Vec<IdentityRecord>, Error> {
            self.inner.list()
        }
        fn get(&self, id: IdentityId) -> Result<IdentityRecord, Error> {
            self.inner.get(id)
        }
        fn replace(&self, record: &IdentityRecord) -> Result<(), Error> {
            self.replaces.fetch_add(1, Ordering::SeqCst);
            self.inner.replace(record)
        }
        fn delete(&self, id: IdentityId) -> Result<bool, Error> {
            self.inner.delete(id)
        }
        fn clear(&self) -> Result<(), Error> {
            self.inner.clear()
        }
    }

    #[test]
    fn test_register_merge_is_one_write() {
        let store = Arc::new(CountingStore::default());
        let settings = EngineSettings {
            enroll_policy: EnrollPolicy::MergeStrictMatch,
            ..EngineSettings::default()
        };
        let mut engine = Engine::new(store.clone(), settings).unwrap();
        let id = engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap()[0].id;
        engine.capture(&frame(), &[detection(&[0.2, 0.0])]).unwrap();

        let before = store.replaces.load(Ordering::SeqCst);
        assert_eq!(engine.register("Nao").unwrap(), vec![id]);
        assert_eq!(store.replaces.load(Ordering::SeqCst) - before, 1);

        let record = store.get(id).unwrap();
        assert_eq!(record.descriptors.len(), 2);
        assert_eq!(record.name, IdentityName::Known("Nao".into()));
    }

    #[test]
    fn test_remove_captured() {
        let (_, mut engine) = engine();
        engine
            .capture(&frame(), &[detection(&[0.0, 0.0]), detection(&[3.0, 0.0])])
            .unwrap();
        engine.remove_captured(0).unwrap();
        assert_eq!(engine.captured().len(), 1);
        assert!(engine.remove_captured(5).unwrap_err().is_invalid_input());
        engine.clear_captured();
        assert!(engine.captured().is_empty());
    }

    #[test]
    fn test_quiz_answers_promote_and_refresh_recent() {
        let (_, mut engine) = engine();
        let id = engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap()[0].id;
        for text in ["Ren", "Sou", "Ren"] {
            engine.record_answer(id, text).unwrap();
        }
        assert_eq!(engine.get(id).unwrap().name, IdentityName::Known("Ren".into()));
        assert_eq!(engine.recent()[0].name, IdentityName::Known("Ren".into()));
        assert!(engine.list(ListFilter::Unknown).unwrap().is_empty());
        assert_eq!(engine.list(ListFilter::Named).unwrap()[0].answers, 3);
    }

    #[test]
    fn test_rename_reset_remove() {
        let (store, mut engine) = engine();
        let id = engine.process_frame(&frame(), &[detection(&[0.0, 0.0])]).unwrap()[0].id;

        assert_eq!(engine.rename(id, "Aoi").unwrap().name, IdentityName::Known("Aoi".into()));
        assert!(engine.rename(id, "").unwrap_err().is_invalid_input());
        assert_eq!(engine.reset_name(id).unwrap().name, IdentityName::Unknown);
        assert!(engine.rename(999, "Aoi").unwrap_err().is_not_found());

        assert!(engine.remove(id).unwrap());
        assert!(!engine.remove(id).unwrap());
        assert!(engine.recent().is_empty());
        assert!(store.get(id).unwrap_err().is_not_found());
        assert!(engine.record_answer(id, "Aoi").unwrap_err().is_not_found());
    }

    #[test]
    fn test_clear_all() {
        let (store, mut engine) = engine();
        engine
            .process_frame(&frame(), &[detection(&[0.0, 0.0]), detection(&[4.0, 4.0])])
            .unwrap();
        engine.clear_all().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(engine.recent().is_empty());
    }

    #[test]
    fn test_import_legacy_export() {
        let (store, mut engine) = engine();
        let documents: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                {"id": 1, "descriptor": [0.0, 0.0], "imageData": "", "name": "Kai",
                 "timestamp": 1700000000000, "quizAnswers": []},
                {"id": 2, "descriptors": [[3.0, 3.0], [3.1, 3.0]], "name": "unknown",
                 "timestamp": 1700000005000},
                {"id": 3, "name": "broken", "timestamp": 1700000009000}
            ]"#,
        )
        .unwrap();

        let report = engine.import(documents).unwrap();
        assert_eq!(report.imported.len(), 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.len().unwrap(), 2);

        let labels = engine.process_frame(&frame(), &[detection(&[0.1, 0.0])]).unwrap();
        assert_eq!(labels[0].outcome, Outcome::Strict);
        assert_eq!(labels[0].label, "Kai (90%)");
    }

    #[test]
    fn test_recent_seeded_from_store() {
        let store = Arc::new(MemoryStore::new());
        let id = store
            .create(
                FaceDescriptor::new(vec![0.0]),
                Default::default(),
                IdentityName::Unknown,
            )
            .unwrap();
        let engine = Engine::new(store, EngineSettings::default()).unwrap();
        assert_eq!(engine.recent()[0].id, id);
    }

    #[test]
    fn test_status_counts() {
        let (_, mut engine) = engine();
        let labels = engine
            .process_frame(&frame(), &[detection(&[0.0, 0.0]), detection(&[4.0, 4.0])])
            .unwrap();
        engine.rename(labels[0].id, "Mei").unwrap();
        engine.capture(&frame(), &[detection(&[9.0, 9.0])]).unwrap();

        let status = engine.status().unwrap();
        assert_eq!((status.faces, status.named, status.unknown), (2, 1, 1));
        assert_eq!(status.captured, 1);
    }

    #[test]
    fn test_list_filter_parse() {
        assert_eq!("all".parse::<ListFilter>().unwrap(), ListFilter::All);
        assert_eq!("unknown".parse::<ListFilter>().unwrap(), ListFilter::Unknown);
        assert!("everyone".parse::<ListFilter>().is_err());
    }

    #[tokio::test]
    async fn test_handle_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let handle = spawn_engine(Engine::new(store, EngineSettings::default()).unwrap()).unwrap();

        let labels = handle
            .process_frame(frame(), vec![detection(&[0.0, 0.0])])
            .await
            .unwrap();
        let id = labels[0].id;

        let other = handle.clone();
        for text in ["Yui", "Yui", "Emi"] {
            other.record_answer(id, text.to_string()).await.unwrap();
        }
        let record = handle.get(id).await.unwrap();
        assert_eq!(record.name, IdentityName::Known("Yui".into()));

        let err = handle.get(id + 1).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(Error::NotFound(_))));
        assert_eq!(handle.status().await.unwrap().named, 1);
    }
}
