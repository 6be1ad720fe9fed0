//! In-session suppression of repeated captures of the same person.
//!
//! Only guards one enrollment session. Duplicates against the persistent
//! store are the matching engine's business at save time.

use crate::error::Error;
use crate::types::{FaceDescriptor, RepresentativeImage};

/// True if any already-captured descriptor is strictly closer than `threshold`.
pub fn is_duplicate<'a>(
    probe: &FaceDescriptor,
    captured: impl IntoIterator<Item = &'a FaceDescriptor>,
    threshold: f32,
) -> Result<bool, Error> {
    for existing in captured {
        if probe.distance(existing)? < threshold {
            return Ok(true);
        }
    }
    Ok(false)
}

/// A face held in the enrollment session until it is registered.
#[derive(Debug, Clone)]
pub struct CapturedFace {
    pub descriptor: FaceDescriptor,
    pub image: RepresentativeImage,
}

/// Growing list of distinct faces captured for one enrollment.
pub struct CaptureSession {
    threshold: f32,
    faces: Vec<CapturedFace>,
}

impl CaptureSession {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            faces: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Add `descriptor` unless it duplicates a face already in the session.
    ///
    /// `snapshot` only runs for accepted faces, so callers can defer the
    /// still-image crop until it is actually needed.
    pub fn offer_with<F>(&mut self, descriptor: FaceDescriptor, snapshot: F) -> Result<bool, Error>
    where
        F: FnOnce() -> Result<RepresentativeImage, Error>,
    {
        if is_duplicate(
            &descriptor,
            self.faces.iter().map(|f| &f.descriptor),
            self.threshold,
        )? {
            tracing::debug!(session = self.faces.len(), "capture: duplicate suppressed");
            return Ok(false);
        }
        let image = snapshot()?;
        self.faces.push(CapturedFace { descriptor, image });
        Ok(true)
    }

    pub fn offer(
        &mut self,
        descriptor: FaceDescriptor,
        image: RepresentativeImage,
    ) -> Result<bool, Error> {
        self.offer_with(descriptor, || Ok(image))
    }

    pub fn faces(&self) -> &[CapturedFace] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn remove(&mut self, index: usize) -> Option<CapturedFace> {
        (index < self.faces.len()).then(|| self.faces.remove(index))
    }

    pub fn clear(&mut self) {
        self.faces.clear();
    }

    /// Drain the session, leaving it empty.
    pub fn take(&mut self) -> Vec<CapturedFace> {
        std::mem::take(&mut self.faces)
    }
}
