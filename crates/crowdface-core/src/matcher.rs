//! Nearest-identity search over multi-angle records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::store::IdentityStore;
use crate::types::{FaceDescriptor, IdentityRecord};

/// Best-matching identity for a probe descriptor.
#[derive(Debug, Clone)]
pub struct IdentityMatch {
    pub record: IdentityRecord,
    /// Euclidean distance to the closest angle of `record`.
    pub distance: f32,
    /// `1 - distance`.
    pub confidence: f32,
}

impl IdentityMatch {
    fn new(record: IdentityRecord, distance: f32) -> Self {
        Self {
            record,
            distance,
            confidence: 1.0 - distance,
        }
    }

    /// Confidence as a whole percentage, clamped to 0..=100.
    pub fn confidence_percent(&self) -> u8 {
        confidence_percent(self.distance)
    }
}

/// `round((1 - distance) * 100)`, clamped to 0..=100.
pub fn confidence_percent(distance: f32) -> u8 {
    ((1.0 - distance) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Coarse bucket for presenting a confidence percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
    /// Freshly created identity, nothing to be confident about yet.
    New,
}

impl ConfidenceBand {
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            70.. => ConfidenceBand::High,
            50..=69 => ConfidenceBand::Medium,
            1..=49 => ConfidenceBand::Low,
            0 => ConfidenceBand::New,
        }
    }
}

/// Strategy for finding the nearest identity in a gallery.
pub trait Matcher {
    /// Closest record to `probe` regardless of any threshold.
    fn nearest(
        &self,
        probe: &FaceDescriptor,
        gallery: Vec<IdentityRecord>,
    ) -> Result<Option<IdentityMatch>, Error>;

    /// Closest record whose distance is strictly below `threshold`.
    fn best_match(
        &self,
        probe: &FaceDescriptor,
        gallery: Vec<IdentityRecord>,
        threshold: f32,
    ) -> Result<Option<IdentityMatch>, Error> {
        Ok(self
            .nearest(probe, gallery)?
            .filter(|m| m.distance < threshold))
    }
}

/// Exhaustive Euclidean scan over every angle of every record.
///
/// Ties go to the first record in gallery order, i.e. the store's
/// enumeration order (ascending id). Callers must not lean on that beyond
/// it being deterministic for a given store state.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn nearest(
        &self,
        probe: &FaceDescriptor,
        gallery: Vec<IdentityRecord>,
    ) -> Result<Option<IdentityMatch>, Error> {
        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            for angle in &record.descriptors {
                let d = probe.distance(angle)?;
                if d < best_distance {
                    best_distance = d;
                    best_idx = Some(i);
                }
            }
        }

        Ok(best_idx
            .and_then(|idx| gallery.into_iter().nth(idx))
            .map(|record| IdentityMatch::new(record, best_distance)))
    }
}

/// Strict and loose distance thresholds.
///
/// A strict match is a confident same-person classification. A loose match
/// only keeps a person from getting a second identity; it is consulted after
/// the strict one fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub strict: f32,
    pub loose: f32,
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.strict > 0.0 && self.loose > 0.0) {
            return Err(Error::InvalidInput("thresholds must be positive".into()));
        }
        if self.strict > self.loose {
            return Err(Error::InvalidInput(format!(
                "strict threshold {} exceeds loose threshold {}",
                self.strict, self.loose
            )));
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            strict: 0.45,
            loose: 0.55,
        }
    }
}

/// Outcome of classifying a probe against both threshold regimes.
#[derive(Debug, Clone)]
pub enum Classification {
    Strict(IdentityMatch),
    Loose(IdentityMatch),
    Unmatched,
}

/// Matches probe descriptors against the records of an [`IdentityStore`].
pub struct MatchingEngine<S: IdentityStore + ?Sized, M: Matcher = EuclideanMatcher> {
    store: Arc<S>,
    matcher: M,
}

impl<S: IdentityStore + ?Sized> MatchingEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            matcher: EuclideanMatcher,
        }
    }
}

impl<S: IdentityStore + ?Sized, M: Matcher> MatchingEngine<S, M> {
    pub fn with_matcher(store: Arc<S>, matcher: M) -> Self {
        Self { store, matcher }
    }

    /// Best identity strictly closer than `threshold`, or `None`.
    /// An empty store never matches.
    pub fn find_match(
        &self,
        probe: &FaceDescriptor,
        threshold: f32,
    ) -> Result<Option<IdentityMatch>, Error> {
        let result = self
            .matcher
            .best_match(probe, self.store.list()?, threshold)?;
        tracing::debug!(
            threshold,
            distance = result.as_ref().map(|m| m.distance),
            id = result.as_ref().map(|m| m.record.id),
            "match lookup"
        );
        Ok(result)
    }

    /// Apply the strict threshold, then the loose one.
    ///
    /// The nearest record does not depend on the threshold, so the store is
    /// scanned once and the distance compared against both.
    pub fn classify(
        &self,
        probe: &FaceDescriptor,
        thresholds: &Thresholds,
    ) -> Result<Classification, Error> {
        let nearest = self.matcher.nearest(probe, self.store.list()?)?;
        let classification = match nearest {
            Some(m) if m.distance < thresholds.strict => Classification::Strict(m),
            Some(m) if m.distance < thresholds.loose => Classification::Loose(m),
            _ => Classification::Unmatched,
        };
        tracing::debug!(
            outcome = match &classification {
                Classification::Strict(_) => "strict",
                Classification::Loose(_) => "loose",
                Classification::Unmatched => "unmatched",
            },
            "classified probe"
        );
        Ok(classification)
    }
}
