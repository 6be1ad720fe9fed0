//! crowdface-core: identity matching and crowd-sourced naming for recurring faces.
//!
//! Probe descriptors from an external detector are matched against a store
//! of multi-angle identity records by Euclidean distance. Unnamed identities
//! get their names from a majority vote over free-text quiz answers.

pub mod consensus;
pub mod dedup;
pub mod error;
pub mod matcher;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod types;

pub use consensus::ConsensusEngine;
pub use dedup::{CaptureSession, CapturedFace};
pub use error::{Error, Result};
pub use matcher::{
    Classification, ConfidenceBand, EuclideanMatcher, IdentityMatch, Matcher, MatchingEngine,
    Thresholds,
};
pub use schema::StoredRecord;
pub use snapshot::{Frame, SnapshotSettings};
pub use store::{IdentityDraft, IdentityStore, MemoryStore};
pub use types::{
    Answer, BoundingBox, Detection, FaceDescriptor, FaceSummary, IdentityId, IdentityName,
    IdentityRecord, RepresentativeImage,
};
