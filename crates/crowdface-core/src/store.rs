use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::types::{
    Answer, FaceDescriptor, IdentityId, IdentityName, IdentityRecord, RepresentativeImage,
};

/// An identity record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityDraft {
    pub descriptors: Vec<FaceDescriptor>,
    pub image: RepresentativeImage,
    pub name: IdentityName,
    pub created_at: DateTime<Utc>,
    pub answers: Vec<Answer>,
}

impl IdentityDraft {
    /// A fresh single-angle identity stamped with the current time.
    pub fn new(descriptor: FaceDescriptor, image: RepresentativeImage, name: IdentityName) -> Self {
        Self {
            descriptors: vec![descriptor],
            image,
            name,
            created_at: Utc::now(),
            answers: Vec::new(),
        }
    }

    /// Check the record invariants: at least one angle, all of one length.
    pub fn validate(&self) -> Result<(), Error> {
        let first = self
            .descriptors
            .first()
            .ok_or_else(|| Error::InvalidInput("identity has no descriptors".into()))?;
        for other in &self.descriptors[1..] {
            if other.len() != first.len() {
                return Err(Error::DimensionMismatch {
                    expected: first.len(),
                    got: other.len(),
                });
            }
        }
        Ok(())
    }

    pub fn into_record(self, id: IdentityId) -> IdentityRecord {
        IdentityRecord {
            id,
            descriptors: self.descriptors,
            image: self.image,
            name: self.name,
            created_at: self.created_at,
            answers: self.answers,
        }
    }
}

impl From<IdentityRecord> for IdentityDraft {
    fn from(record: IdentityRecord) -> Self {
        Self {
            descriptors: record.descriptors,
            image: record.image,
            name: record.name,
            created_at: record.created_at,
            answers: record.answers,
        }
    }
}

/// Keyed CRUD over identity records.
///
/// Implementations must give read-after-write consistency on one handle and
/// must never hand out an id twice, even after `delete` or `clear`.
/// `list` enumerates in ascending id order (insertion order).
pub trait IdentityStore: Send + Sync {
    /// Insert a validated draft and return its newly assigned id.
    fn insert(&self, draft: IdentityDraft) -> Result<IdentityId, Error>;

    /// All records in ascending id order.
    fn list(&self) -> Result<Vec<IdentityRecord>, Error>;

    /// Fetch one record, or [`Error::NotFound`].
    fn get(&self, id: IdentityId) -> Result<IdentityRecord, Error>;

    /// Overwrite an existing record wholesale. [`Error::NotFound`] if it is gone.
    fn replace(&self, record: &IdentityRecord) -> Result<(), Error>;

    /// Remove a record. Returns `false` if it did not exist.
    fn delete(&self, id: IdentityId) -> Result<bool, Error>;

    /// Remove every record. Ids keep counting up afterwards.
    fn clear(&self) -> Result<(), Error>;

    /// Create a single-angle identity.
    fn create(
        &self,
        descriptor: FaceDescriptor,
        image: RepresentativeImage,
        name: IdentityName,
    ) -> Result<IdentityId, Error> {
        self.insert(IdentityDraft::new(descriptor, image, name))
    }

    /// Append a new angle, leaving earlier angles untouched.
    fn append_descriptor(
        &self,
        id: IdentityId,
        descriptor: FaceDescriptor,
    ) -> Result<IdentityRecord, Error> {
        let mut record = self.get(id)?;
        if let Some(dim) = record.dimension() {
            if dim != descriptor.len() {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    got: descriptor.len(),
                });
            }
        }
        record.descriptors.push(descriptor);
        self.replace(&record)?;
        Ok(record)
    }

    /// Overwrite the name.
    fn set_name(&self, id: IdentityId, name: IdentityName) -> Result<IdentityRecord, Error> {
        let mut record = self.get(id)?;
        record.name = name;
        self.replace(&record)?;
        Ok(record)
    }

    fn list_named(&self) -> Result<Vec<IdentityRecord>, Error> {
        Ok(self.list()?.into_iter().filter(|r| r.name.is_known()).collect())
    }

    fn list_unknown(&self) -> Result<Vec<IdentityRecord>, Error> {
        Ok(self.list()?.into_iter().filter(|r| !r.name.is_known()).collect())
    }

    fn len(&self) -> Result<usize, Error> {
        Ok(self.list()?.len())
    }

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }
}

/// In-memory [`IdentityStore`]. Data is lost on restart.
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

struct MemoryStoreInner {
    records: BTreeMap<IdentityId, IdentityRecord>,
    last_id: IdentityId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryStoreInner {
                records: BTreeMap::new(),
                last_id: 0,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, Error> {
        self.inner
            .lock()
            .map_err(|_| Error::StoreUnavailable("memory store lock poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for MemoryStore {
    fn insert(&self, draft: IdentityDraft) -> Result<IdentityId, Error> {
        draft.validate()?;
        let mut inner = self.lock()?;
        inner.last_id += 1;
        let id = inner.last_id;
        inner.records.insert(id, draft.into_record(id));
        Ok(id)
    }

    fn list(&self) -> Result<Vec<IdentityRecord>, Error> {
        Ok(self.lock()?.records.values().cloned().collect())
    }

    fn get(&self, id: IdentityId) -> Result<IdentityRecord, Error> {
        self.lock()?
            .records
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    fn replace(&self, record: &IdentityRecord) -> Result<(), Error> {
        let mut inner = self.lock()?;
        let slot = inner
            .records
            .get_mut(&record.id)
            .ok_or(Error::NotFound(record.id))?;
        *slot = record.clone();
        Ok(())
    }

    fn delete(&self, id: IdentityId) -> Result<bool, Error> {
        Ok(self.lock()?.records.remove(&id).is_some())
    }

    fn clear(&self) -> Result<(), Error> {
        self.lock()?.records.clear();
        Ok(())
    }
}
