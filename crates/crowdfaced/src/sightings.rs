use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use crowdface_core::{ConfidenceBand, IdentityId, IdentityName, IdentityRecord};
use serde::Serialize;

/// One identity seen recently, with the confidence of its last sighting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sighting {
    pub id: IdentityId,
    pub name: IdentityName,
    /// Percent, 0 for an identity created by this sighting.
    pub confidence: u8,
    pub band: ConfidenceBand,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub seen_at: DateTime<Utc>,
}

/// Most-recent-first list of identities, capped in length.
pub struct RecentSightings {
    capacity: usize,
    entries: VecDeque<Sighting>,
}

impl RecentSightings {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Fill from stored records, newest first, with no confidence yet.
    pub fn seed(&mut self, mut records: Vec<IdentityRecord>) {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.entries = records
            .into_iter()
            .take(self.capacity)
            .map(|r| Sighting {
                id: r.id,
                name: r.name,
                confidence: 0,
                band: ConfidenceBand::New,
                seen_at: r.created_at,
            })
            .collect();
    }

    /// Move `record` to the front, dropping the oldest entry past capacity.
    pub fn observe(&mut self, record: &IdentityRecord, confidence: u8) {
        self.forget(record.id);
        self.entries.push_front(Sighting {
            id: record.id,
            name: record.name.clone(),
            confidence,
            band: ConfidenceBand::from_percent(confidence),
            seen_at: Utc::now(),
        });
        self.entries.truncate(self.capacity);
    }

    /// Refresh the displayed name after a rename, reset or vote.
    pub fn rename(&mut self, id: IdentityId, name: &IdentityName) {
        if let Some(entry) = self.entries.iter_mut().find(|s| s.id == id) {
            entry.name = name.clone();
        }
    }

    pub fn forget(&mut self, id: IdentityId) {
        self.entries.retain(|s| s.id != id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> Vec<Sighting> {
        self.entries.iter().cloned().collect()
    }
}
