//! Crowd-sourced naming: majority vote over every answer ever submitted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::error::Error;
use crate::store::IdentityStore;
use crate::types::{Answer, IdentityId, IdentityName, IdentityRecord};

/// Answers needed before a vote is taken.
pub const MIN_ANSWERS: usize = 3;

/// Result of a successful vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub winner: String,
    pub votes: usize,
    pub total: usize,
}

/// Most frequent answer text and its count (exact, case-sensitive match).
///
/// Texts are ranked in order of first appearance; a later text must beat
/// the current leader outright to take over, so ties go to whichever text
/// was answered first.
pub fn leader(answers: &[Answer]) -> Option<(&str, usize)> {
    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for answer in answers {
        let text = answer.text.as_str();
        match index.get(text) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(text, order.len());
                order.push((text, 1));
            }
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (text, count) in order {
        if best.map_or(true, |(_, max)| count > max) {
            best = Some((text, count));
        }
    }
    best
}

/// The name the answer log currently elects, if any.
///
/// Requires [`MIN_ANSWERS`] answers and a leader holding at least half of
/// them (`votes >= total / 2` in real arithmetic).
pub fn verdict(answers: &[Answer]) -> Option<Verdict> {
    let total = answers.len();
    if total < MIN_ANSWERS {
        return None;
    }
    let (winner, votes) = leader(answers)?;
    (votes * 2 >= total).then(|| Verdict {
        winner: winner.to_string(),
        votes,
        total,
    })
}

/// Records quiz answers and promotes an identity's name on majority.
pub struct ConsensusEngine<S: IdentityStore + ?Sized> {
    store: Arc<S>,
}

impl<S: IdentityStore + ?Sized> ConsensusEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append `text` to the identity's answer log and re-run the vote.
    ///
    /// The vote covers the whole log, including answers given before any
    /// earlier promotion, so a later majority can overwrite a name.
    pub fn record_answer(&self, id: IdentityId, text: &str) -> Result<IdentityRecord, Error> {
        let mut record = self.store.get(id)?;
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("answer must not be blank".into()));
        }
        record.answers.push(Answer {
            text: text.to_string(),
            at: Utc::now(),
        });

        if let Some(verdict) = verdict(&record.answers) {
            let elected = IdentityName::from_stored(&verdict.winner);
            if elected != record.name {
                tracing::info!(
                    id,
                    from = %record.name,
                    to = %elected,
                    votes = verdict.votes,
                    total = verdict.total,
                    "consensus: name promoted"
                );
            }
            record.name = elected;
        }

        self.store.replace(&record)?;
        Ok(record)
    }
}
