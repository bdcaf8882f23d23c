use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::config::*;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum ElectionStatus {
    Open,
    /// Terminal.
    Closed,
}

/// A candidate as shown on the ballot.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub marker: BallotMarker,
    /// Cumulative weighted votes.
    pub votes: u64,
}

/// The state of one election: the candidates, their tally and who voted for whom.
///
/// The ledger itself does not know about roles. It records the weight that was given to
/// it for each (voter, candidate) pair, so that a retraction can take back exactly what
/// was added.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub election_id: ElectionId,
    pub guild_id: GuildId,
    pub created_at: DateTime<Utc>,
    pub status: ElectionStatus,
    pub ballot_message: Option<MessageId>,
    candidates: BTreeMap<UserId, CandidateRecord>,
    // voter -> candidate -> weight recorded at cast time
    cast_votes: BTreeMap<UserId, BTreeMap<UserId, u64>>,
}

impl Election {
    /// Creates an open election with all the tallies at zero.
    ///
    /// The candidates must be distinct and so must be their markers.
    pub fn new(
        election_id: ElectionId,
        guild_id: GuildId,
        created_at: DateTime<Utc>,
        candidates: &[(UserId, BallotMarker)],
    ) -> TallyResult<Election> {
        ensure!(!candidates.is_empty(), NoCandidatesSnafu {});
        let mut seen_markers: HashSet<&BallotMarker> = HashSet::new();
        let mut records: BTreeMap<UserId, CandidateRecord> = BTreeMap::new();
        for (cid, marker) in candidates.iter() {
            ensure!(
                !records.contains_key(cid),
                DuplicateCandidateSnafu { user_id: *cid }
            );
            ensure!(
                seen_markers.insert(marker),
                DuplicateMarkerSnafu {
                    marker: marker.clone()
                }
            );
            records.insert(
                *cid,
                CandidateRecord {
                    marker: marker.clone(),
                    votes: 0,
                },
            );
        }
        debug!(
            "Election::new: election {} in guild {}: candidates: {:?}",
            election_id, guild_id, records
        );
        Ok(Election {
            election_id,
            guild_id,
            created_at,
            status: ElectionStatus::Open,
            ballot_message: None,
            candidates: records,
            cast_votes: BTreeMap::new(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == ElectionStatus::Open
    }

    pub fn candidates(&self) -> &BTreeMap<UserId, CandidateRecord> {
        &self.candidates
    }

    /// Finds the candidate a reaction refers to.
    pub fn candidate_for_marker(&self, marker: &BallotMarker) -> Option<UserId> {
        self.candidates
            .iter()
            .find_map(|(cid, rec)| if rec.marker == *marker { Some(*cid) } else { None })
    }

    pub fn votes_for(&self, candidate: UserId) -> Option<u64> {
        self.candidates.get(&candidate).map(|rec| rec.votes)
    }

    pub fn tally(&self) -> BTreeMap<UserId, u64> {
        self.candidates
            .iter()
            .map(|(cid, rec)| (*cid, rec.votes))
            .collect()
    }

    /// The weight recorded for an active vote, if any.
    pub fn active_vote(&self, voter: UserId, candidate: UserId) -> Option<u64> {
        self.cast_votes
            .get(&voter)
            .and_then(|votes| votes.get(&candidate))
            .cloned()
    }

    /// All the candidates a voter currently has a vote for.
    pub fn votes_of(&self, voter: UserId) -> Vec<UserId> {
        self.cast_votes
            .get(&voter)
            .map(|votes| votes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Records a vote and returns the new total of the candidate.
    ///
    /// Returns `None` when nothing was recorded: unknown candidate, the voter already has
    /// a vote for this candidate, or a zero weight.
    pub fn record_cast(
        &mut self,
        voter: UserId,
        candidate: UserId,
        weight: u64,
    ) -> TallyResult<Option<u64>> {
        self.ensure_open()?;
        if weight == 0 || self.active_vote(voter, candidate).is_some() {
            return Ok(None);
        }
        let rec = match self.candidates.get_mut(&candidate) {
            Some(rec) => rec,
            None => return Ok(None),
        };
        rec.votes = rec.votes.saturating_add(weight);
        let total = rec.votes;
        self.cast_votes
            .entry(voter)
            .or_default()
            .insert(candidate, weight);
        Ok(Some(total))
    }

    /// Removes an active vote.
    ///
    /// `weight` overrides the amount taken from the tally. When absent, the weight
    /// recorded at cast time is used. Returns the removed weight and the new total, or
    /// `None` if the voter had no vote for this candidate.
    pub fn record_retract(
        &mut self,
        voter: UserId,
        candidate: UserId,
        weight: Option<u64>,
    ) -> TallyResult<Option<(u64, u64)>> {
        self.ensure_open()?;
        let recorded = match self.active_vote(voter, candidate) {
            Some(w) => w,
            None => return Ok(None),
        };
        let removed = weight.unwrap_or(recorded);
        let rec = match self.candidates.get_mut(&candidate) {
            Some(rec) => rec,
            None => return Ok(None),
        };
        rec.votes = rec.votes.saturating_sub(removed);
        let total = rec.votes;
        if let Some(votes) = self.cast_votes.get_mut(&voter) {
            votes.remove(&candidate);
            if votes.is_empty() {
                self.cast_votes.remove(&voter);
            }
        }
        Ok(Some((removed, total)))
    }

    pub fn close(&mut self) -> TallyResult<()> {
        self.ensure_open()?;
        self.status = ElectionStatus::Closed;
        Ok(())
    }

    pub fn summary(&self) -> ElectionSummary {
        ElectionSummary {
            election_id: self.election_id,
            created_at: self.created_at,
        }
    }

    fn ensure_open(&self) -> TallyResult<()> {
        ensure!(
            self.is_open(),
            ElectionClosedSnafu {
                election_id: self.election_id
            }
        );
        Ok(())
    }
}
