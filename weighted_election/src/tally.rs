use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use snafu::prelude::*;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::*;
use crate::directory::MemberDirectory;
use crate::ledger::Election;
use crate::store::ElectionStore;
use crate::weights::resolve_weight;

/// Applies the votes to the elections.
///
/// Updates to the same election are done one at a time: an update loads the election,
/// changes a private copy and stores it back while holding the lock of this election.
/// Elections do not share locks, so votes on different elections proceed in parallel.
pub struct TallyEngine {
    store: Arc<dyn ElectionStore>,
    directory: Arc<dyn MemberDirectory>,
    retract_weight: RetractWeight,
    locks: Mutex<HashMap<ElectionId, Arc<Mutex<()>>>>,
}

impl TallyEngine {
    pub fn new(store: Arc<dyn ElectionStore>, directory: Arc<dyn MemberDirectory>) -> TallyEngine {
        TallyEngine {
            store,
            directory,
            retract_weight: RetractWeight::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retract_weight(self, retract_weight: RetractWeight) -> TallyEngine {
        TallyEngine {
            retract_weight,
            ..self
        }
    }

    pub fn retract_weight(&self) -> RetractWeight {
        self.retract_weight
    }

    /// Takes the lock of one election. Every change to an election goes through it.
    ///
    /// Hand the guard back to [`TallyEngine::unlock_election`] so that the lock table
    /// does not keep an entry for every election ever seen.
    pub(crate) async fn lock_election(&self, election_id: ElectionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(election_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Releases the lock of an election, and drops its entry when nobody else holds or
    /// waits for it.
    pub(crate) async fn unlock_election(&self, election_id: ElectionId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.locks.lock().await;
        // Waiters clone the entry while holding the table, so the count is exact here.
        if let Some(lock) = locks.get(&election_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&election_id);
            }
        }
    }

    /// Applies one vote intent.
    ///
    /// Events that have nothing to do with a running election (unknown election or
    /// marker, self votes, duplicates, ...) are not errors: they are reported as
    /// [`TallyOutcome::Ignored`] and leave the election untouched. When an error is
    /// returned, nothing was changed either.
    pub async fn apply_event(&self, intent: &VoteIntent) -> TallyResult<TallyOutcome> {
        let guard = self.lock_election(intent.election_id).await;
        let res = self.apply_event_locked(intent).await;
        self.unlock_election(intent.election_id, guard).await;
        res
    }

    /// Casts the votes of one explicit vote command, naming the candidates directly.
    ///
    /// One outcome is returned per requested candidate, in order. The applied votes are
    /// stored together: if an error is returned, none of them was recorded.
    pub async fn apply_votes(
        &self,
        election_id: ElectionId,
        voter_id: UserId,
        candidates: &[UserId],
        voter_roles: Option<&RoleSet>,
    ) -> TallyResult<Vec<TallyOutcome>> {
        let guard = self.lock_election(election_id).await;
        let res = self
            .apply_votes_locked(election_id, voter_id, candidates, voter_roles)
            .await;
        self.unlock_election(election_id, guard).await;
        res
    }

    async fn apply_event_locked(&self, intent: &VoteIntent) -> TallyResult<TallyOutcome> {
        let mut election = match self.open_election(intent.election_id).await? {
            Ok(e) => e,
            Err(reason) => return Ok(TallyOutcome::Ignored(reason)),
        };
        let candidate = match election.candidate_for_marker(&intent.marker) {
            Some(cid) => cid,
            None => {
                debug!(
                    "apply_event: election {}: marker {} is not on the ballot",
                    intent.election_id, intent.marker
                );
                return Ok(TallyOutcome::Ignored(IgnoreReason::UnknownMarker));
            }
        };
        let voter = intent.voter_id;
        if voter == candidate {
            debug!("apply_event: {} tried to vote for themselves", voter);
            return Ok(TallyOutcome::Ignored(IgnoreReason::SelfVote));
        }

        let outcome = match intent.direction {
            VoteDirection::Cast => {
                let mut weight = None;
                self.cast(
                    &mut election,
                    voter,
                    candidate,
                    intent.voter_roles.as_ref(),
                    &mut weight,
                )
                .await?
            }
            VoteDirection::Retract => {
                if election.active_vote(voter, candidate).is_none() {
                    return Ok(TallyOutcome::Ignored(IgnoreReason::NoActiveVote));
                }
                let weight = match self.retract_weight {
                    RetractWeight::Snapshot => None,
                    RetractWeight::Reresolve => Some(
                        self.voter_weight(election.guild_id, voter, intent.voter_roles.as_ref())
                            .await?,
                    ),
                };
                match election.record_retract(voter, candidate, weight)? {
                    Some((weight, total)) => TallyOutcome::Applied {
                        candidate,
                        weight,
                        total,
                    },
                    None => TallyOutcome::Ignored(IgnoreReason::NoActiveVote),
                }
            }
        };
        if !outcome.is_applied() {
            return Ok(outcome);
        }

        self.store
            .save_election(&election)
            .await
            .context(StorageSnafu {})?;
        info!(
            "election {}: {:?} by {} -> {:?}",
            intent.election_id, intent.direction, voter, outcome
        );
        Ok(outcome)
    }

    async fn apply_votes_locked(
        &self,
        election_id: ElectionId,
        voter_id: UserId,
        candidates: &[UserId],
        voter_roles: Option<&RoleSet>,
    ) -> TallyResult<Vec<TallyOutcome>> {
        let mut election = match self.open_election(election_id).await? {
            Ok(e) => e,
            Err(reason) => return Ok(vec![TallyOutcome::Ignored(reason); candidates.len()]),
        };
        // Resolved at most once per command.
        let mut weight = None;
        let mut outcomes: Vec<TallyOutcome> = Vec::with_capacity(candidates.len());
        for cid in candidates.iter() {
            let outcome = if election.candidates().contains_key(cid) {
                self.cast(&mut election, voter_id, *cid, voter_roles, &mut weight)
                    .await?
            } else {
                TallyOutcome::Ignored(IgnoreReason::UnknownCandidate)
            };
            outcomes.push(outcome);
        }

        if outcomes.iter().any(|o| o.is_applied()) {
            self.store
                .save_election(&election)
                .await
                .context(StorageSnafu {})?;
        }
        info!(
            "election {}: vote by {} for {:?} -> {:?}",
            election_id, voter_id, candidates, outcomes
        );
        Ok(outcomes)
    }

    // The inner error tells why events for this election are dropped.
    async fn open_election(
        &self,
        election_id: ElectionId,
    ) -> TallyResult<Result<Election, IgnoreReason>> {
        let election = self
            .store
            .load_election(election_id)
            .await
            .context(StorageSnafu {})?;
        Ok(match election {
            None => {
                debug!("apply_event: unknown election {}", election_id);
                Err(IgnoreReason::UnknownElection)
            }
            Some(e) if !e.is_open() => {
                debug!("apply_event: election {} is closed", election_id);
                Err(IgnoreReason::ElectionClosed)
            }
            Some(e) => Ok(e),
        })
    }

    // Records a cast on the working copy. `weight` caches the weight of the voter.
    async fn cast(
        &self,
        election: &mut Election,
        voter: UserId,
        candidate: UserId,
        voter_roles: Option<&RoleSet>,
        weight: &mut Option<u64>,
    ) -> TallyResult<TallyOutcome> {
        if voter == candidate {
            return Ok(TallyOutcome::Ignored(IgnoreReason::SelfVote));
        }
        if election.active_vote(voter, candidate).is_some() {
            return Ok(TallyOutcome::Ignored(IgnoreReason::DuplicateCast));
        }
        let w = match *weight {
            Some(w) => w,
            None => {
                let w = self
                    .voter_weight(election.guild_id, voter, voter_roles)
                    .await?;
                *weight = Some(w);
                w
            }
        };
        Ok(match election.record_cast(voter, candidate, w)? {
            Some(total) => TallyOutcome::Applied {
                candidate,
                weight: w,
                total,
            },
            None => {
                debug!("apply_event: {} has no voting power", voter);
                TallyOutcome::Ignored(IgnoreReason::ZeroWeight)
            }
        })
    }

    async fn voter_weight(
        &self,
        guild_id: GuildId,
        voter_id: UserId,
        voter_roles: Option<&RoleSet>,
    ) -> TallyResult<u64> {
        let policy = self
            .store
            .load_policy(guild_id)
            .await
            .context(StorageSnafu {})?
            .context(PolicyMissingSnafu { guild_id })?;
        let roles: RoleSet = match voter_roles {
            Some(roles) => roles.clone(),
            None => self
                .directory
                .lookup_roles(guild_id, voter_id)
                .await
                .context(RoleLookupSnafu { guild_id, user_id: voter_id })?,
        };
        Ok(resolve_weight(&roles, &policy.role_weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    const GUILD: GuildId = GuildId(1);
    const ELECTION: ElectionId = ElectionId(1);
    const ALICE: UserId = UserId(10);
    const BOB: UserId = UserId(11);
    const MEMBER: RoleId = RoleId(100);
    const ELDER: RoleId = RoleId(200);

    async fn setup(store: Arc<dyn ElectionStore>, directory: Arc<TestDirectory>) -> TallyEngine {
        let _ = env_logger::builder().is_test(true).try_init();
        let policy = GuildPolicy {
            role_weights: [(MEMBER, 1), (ELDER, 3)].into_iter().collect(),
            ..GuildPolicy::default()
        };
        store.save_policy(GUILD, &policy).await.unwrap();
        let election = Election::new(
            ELECTION,
            GUILD,
            Utc::now(),
            &[(ALICE, BallotMarker::new("a")), (BOB, BallotMarker::new("b"))],
        )
        .unwrap();
        store.save_election(&election).await.unwrap();
        TallyEngine::new(store, directory)
    }

    fn intent(voter: u64, marker: &str, direction: VoteDirection) -> VoteIntent {
        VoteIntent {
            election_id: ELECTION,
            voter_id: UserId(voter),
            marker: BallotMarker::new(marker),
            voter_roles: None,
            direction,
        }
    }

    fn cast(voter: u64, marker: &str) -> VoteIntent {
        intent(voter, marker, VoteDirection::Cast)
    }

    fn retract(voter: u64, marker: &str) -> VoteIntent {
        intent(voter, marker, VoteDirection::Retract)
    }

    async fn votes(store: &MemoryStore, candidate: UserId) -> u64 {
        store
            .load_election(ELECTION)
            .await
            .unwrap()
            .unwrap()
            .votes_for(candidate)
            .unwrap()
    }

    #[tokio::test]
    async fn cast_is_weighted() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER, ELDER]);
        let engine = setup(store.clone(), dir).await;

        let res = engine.apply_event(&cast(1, "a")).await.unwrap();
        assert_eq!(
            res,
            TallyOutcome::Applied {
                candidate: ALICE,
                weight: 3,
                total: 3
            }
        );
        assert_eq!(votes(&store, ALICE).await, 3);
    }

    #[tokio::test]
    async fn roles_from_the_event_are_used() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        let engine = setup(store.clone(), dir).await;

        let mut i = cast(1, "b");
        i.voter_roles = Some(BTreeSet::from([MEMBER]));
        assert!(engine.apply_event(&i).await.unwrap().is_applied());
        assert_eq!(votes(&store, BOB).await, 1);
    }

    #[tokio::test]
    async fn self_vote_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, ALICE, &[ELDER]);
        let engine = setup(store.clone(), dir).await;

        let res = engine.apply_event(&cast(ALICE.0, "a")).await.unwrap();
        assert_eq!(res, TallyOutcome::Ignored(IgnoreReason::SelfVote));
        assert_eq!(votes(&store, ALICE).await, 0);
        // Voting for someone else is fine.
        assert!(engine.apply_event(&cast(ALICE.0, "b")).await.unwrap().is_applied());
    }

    #[tokio::test]
    async fn second_cast_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        assert!(engine.apply_event(&cast(1, "a")).await.unwrap().is_applied());
        assert_eq!(
            engine.apply_event(&cast(1, "a")).await.unwrap(),
            TallyOutcome::Ignored(IgnoreReason::DuplicateCast)
        );
        assert_eq!(votes(&store, ALICE).await, 1);
    }

    #[tokio::test]
    async fn retract_restores_the_tally() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[ELDER]);
        dir.set_roles(GUILD, UserId(2), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        engine.apply_event(&cast(2, "a")).await.unwrap();
        let before = votes(&store, ALICE).await;
        engine.apply_event(&cast(1, "a")).await.unwrap();
        assert_eq!(votes(&store, ALICE).await, before + 3);
        let res = engine.apply_event(&retract(1, "a")).await.unwrap();
        assert_eq!(
            res,
            TallyOutcome::Applied {
                candidate: ALICE,
                weight: 3,
                total: before
            }
        );
        assert_eq!(votes(&store, ALICE).await, before);
        let e = store.load_election(ELECTION).await.unwrap().unwrap();
        assert_eq!(e.active_vote(UserId(1), ALICE), None);

        assert_eq!(
            engine.apply_event(&retract(1, "a")).await.unwrap(),
            TallyOutcome::Ignored(IgnoreReason::NoActiveVote)
        );
    }

    #[tokio::test]
    async fn snapshot_weight_survives_role_changes() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[ELDER]);
        let engine = setup(store.clone(), dir.clone()).await;

        engine.apply_event(&cast(1, "a")).await.unwrap();
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        engine.apply_event(&retract(1, "a")).await.unwrap();
        assert_eq!(votes(&store, ALICE).await, 0);
    }

    #[tokio::test]
    async fn reresolved_weight_follows_current_roles() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[ELDER]);
        dir.set_roles(GUILD, UserId(2), &[MEMBER]);
        let engine = setup(store.clone(), dir.clone())
            .await
            .with_retract_weight(RetractWeight::Reresolve);

        engine.apply_event(&cast(1, "a")).await.unwrap();
        engine.apply_event(&cast(2, "a")).await.unwrap();
        assert_eq!(votes(&store, ALICE).await, 4);
        // Demoted between the two reactions: only one vote is taken back.
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let res = engine.apply_event(&retract(1, "a")).await.unwrap();
        assert_eq!(
            res,
            TallyOutcome::Applied {
                candidate: ALICE,
                weight: 1,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn zero_weight_is_not_recorded() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[RoleId(999)]);
        let engine = setup(store.clone(), dir).await;

        assert_eq!(
            engine.apply_event(&cast(1, "a")).await.unwrap(),
            TallyOutcome::Ignored(IgnoreReason::ZeroWeight)
        );
        assert_eq!(
            engine.apply_event(&retract(1, "a")).await.unwrap(),
            TallyOutcome::Ignored(IgnoreReason::NoActiveVote)
        );
        assert_eq!(votes(&store, ALICE).await, 0);
    }

    #[tokio::test]
    async fn unknown_marker_and_election_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        assert_eq!(
            engine.apply_event(&cast(1, "zzz")).await.unwrap(),
            TallyOutcome::Ignored(IgnoreReason::UnknownMarker)
        );
        let mut i = cast(1, "a");
        i.election_id = ElectionId(42);
        assert_eq!(
            engine.apply_event(&i).await.unwrap(),
            TallyOutcome::Ignored(IgnoreReason::UnknownElection)
        );
        let e = store.load_election(ELECTION).await.unwrap().unwrap();
        assert_eq!(e.votes_for(ALICE), Some(0));
        assert!(e.votes_of(UserId(1)).is_empty());
    }

    #[tokio::test]
    async fn closed_election_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        let mut e = store.load_election(ELECTION).await.unwrap().unwrap();
        e.close().unwrap();
        store.save_election(&e).await.unwrap();
        assert_eq!(
            engine.apply_event(&cast(1, "a")).await.unwrap(),
            TallyOutcome::Ignored(IgnoreReason::ElectionClosed)
        );
    }

    #[tokio::test]
    async fn failed_role_lookup_is_surfaced() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        let engine = setup(store.clone(), dir).await;

        // User 1 is not known to the directory.
        let err = engine.apply_event(&cast(1, "a")).await.unwrap_err();
        assert!(matches!(err, ElectionError::RoleLookup { .. }));
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        let e = store.load_election(ELECTION).await.unwrap().unwrap();
        assert!(e.votes_of(UserId(1)).is_empty());
    }

    #[tokio::test]
    async fn failed_write_changes_nothing() {
        let store = Arc::new(FlakyStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        store.fail_writes(true);
        let err = engine.apply_event(&cast(1, "a")).await.unwrap_err();
        assert!(matches!(err, ElectionError::Storage { .. }));
        store.fail_writes(false);

        let e = store.load_election(ELECTION).await.unwrap().unwrap();
        assert_eq!(e.votes_for(ALICE), Some(0));
        assert_eq!(e.active_vote(UserId(1), ALICE), None);
        // The same vote goes through once the store is back.
        assert!(engine.apply_event(&cast(1, "a")).await.unwrap().is_applied());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_casts_are_all_counted() {
        const N: u64 = 200;
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        let engine = Arc::new(setup(store.clone(), dir).await);

        let mut handles = Vec::new();
        for voter in 1000..1000 + N {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let mut i = cast(voter, "b");
                i.voter_roles = Some(BTreeSet::from([MEMBER]));
                engine.apply_event(&i).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().unwrap().is_applied());
        }
        assert_eq!(votes(&store, BOB).await, N);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_cast_and_retract_stay_consistent() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[ELDER]);
        let engine = Arc::new(setup(store.clone(), dir).await);

        let mut handles = Vec::new();
        for k in 0..100 {
            let engine = engine.clone();
            let direction = if k % 2 == 0 {
                VoteDirection::Cast
            } else {
                VoteDirection::Retract
            };
            handles.push(tokio::spawn(async move {
                engine.apply_event(&intent(1, "a", direction)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let e = store.load_election(ELECTION).await.unwrap().unwrap();
        let expected = if e.active_vote(UserId(1), ALICE).is_some() { 3 } else { 0 };
        assert_eq!(e.votes_for(ALICE), Some(expected));
    }

    #[tokio::test]
    async fn lock_table_does_not_grow() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        for id in 0..1000 {
            let mut i = cast(1, "a");
            i.election_id = ElectionId(1000 + id);
            assert_eq!(
                engine.apply_event(&i).await.unwrap(),
                TallyOutcome::Ignored(IgnoreReason::UnknownElection)
            );
        }
        assert!(engine.locks.lock().await.is_empty());

        assert!(engine.apply_event(&cast(1, "a")).await.unwrap().is_applied());
        engine
            .apply_votes(ElectionId(5000), UserId(1), &[BOB], None)
            .await
            .unwrap();
        assert!(engine.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_policy_is_a_state_error() {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let election = Election::new(
            ELECTION,
            GUILD,
            Utc::now(),
            &[(ALICE, BallotMarker::new("a"))],
        )
        .unwrap();
        store.save_election(&election).await.unwrap();
        let engine = TallyEngine::new(store.clone(), dir);

        let err = engine.apply_event(&cast(1, "a")).await.unwrap_err();
        assert!(matches!(err, ElectionError::PolicyMissing { guild_id: GUILD }));
        assert_eq!(err.kind(), ErrorKind::State);
        let e = store.load_election(ELECTION).await.unwrap().unwrap();
        assert_eq!(e, election);
    }

    #[tokio::test]
    async fn explicit_votes_follow_the_reaction_rules() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, ALICE, &[ELDER]);
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        let outcomes = engine
            .apply_votes(ELECTION, ALICE, &[BOB, ALICE, UserId(77), BOB], None)
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                TallyOutcome::Applied {
                    candidate: BOB,
                    weight: 3,
                    total: 3
                },
                TallyOutcome::Ignored(IgnoreReason::SelfVote),
                TallyOutcome::Ignored(IgnoreReason::UnknownCandidate),
                TallyOutcome::Ignored(IgnoreReason::DuplicateCast),
            ]
        );
        assert_eq!(votes(&store, BOB).await, 3);

        // The reaction on the same candidate is a duplicate, and removing it takes the
        // vote back.
        assert_eq!(
            engine.apply_event(&cast(ALICE.0, "b")).await.unwrap(),
            TallyOutcome::Ignored(IgnoreReason::DuplicateCast)
        );
        assert!(engine
            .apply_event(&retract(ALICE.0, "b"))
            .await
            .unwrap()
            .is_applied());
        assert_eq!(votes(&store, BOB).await, 0);

        let outcomes = engine
            .apply_votes(ELECTION, UserId(1), &[ALICE, BOB], None)
            .await
            .unwrap();
        assert!(outcomes.iter().all(|o| o.is_applied()));
        assert_eq!(votes(&store, ALICE).await, 1);
        assert_eq!(votes(&store, BOB).await, 1);
    }

    #[tokio::test]
    async fn explicit_vote_without_weight_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        let engine = setup(store.clone(), dir).await;

        let outcomes = engine
            .apply_votes(ELECTION, UserId(1), &[ALICE, BOB], Some(&BTreeSet::new()))
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![TallyOutcome::Ignored(IgnoreReason::ZeroWeight); 2]
        );
        let e = store.load_election(ELECTION).await.unwrap().unwrap();
        assert!(e.votes_of(UserId(1)).is_empty());
    }

    #[tokio::test]
    async fn explicit_vote_is_stored_as_a_whole() {
        let store = Arc::new(FlakyStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        store.fail_writes(true);
        let err = engine
            .apply_votes(ELECTION, UserId(1), &[ALICE, BOB], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ElectionError::Storage { .. }));
        store.fail_writes(false);
        let e = store.load_election(ELECTION).await.unwrap().unwrap();
        assert_eq!(e.votes_for(ALICE), Some(0));
        assert_eq!(e.votes_for(BOB), Some(0));
        assert!(e.votes_of(UserId(1)).is_empty());
        assert!(engine.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn explicit_vote_on_closed_election_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let dir = Arc::new(TestDirectory::new());
        dir.set_roles(GUILD, UserId(1), &[MEMBER]);
        let engine = setup(store.clone(), dir).await;

        let mut e = store.load_election(ELECTION).await.unwrap().unwrap();
        e.close().unwrap();
        store.save_election(&e).await.unwrap();
        assert_eq!(
            engine
                .apply_votes(ELECTION, UserId(1), &[ALICE], None)
                .await
                .unwrap(),
            vec![TallyOutcome::Ignored(IgnoreReason::ElectionClosed)]
        );
    }
}
