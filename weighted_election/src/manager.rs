use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use snafu::prelude::*;
use tokio::sync::Mutex;

use crate::config::*;
use crate::directory::MemberDirectory;
use crate::ledger::Election;
use crate::store::ElectionStore;
use crate::tally::TallyEngine;
use crate::winners::{select_winners, standings};

/// The operations of the election commands: guild settings, starting and finishing
/// elections, looking at the polls and feeding the reactions to the tally.
///
/// Permission checks are the business of the command framework calling this.
pub struct ElectionManager {
    store: Arc<dyn ElectionStore>,
    directory: Arc<dyn MemberDirectory>,
    engine: TallyEngine,
    // Serializes the read-modify-write of the guild settings.
    policy_lock: Mutex<()>,
}

impl ElectionManager {
    pub fn new(
        store: Arc<dyn ElectionStore>,
        directory: Arc<dyn MemberDirectory>,
    ) -> ElectionManager {
        ElectionManager {
            engine: TallyEngine::new(store.clone(), directory.clone()),
            store,
            directory,
            policy_lock: Mutex::new(()),
        }
    }

    pub fn with_retract_weight(self, retract_weight: RetractWeight) -> ElectionManager {
        ElectionManager {
            engine: self.engine.with_retract_weight(retract_weight),
            ..self
        }
    }

    pub fn engine(&self) -> &TallyEngine {
        &self.engine
    }

    // ******** Guild settings ********

    pub async fn policy(&self, guild_id: GuildId) -> TallyResult<GuildPolicy> {
        self.store
            .load_policy(guild_id)
            .await
            .context(StorageSnafu {})?
            .context(PolicyNotConfiguredSnafu { guild_id })
    }

    pub async fn configure_policy(&self, guild_id: GuildId, policy: GuildPolicy) -> TallyResult<()> {
        self.update_policy(guild_id, move |p| *p = policy)
            .await
            .map(|_| ())
    }

    pub async fn set_reward_roles(&self, guild_id: GuildId, roles: RoleSet) -> TallyResult<GuildPolicy> {
        self.update_policy(guild_id, move |p| p.reward_role_ids = roles)
            .await
    }

    /// Replaces all the role weights. Roles that are not listed lose their voting power.
    pub async fn set_role_weights(
        &self,
        guild_id: GuildId,
        weights: BTreeMap<RoleId, u64>,
    ) -> TallyResult<GuildPolicy> {
        self.update_policy(guild_id, move |p| p.role_weights = weights)
            .await
    }

    pub async fn set_winners_pool(&self, guild_id: GuildId, pool: u32) -> TallyResult<GuildPolicy> {
        self.update_policy(guild_id, move |p| p.winners_pool = pool)
            .await
    }

    pub async fn set_votes_cutoff(&self, guild_id: GuildId, cutoff: u64) -> TallyResult<GuildPolicy> {
        self.update_policy(guild_id, move |p| p.votes_cutoff = cutoff)
            .await
    }

    pub async fn set_winner_selection_strategy(
        &self,
        guild_id: GuildId,
        strategy: WinnerSelectionStrategy,
    ) -> TallyResult<GuildPolicy> {
        self.update_policy(guild_id, move |p| p.winner_selection_strategy = strategy)
            .await
    }

    // Guilds start with the default settings. An invalid change is not stored.
    async fn update_policy<F>(&self, guild_id: GuildId, f: F) -> TallyResult<GuildPolicy>
    where
        F: FnOnce(&mut GuildPolicy) + Send,
    {
        let _guard = self.policy_lock.lock().await;
        let mut policy = self
            .store
            .load_policy(guild_id)
            .await
            .context(StorageSnafu {})?
            .unwrap_or_default();
        f(&mut policy);
        policy.validate()?;
        self.store
            .save_policy(guild_id, &policy)
            .await
            .context(StorageSnafu {})?;
        info!("guild {}: new election settings: {:?}", guild_id, policy);
        Ok(policy)
    }

    // ******** Elections ********

    /// Opens a new election.
    ///
    /// Candidates are paired with the markers in order. Repeated candidates are only
    /// counted once. Extra markers are not used.
    pub async fn start_election(
        &self,
        guild_id: GuildId,
        candidates: &[UserId],
        markers: &[BallotMarker],
    ) -> TallyResult<Election> {
        let policy = self
            .store
            .load_policy(guild_id)
            .await
            .context(StorageSnafu {})?;
        ensure!(policy.is_some(), PolicyNotConfiguredSnafu { guild_id });

        let mut seen: HashSet<UserId> = HashSet::new();
        let unique: Vec<UserId> = candidates
            .iter()
            .filter(|cid| seen.insert(**cid))
            .cloned()
            .collect();
        ensure!(!unique.is_empty(), NoCandidatesSnafu {});
        for cid in unique.iter() {
            let is_bot = self
                .directory
                .is_bot(*cid)
                .await
                .context(BotLookupSnafu { user_id: *cid })?;
            ensure!(!is_bot, BotCandidateSnafu { user_id: *cid });
        }
        ensure!(
            markers.len() >= unique.len(),
            NotEnoughMarkersSnafu {
                candidates: unique.len(),
                markers: markers.len(),
            }
        );

        let ballot: Vec<(UserId, BallotMarker)> = unique
            .iter()
            .cloned()
            .zip(markers.iter().cloned())
            .collect();
        let election_id = self
            .store
            .next_election_id()
            .await
            .context(StorageSnafu {})?;
        let election = Election::new(election_id, guild_id, Utc::now(), &ballot)?;
        self.store
            .save_election(&election)
            .await
            .context(StorageSnafu {})?;
        info!(
            "Election {} started in guild {} with candidates {:?}",
            election_id, guild_id, unique
        );
        Ok(election)
    }

    /// Remembers which message carries the ballot of an election.
    ///
    /// A message can only be the ballot of one open election of the guild.
    pub async fn attach_ballot_message(
        &self,
        guild_id: GuildId,
        election_id: ElectionId,
        message_id: MessageId,
    ) -> TallyResult<()> {
        let guard = self.engine.lock_election(election_id).await;
        let res = self
            .attach_ballot_message_locked(guild_id, election_id, message_id)
            .await;
        self.engine.unlock_election(election_id, guard).await;
        res
    }

    async fn attach_ballot_message_locked(
        &self,
        guild_id: GuildId,
        election_id: ElectionId,
        message_id: MessageId,
    ) -> TallyResult<()> {
        let mut election = self.guild_election(guild_id, election_id).await?;
        ensure!(election.is_open(), ElectionClosedSnafu { election_id });
        let elections = self
            .store
            .elections_in_guild(guild_id)
            .await
            .context(StorageSnafu {})?;
        if let Some(other) = elections.iter().find(|e| {
            e.election_id != election_id && e.is_open() && e.ballot_message == Some(message_id)
        }) {
            return BallotInUseSnafu {
                message_id,
                election_id: other.election_id,
            }
            .fail();
        }
        election.ballot_message = Some(message_id);
        self.store
            .save_election(&election)
            .await
            .context(StorageSnafu {})?;
        debug!(
            "attach_ballot_message: election {} -> message {}",
            election_id, message_id
        );
        Ok(())
    }

    /// The open election whose ballot is the given message, if any.
    pub async fn election_for_ballot(
        &self,
        guild_id: GuildId,
        message_id: MessageId,
    ) -> TallyResult<Option<ElectionId>> {
        let elections = self
            .store
            .elections_in_guild(guild_id)
            .await
            .context(StorageSnafu {})?;
        Ok(elections
            .iter()
            .find(|e| e.is_open() && e.ballot_message == Some(message_id))
            .map(|e| e.election_id))
    }

    pub async fn open_elections(&self, guild_id: GuildId) -> TallyResult<Vec<ElectionSummary>> {
        let elections = self
            .store
            .elections_in_guild(guild_id)
            .await
            .context(StorageSnafu {})?;
        Ok(elections
            .iter()
            .filter(|e| e.is_open())
            .map(|e| e.summary())
            .collect())
    }

    /// The current counts of an election, best first.
    pub async fn poll(
        &self,
        guild_id: GuildId,
        election_id: ElectionId,
    ) -> TallyResult<Vec<(UserId, u64)>> {
        let election = self.guild_election(guild_id, election_id).await?;
        Ok(standings(&election.tally()))
    }

    /// Feeds a reaction to the tally.
    ///
    /// Reactions from bots and reactions on messages that are not a ballot are ignored.
    pub async fn handle_reaction(&self, event: &ReactionEvent) -> TallyResult<TallyOutcome> {
        let is_bot = self
            .directory
            .is_bot(event.user_id)
            .await
            .context(BotLookupSnafu {
                user_id: event.user_id,
            })?;
        if is_bot {
            return Ok(TallyOutcome::Ignored(IgnoreReason::BotVoter));
        }
        let election_id = match self
            .election_for_ballot(event.guild_id, event.message_id)
            .await?
        {
            Some(id) => id,
            None => return Ok(TallyOutcome::Ignored(IgnoreReason::NotABallot)),
        };
        self.engine
            .apply_event(&VoteIntent {
                election_id,
                voter_id: event.user_id,
                marker: event.marker.clone(),
                voter_roles: event.member_roles.clone(),
                direction: event.direction,
            })
            .await
    }

    /// An explicit vote command: the voter names one or more candidates.
    ///
    /// Returns one outcome per named candidate. Candidates that do not run in the election
    /// are ignored, and the other ones follow the same rules as reactions.
    pub async fn vote(
        &self,
        guild_id: GuildId,
        election_id: ElectionId,
        voter_id: UserId,
        candidates: &[UserId],
        voter_roles: Option<RoleSet>,
    ) -> TallyResult<Vec<TallyOutcome>> {
        ensure!(!candidates.is_empty(), EmptyVoteSnafu {});
        self.guild_election(guild_id, election_id).await?;
        let is_bot = self
            .directory
            .is_bot(voter_id)
            .await
            .context(BotLookupSnafu { user_id: voter_id })?;
        if is_bot {
            return Ok(vec![
                TallyOutcome::Ignored(IgnoreReason::BotVoter);
                candidates.len()
            ]);
        }
        self.engine
            .apply_votes(election_id, voter_id, candidates, voter_roles.as_ref())
            .await
    }

    /// Closes an election, hands the reward roles to the winners and forgets the election.
    ///
    /// If a reward cannot be granted, the election stays open and the command can be
    /// issued again.
    pub async fn finish_election(
        &self,
        guild_id: GuildId,
        election_id: ElectionId,
    ) -> TallyResult<ElectionResult> {
        let guard = self.engine.lock_election(election_id).await;
        let res = self.finish_election_locked(guild_id, election_id).await;
        self.engine.unlock_election(election_id, guard).await;
        res
    }

    async fn finish_election_locked(
        &self,
        guild_id: GuildId,
        election_id: ElectionId,
    ) -> TallyResult<ElectionResult> {
        let mut election = self.guild_election(guild_id, election_id).await?;
        let policy = self
            .store
            .load_policy(guild_id)
            .await
            .context(StorageSnafu {})?
            .context(PolicyMissingSnafu { guild_id })?;
        election.close()?;

        let tally = election.tally();
        let winners = select_winners(&tally, &policy);
        if policy.reward_role_ids.is_empty() {
            warn!(
                "Election {}: no reward roles configured in guild {}",
                election_id, guild_id
            );
        } else {
            for winner in winners.iter() {
                self.directory
                    .grant_roles(guild_id, *winner, &policy.reward_role_ids)
                    .await
                    .context(RewardGrantSnafu { user_id: *winner })?;
            }
        }
        self.store
            .remove_election(election_id)
            .await
            .context(StorageSnafu {})?;

        info!("Election {} finished. Winners: {:?}", election_id, winners);
        Ok(ElectionResult {
            election_id,
            guild_id,
            winners,
            reward_roles: policy.reward_role_ids,
            standings: standings(&tally),
        })
    }

    async fn guild_election(
        &self,
        guild_id: GuildId,
        election_id: ElectionId,
    ) -> TallyResult<Election> {
        let election = self
            .store
            .load_election(election_id)
            .await
            .context(StorageSnafu {})?
            .context(NoSuchElectionSnafu { election_id })?;
        ensure!(
            election.guild_id == guild_id,
            ForeignElectionSnafu {
                election_id,
                guild_id
            }
        );
        Ok(election)
    }
}
