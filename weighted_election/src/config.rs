use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::directory::DirectoryError;
use crate::store::StoreError;

// ********* Identifiers ***********

// The platform hands out 64-bit snowflakes for everything. They are only compared and
// ordered here, never interpreted.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(
    /// Identifier of one election. Assigned by the store, strictly increasing.
    ElectionId
);
opaque_id!(
    /// A community (server) on the chat platform.
    GuildId
);
opaque_id!(
    /// A member of a guild. Candidates are users as well.
    UserId
);
opaque_id!(RoleId);
opaque_id!(
    /// The message carrying the ballot, on which the reactions are collected.
    MessageId
);

/// The reaction (emoji) attached to a candidate on the ballot.
///
/// Custom emojis are usually passed with their numeric identifier, unicode emojis with
/// their text. No interpretation is done on the content.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallotMarker(pub String);

impl BallotMarker {
    pub fn new(marker: impl Into<String>) -> BallotMarker {
        BallotMarker(marker.into())
    }
}

impl Display for BallotMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type RoleSet = BTreeSet<RoleId>;

// ********* Input data structures ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum VoteDirection {
    /// The reaction was added, or an explicit vote command was issued.
    Cast,
    /// The reaction was removed.
    Retract,
}

/// A vote intent, already correlated to an election.
///
/// `voter_roles` may be filled by the event source when the platform ships the member
/// roles with the event. Otherwise they are queried from the member directory.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoteIntent {
    pub election_id: ElectionId,
    pub voter_id: UserId,
    pub marker: BallotMarker,
    pub voter_roles: Option<RoleSet>,
    pub direction: VoteDirection,
}

/// A raw reaction event as delivered by the platform.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReactionEvent {
    pub guild_id: GuildId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub marker: BallotMarker,
    pub member_roles: Option<RoleSet>,
    pub direction: VoteDirection,
}

// ******** Output data structures *********

/// Why an event did not change the tally. None of these is an error.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum IgnoreReason {
    UnknownElection,
    ElectionClosed,
    /// The message is not a ballot of an election in progress.
    NotABallot,
    UnknownMarker,
    /// An explicit vote named someone who does not run in the election.
    UnknownCandidate,
    SelfVote,
    BotVoter,
    DuplicateCast,
    /// The voter holds no weighted role. The vote is not recorded.
    ZeroWeight,
    NoActiveVote,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TallyOutcome {
    Applied {
        candidate: UserId,
        /// The weight added (cast) or removed (retract).
        weight: u64,
        /// The total of the candidate after the update.
        total: u64,
    },
    Ignored(IgnoreReason),
}

impl TallyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TallyOutcome::Applied { .. })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub election_id: ElectionId,
    pub created_at: DateTime<Utc>,
}

/// The outcome of a finished election.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionResult {
    pub election_id: ElectionId,
    pub guild_id: GuildId,
    /// The winners, best first.
    pub winners: Vec<UserId>,
    pub reward_roles: RoleSet,
    /// All the candidates with their final counts, best first.
    pub standings: Vec<(UserId, u64)>,
}

// ********* Errors **********

/// Broad classes of errors, for the command layer to decide how to report them.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ErrorKind {
    /// Bad input from the person issuing the command. Recoverable.
    UserInput,
    /// The operation does not make sense in the current state of the election.
    State,
    /// A collaborator (store, member directory) failed.
    Collaborator,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ElectionError {
    #[snafu(display("the winners pool must be more than zero"))]
    InvalidWinnersPool {},

    #[snafu(display("the votes cutoff must be more than zero"))]
    InvalidVotesCutoff {},

    #[snafu(display("the weight of role {role_id} must be more than zero"))]
    InvalidRoleWeight { role_id: RoleId },

    #[snafu(display("at least one candidate is required to start an election"))]
    NoCandidates {},

    #[snafu(display("user {user_id} is a bot and cannot be a candidate"))]
    BotCandidate { user_id: UserId },

    #[snafu(display("{candidates} candidates but only {markers} ballot markers available"))]
    NotEnoughMarkers { candidates: usize, markers: usize },

    #[snafu(display("user {user_id} is listed more than once as a candidate"))]
    DuplicateCandidate { user_id: UserId },

    #[snafu(display("ballot marker {marker} is used for more than one candidate"))]
    DuplicateMarker { marker: BallotMarker },

    #[snafu(display("message {message_id} is already the ballot of election {election_id}"))]
    BallotInUse {
        message_id: MessageId,
        election_id: ElectionId,
    },

    #[snafu(display("select at least one candidate to vote for"))]
    EmptyVote {},

    #[snafu(display("no such election: {election_id}"))]
    NoSuchElection { election_id: ElectionId },

    #[snafu(display("election {election_id} does not belong to guild {guild_id}"))]
    ForeignElection {
        election_id: ElectionId,
        guild_id: GuildId,
    },

    #[snafu(display("no election settings for guild {guild_id}, set reward roles first"))]
    PolicyNotConfigured { guild_id: GuildId },

    #[snafu(display("election {election_id} is closed"))]
    ElectionClosed { election_id: ElectionId },

    #[snafu(display("election settings of guild {guild_id} disappeared"))]
    PolicyMissing { guild_id: GuildId },

    #[snafu(display("could not fetch the roles of user {user_id} in guild {guild_id}"))]
    RoleLookup {
        guild_id: GuildId,
        user_id: UserId,
        source: DirectoryError,
    },

    #[snafu(display("could not grant the reward roles to user {user_id}"))]
    RewardGrant {
        user_id: UserId,
        source: DirectoryError,
    },

    #[snafu(display("could not check whether user {user_id} is a bot"))]
    BotLookup {
        user_id: UserId,
        source: DirectoryError,
    },

    #[snafu(display("election storage failed"))]
    Storage { source: StoreError },
}

impl ElectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ElectionError::InvalidWinnersPool {}
            | ElectionError::InvalidVotesCutoff {}
            | ElectionError::InvalidRoleWeight { .. }
            | ElectionError::NoCandidates {}
            | ElectionError::BotCandidate { .. }
            | ElectionError::NotEnoughMarkers { .. }
            | ElectionError::DuplicateCandidate { .. }
            | ElectionError::DuplicateMarker { .. }
            | ElectionError::BallotInUse { .. }
            | ElectionError::EmptyVote {}
            | ElectionError::NoSuchElection { .. }
            | ElectionError::ForeignElection { .. }
            | ElectionError::PolicyNotConfigured { .. } => ErrorKind::UserInput,
            ElectionError::ElectionClosed { .. } | ElectionError::PolicyMissing { .. } => {
                ErrorKind::State
            }
            ElectionError::RoleLookup { .. }
            | ElectionError::RewardGrant { .. }
            | ElectionError::BotLookup { .. }
            | ElectionError::Storage { .. } => ErrorKind::Collaborator,
        }
    }
}

pub type TallyResult<T> = Result<T, ElectionError>;

// ********* Configuration **********

/// How the winners are picked when an election is finished.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerSelectionStrategy {
    /// The `winners_pool` candidates with the most votes win.
    MaxVotes,
    /// Every candidate with at least `votes_cutoff` votes wins.
    Cutoff,
}

/// The selection rule that is actually in effect for a policy.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum WinnerSelection {
    MaxVotes(u32),
    Cutoff(u64),
}

/// Election settings of a guild.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GuildPolicy {
    pub reward_role_ids: RoleSet,
    /// Roles not in this map give no voting power.
    pub role_weights: BTreeMap<RoleId, u64>,
    pub winner_selection_strategy: WinnerSelectionStrategy,
    /// Only used with `MaxVotes`.
    pub winners_pool: u32,
    /// Only used with `Cutoff`.
    pub votes_cutoff: u64,
}

impl GuildPolicy {
    pub const DEFAULT_POLICY: GuildPolicy = GuildPolicy {
        reward_role_ids: BTreeSet::new(),
        role_weights: BTreeMap::new(),
        winner_selection_strategy: WinnerSelectionStrategy::MaxVotes,
        winners_pool: 1,
        votes_cutoff: 1,
    };

    pub fn validate(&self) -> TallyResult<()> {
        ensure!(self.winners_pool > 0, InvalidWinnersPoolSnafu {});
        ensure!(self.votes_cutoff > 0, InvalidVotesCutoffSnafu {});
        if let Some((role_id, _)) = self.role_weights.iter().find(|(_, w)| **w == 0) {
            return InvalidRoleWeightSnafu { role_id: *role_id }.fail();
        }
        Ok(())
    }

    pub fn selection(&self) -> WinnerSelection {
        match self.winner_selection_strategy {
            WinnerSelectionStrategy::MaxVotes => WinnerSelection::MaxVotes(self.winners_pool),
            WinnerSelectionStrategy::Cutoff => WinnerSelection::Cutoff(self.votes_cutoff),
        }
    }
}

impl Default for GuildPolicy {
    fn default() -> Self {
        GuildPolicy::DEFAULT_POLICY
    }
}

/// Which weight is removed when a vote is retracted.
///
/// The roles of a voter may change between the moment they vote and the moment they
/// take their vote back.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Default)]
pub enum RetractWeight {
    /// Remove the weight recorded when the vote was cast. The tally never drifts.
    #[default]
    Snapshot,
    /// Resolve the weight again from the current roles. The tally drifts when roles
    /// change in between.
    Reresolve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(GuildPolicy::default().validate().is_ok());
        assert_eq!(
            GuildPolicy::default().selection(),
            WinnerSelection::MaxVotes(1)
        );
    }

    #[test]
    fn rejects_non_positive_settings() {
        let mut policy = GuildPolicy {
            winners_pool: 0,
            ..GuildPolicy::default()
        };
        let err = policy.validate().unwrap_err();
        assert!(matches!(err, ElectionError::InvalidWinnersPool {}));
        assert_eq!(err.kind(), ErrorKind::UserInput);

        policy.winners_pool = 3;
        policy.votes_cutoff = 0;
        assert!(matches!(
            policy.validate(),
            Err(ElectionError::InvalidVotesCutoff {})
        ));

        policy.votes_cutoff = 2;
        policy.role_weights.insert(RoleId(7), 0);
        assert!(matches!(
            policy.validate(),
            Err(ElectionError::InvalidRoleWeight { role_id: RoleId(7) })
        ));
    }

    #[test]
    fn only_one_selection_parameter_is_active() {
        let policy = GuildPolicy {
            winner_selection_strategy: WinnerSelectionStrategy::Cutoff,
            winners_pool: 4,
            votes_cutoff: 9,
            ..GuildPolicy::default()
        };
        assert_eq!(policy.selection(), WinnerSelection::Cutoff(9));
    }
}
