use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use weighted_election::*;

use crate::replay::{ElectionSnafu, OpeningJsonSnafu, ParsingJsonSnafu, RpResult, UnknownActionSnafu};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RoleWeight {
    pub role: u64,
    pub weight: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GuildSettings {
    #[serde(rename = "guildId")]
    pub guild_id: u64,
    #[serde(rename = "rewardRoles")]
    pub reward_roles: Vec<u64>,
    #[serde(rename = "roleWeights")]
    pub role_weights: Vec<RoleWeight>,
    #[serde(rename = "winnerSelectionStrategy")]
    pub winner_selection_strategy: Option<String>,
    #[serde(rename = "winnersPool")]
    pub winners_pool: Option<u32>,
    #[serde(rename = "votesCutoff")]
    pub votes_cutoff: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMember {
    #[serde(rename = "guildId")]
    pub guild_id: u64,
    #[serde(rename = "userId")]
    pub user_id: u64,
    #[serde(default)]
    pub roles: Vec<u64>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReaction {
    #[serde(rename = "userId")]
    pub user_id: u64,
    /// Required by "add" and "remove".
    pub marker: Option<String>,
    /// The candidates named by a "vote".
    #[serde(default)]
    pub candidates: Vec<u64>,
    /// "add", "remove" or "vote"
    pub action: String,
    /// Defaults to the ballot message of the election.
    #[serde(rename = "messageId")]
    pub message_id: Option<u64>,
    /// Roles shipped with the event. When absent, the member roles are looked up.
    pub roles: Option<Vec<u64>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioElection {
    #[serde(rename = "guildId")]
    pub guild_id: u64,
    pub candidates: Vec<u64>,
    pub markers: Vec<String>,
    #[serde(rename = "ballotMessage")]
    pub ballot_message: u64,
    #[serde(default)]
    pub reactions: Vec<ScenarioReaction>,
    #[serde(default)]
    pub finish: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub guilds: Vec<GuildSettings>,
    #[serde(default)]
    pub members: Vec<ScenarioMember>,
    pub elections: Vec<ScenarioElection>,
    #[serde(rename = "retractWeight")]
    pub retract_weight: Option<String>,
}

/// What a scenario entry does.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ReactionAction {
    /// A reaction added or removed on the ballot.
    Reaction(VoteDirection),
    /// An explicit vote command.
    Vote,
}

impl ScenarioReaction {
    pub fn action(&self) -> RpResult<ReactionAction> {
        match self.action.as_str() {
            "add" | "cast" => Ok(ReactionAction::Reaction(VoteDirection::Cast)),
            "remove" | "retract" => Ok(ReactionAction::Reaction(VoteDirection::Retract)),
            "vote" => Ok(ReactionAction::Vote),
            x => UnknownActionSnafu {
                action: x.to_string(),
            }
            .fail(),
        }
    }

    pub fn marker(&self) -> RpResult<BallotMarker> {
        match &self.marker {
            Some(m) => Ok(BallotMarker::new(m.as_str())),
            None => whatever!(
                "the {:?} of user {} has no marker",
                self.action,
                self.user_id
            ),
        }
    }
}

pub fn read_scenario(path: &str) -> RpResult<Scenario> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let scenario: Scenario =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_scenario: {:?}", scenario);
    Ok(scenario)
}

pub fn parse_strategy(s: &str) -> RpResult<WinnerSelectionStrategy> {
    match s {
        "max_votes" => Ok(WinnerSelectionStrategy::MaxVotes),
        "cutoff" => Ok(WinnerSelectionStrategy::Cutoff),
        x => whatever!(
            "Incorrect winner selection strategy {:?}, only `max_votes` or `cutoff` allowed",
            x
        ),
    }
}

pub fn parse_retract_weight(s: &str) -> RpResult<RetractWeight> {
    match s {
        "snapshot" => Ok(RetractWeight::Snapshot),
        "reresolve" => Ok(RetractWeight::Reresolve),
        x => whatever!(
            "Incorrect retract weight {:?}, only `snapshot` or `reresolve` allowed",
            x
        ),
    }
}

/// Turns the settings of the file into a policy. Unset values keep their defaults.
pub fn validate_settings(settings: &GuildSettings) -> RpResult<GuildPolicy> {
    let mut role_weights: BTreeMap<RoleId, u64> = BTreeMap::new();
    for rw in settings.role_weights.iter() {
        if role_weights.insert(RoleId(rw.role), rw.weight).is_some() {
            whatever!(
                "guild {}: role {} has more than one weight",
                settings.guild_id,
                rw.role
            )
        }
    }
    let defaults = GuildPolicy::default();
    let policy = GuildPolicy {
        reward_role_ids: settings.reward_roles.iter().map(|r| RoleId(*r)).collect(),
        role_weights,
        winner_selection_strategy: match settings.winner_selection_strategy.as_deref() {
            Some(s) => parse_strategy(s)?,
            None => defaults.winner_selection_strategy,
        },
        winners_pool: settings.winners_pool.unwrap_or(defaults.winners_pool),
        votes_cutoff: settings.votes_cutoff.unwrap_or(defaults.votes_cutoff),
    };
    policy.validate().context(ElectionSnafu {})?;
    Ok(policy)
}

pub fn role_set(roles: &[u64]) -> RoleSet {
    roles.iter().map(|r| RoleId(*r)).collect::<BTreeSet<RoleId>>()
}
