use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use weighted_election::*;

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

mod directory;
pub mod scenario;

use crate::replay::directory::ScenarioDirectory;
use crate::replay::scenario::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReplayError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Unknown reaction action {action:?}, only `add`, `remove` or `vote` allowed"))]
    UnknownAction { action: String },
    #[snafu(display("Election error ({:?}): {}", source.kind(), source))]
    Election { source: ElectionError },
    #[snafu(display("The summary differs from the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RpResult<T> = Result<T, ReplayError>;

fn standings_to_json(standings: &[(UserId, u64)]) -> Vec<JSValue> {
    standings
        .iter()
        .map(|(cid, votes)| json!({"candidate": cid.0, "votes": votes}))
        .collect()
}

fn roles_to_json(roles: &RoleSet) -> Vec<u64> {
    roles.iter().map(|r| r.0).collect()
}

/// Runs every election of the scenario, in order, and builds the summary.
pub async fn replay(scenario: &Scenario, retract_weight: RetractWeight) -> RpResult<JSValue> {
    let directory = Arc::new(ScenarioDirectory::from_members(&scenario.members));
    let manager = ElectionManager::new(Arc::new(MemoryStore::new()), directory.clone())
        .with_retract_weight(retract_weight);

    for settings in scenario.guilds.iter() {
        let policy = validate_settings(settings)?;
        manager
            .configure_policy(GuildId(settings.guild_id), policy)
            .await
            .context(ElectionSnafu {})?;
    }

    let mut results: Vec<JSValue> = Vec::new();
    for se in scenario.elections.iter() {
        let guild_id = GuildId(se.guild_id);
        let candidates: Vec<UserId> = se.candidates.iter().map(|c| UserId(*c)).collect();
        let markers: Vec<BallotMarker> = se.markers.iter().map(BallotMarker::new).collect();
        let election = manager
            .start_election(guild_id, &candidates, &markers)
            .await
            .context(ElectionSnafu {})?;
        let election_id = election.election_id;
        let ballot = MessageId(se.ballot_message);
        manager
            .attach_ballot_message(guild_id, election_id, ballot)
            .await
            .context(ElectionSnafu {})?;

        let mut applied: u64 = 0;
        let mut ignored: BTreeMap<String, u64> = BTreeMap::new();
        for reaction in se.reactions.iter() {
            let user_id = UserId(reaction.user_id);
            let member_roles = reaction.roles.as_deref().map(role_set);
            let outcomes: Vec<TallyOutcome> = match reaction.action()? {
                ReactionAction::Reaction(direction) => {
                    let event = ReactionEvent {
                        guild_id,
                        message_id: reaction.message_id.map(MessageId).unwrap_or(ballot),
                        user_id,
                        marker: reaction.marker()?,
                        member_roles,
                        direction,
                    };
                    let outcome = manager
                        .handle_reaction(&event)
                        .await
                        .context(ElectionSnafu {})?;
                    debug!("replay: {:?} -> {:?}", event, outcome);
                    vec![outcome]
                }
                ReactionAction::Vote => {
                    let candidates: Vec<UserId> =
                        reaction.candidates.iter().map(|c| UserId(*c)).collect();
                    let outcomes = manager
                        .vote(guild_id, election_id, user_id, &candidates, member_roles)
                        .await
                        .context(ElectionSnafu {})?;
                    debug!("replay: vote by {} -> {:?}", user_id, outcomes);
                    outcomes
                }
            };
            for outcome in outcomes {
                match outcome {
                    TallyOutcome::Applied { .. } => applied += 1,
                    TallyOutcome::Ignored(reason) => {
                        *ignored.entry(format!("{:?}", reason)).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut ignored_js: JSMap<String, JSValue> = JSMap::new();
        for (reason, count) in ignored {
            ignored_js.insert(reason, json!(count));
        }
        let events = json!({"applied": applied, "ignored": ignored_js});

        let js = if se.finish {
            let result = manager
                .finish_election(guild_id, election_id)
                .await
                .context(ElectionSnafu {})?;
            json!({
                "election": election_id.0,
                "events": events,
                "guild": guild_id.0,
                "rewardRoles": roles_to_json(&result.reward_roles),
                "standings": standings_to_json(&result.standings),
                "status": "finished",
                "winners": result.winners.iter().map(|w| w.0).collect::<Vec<u64>>(),
            })
        } else {
            let current = manager
                .poll(guild_id, election_id)
                .await
                .context(ElectionSnafu {})?;
            json!({
                "election": election_id.0,
                "events": events,
                "guild": guild_id.0,
                "standings": standings_to_json(&current),
                "status": "open",
            })
        };
        info!("replay: election {} done", election_id);
        results.push(js);
    }

    let rewards: Vec<JSValue> = directory
        .granted()
        .iter()
        .map(|(gid, uid, roles)| json!({"guild": gid.0, "roles": roles_to_json(roles), "user": uid.0}))
        .collect();

    Ok(json!({ "results": results, "rewards": rewards }))
}

pub fn read_summary(path: &str) -> RpResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read content: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

/// Replays a scenario file, writes the summary and checks it against a reference.
pub async fn run_scenario(
    scenario_path: &str,
    check_summary_path: Option<&str>,
    out: Option<&str>,
    retract_weight: Option<&str>,
) -> RpResult<()> {
    let scenario = read_scenario(scenario_path)?;
    info!("scenario: {:?}", scenario);

    // The command line wins over the file.
    let retract_weight = match retract_weight.or(scenario.retract_weight.as_deref()) {
        Some(s) => parse_retract_weight(s)?,
        None => RetractWeight::default(),
    };

    let result_js = replay(&scenario, retract_weight).await?;
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(SerializingJsonSnafu {})?;

    match out {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            fs::write(path, pretty_js_stats.as_str()).context(WritingSummarySnafu { path })?;
            info!("summary written to {}", path);
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        if summary_ref != result_js {
            let pretty_js_summary_ref =
                serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_str(),
                "\n",
            );
            return ReferenceMismatchSnafu { path: summary_p }.fail();
        }
    }
    Ok(())
}
