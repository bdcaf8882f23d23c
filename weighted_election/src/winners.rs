use std::collections::BTreeMap;

use log::{debug, info};

use crate::config::{GuildPolicy, UserId, WinnerSelection};

/// All the candidates, most votes first.
///
/// Candidates with the same number of votes are ordered by increasing identifier, so that
/// the ranking is the same every time it is computed.
pub fn standings(tally: &BTreeMap<UserId, u64>) -> Vec<(UserId, u64)> {
    let mut sorted: Vec<(UserId, u64)> = tally.iter().map(|(&cid, &vc)| (cid, vc)).collect();
    sorted.sort_by(|(c1, v1), (c2, v2)| v2.cmp(v1).then(c1.cmp(c2)));
    sorted
}

/// Picks the winners of an election according to the policy of the guild.
///
/// ```
/// use std::collections::BTreeMap;
/// use weighted_election::*;
///
/// let tally = BTreeMap::from([(UserId(1), 10), (UserId(2), 7), (UserId(3), 7), (UserId(4), 2)]);
/// let policy = GuildPolicy { winners_pool: 2, ..GuildPolicy::default() };
/// assert_eq!(select_winners(&tally, &policy), vec![UserId(1), UserId(2)]);
/// ```
pub fn select_winners(tally: &BTreeMap<UserId, u64>, policy: &GuildPolicy) -> Vec<UserId> {
    let ranked = standings(tally);
    debug!("select_winners: ranked: {:?}", ranked);
    let winners: Vec<UserId> = match policy.selection() {
        WinnerSelection::MaxVotes(pool) => ranked
            .iter()
            .take(pool as usize)
            .map(|(cid, _)| *cid)
            .collect(),
        WinnerSelection::Cutoff(cutoff) => ranked
            .iter()
            .filter(|(_, vc)| *vc >= cutoff)
            .map(|(cid, _)| *cid)
            .collect(),
    };
    info!(
        "select_winners: selection: {:?} winners: {:?}",
        policy.selection(),
        winners
    );
    winners
}
