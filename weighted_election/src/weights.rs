use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::config::RoleId;

/// Returns the number of votes a voter brings, given the roles they hold.
///
/// Only the best weighted role counts: holding several weighted roles does not add
/// them up. A voter without any weighted role has a weight of zero, which is not an error.
///
/// ```
/// use std::collections::{BTreeMap, BTreeSet};
/// use weighted_election::{resolve_weight, RoleId};
///
/// let weights = BTreeMap::from([(RoleId(1), 2), (RoleId(2), 5)]);
/// let roles = BTreeSet::from([RoleId(1), RoleId(2), RoleId(3)]);
/// assert_eq!(resolve_weight(&roles, &weights), 5);
/// assert_eq!(resolve_weight(&BTreeSet::from([RoleId(3)]), &weights), 0);
/// ```
pub fn resolve_weight(voter_roles: &BTreeSet<RoleId>, role_weights: &BTreeMap<RoleId, u64>) -> u64 {
    // Walk the smaller of the two collections.
    let weight = if voter_roles.len() <= role_weights.len() {
        voter_roles
            .iter()
            .filter_map(|r| role_weights.get(r))
            .max()
            .cloned()
    } else {
        role_weights
            .iter()
            .filter_map(|(r, w)| if voter_roles.contains(r) { Some(*w) } else { None })
            .max()
    };
    debug!(
        "resolve_weight: roles: {:?} weight: {:?}",
        voter_roles, weight
    );
    weight.unwrap_or(0)
}
