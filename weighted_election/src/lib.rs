/*!
Role-weighted elections for community chat bots.

Members of a guild vote for candidates by reacting on a ballot message. Each voter
brings as many votes as the best weighted role they hold. When the election is finished,
the winners are selected either as a fixed number of candidates with the most votes, or
as all the candidates above a cutoff, and they receive the reward roles of the guild.

The main entry point is [`ElectionManager`]. The platform is reached through two traits
that the application implements: [`MemberDirectory`] (roles, bots, role grants) and
[`ElectionStore`] (persistence, with [`MemoryStore`] provided).

```
# use std::sync::Arc;
# use std::collections::{BTreeMap, BTreeSet};
# use async_trait::async_trait;
use weighted_election::*;

# struct Everyone;
# #[async_trait]
# impl MemberDirectory for Everyone {
#     async fn lookup_roles(&self, _: GuildId, _: UserId) -> Result<RoleSet, DirectoryError> {
#         Ok(BTreeSet::from([RoleId(1)]))
#     }
#     async fn is_bot(&self, _: UserId) -> Result<bool, DirectoryError> { Ok(false) }
#     async fn grant_roles(&self, _: GuildId, _: UserId, _: &RoleSet) -> Result<(), DirectoryError> {
#         Ok(())
#     }
# }
# tokio_test_block_on(async {
let guild = GuildId(1);
let manager = ElectionManager::new(Arc::new(MemoryStore::new()), Arc::new(Everyone));
manager.set_role_weights(guild, BTreeMap::from([(RoleId(1), 2)])).await?;

let election = manager
    .start_election(guild, &[UserId(10), UserId(11)], &[BallotMarker::new("🍎"), BallotMarker::new("🍐")])
    .await?;
manager.attach_ballot_message(guild, election.election_id, MessageId(99)).await?;
manager
    .handle_reaction(&ReactionEvent {
        guild_id: guild,
        message_id: MessageId(99),
        user_id: UserId(12),
        marker: BallotMarker::new("🍐"),
        member_roles: None,
        direction: VoteDirection::Cast,
    })
    .await?;

let result = manager.finish_election(guild, election.election_id).await?;
assert_eq!(result.winners, vec![UserId(11)]);
# Ok::<(), ElectionError>(())
# }).unwrap();
# fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
#     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
# }
```
*/

mod config;
pub mod directory;
pub mod ledger;
pub mod manager;
pub mod manual;
pub mod store;
pub mod tally;
mod weights;
pub mod winners;

#[cfg(test)]
mod testing;

pub use crate::config::*;
pub use crate::directory::{DirectoryError, MemberDirectory};
pub use crate::ledger::{CandidateRecord, Election, ElectionStatus};
pub use crate::manager::ElectionManager;
pub use crate::store::{ElectionStore, MemoryStore, StoreError};
pub use crate::tally::TallyEngine;
pub use crate::weights::resolve_weight;
pub use crate::winners::{select_winners, standings};
