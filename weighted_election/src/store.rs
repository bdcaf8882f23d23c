//! Persistence of the guild settings and of the elections in progress.
//!
//! The storage technology is left to the application. [`MemoryStore`] keeps everything
//! in the process and is what the command line tool and the tests use.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::debug;
use snafu::prelude::*;
use tokio::sync::RwLock;

use crate::config::{ElectionId, GuildId, GuildPolicy};
use crate::ledger::Election;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    #[snafu(display("storage backend unavailable: {message}"))]
    Unavailable { message: String },

    #[snafu(display("stored record {key} could not be decoded: {message}"))]
    Corrupted { key: String, message: String },
}

#[async_trait]
pub trait ElectionStore: Send + Sync {
    /// Hands out a fresh election identifier. Identifiers are never reused.
    async fn next_election_id(&self) -> Result<ElectionId, StoreError>;

    async fn load_policy(&self, guild_id: GuildId) -> Result<Option<GuildPolicy>, StoreError>;

    async fn save_policy(&self, guild_id: GuildId, policy: &GuildPolicy)
        -> Result<(), StoreError>;

    async fn load_election(&self, election_id: ElectionId)
        -> Result<Option<Election>, StoreError>;

    /// Inserts or replaces the election. The write is all or nothing.
    async fn save_election(&self, election: &Election) -> Result<(), StoreError>;

    async fn remove_election(&self, election_id: ElectionId)
        -> Result<Option<Election>, StoreError>;

    /// The elections of a guild, by increasing identifier.
    async fn elections_in_guild(&self, guild_id: GuildId) -> Result<Vec<Election>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    last_election_id: AtomicU64,
    policies: RwLock<HashMap<GuildId, GuildPolicy>>,
    elections: RwLock<BTreeMap<ElectionId, Election>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

#[async_trait]
impl ElectionStore for MemoryStore {
    async fn next_election_id(&self) -> Result<ElectionId, StoreError> {
        let id = self.last_election_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ElectionId(id))
    }

    async fn load_policy(&self, guild_id: GuildId) -> Result<Option<GuildPolicy>, StoreError> {
        Ok(self.policies.read().await.get(&guild_id).cloned())
    }

    async fn save_policy(
        &self,
        guild_id: GuildId,
        policy: &GuildPolicy,
    ) -> Result<(), StoreError> {
        debug!("MemoryStore: guild {}: policy {:?}", guild_id, policy);
        self.policies.write().await.insert(guild_id, policy.clone());
        Ok(())
    }

    async fn load_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Option<Election>, StoreError> {
        Ok(self.elections.read().await.get(&election_id).cloned())
    }

    async fn save_election(&self, election: &Election) -> Result<(), StoreError> {
        self.elections
            .write()
            .await
            .insert(election.election_id, election.clone());
        Ok(())
    }

    async fn remove_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Option<Election>, StoreError> {
        Ok(self.elections.write().await.remove(&election_id))
    }

    async fn elections_in_guild(&self, guild_id: GuildId) -> Result<Vec<Election>, StoreError> {
        Ok(self
            .elections
            .read()
            .await
            .values()
            .filter(|e| e.guild_id == guild_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BallotMarker, UserId};
    use chrono::Utc;

    #[tokio::test]
    async fn identifiers_increase() {
        let store = MemoryStore::new();
        assert_eq!(store.next_election_id().await.unwrap(), ElectionId(1));
        assert_eq!(store.next_election_id().await.unwrap(), ElectionId(2));
    }

    #[tokio::test]
    async fn elections_by_guild() {
        let store = MemoryStore::new();
        for (id, guild) in [(3, 1), (1, 1), (2, 2)] {
            let e = Election::new(
                ElectionId(id),
                GuildId(guild),
                Utc::now(),
                &[(UserId(9), BallotMarker::new("x"))],
            )
            .unwrap();
            store.save_election(&e).await.unwrap();
        }
        let ids: Vec<ElectionId> = store
            .elections_in_guild(GuildId(1))
            .await
            .unwrap()
            .iter()
            .map(|e| e.election_id)
            .collect();
        assert_eq!(ids, vec![ElectionId(1), ElectionId(3)]);

        assert!(store.remove_election(ElectionId(3)).await.unwrap().is_some());
        assert!(store.remove_election(ElectionId(3)).await.unwrap().is_none());
        assert!(store.load_election(ElectionId(3)).await.unwrap().is_none());
    }
}
