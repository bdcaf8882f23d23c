// Collaborators for the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::*;
use crate::directory::*;
use crate::ledger::Election;
use crate::store::*;

#[derive(Default)]
pub struct TestDirectory {
    roles: Mutex<HashMap<(GuildId, UserId), RoleSet>>,
    bots: Mutex<HashSet<UserId>>,
    grants: Mutex<Vec<(GuildId, UserId, RoleSet)>>,
    failing_grants: AtomicBool,
}

impl TestDirectory {
    pub fn new() -> TestDirectory {
        TestDirectory::default()
    }

    pub fn set_roles(&self, guild_id: GuildId, user_id: UserId, roles: &[RoleId]) {
        self.roles
            .lock()
            .unwrap()
            .insert((guild_id, user_id), roles.iter().cloned().collect());
    }

    pub fn add_bot(&self, user_id: UserId) {
        self.bots.lock().unwrap().insert(user_id);
    }

    pub fn fail_grants(&self, failing: bool) {
        self.failing_grants.store(failing, Ordering::SeqCst);
    }

    pub fn granted(&self) -> Vec<(GuildId, UserId, RoleSet)> {
        self.grants.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemberDirectory for TestDirectory {
    async fn lookup_roles(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<RoleSet, DirectoryError> {
        self.roles
            .lock()
            .unwrap()
            .get(&(guild_id, user_id))
            .cloned()
            .ok_or(DirectoryError::UnknownMember { guild_id, user_id })
    }

    async fn is_bot(&self, user_id: UserId) -> Result<bool, DirectoryError> {
        Ok(self.bots.lock().unwrap().contains(&user_id))
    }

    async fn grant_roles(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        roles: &RoleSet,
    ) -> Result<(), DirectoryError> {
        if self.failing_grants.load(Ordering::SeqCst) {
            return Err(DirectoryError::DirectoryUnavailable {
                message: "missing permissions".to_string(),
            });
        }
        self.grants
            .lock()
            .unwrap()
            .push((guild_id, user_id, roles.clone()));
        Ok(())
    }
}

/// A memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> FlakyStore {
        FlakyStore::default()
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable {
                message: "disk on fire".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ElectionStore for FlakyStore {
    async fn next_election_id(&self) -> Result<ElectionId, StoreError> {
        self.inner.next_election_id().await
    }

    async fn load_policy(&self, guild_id: GuildId) -> Result<Option<GuildPolicy>, StoreError> {
        self.inner.load_policy(guild_id).await
    }

    async fn save_policy(
        &self,
        guild_id: GuildId,
        policy: &GuildPolicy,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save_policy(guild_id, policy).await
    }

    async fn load_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Option<Election>, StoreError> {
        self.inner.load_election(election_id).await
    }

    async fn save_election(&self, election: &Election) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save_election(election).await
    }

    async fn remove_election(
        &self,
        election_id: ElectionId,
    ) -> Result<Option<Election>, StoreError> {
        self.check()?;
        self.inner.remove_election(election_id).await
    }

    async fn elections_in_guild(&self, guild_id: GuildId) -> Result<Vec<Election>, StoreError> {
        self.inner.elections_in_guild(guild_id).await
    }
}
