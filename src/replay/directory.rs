use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use weighted_election::*;

use crate::replay::scenario::{role_set, ScenarioMember};

/// The members of the scenario file. Granted roles are only recorded.
#[derive(Debug, Default)]
pub struct ScenarioDirectory {
    roles: HashMap<(GuildId, UserId), RoleSet>,
    bots: HashSet<UserId>,
    grants: Mutex<Vec<(GuildId, UserId, RoleSet)>>,
}

impl ScenarioDirectory {
    pub fn from_members(members: &[ScenarioMember]) -> ScenarioDirectory {
        let mut directory = ScenarioDirectory::default();
        for m in members.iter() {
            directory.roles.insert(
                (GuildId(m.guild_id), UserId(m.user_id)),
                role_set(&m.roles),
            );
            if m.bot {
                directory.bots.insert(UserId(m.user_id));
            }
        }
        directory
    }

    pub fn granted(&self) -> Vec<(GuildId, UserId, RoleSet)> {
        match self.grants.lock() {
            Ok(grants) => grants.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MemberDirectory for ScenarioDirectory {
    async fn lookup_roles(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<RoleSet, DirectoryError> {
        self.roles
            .get(&(guild_id, user_id))
            .cloned()
            .ok_or(DirectoryError::UnknownMember { guild_id, user_id })
    }

    async fn is_bot(&self, user_id: UserId) -> Result<bool, DirectoryError> {
        Ok(self.bots.contains(&user_id))
    }

    async fn grant_roles(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        roles: &RoleSet,
    ) -> Result<(), DirectoryError> {
        let mut grants = self
            .grants
            .lock()
            .map_err(|_| DirectoryError::DirectoryUnavailable {
                message: "grant log poisoned".to_string(),
            })?;
        grants.push((guild_id, user_id, roles.clone()));
        Ok(())
    }
}
