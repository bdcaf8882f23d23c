//! What the election engine needs to know about the members of a guild.

use async_trait::async_trait;
use snafu::prelude::*;

use crate::config::{GuildId, RoleSet, UserId};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DirectoryError {
    #[snafu(display("user {user_id} is not a member of guild {guild_id}"))]
    UnknownMember { guild_id: GuildId, user_id: UserId },

    #[snafu(display("user {user_id} is unknown"))]
    UnknownUser { user_id: UserId },

    #[snafu(display("member directory unavailable: {message}"))]
    DirectoryUnavailable { message: String },
}

/// Access to the platform: membership, bot accounts and role grants.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// The roles a member currently holds in the guild.
    async fn lookup_roles(&self, guild_id: GuildId, user_id: UserId)
        -> Result<RoleSet, DirectoryError>;

    /// Whether the account is automated. Bots can neither vote nor run.
    async fn is_bot(&self, user_id: UserId) -> Result<bool, DirectoryError>;

    async fn grant_roles(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        roles: &RoleSet,
    ) -> Result<(), DirectoryError>;
}
