//! Streaming role: members who are live get a role, and lose it when they
//! stop.

use serenity::model::gateway::{ActivityType, Presence};
use serenity::model::id::{GuildId, RoleId, UserId};
use serenity::prelude::*;
use tracing::{debug, info, warn};

use crate::common::error::DiscordError;
use crate::discord::commands::RoleChange;

const AUDIT_REASON: &str = "Streaming status changed";

/// What to do for a member, if anything.
pub fn role_change(streaming: bool, has_role: bool) -> Option<RoleChange> {
    match (streaming, has_role) {
        (true, false) => Some(RoleChange::Grant),
        (false, true) => Some(RoleChange::Revoke),
        _ => None,
    }
}

pub fn is_streaming<'a>(mut activities: impl Iterator<Item = &'a ActivityType>) -> bool {
    activities.any(|kind| *kind == ActivityType::Streaming)
}

#[derive(Debug, Clone)]
pub struct StreamingRole {
    name: String,
}

impl StreamingRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub async fn on_presence(&self, ctx: &Context, presence: &Presence) {
        let Some(guild_id) = presence.guild_id else {
            return;
        };
        let streaming = is_streaming(presence.activities.iter().map(|activity| &activity.kind));
        if let Err(e) = self.update(ctx, guild_id, presence.user.id, streaming).await {
            warn!(user = %presence.user.id, error = %e, "Failed to update streaming role");
        }
    }

    async fn update(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        user_id: UserId,
        streaming: bool,
    ) -> Result<(), DiscordError> {
        let (role_id, cached_roles) = {
            let Some(guild) = ctx.cache.guild(guild_id) else {
                debug!(guild = %guild_id, "Guild not cached, skipping presence update");
                return Ok(());
            };
            let Some(role) = guild.role_by_name(&self.name) else {
                debug!(guild = %guild_id, role = %self.name, "Streaming role not found");
                return Ok(());
            };
            (role.id, guild.members.get(&user_id).map(|member| member.roles.clone()))
        };

        let roles: Vec<RoleId> = match cached_roles {
            Some(roles) => roles,
            None => guild_id.member(ctx, user_id).await?.roles,
        };

        match role_change(streaming, roles.contains(&role_id)) {
            Some(RoleChange::Grant) => {
                ctx.http
                    .add_member_role(guild_id, user_id, role_id, Some(AUDIT_REASON))
                    .await?;
                info!(user = %user_id, role = %self.name, "Granted streaming role");
            }
            Some(RoleChange::Revoke) => {
                ctx.http
                    .remove_member_role(guild_id, user_id, role_id, Some(AUDIT_REASON))
                    .await?;
                info!(user = %user_id, role = %self.name, "Removed streaming role");
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_change() {
        assert_eq!(role_change(true, false), Some(RoleChange::Grant));
        assert_eq!(role_change(false, true), Some(RoleChange::Revoke));
        assert_eq!(role_change(true, true), None);
        assert_eq!(role_change(false, false), None);
    }

    #[test]
    fn test_is_streaming() {
        let kinds = [ActivityType::Playing, ActivityType::Streaming];
        assert!(is_streaming(kinds.iter()));
        let kinds = [ActivityType::Listening];
        assert!(!is_streaming(kinds.iter()));
        assert!(!is_streaming(std::iter::empty()));
    }
}
