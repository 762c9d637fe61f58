//! Built-in commands that act on Discord itself: vanity roles and the
//! edit-in-place animations.

use std::time::Duration;

use serenity::builder::EditMessage;
use serenity::model::guild::Role;
use serenity::model::id::{GuildId, RoleId, UserId};
use serenity::model::Permissions;
use serenity::prelude::*;
use tracing::{debug, info, warn};

use crate::common::error::DiscordError;
use crate::discord::outbox::post;
use crate::relay::commands::{BuiltinCommand, Invocation};

const AUDIT_REASON: &str = "Vanity role command";

/// Run a permitted built-in command.
pub async fn run(ctx: &Context, invocation: Invocation) -> Result<(), DiscordError> {
    match invocation.command {
        BuiltinCommand::ListRoles => list_roles(ctx, &invocation).await,
        BuiltinCommand::AddRole => change_role(ctx, &invocation, RoleChange::Grant).await,
        BuiltinCommand::RemoveRole => change_role(ctx, &invocation, RoleChange::Revoke).await,
        command => {
            let Some(animation) = animation(command) else {
                debug!(command = command.name(), "Not a Discord-side command");
                return Ok(());
            };
            let ctx = ctx.clone();
            let channel_id = invocation.channel_id;
            tokio::spawn(async move {
                if let Err(e) = play(&ctx, channel_id, animation).await {
                    warn!(error = %e, "Animation interrupted");
                }
            });
            Ok(())
        }
    }
}

/// What a role command does to the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Grant,
    Revoke,
}

/// The parts of a guild role that decide whether it is a vanity role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: u64,
    pub name: String,
    pub position: u16,
    pub permissions: Permissions,
}

impl From<&Role> for RoleInfo {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id.get(),
            name: role.name.clone(),
            position: role.position,
            permissions: role.permissions,
        }
    }
}

/// Roles anyone may assign themselves: below the bot's highest role, not
/// @everyone, and carrying exactly the @everyone permissions.
///
/// The @everyone role shares its ID with the guild.
pub fn vanity_roles(roles: &[RoleInfo], bot_roles: &[u64], everyone_id: u64) -> Vec<RoleInfo> {
    let Some(everyone) = roles.iter().find(|role| role.id == everyone_id) else {
        return Vec::new();
    };
    let Some(ceiling) = roles
        .iter()
        .filter(|role| bot_roles.contains(&role.id))
        .map(|role| role.position)
        .max()
    else {
        return Vec::new();
    };

    let mut found: Vec<RoleInfo> = roles
        .iter()
        .filter(|role| {
            role.id != everyone_id
                && role.position < ceiling
                && role.permissions == everyone.permissions
        })
        .cloned()
        .collect();
    found.sort_by(|a, b| b.position.cmp(&a.position).then_with(|| a.name.cmp(&b.name)));
    found
}

fn guild_of(invocation: &Invocation) -> Result<GuildId, DiscordError> {
    invocation
        .guild_id
        .map(GuildId::new)
        .ok_or(DiscordError::NotInGuild {
            channel_id: invocation.channel_id,
        })
}

async fn fetch_vanity_roles(ctx: &Context, guild_id: GuildId) -> Result<Vec<RoleInfo>, DiscordError> {
    let roles = guild_id.roles(&ctx.http).await?;
    let bot_id = ctx.cache.current_user().id;
    let bot = guild_id.member(ctx, bot_id).await?;

    let roles: Vec<RoleInfo> = roles.values().map(RoleInfo::from).collect();
    let bot_roles: Vec<u64> = bot.roles.iter().map(|id| id.get()).collect();
    Ok(vanity_roles(&roles, &bot_roles, guild_id.get()))
}

async fn list_roles(ctx: &Context, invocation: &Invocation) -> Result<(), DiscordError> {
    let roles = fetch_vanity_roles(ctx, guild_of(invocation)?).await?;
    let reply = if roles.is_empty() {
        "No available roles found.".to_string()
    } else {
        roles
            .iter()
            .map(|role| role.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    post(ctx, invocation.channel_id, &reply).await?;
    Ok(())
}

async fn change_role(ctx: &Context, invocation: &Invocation, change: RoleChange) -> Result<(), DiscordError> {
    let Some(role_name) = invocation.argument.as_deref() else {
        let usage = format!("Usage: !{} [<@user>] ROLE", invocation.command.name());
        post(ctx, invocation.channel_id, &usage).await?;
        return Ok(());
    };

    let guild_id = guild_of(invocation)?;
    let roles = fetch_vanity_roles(ctx, guild_id).await?;
    let Some(role) = roles.iter().find(|role| role.name == role_name) else {
        post(ctx, invocation.channel_id, &format!("Unknown role: {}", role_name)).await?;
        return Ok(());
    };

    let user_id = UserId::new(invocation.subject_id);
    let member = guild_id.member(ctx, user_id).await?;
    let role_id = RoleId::new(role.id);
    let has_role = member.roles.contains(&role_id);

    let reply = match change {
        RoleChange::Grant => {
            ctx.http
                .add_member_role(guild_id, user_id, role_id, Some(AUDIT_REASON))
                .await?;
            format!("Member {} has been given role {}", member.user.name, role_name)
        }
        RoleChange::Revoke if !has_role => {
            format!("Member {} does not have role {}", member.user.name, role_name)
        }
        RoleChange::Revoke => {
            ctx.http
                .remove_member_role(guild_id, user_id, role_id, Some(AUDIT_REASON))
                .await?;
            format!("Member {} has lost role {}", member.user.name, role_name)
        }
    };
    info!(
        requester = %invocation.user_name,
        member = %member.user.name,
        role = %role_name,
        ?change,
        "Vanity role command"
    );
    post(ctx, invocation.channel_id, &reply).await?;
    Ok(())
}

/// Frames of a short animation, shown by editing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {
    pub frames: Vec<String>,
    pub delay: Duration,
}

fn code_block(lines: &[&str]) -> String {
    format!("```{}```", lines.join("\n"))
}

/// Two passes over `figures`, the first skipping the opening figure,
/// ending back on it.
fn dance_frames(figures: &[&str]) -> Vec<String> {
    let mut frames = vec![figures[0].to_string()];
    for pass in 0..2 {
        let start = if pass == 0 { 1 } else { 0 };
        frames.extend(figures[start..].iter().map(|f| f.to_string()));
    }
    frames.push(figures[0].to_string());
    frames
}

pub fn animation(command: BuiltinCommand) -> Option<Animation> {
    let half_second = Duration::from_millis(500);
    let quarter_second = Duration::from_millis(250);

    match command {
        BuiltinCommand::Glasses => Some(Animation {
            frames: vec![
                "( •_•)".to_string(),
                "( •_•)>⌐■-■".to_string(),
                "(⌐■_■)".to_string(),
            ],
            delay: half_second,
        }),
        BuiltinCommand::Deal => {
            let blank = "            ";
            let glasses = "    ⌐■-■    ";
            let glasson = "   (⌐■_■)   ";
            let dealwith = "deal with it";
            let lines = [blank, blank, blank, "    (•_•)   "];

            let mut frames = vec![code_block(&lines)];
            for i in 0..3 {
                let mut frame = lines;
                frame[i] = glasses;
                frames.push(code_block(&frame));
            }
            frames.push(code_block(&[lines[0], dealwith, lines[2], glasson]));
            Some(Animation {
                frames,
                delay: half_second,
            })
        }
        BuiltinCommand::Dance => Some(Animation {
            frames: dance_frames(&[":D|-<", ":D/-<", ":D|-<", r":D\\-<"]),
            delay: quarter_second,
        }),
        BuiltinCommand::ZxcDance => Some(Animation {
            frames: dance_frames(&["└[^_^]┐", "┌[^_^]┘"]),
            delay: quarter_second,
        }),
        _ => None,
    }
}

async fn play(ctx: &Context, channel_id: u64, animation: Animation) -> Result<(), DiscordError> {
    let mut frames = animation.frames.into_iter();
    let Some(first) = frames.next() else {
        return Ok(());
    };

    let mut message = post(ctx, channel_id, &first).await?;
    for frame in frames {
        tokio::time::sleep(animation.delay).await;
        message.edit(ctx, EditMessage::new().content(frame)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: u64 = 1000;

    fn role(id: u64, name: &str, position: u16, permissions: Permissions) -> RoleInfo {
        RoleInfo {
            id,
            name: name.to_string(),
            position,
            permissions,
        }
    }

    fn guild_roles() -> Vec<RoleInfo> {
        let default = Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY;
        vec![
            role(GUILD, "@everyone", 0, default),
            role(1, "Tourney", 1, default),
            role(2, "Streamer", 2, default),
            role(3, "Moderator", 3, default | Permissions::MANAGE_MESSAGES),
            role(4, "Bot", 4, default | Permissions::MANAGE_ROLES),
            role(5, "Admin", 5, default),
        ]
    }

    #[test]
    fn test_vanity_roles_below_bot_with_default_permissions() {
        let roles = vanity_roles(&guild_roles(), &[4], GUILD);
        let names: Vec<_> = roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Streamer", "Tourney"]);
    }

    #[test]
    fn test_vanity_roles_use_highest_bot_role() {
        let roles = vanity_roles(&guild_roles(), &[1, 4], GUILD);
        assert_eq!(roles.len(), 2);
    }

    #[test]
    fn test_vanity_roles_without_bot_role() {
        assert!(vanity_roles(&guild_roles(), &[], GUILD).is_empty());
    }

    #[test]
    fn test_glasses_frames() {
        let animation = animation(BuiltinCommand::Glasses).unwrap();
        assert_eq!(animation.frames.len(), 3);
        assert_eq!(animation.frames[2], "(⌐■_■)");
        assert_eq!(animation.delay, Duration::from_millis(500));
    }

    #[test]
    fn test_deal_frames() {
        let animation = animation(BuiltinCommand::Deal).unwrap();
        assert_eq!(animation.frames.len(), 5);
        assert!(animation.frames.iter().all(|f| f.starts_with("```") && f.ends_with("```")));
        assert_eq!(
            animation.frames[1],
            "```    ⌐■-■    \n            \n            \n    (•_•)   ```"
        );
        assert_eq!(
            animation.frames[4],
            "```            \ndeal with it\n            \n   (⌐■_■)   ```"
        );
    }

    #[test]
    fn test_dance_frames() {
        let animation = animation(BuiltinCommand::ZxcDance).unwrap();
        assert_eq!(
            animation.frames,
            vec!["└[^_^]┐", "┌[^_^]┘", "└[^_^]┐", "┌[^_^]┘", "└[^_^]┐"]
        );
        assert_eq!(animation.delay, Duration::from_millis(250));

        let dance = super::animation(BuiltinCommand::Dance).unwrap();
        assert_eq!(dance.frames.len(), 9);
        assert_eq!(dance.frames.first(), dance.frames.last());
    }

    #[test]
    fn test_role_commands_have_no_animation() {
        assert!(animation(BuiltinCommand::AddRole).is_none());
        assert!(animation(BuiltinCommand::Status).is_none());
    }
}
