//! Miscellaneous convenience methods

use crate::context::Context;
use serenity::all::{GuildId, Mentionable, Reaction, ReactionType, UserId};

#[serenity::async_trait]
pub trait UserIdHelper {
    async fn mention_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String;
}

#[serenity::async_trait]
impl UserIdHelper for UserId {
    /// Best-effort mention for a guild member.  Users we can't resolve (left
    /// the server, cache miss outside a guild) fall back to the raw mention
    /// form, which the client still renders when it can.
    async fn mention_in_guild(&self, ctx: &Context, guild_id: Option<GuildId>) -> String {
        if let Some(guild_id) = guild_id {
            if let Ok(member) = guild_id.member(ctx.cache_http, *self).await {
                return member.mention().to_string();
            }
        }

        format!("<@{}>", self)
    }
}

pub trait GuildHelper {
    fn role_mention(&self, role_name: &str) -> Option<String>;
}

impl GuildHelper for serenity::all::PartialGuild {
    /// Mention string for a role looked up by name, if the guild has one.
    fn role_mention(&self, role_name: &str) -> Option<String> {
        self.role_by_name(role_name)
            .map(|role| role.mention().to_string())
    }
}

pub trait ReactionHelper {
    fn symbol(&self) -> Option<&str>;
}

impl ReactionHelper for Reaction {
    /// The unicode glyph of a reaction.  Custom guild emoji have no place in
    /// the choice sets, so they resolve to `None`.
    fn symbol(&self) -> Option<&str> {
        match &self.emoji {
            ReactionType::Unicode(s) => Some(s),
            _ => None,
        }
    }
}
