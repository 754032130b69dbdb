use crate::{event::*, plugin::*};
use anyhow::Result;

/// Drops events originated by bot accounts, our own reactions included, so
/// they never reach the poll engine.
pub struct IgnoreBots;

#[serenity::async_trait]
impl Plugin for IgnoreBots {
    fn name(&self) -> &'static str {
        "ignore_bots"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let from_bot = match event {
            Event::Message(msg) => msg.author.bot,
            Event::ReactionAdd(reaction) | Event::ReactionRemove(reaction) => {
                match reaction.user_id {
                    Some(user_id) => user_id.to_user(ctx.cache_http).await?.bot,
                    None => false,
                }
            }
            _ => false,
        };

        if from_bot {
            Ok(EventHandled::Yes)
        } else {
            Ok(EventHandled::No)
        }
    }
}
