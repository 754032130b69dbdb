//! Gateway side of the two-stage play-session poll.
//!
//! Routes the `ppl` / `endppl` commands and reaction add/remove events into
//! the vote engine in [`crate::poll`], and performs the outbound actions the
//! engine asks for (opening the game poll, auto-ending on unanimous "No",
//! announcing results).

use crate::poll::{
    render_results, PollSession, TimeVoteTrigger, GAME_CHOICES, NO_SYMBOL, QUORUM, TIME_CHOICES,
};
use crate::{event::*, helper::*, log_event, logging::*, plugin::*};
use anyhow::Result;
use serenity::all::{
    ChannelId, Colour, CreateEmbed, CreateEmbedFooter, CreateMessage, GuildId, Message, Reaction,
    ReactionType, UserId,
};
use std::collections::HashMap;

const START_CMD: &str = "ppl";
const END_CMD: &str = "endppl";

pub struct Poll;

#[serenity::async_trait]
impl Plugin for Poll {
    fn name(&self) -> &'static str {
        "poll"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{prefix}{START_CMD} - start the \"Play Phyit Lr?\" poll\n\
             {prefix}{END_CMD} - end the poll sequence and announce the results"
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        if let Some((msg, _)) = event.is_bot_cmd(ctx, START_CMD).await {
            start_time_poll(ctx, msg).await?;
            return Ok(EventHandled::Yes);
        }
        if let Some((msg, _)) = event.is_bot_cmd(ctx, END_CMD).await {
            end_poll(ctx, msg).await?;
            return Ok(EventHandled::Yes);
        }

        match event {
            Event::ReactionAdd(reaction) => reaction_added(ctx, reaction).await,
            Event::ReactionRemove(reaction) => reaction_removed(ctx, reaction).await,
            _ => Ok(EventHandled::No),
        }
    }
}

/// Start a fresh poll sequence in the invoking channel.  Always allowed; any
/// in-flight sequence is abandoned without warning, votes and all.
async fn start_time_poll(ctx: &Context<'_>, msg: &Message) -> Result<()> {
    ctx.vstate.write().await.poll = PollSession::start(msg.channel_id);

    let role_mention = match msg.guild_id {
        Some(guild_id) => {
            let role_name = ctx.cfg.read().await.poll.target_role_name.clone();
            guild_id
                .to_partial_guild(ctx.http)
                .await?
                .role_mention(&role_name)
        }
        None => None,
    };
    let role_mention = role_mention.unwrap_or_else(|| "**Hey everyone**".to_string());

    let choices = TIME_CHOICES
        .iter()
        .map(|(symbol, label)| format!("{}: {}", symbol, label))
        .collect::<Vec<_>>()
        .join("\n");
    let embed = CreateEmbed::new()
        .title("\u{1F4E2} Play Phyit Lr?")
        .description(format!("**Time choices:**\n{}", choices))
        .colour(Colour::BLUE)
        .footer(CreateEmbedFooter::new(format!(
            "React with your preferred time. We need at least {} unique voters to continue!",
            QUORUM
        )));
    let content = format!("{}! Play Phyit Lrr? Ma Play Phyit Buu Lrr? Vote now:", role_mention);

    let poll_msg = msg
        .channel_id
        .send_message(ctx.cache_http, CreateMessage::new().content(content).embed(embed))
        .await?;

    ctx.vstate.write().await.poll.set_time_poll_id(poll_msg.id);

    // Seed one reaction per choice, in declared order, so voters can react
    // by tapping.
    for symbol in TIME_CHOICES.symbols() {
        poll_msg
            .react(ctx.cache_http, ReactionType::Unicode(symbol.to_owned()))
            .await?;
    }

    log_event!("Time poll started with ID {}", poll_msg.id);
    Ok(())
}

/// Open the game poll.  No-op if one is already up for this sequence.
async fn open_game_poll(ctx: &Context<'_>, channel_id: ChannelId) -> Result<()> {
    if ctx.vstate.read().await.poll.game_poll_open() {
        return Ok(());
    }

    let choices = GAME_CHOICES
        .iter()
        .map(|(symbol, label)| format!("{}: {}", symbol, label))
        .collect::<Vec<_>>()
        .join("\n");
    let embed = CreateEmbed::new()
        .title("\u{1F3AE} Br Play Mr Lal?")
        .description(format!("**Br Play Mr Lal?:**\n{}", choices))
        .colour(Colour::DARK_GREEN)
        .footer(CreateEmbedFooter::new("React with the game you want to play!"));

    let poll_msg = channel_id
        .send_message(ctx.cache_http, CreateMessage::new().embed(embed))
        .await?;

    ctx.vstate.write().await.poll.open_game_poll(poll_msg.id);

    for symbol in GAME_CHOICES.symbols() {
        poll_msg
            .react(ctx.cache_http, ReactionType::Unicode(symbol.to_owned()))
            .await?;
    }

    log_event!("Game poll started with ID {}", poll_msg.id);
    Ok(())
}

enum Routed {
    Time(TimeVoteTrigger),
    Game,
    NotOurs,
}

async fn reaction_added(ctx: &Context<'_>, reaction: &Reaction) -> Result<EventHandled> {
    let Some(user_id) = reaction.user_id else {
        return Ok(EventHandled::No);
    };
    let Some(symbol) = reaction.symbol() else {
        return Ok(EventHandled::No);
    };

    // The vote engine runs under the state write lock; the requested
    // follow-up actions run after it is released.
    let routed = {
        let mut vstate = ctx.vstate.write().await;
        let poll = &mut vstate.poll;
        if poll.is_time_poll(reaction.message_id) {
            Routed::Time(poll.apply_time_vote(user_id, symbol))
        } else if poll.is_game_poll(reaction.message_id) {
            poll.apply_game_vote(symbol);
            Routed::Game
        } else {
            // Stale or foreign message
            Routed::NotOurs
        }
    };

    match routed {
        Routed::Time(trigger) => {
            if let Some(label) = TIME_CHOICES.label(symbol) {
                log_event!(
                    "Time vote: {} voted for {}",
                    user_id.color(ctx.http).await,
                    label,
                );
            }
            match trigger {
                TimeVoteTrigger::None => {}
                TimeVoteTrigger::OpenGamePoll => open_game_poll(ctx, reaction.channel_id).await?,
                TimeVoteTrigger::EndNoConsensus => {
                    reaction
                        .channel_id
                        .say(
                            ctx.cache_http,
                            format!(
                                "{} Two or more users have voted 'No'. \
                                 The poll is ending automatically.",
                                NO_SYMBOL
                            ),
                        )
                        .await?;
                    finalize(ctx, reaction.channel_id, reaction.guild_id, true).await?;
                }
            }
            Ok(EventHandled::Yes)
        }
        Routed::Game => {
            if let Some(label) = GAME_CHOICES.label(symbol) {
                log_event!(
                    "Game vote: {} voted for {}",
                    user_id.color(ctx.http).await,
                    label,
                );
            }
            Ok(EventHandled::Yes)
        }
        Routed::NotOurs => Ok(EventHandled::No),
    }
}

async fn reaction_removed(ctx: &Context<'_>, reaction: &Reaction) -> Result<EventHandled> {
    let Some(user_id) = reaction.user_id else {
        return Ok(EventHandled::No);
    };
    let Some(symbol) = reaction.symbol() else {
        return Ok(EventHandled::No);
    };

    let mut vstate = ctx.vstate.write().await;
    let poll = &mut vstate.poll;

    if poll.is_time_poll(reaction.message_id) {
        poll.retract_time_vote(user_id, symbol);
        Ok(EventHandled::Yes)
    } else if poll.is_game_poll(reaction.message_id) {
        poll.retract_game_vote(symbol);
        Ok(EventHandled::Yes)
    } else {
        Ok(EventHandled::No)
    }
}

/// Handle `endppl`: validate, then tally and announce.
async fn end_poll(ctx: &Context<'_>, msg: &Message) -> Result<()> {
    let (active, bound_channel) = {
        let vstate = ctx.vstate.read().await;
        (vstate.poll.is_active(), vstate.poll.bound_channel())
    };

    if !active {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        msg.channel_id
            .say(
                ctx.cache_http,
                format!(
                    "No active poll sequence to end. Start one with `{}{}`.",
                    prefix, START_CMD
                ),
            )
            .await?;
        return Ok(());
    }

    if bound_channel != Some(msg.channel_id) {
        msg.channel_id
            .say(
                ctx.cache_http,
                "Please run this command in the same channel where the poll was started.",
            )
            .await?;
        return Ok(());
    }

    finalize(ctx, msg.channel_id, msg.guild_id, false).await
}

/// Tally votes, announce results, and clear the session.  A failed send does
/// not restore any already-cleared state.
async fn finalize(
    ctx: &Context<'_>,
    channel_id: ChannelId,
    guild_id: Option<GuildId>,
    forced_no_end: bool,
) -> Result<()> {
    let report = {
        let vstate = ctx.vstate.read().await;
        let tally = vstate.poll.tally(forced_no_end);

        let mut mentions: HashMap<UserId, String> = HashMap::new();
        for &user_id in vstate.poll.time_voters() {
            let mention = user_id.mention_in_guild(ctx, guild_id).await;
            mentions.insert(user_id, mention);
        }

        render_results(&vstate.poll, &tally, &mentions)
    };

    channel_id.say(ctx.cache_http, report).await?;

    ctx.vstate.write().await.poll.finalize();

    log_event!("Poll sequence in {} finalized", channel_id.color(ctx.http).await);
    Ok(())
}
