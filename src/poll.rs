//! Two-stage play-session poll: first "when can we play", then "which game".
//!
//! Everything here is pure state manipulation.  The gateway side
//! (`plugin/poll.rs`) routes reaction events into these methods and performs
//! whatever outbound action a returned [`TimeVoteTrigger`] asks for, so the
//! whole vote engine is testable without a Discord connection.

use serenity::all::{ChannelId, MessageId, UserId};
use std::collections::{BTreeSet, HashMap};

/// Minimum distinct time-poll voters before the sequence advances.
pub const QUORUM: usize = 2;

/// The negative time choice.  Unanimous `NO_SYMBOL` votes end the sequence
/// without a game stage.
pub const NO_SYMBOL: &str = "\u{274C}";

/// Reported as the game winner when the game poll never opened or collected
/// no votes.
pub const UNDECIDED: &str = "Undecided (No votes recorded)";

/// Fixed ordered mapping from reaction symbol to human-readable option label.
pub struct ChoiceSet {
    entries: &'static [(&'static str, &'static str)],
}

pub static TIME_CHOICES: ChoiceSet = ChoiceSet {
    entries: &[
        ("8\u{FE0F}\u{20E3}", "8pm JST"),
        ("9\u{FE0F}\u{20E3}", "9pm JST"),
        ("0\u{FE0F}\u{20E3}", "9pm JST and later"),
        (NO_SYMBOL, "No"),
    ],
};

pub static GAME_CHOICES: ChoiceSet = ChoiceSet {
    entries: &[
        ("\u{1F431}", "PalWorld"),
        ("6\u{FE0F}\u{20E3}", "RainBow Six: Siege"),
        ("\u{1F480}", "Project Zomboid"),
    ],
};

impl ChoiceSet {
    /// Iterate `(symbol, label)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries.iter().copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(symbol, _)| *symbol)
    }

    /// Label for a symbol, or `None` for a symbol outside this set.
    pub fn label(&self, symbol: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, label)| *label)
    }

    /// Map an event-supplied symbol back to its `'static` key, or `None` for
    /// a symbol outside this set.
    fn canonical(&self, symbol: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(s, _)| *s)
    }
}

/// Requested follow-up after a time vote lands.
///
/// Evaluated only while the game poll has not opened, so at most one
/// non-`None` trigger fires per poll sequence.
#[derive(Debug, PartialEq, Eq)]
pub enum TimeVoteTrigger {
    None,
    /// Quorum reached with at least one non-"No" vote.
    OpenGamePoll,
    /// Quorum reached and every distinct voter is currently on "No".
    EndNoConsensus,
}

/// The one poll sequence this process tracks.
///
/// Replaced wholesale by each new start command, never partially merged.
/// Voter sets are `BTreeSet` so the final report is deterministic.
#[derive(Default)]
pub struct PollSession {
    time_poll_id: Option<MessageId>,
    game_poll_id: Option<MessageId>,
    time_votes: HashMap<&'static str, BTreeSet<UserId>>,
    game_votes: HashMap<&'static str, u32>,
    time_voters: BTreeSet<UserId>,
    channel_id: Option<ChannelId>,
}

impl PollSession {
    /// Fresh session bound to the invoking channel.  Any prior sequence is
    /// abandoned, votes and all.
    pub fn start(channel_id: ChannelId) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Self::default()
        }
    }

    pub fn set_time_poll_id(&mut self, id: MessageId) {
        self.time_poll_id = Some(id);
    }

    /// Whether a poll sequence is currently running.
    pub fn is_active(&self) -> bool {
        self.time_poll_id.is_some()
    }

    pub fn is_time_poll(&self, id: MessageId) -> bool {
        self.time_poll_id == Some(id)
    }

    pub fn is_game_poll(&self, id: MessageId) -> bool {
        self.game_poll_id == Some(id)
    }

    pub fn game_poll_open(&self) -> bool {
        self.game_poll_id.is_some()
    }

    pub fn bound_channel(&self) -> Option<ChannelId> {
        self.channel_id
    }

    pub fn time_voters(&self) -> &BTreeSet<UserId> {
        &self.time_voters
    }

    /// Record the game-poll message and zero every game counter.  No-op if
    /// the game poll already opened.
    pub fn open_game_poll(&mut self, id: MessageId) {
        if self.game_poll_id.is_some() {
            return;
        }
        self.game_poll_id = Some(id);
        for symbol in GAME_CHOICES.symbols() {
            self.game_votes.insert(symbol, 0);
        }
    }

    /// Apply a time vote.  A new vote supersedes any previous choice by the
    /// same user; one choice per user at a time.
    pub fn apply_time_vote(&mut self, user: UserId, symbol: &str) -> TimeVoteTrigger {
        let Some(symbol) = TIME_CHOICES.canonical(symbol) else {
            return TimeVoteTrigger::None;
        };

        for voters in self.time_votes.values_mut() {
            voters.remove(&user);
        }
        self.time_votes.entry(symbol).or_default().insert(user);
        self.time_voters.insert(user);

        // Stage triggers are evaluated only until the game poll opens.
        if self.game_poll_id.is_some() || self.time_voters.len() < QUORUM {
            return TimeVoteTrigger::None;
        }

        let all_no = self
            .time_votes
            .get(NO_SYMBOL)
            .is_some_and(|no_voters| *no_voters == self.time_voters);
        if all_no {
            TimeVoteTrigger::EndNoConsensus
        } else {
            TimeVoteTrigger::OpenGamePoll
        }
    }

    /// Retract a time vote.  Quorum/consensus triggers are never re-evaluated
    /// on retraction; only additions advance the sequence.
    pub fn retract_time_vote(&mut self, user: UserId, symbol: &str) {
        let Some(symbol) = TIME_CHOICES.canonical(symbol) else {
            return;
        };
        let Some(voters) = self.time_votes.get_mut(symbol) else {
            return;
        };
        if !voters.remove(&user) {
            return;
        }

        let still_voted = self.time_votes.values().any(|v| v.contains(&user));
        if !still_voted {
            self.time_voters.remove(&user);
        }
    }

    /// Game votes are raw counters with no per-user bookkeeping; the same
    /// user reacting repeatedly accumulates.
    pub fn apply_game_vote(&mut self, symbol: &str) {
        let Some(symbol) = GAME_CHOICES.canonical(symbol) else {
            return;
        };
        *self.game_votes.entry(symbol).or_insert(0) += 1;
    }

    /// Floor-clamped at zero, guarding against replayed or out-of-order
    /// reaction-remove events.
    pub fn retract_game_vote(&mut self, symbol: &str) {
        let Some(symbol) = GAME_CHOICES.canonical(symbol) else {
            return;
        };
        if let Some(count) = self.game_votes.get_mut(symbol) {
            *count = count.saturating_sub(1);
        }
    }

    /// Close out the sequence.  Poll ids and the voter roster are cleared;
    /// the vote maps stay populated but inert until the next start overwrites
    /// them wholesale.
    pub fn finalize(&mut self) {
        self.time_poll_id = None;
        self.game_poll_id = None;
        self.time_voters.clear();
    }

    /// Derive the result tally.  `forced_no_end` marks the unanimous-"No"
    /// path, which has no game section at all.
    pub fn tally(&self, forced_no_end: bool) -> Tally {
        let time = TIME_CHOICES
            .iter()
            .map(|(symbol, label)| {
                let voters = self
                    .time_votes
                    .get(symbol)
                    .map(|v| v.iter().copied().collect())
                    .unwrap_or_default();
                (label, voters)
            })
            .collect();

        let game_winner = if forced_no_end {
            None
        } else {
            Some(self.game_winner())
        };

        Tally { time, game_winner }
    }

    fn game_winner(&self) -> String {
        let mut winner = UNDECIDED.to_string();

        if self.game_poll_id.is_none() {
            return winner;
        }
        let total: u32 = self.game_votes.values().sum();
        if total == 0 {
            return winner;
        }

        // Scan in declared order.  A strictly greater count takes the lead; a
        // count matching the running maximum tags the current leader with
        // " (Tie)".  Under a three-way tie the tags stack; that is the
        // documented behavior, kept as-is.
        let mut max: i64 = -1;
        for (symbol, label) in GAME_CHOICES.iter() {
            let count = i64::from(*self.game_votes.get(symbol).unwrap_or(&0));
            if count > max {
                max = count;
                winner = label.to_string();
            } else if count == max && max > 0 {
                winner = format!("{} (Tie)", winner);
            }
        }
        winner
    }
}

/// Derived results, computed at finalization and never stored.
pub struct Tally {
    /// One `(label, voters)` entry per time choice, in declared order.
    pub time: Vec<(&'static str, Vec<UserId>)>,
    /// Winning game label; `None` when the sequence ended on unanimous "No"
    /// and the game stage never ran.
    pub game_winner: Option<String>,
}

/// Render the final announcement.  Pure: mention strings are resolved by the
/// caller, with the raw `<@id>` form as fallback for anyone missing from the
/// map.
pub fn render_results(
    session: &PollSession,
    tally: &Tally,
    mentions: &HashMap<UserId, String>,
) -> String {
    let mention_of = |user: &UserId| {
        mentions
            .get(user)
            .cloned()
            .unwrap_or_else(|| format!("<@{}>", user))
    };

    let roster = session
        .time_voters
        .iter()
        .map(|user| mention_of(user))
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::new();
    out.push_str(&roster);
    out.push_str("\n---\n** POLL RESULTS! **\n---\n**Play Phyit Lrr?**\n");
    if session.time_voters.is_empty() {
        out.push_str(" (No one voted for time!)\n");
    }

    for (label, voters) in &tally.time {
        let voters_str = if voters.is_empty() {
            "No votes".to_string()
        } else {
            voters.iter().map(|u| mention_of(u)).collect::<Vec<_>>().join(", ")
        };
        out.push_str(&format!("**{}**: {}\n", label, voters_str));
    }

    if let Some(winner) = &tally.game_winner {
        out.push_str(&format!("\n---\n**Game - {}**\n", winner));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: u64) -> UserId {
        UserId::new(n)
    }

    fn session() -> PollSession {
        let mut s = PollSession::start(ChannelId::new(100));
        s.set_time_poll_id(MessageId::new(200));
        s
    }

    const EIGHT: &str = "8\u{FE0F}\u{20E3}";
    const NINE: &str = "9\u{FE0F}\u{20E3}";
    const CAT: &str = "\u{1F431}";
    const SIX: &str = "6\u{FE0F}\u{20E3}";
    const SKULL: &str = "\u{1F480}";

    #[test]
    fn choice_symbols_are_unique() {
        for set in [&TIME_CHOICES, &GAME_CHOICES] {
            let symbols: Vec<_> = set.symbols().collect();
            let deduped: BTreeSet<_> = symbols.iter().collect();
            assert_eq!(symbols.len(), deduped.len());
        }
    }

    #[test]
    fn revoting_keeps_user_in_exactly_one_voter_set() {
        let mut s = session();
        s.apply_time_vote(uid(1), EIGHT);
        s.apply_time_vote(uid(1), NINE);
        s.apply_time_vote(uid(1), NO_SYMBOL);

        let tally = s.tally(false);
        let sets_with_user: usize = tally
            .time
            .iter()
            .filter(|(_, voters)| voters.contains(&uid(1)))
            .count();
        assert_eq!(sets_with_user, 1);
        assert!(s.time_voters().contains(&uid(1)));
    }

    #[test]
    fn retract_then_reapply_is_idempotent_on_roster() {
        let mut s = session();
        s.apply_time_vote(uid(1), EIGHT);
        s.retract_time_vote(uid(1), EIGHT);
        assert!(!s.time_voters().contains(&uid(1)));

        s.apply_time_vote(uid(1), EIGHT);
        assert_eq!(s.time_voters().len(), 1);
        assert!(s.time_voters().contains(&uid(1)));
    }

    #[test]
    fn retracting_one_of_a_users_votes_is_scoped_to_that_symbol() {
        let mut s = session();
        s.apply_time_vote(uid(1), EIGHT);
        // Removing a reaction the user never (still) holds changes nothing.
        s.retract_time_vote(uid(1), NINE);
        assert!(s.time_voters().contains(&uid(1)));
    }

    #[test]
    fn quorum_with_mixed_votes_opens_game_poll() {
        let mut s = session();
        assert_eq!(s.apply_time_vote(uid(1), NINE), TimeVoteTrigger::None);
        assert_eq!(
            s.apply_time_vote(uid(2), NO_SYMBOL),
            TimeVoteTrigger::OpenGamePoll
        );
    }

    #[test]
    fn unanimous_no_ends_without_game_stage() {
        let mut s = session();
        assert_eq!(s.apply_time_vote(uid(1), NO_SYMBOL), TimeVoteTrigger::None);
        assert_eq!(
            s.apply_time_vote(uid(2), NO_SYMBOL),
            TimeVoteTrigger::EndNoConsensus
        );

        let tally = s.tally(true);
        assert!(tally.game_winner.is_none());
        let report = render_results(&s, &tally, &HashMap::new());
        assert!(!report.contains("**Game"));
    }

    #[test]
    fn trigger_fires_at_most_once_per_sequence() {
        let mut s = session();
        s.apply_time_vote(uid(1), NINE);
        assert_eq!(s.apply_time_vote(uid(2), EIGHT), TimeVoteTrigger::OpenGamePoll);
        s.open_game_poll(MessageId::new(300));

        // Later time votes, including a swing to unanimous "No", stay inert.
        assert_eq!(s.apply_time_vote(uid(3), NO_SYMBOL), TimeVoteTrigger::None);
        assert_eq!(s.apply_time_vote(uid(1), NO_SYMBOL), TimeVoteTrigger::None);
        assert_eq!(s.apply_time_vote(uid(2), NO_SYMBOL), TimeVoteTrigger::None);
    }

    #[test]
    fn open_game_poll_is_idempotent() {
        let mut s = session();
        s.open_game_poll(MessageId::new(300));
        s.apply_game_vote(CAT);
        s.open_game_poll(MessageId::new(301));

        assert!(s.is_game_poll(MessageId::new(300)));
        assert!(!s.is_game_poll(MessageId::new(301)));
        // Counters survive the no-op second open.
        assert_eq!(s.tally(false).game_winner.as_deref(), Some("PalWorld"));
    }

    #[test]
    fn game_votes_accumulate_per_reaction() {
        // No per-user cap: the same user reacting twice counts twice.
        let mut s = session();
        s.open_game_poll(MessageId::new(300));
        s.apply_game_vote(SKULL);
        s.apply_game_vote(SKULL);
        s.apply_game_vote(CAT);

        assert_eq!(s.tally(false).game_winner.as_deref(), Some("Project Zomboid"));
    }

    #[test]
    fn game_vote_decrement_clamps_at_zero() {
        let mut s = session();
        s.open_game_poll(MessageId::new(300));
        s.retract_game_vote(CAT);
        s.retract_game_vote(CAT);
        s.apply_game_vote(CAT);

        assert_eq!(s.tally(false).game_winner.as_deref(), Some("PalWorld"));
    }

    #[test]
    fn two_way_tie_annotates_first_leader() {
        let mut s = session();
        s.open_game_poll(MessageId::new(300));
        for _ in 0..3 {
            s.apply_game_vote(CAT);
            s.apply_game_vote(SIX);
        }
        s.apply_game_vote(SKULL);

        assert_eq!(s.tally(false).game_winner.as_deref(), Some("PalWorld (Tie)"));
    }

    #[test]
    fn three_way_tie_stacks_annotations() {
        // Documented quirk: each additional tie appends another " (Tie)".
        let mut s = session();
        s.open_game_poll(MessageId::new(300));
        for symbol in [CAT, SIX, SKULL] {
            s.apply_game_vote(symbol);
            s.apply_game_vote(symbol);
        }

        assert_eq!(
            s.tally(false).game_winner.as_deref(),
            Some("PalWorld (Tie) (Tie)")
        );
    }

    #[test]
    fn zero_game_votes_reports_undecided() {
        let mut s = session();
        s.open_game_poll(MessageId::new(300));
        assert_eq!(s.tally(false).game_winner.as_deref(), Some(UNDECIDED));
    }

    #[test]
    fn game_poll_never_opened_reports_undecided() {
        let s = session();
        assert_eq!(s.tally(false).game_winner.as_deref(), Some(UNDECIDED));
    }

    #[test]
    fn unknown_symbols_are_ignored() {
        let mut s = session();
        assert_eq!(s.apply_time_vote(uid(1), "\u{1F44D}"), TimeVoteTrigger::None);
        assert!(s.time_voters().is_empty());

        s.open_game_poll(MessageId::new(300));
        s.apply_game_vote("\u{1F44D}");
        assert_eq!(s.tally(false).game_winner.as_deref(), Some(UNDECIDED));
    }

    #[test]
    fn default_session_is_inactive() {
        let s = PollSession::default();
        assert!(!s.is_active());
        assert!(s.bound_channel().is_none());
    }

    #[test]
    fn finalize_clears_ids_and_roster_but_session_restarts_fresh() {
        let mut s = session();
        s.apply_time_vote(uid(1), NINE);
        s.apply_time_vote(uid(2), EIGHT);
        s.open_game_poll(MessageId::new(300));
        s.apply_game_vote(CAT);

        s.finalize();
        assert!(!s.is_active());
        assert!(!s.game_poll_open());
        assert!(s.time_voters().is_empty());

        // A new start supersedes the stale vote maps wholesale.
        let s = PollSession::start(ChannelId::new(101));
        assert!(s.tally(false).time.iter().all(|(_, v)| v.is_empty()));
    }

    #[test]
    fn report_lists_choices_in_declared_order_with_mentions() {
        let mut s = session();
        s.apply_time_vote(uid(2), NINE);
        s.apply_time_vote(uid(1), NINE);
        let tally = s.tally(false);

        let mut mentions = HashMap::new();
        mentions.insert(uid(1), "<@1>".to_string());

        let report = render_results(&s, &tally, &mentions);
        let nine_line = report
            .lines()
            .find(|l| l.starts_with("**9pm JST**"))
            .unwrap();
        // BTreeSet order, resolver miss falls back to the raw mention form.
        assert_eq!(nine_line, "**9pm JST**: <@1>, <@2>");
        assert!(report.contains("**8pm JST**: No votes"));
        assert!(report.contains("**Game - Undecided (No votes recorded)**"));

        let eight_pos = report.find("**8pm JST**").unwrap();
        let nine_pos = report.find("**9pm JST**").unwrap();
        let later_pos = report.find("**9pm JST and later**").unwrap();
        assert!(eight_pos < nine_pos && nine_pos < later_pos);
    }

    #[test]
    fn report_with_no_voters_carries_explicit_marker() {
        let s = session();
        let tally = s.tally(false);
        let report = render_results(&s, &tally, &HashMap::new());
        assert!(report.contains("(No one voted for time!)"));
    }
}
