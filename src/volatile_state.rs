use crate::poll::PollSession;

/// State which is lost across sessions
///
/// A restart mid-poll drops all accumulated votes.  That is accepted behavior
/// for this bot; nothing here is worth persisting.
pub struct VolatileState {
    pub poll: PollSession,
}

impl VolatileState {
    pub fn new() -> Self {
        Self {
            poll: PollSession::default(),
        }
    }
}
