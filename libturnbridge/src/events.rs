use crate::domain::participant::Participant;
use crate::domain::turn_match::TurnMatch;
use std::sync::Arc;

/// Notice kinds delivered by the matchmaking service, identified by their
/// raw vendor code.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum MatchNoticeKind {
    TurnReceived = 1,
    WantsToQuit = 2,
    MatchEnded = 3,
    InviteReceived = 4,
    ChallengeReceived = 5,
    ChallengeCompleted = 6,
    ExchangeRequest = 7,
    ExchangeCancel = 8,
    ExchangeReply = 9,
}

pub type MatchHandler = Box<dyn Fn(&TurnMatch)>;
pub type ParticipantHandler = Box<dyn Fn(&Participant)>;
pub type PlainHandler = Box<dyn Fn()>;
pub type MatchEventHandler = Box<dyn Fn(MatchNoticeKind, &TurnMatch)>;
/// Shared and sendable so the router can clone it onto the application's
/// primary execution context.
pub type ViewChangeHandler = Arc<dyn Fn() + Send + Sync>;

/// The registered callback slots, one per lifecycle event kind.
///
/// Every slot holds at most one handler and registering again replaces the
/// previous one. Unregistered slots are no-ops; the router never treats a
/// missing handler as an error.
#[derive(Default)]
pub struct EventHandlers {
    pub(crate) turn_ended: Option<MatchHandler>,
    pub(crate) quit_in_turn: Option<MatchHandler>,
    pub(crate) quit_out_of_turn: Option<MatchHandler>,
    pub(crate) won: Option<ParticipantHandler>,
    pub(crate) lost: Option<ParticipantHandler>,
    pub(crate) match_ended: Option<MatchHandler>,
    pub(crate) only_one_remaining: Option<MatchHandler>,
    pub(crate) new_game_requested: Option<PlainHandler>,
    pub(crate) game_started: Option<MatchHandler>,
    pub(crate) view_change_requested: Option<ViewChangeHandler>,
    pub(crate) match_event: Option<MatchEventHandler>,
    pub(crate) invite_received: Option<MatchHandler>,
    pub(crate) challenge_received: Option<MatchHandler>,
    pub(crate) challenge_completed: Option<MatchHandler>,
    pub(crate) exchange_request: Option<MatchHandler>,
    pub(crate) exchange_cancel: Option<MatchHandler>,
    pub(crate) exchange_reply: Option<MatchHandler>,
}

impl EventHandlers {
    pub fn new() -> EventHandlers {
        EventHandlers::default()
    }

    pub fn on_turn_ended(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.turn_ended = Some(Box::new(handler));
    }

    pub fn on_quit_in_turn(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.quit_in_turn = Some(Box::new(handler));
    }

    pub fn on_quit_out_of_turn(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.quit_out_of_turn = Some(Box::new(handler));
    }

    pub fn on_won(&mut self, handler: impl Fn(&Participant) + 'static) {
        self.won = Some(Box::new(handler));
    }

    /// Fires once per participant that is marked as having lost.
    pub fn on_lost(&mut self, handler: impl Fn(&Participant) + 'static) {
        self.lost = Some(Box::new(handler));
    }

    pub fn on_match_ended(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.match_ended = Some(Box::new(handler));
    }

    /// Fires when at most one contender is left before the match is ended.
    pub fn on_only_one_remaining(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.only_one_remaining = Some(Box::new(handler));
    }

    pub fn on_new_game_requested(&mut self, handler: impl Fn() + 'static) {
        self.new_game_requested = Some(Box::new(handler));
    }

    pub fn on_game_started(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.game_started = Some(Box::new(handler));
    }

    /// The only handler that is marshaled onto the application's primary
    /// execution context instead of running on the delivering one.
    pub fn on_view_change_requested(&mut self, handler: impl Fn() + Send + Sync + 'static) {
        self.view_change_requested = Some(Arc::new(handler));
    }

    /// Catch-all handler observing every dispatched notice.
    pub fn on_match_event(&mut self, handler: impl Fn(MatchNoticeKind, &TurnMatch) + 'static) {
        self.match_event = Some(Box::new(handler));
    }

    pub fn on_invite_received(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.invite_received = Some(Box::new(handler));
    }

    pub fn on_challenge_received(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.challenge_received = Some(Box::new(handler));
    }

    pub fn on_challenge_completed(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.challenge_completed = Some(Box::new(handler));
    }

    pub fn on_exchange_request(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.exchange_request = Some(Box::new(handler));
    }

    pub fn on_exchange_cancel(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.exchange_cancel = Some(Box::new(handler));
    }

    pub fn on_exchange_reply(&mut self, handler: impl Fn(&TurnMatch) + 'static) {
        self.exchange_reply = Some(Box::new(handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::turn_match::MatchStatus;
    use num_traits::FromPrimitive;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn ensure_notice_codes_decode() {
        assert_eq!(
            MatchNoticeKind::from_u8(4),
            Some(MatchNoticeKind::InviteReceived)
        );
        assert_eq!(MatchNoticeKind::from_u8(0), None);
        assert_eq!(MatchNoticeKind::from_u8(99), None);
    }

    #[test]
    fn ensure_last_registration_wins() {
        let mut handlers = EventHandlers::new();
        let fired_first = Rc::new(Cell::new(false));
        let fired_second = Rc::new(Cell::new(false));

        let first = fired_first.clone();
        handlers.on_turn_ended(move |_| first.set(true));
        let second = fired_second.clone();
        handlers.on_turn_ended(move |_| second.set(true));

        let turn_match = TurnMatch::new("match-1", Vec::new(), None, MatchStatus::Open);
        handlers.turn_ended.as_ref().unwrap()(&turn_match);

        assert!(!fired_first.get());
        assert!(fired_second.get());
    }
}
