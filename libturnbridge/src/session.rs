use crate::domain::turn_match::TurnMatch;
use crate::events::EventHandlers;
use chrono::Duration;

/// Hook producing the opaque payload for the current application state.
pub type PayloadEncoder = Box<dyn Fn() -> Vec<u8>>;
/// Hook consuming an opaque payload; returns whether it was understood.
pub type PayloadDecoder = Box<dyn Fn(&[u8]) -> bool>;

const DEFAULT_TURN_TIMEOUT_DAYS: i64 = 7;

/// The match lifecycle as seen from this library.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum MatchPhase {
    Unloaded,
    Loaded,
    Active,
    WaitingOnOpponent,
    Ended,
}

/// The player this process acts for.
#[derive(Debug, Clone)]
pub struct LocalPlayer {
    pub display_name: String,
    pub authenticated: bool,
}

/// Holds everything the router needs between notices: the active match
/// snapshot, the registered hooks and the callback table.
///
/// Constructed once by the application composition root and handed to the
/// [`EventRouter`](crate::router::EventRouter). There is at most one
/// active match at a time from this session's point of view; whichever
/// notice arrives last names it.
pub struct MatchSession {
    pub handlers: EventHandlers,
    /// Turn timeout handed to the service when advancing the turn.
    pub turn_timeout: Duration,
    /// Permits the router to start a fresh match when the payload of a
    /// received turn cannot be decoded while it is the local turn.
    pub start_fresh_on_decode_failure: bool,
    pub(crate) local_player: Option<LocalPlayer>,
    pub(crate) active_match: Option<TurnMatch>,
    pub(crate) phase: MatchPhase,
    pub(crate) encoder: Option<PayloadEncoder>,
    pub(crate) decoder: Option<PayloadDecoder>,
}

impl MatchSession {
    pub fn new() -> MatchSession {
        MatchSession {
            handlers: EventHandlers::new(),
            turn_timeout: Duration::days(DEFAULT_TURN_TIMEOUT_DAYS),
            start_fresh_on_decode_failure: false,
            local_player: None,
            active_match: None,
            phase: MatchPhase::Unloaded,
            encoder: None,
            decoder: None,
        }
    }

    /// Records the player the service authenticated this process for.
    pub fn authenticate(&mut self, display_name: &str) {
        self.local_player = Some(LocalPlayer {
            display_name: display_name.to_string(),
            authenticated: true,
        });
    }

    pub fn local_player(&self) -> Option<&LocalPlayer> {
        self.local_player.as_ref()
    }

    pub fn active_match(&self) -> Option<&TurnMatch> {
        self.active_match.as_ref()
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Last registration wins; there is at most one encode hook.
    pub fn set_encoder(&mut self, encoder: impl Fn() -> Vec<u8> + 'static) {
        self.encoder = Some(Box::new(encoder));
    }

    /// Last registration wins; there is at most one decode hook.
    pub fn set_decoder(&mut self, decoder: impl Fn(&[u8]) -> bool + 'static) {
        self.decoder = Some(Box::new(decoder));
    }

    /// Whether the local player currently holds the turn of the active
    /// match.
    pub fn is_local_turn(&self) -> bool {
        match (&self.active_match, &self.local_player) {
            (Some(active), Some(local)) => active.holds_turn(&local.display_name),
            _ => false,
        }
    }
}

impl Default for MatchSession {
    fn default() -> Self {
        MatchSession::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::participant::{Participant, ParticipantStatus};
    use crate::domain::turn_match::MatchStatus;

    #[test]
    fn ensure_fresh_session_is_unloaded() {
        let session = MatchSession::new();

        assert_eq!(session.phase(), MatchPhase::Unloaded);
        assert!(session.active_match().is_none());
        assert!(!session.is_local_turn());
    }

    #[test]
    fn ensure_local_turn_follows_the_active_match() {
        let mut session = MatchSession::new();
        session.authenticate("Alice");
        session.active_match = Some(TurnMatch::new(
            "match-1",
            vec![
                Participant::new("Alice", ParticipantStatus::Active),
                Participant::new("Bob", ParticipantStatus::Active),
            ],
            Some("Alice"),
            MatchStatus::Open,
        ));

        assert!(session.is_local_turn());

        session.active_match.as_mut().unwrap().current_participant = Some("Bob".to_string());
        assert!(!session.is_local_turn());
    }
}
