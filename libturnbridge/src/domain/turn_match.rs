use crate::domain::participant::Participant;

/// Overall state of a match, identified by its raw vendor code.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum MatchStatus {
    Open = 1,
    Ended = 2,
    Matching = 3,
}

/// Snapshot of one match owned by the matchmaking service.
///
/// This library never owns match data. The snapshot is replaced wholesale
/// whenever an inbound notice names a different match; all persistence and
/// conflict resolution happen on the service side.
#[derive(Debug, Clone)]
pub struct TurnMatch {
    pub match_id: String,
    /// Participants in the original seating order handed out by the
    /// service. The turn rotation is derived from this order.
    pub participants: Vec<Participant>,
    /// Display name of the participant currently holding the turn.
    pub current_participant: Option<String>,
    pub status: MatchStatus,
}

impl TurnMatch {
    pub fn new(
        match_id: &str,
        participants: Vec<Participant>,
        current_participant: Option<&str>,
        status: MatchStatus,
    ) -> TurnMatch {
        TurnMatch {
            match_id: match_id.to_string(),
            participants,
            current_participant: current_participant.map(str::to_string),
            status,
        }
    }

    pub fn participant(&self, display_name: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.display_name == display_name)
    }

    pub fn participant_mut(&mut self, display_name: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.display_name == display_name)
    }

    /// Number of participants still contending for this match.
    pub fn contender_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.is_contending())
            .count()
    }

    pub fn holds_turn(&self, display_name: &str) -> bool {
        self.current_participant.as_deref() == Some(display_name)
    }
}
