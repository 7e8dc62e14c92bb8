/// The seat state the matchmaking service reports for a participant,
/// identified by its raw vendor code.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum ParticipantStatus {
    Active = 1,
    Matching = 2,
    Invited = 3,
    Done = 4,
}

/// The terminal result recorded against a participant, identified by its
/// raw vendor code.
///
/// Once a non-[`None`][MatchOutcome::None] outcome has been recorded, none
/// of the turn-ending operations of this library overwrite it again within
/// the same match.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum MatchOutcome {
    None = 0,
    Won = 1,
    Lost = 2,
    Quit = 3,
    Tied = 4,
}

/// One seat in a turn-based match as reported by the matchmaking service.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    /// The display name of the player occupying this seat.
    ///
    /// This is the only field that is stable across invocations. The
    /// service also reports a team player id for every seat, but that id
    /// changes between launches and must never be used for identity
    /// comparisons.
    pub display_name: String,
    pub status: ParticipantStatus,
    pub outcome: MatchOutcome,
}

impl Participant {
    pub fn new(display_name: &str, status: ParticipantStatus) -> Participant {
        Participant {
            display_name: display_name.to_string(),
            status,
            outcome: MatchOutcome::None,
        }
    }

    /// Statuses that keep a participant in the turn rotation.
    pub fn in_rotation(&self) -> bool {
        matches!(
            self.status,
            ParticipantStatus::Active | ParticipantStatus::Matching | ParticipantStatus::Invited
        )
    }

    /// A participant contends for the match while its status is
    /// non-terminal and no outcome has been recorded yet.
    pub fn is_contending(&self) -> bool {
        self.in_rotation() && self.outcome == MatchOutcome::None
    }
}
