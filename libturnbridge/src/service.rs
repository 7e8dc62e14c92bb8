use crate::domain::participant::Participant;
use crate::domain::turn_match::TurnMatch;
use chrono::Duration;
use snafu::Snafu;

/// Errors reported by an external service implementation.
#[derive(Debug, Snafu)]
pub enum ServiceError {
    #[snafu(display("The service could not be reached: {reason}"))]
    Unreachable { reason: String },
    #[snafu(display("The service does not know match {match_id}"))]
    UnknownMatch { match_id: String },
    #[snafu(display("The service rejected the submitted data: {reason}"))]
    Rejected { reason: String },
}

pub type ThreadSafeMatchmakingService = dyn MatchmakingService + Sync + Send;

/// The vendor matchmaking backend this library wraps.
///
/// All match state transport, conflict resolution between concurrent
/// participant updates, turn timeouts and persistence live behind this
/// seam. The library only routes events and keeps session bookkeeping; it
/// never retries a failed call on its own.
pub trait MatchmakingService {
    /// Starts a fresh match for the local player.
    ///
    /// # Errors
    ///
    /// * [`Unreachable`][ServiceError::Unreachable]: The service could not
    ///   be contacted.
    fn start_match(&self) -> Result<TurnMatch, ServiceError>;

    /// Fetches the latest opaque payload stored for a match.
    ///
    /// The payload is produced by the application's encode hook on some
    /// device and is never interpreted by the service or this library.
    ///
    /// # Errors
    ///
    /// * [`UnknownMatch`][ServiceError::UnknownMatch]: The service has no
    ///   match with the given id.
    fn fetch_payload(&self, match_id: &str) -> Result<Vec<u8>, ServiceError>;

    /// Persists a payload for the current turn without advancing it.
    fn save_turn_payload(&self, current: &TurnMatch, payload: &[u8]) -> Result<(), ServiceError>;

    /// Persists a payload and advances the current-turn pointer to the
    /// first reachable entry of `recipients`, in order.
    ///
    /// The timeout is enforced by the service; once it elapses the service
    /// moves on to the next recipient on its own.
    fn advance_turn(
        &self,
        current: &TurnMatch,
        recipients: &[Participant],
        timeout: Duration,
        payload: &[u8],
    ) -> Result<(), ServiceError>;

    /// Ends the match, storing the final payload and the participant
    /// outcomes recorded on `current`.
    fn end_match(&self, current: &TurnMatch, payload: &[u8]) -> Result<(), ServiceError>;

    /// Records a quit outcome for a participant that does not hold the
    /// turn. No payload is involved since no turn advances.
    fn quit_out_of_turn(
        &self,
        current: &TurnMatch,
        quitter_display_name: &str,
    ) -> Result<(), ServiceError>;
}

/// Progress of one achievement for one player, in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct AchievementProgress {
    pub achievement_id: String,
    pub percent: f64,
}

pub type ThreadSafeAchievementService = dyn AchievementService + Sync + Send;

/// The vendor achievement store.
pub trait AchievementService {
    /// Loads all achievement progress recorded for a player.
    ///
    /// Achievements the player never progressed may be missing from the
    /// result; callers treat those as starting at zero percent.
    fn load_progress(
        &self,
        player_display_name: &str,
    ) -> Result<Vec<AchievementProgress>, ServiceError>;

    /// Reports an absolute progress value for one achievement.
    fn report_progress(
        &self,
        player_display_name: &str,
        achievement_id: &str,
        percent: f64,
    ) -> Result<(), ServiceError>;
}

pub type ThreadSafeLeaderboardService = dyn LeaderboardService + Sync + Send;

/// The vendor leaderboard store.
pub trait LeaderboardService {
    /// Submits a score for a player to every named board.
    fn submit_score(
        &self,
        player_display_name: &str,
        score: i64,
        board_ids: &[String],
    ) -> Result<(), ServiceError>;
}

pub type ThreadSafeMainThreadDispatcher = dyn MainThreadDispatcher + Sync + Send;

/// Marshals a task onto the application's primary execution context.
///
/// Supplied by the host application; the router uses it exclusively for
/// the view-change callback, which must never run on a background context.
pub trait MainThreadDispatcher {
    fn run_on_main(&self, task: Box<dyn FnOnce() + Send>);
}
