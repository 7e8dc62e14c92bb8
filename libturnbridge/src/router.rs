use crate::domain::participant::MatchOutcome;
use crate::domain::turn_match::{MatchStatus, TurnMatch};
use crate::events::MatchNoticeKind;
use crate::rotation::next_players;
use crate::service::{
    ServiceError, ThreadSafeAchievementService, ThreadSafeLeaderboardService,
    ThreadSafeMainThreadDispatcher, ThreadSafeMatchmakingService,
};
use crate::session::{MatchPhase, MatchSession};
use log::{debug, info, warn};
use num_traits::FromPrimitive;
use snafu::{ResultExt, Snafu};
use std::sync::Arc;

/// Receives the outcome of an operation that talks to the service.
pub type Completion = Box<dyn FnOnce(bool)>;

const ACHIEVEMENT_COMPLETE_PERCENT: f64 = 100.0;

/// Internal failure taxonomy. None of these surface to the caller beyond
/// a completion flag; missing-dependency failures are swallowed entirely
/// because the host application may not have finished wiring its hooks.
#[derive(Debug, Snafu)]
enum RouterError {
    #[snafu(display("no match is currently active"))]
    NoActiveMatch,
    #[snafu(display("the application has not registered an encode hook"))]
    MissingEncoder,
    #[snafu(display("the application has not registered a decode hook"))]
    MissingDecoder,
    #[snafu(display("the service failed to persist the match: {source}"))]
    PersistenceFailed { source: ServiceError },
    #[snafu(display("the match payload could not be decoded"))]
    LoadFailed,
    #[snafu(display("achievements can only be reported for the authenticated local player"))]
    NotAuthorizedForAchievement,
}

/// Routes every inbound lifecycle notice from the matchmaking service to
/// the single matching registered callback, performing the minimum session
/// mutation first.
///
/// The router is not internally threaded; notices are expected to arrive
/// serialized by the service's own delivery mechanism and racing writers
/// are resolved by last-write-wins on the active match reference.
pub struct EventRouter {
    session: MatchSession,
    matchmaking: Arc<ThreadSafeMatchmakingService>,
    achievements: Arc<ThreadSafeAchievementService>,
    leaderboards: Arc<ThreadSafeLeaderboardService>,
    main_thread: Option<Arc<ThreadSafeMainThreadDispatcher>>,
}

impl EventRouter {
    pub fn new(
        session: MatchSession,
        matchmaking: Arc<ThreadSafeMatchmakingService>,
        achievements: Arc<ThreadSafeAchievementService>,
        leaderboards: Arc<ThreadSafeLeaderboardService>,
    ) -> EventRouter {
        EventRouter {
            session,
            matchmaking,
            achievements,
            leaderboards,
            main_thread: None,
        }
    }

    pub fn set_main_thread_dispatcher(&mut self, dispatcher: Arc<ThreadSafeMainThreadDispatcher>) {
        self.main_thread = Some(dispatcher);
    }

    pub fn session(&self) -> &MatchSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MatchSession {
        &mut self.session
    }

    /// Entry point for notices arriving with their raw vendor code.
    pub fn handle_notice(&mut self, raw_kind: u8, notice_match: TurnMatch) {
        let Some(kind) = MatchNoticeKind::from_u8(raw_kind) else {
            warn!("Service delivered unknown notice kind {raw_kind}");
            return;
        };

        self.dispatch_notice(kind, notice_match);
    }

    pub fn dispatch_notice(&mut self, kind: MatchNoticeKind, notice_match: TurnMatch) {
        debug!(
            "Dispatching {kind:?} notice for match {}",
            notice_match.match_id
        );

        match kind {
            MatchNoticeKind::TurnReceived => self.turn_received(notice_match, None),
            MatchNoticeKind::WantsToQuit => self.quit_requested(notice_match),
            MatchNoticeKind::MatchEnded => self.match_concluded(notice_match),
            MatchNoticeKind::InviteReceived
            | MatchNoticeKind::ChallengeReceived
            | MatchNoticeKind::ChallengeCompleted
            | MatchNoticeKind::ExchangeRequest
            | MatchNoticeKind::ExchangeCancel
            | MatchNoticeKind::ExchangeReply => self.forward(kind, notice_match),
        }
    }

    /// A new turn is available. Loads and decodes the match payload, then
    /// hands control to the turn-ended callback.
    pub fn turn_received(&mut self, notice_match: TurnMatch, completion: Option<Completion>) {
        let result = self.try_turn_received(notice_match);
        conclude("load received turn", completion, result);
    }

    /// Explicit end-turn request by the local actor. Persistence is
    /// fire-and-forget: errors are logged and never retried locally.
    pub fn end_turn(&mut self, completion: Option<Completion>) {
        let result = self.try_end_turn();
        conclude("end turn", completion, result);
    }

    /// Persists the current application state without advancing the turn.
    pub fn save_turn(&mut self, completion: Option<Completion>) {
        let result = self.try_save_turn();
        conclude("save turn", completion, result);
    }

    /// The local actor quits while holding the turn.
    pub fn quit_in_turn(&mut self, completion: Option<Completion>) {
        let result = self.try_resign_in_turn(MatchOutcome::Quit);
        conclude("quit in turn", completion, result);
    }

    /// The local actor quits without holding the turn. Uses the service's
    /// dedicated operation; no payload is re-encoded since no turn
    /// advances.
    pub fn quit_out_of_turn(&mut self, completion: Option<Completion>) {
        let result = self.try_quit_out_of_turn();
        conclude("quit out of turn", completion, result);
    }

    /// The local actor declares victory for the named player. Every other
    /// contender is marked as having lost, with one lost callback each.
    pub fn declare_victory(&mut self, winner_display_name: &str, completion: Option<Completion>) {
        let result = self.try_declare_victory(winner_display_name);
        conclude("declare victory", completion, result);
    }

    /// The local actor declares defeat and passes the turn on.
    pub fn declare_defeat(&mut self, completion: Option<Completion>) {
        let result = self.try_resign_in_turn(MatchOutcome::Lost);
        conclude("declare defeat", completion, result);
    }

    /// Starts a fresh match and makes it the active one.
    pub fn start_match(&mut self, completion: Option<Completion>) {
        let result = self.try_start_match();
        conclude("start match", completion, result);
    }

    /// Adds `delta` percent to an achievement of the authenticated local
    /// player, clamped to 100. Idempotent once complete; reports for any
    /// other player are ignored.
    pub fn report_achievement(
        &mut self,
        player_display_name: &str,
        achievement_id: &str,
        delta_percent: f64,
        completion: Option<Completion>,
    ) {
        let result = self.try_report_achievement(player_display_name, achievement_id, delta_percent);
        conclude("report achievement", completion, result);
    }

    /// Submits a score for the local player to every named board.
    pub fn submit_score(&mut self, score: i64, board_ids: &[String], completion: Option<Completion>) {
        let result = self.try_submit_score(score, board_ids);
        conclude("submit score", completion, result);
    }

    /// Invokes the registered view-change handler on the application's
    /// primary execution context. The handler never runs inline on the
    /// delivering context.
    pub fn request_view_change(&self) {
        let Some(handler) = self.session.handlers.view_change_requested.clone() else {
            return;
        };

        match &self.main_thread {
            Some(dispatcher) => dispatcher.run_on_main(Box::new(move || handler())),
            None => debug!("No main thread dispatcher registered; dropping view change request"),
        }
    }

    fn try_turn_received(&mut self, notice_match: TurnMatch) -> Result<(), RouterError> {
        info!("Turn notice for match {}", notice_match.match_id);
        self.session.active_match = Some(notice_match);
        self.session.phase = MatchPhase::Loaded;

        self.load_active_match()?;
        self.session.phase = MatchPhase::Active;

        if let (Some(handler), Some(active)) = (
            &self.session.handlers.turn_ended,
            &self.session.active_match,
        ) {
            handler(active);
        }
        self.fire_generic(MatchNoticeKind::TurnReceived);
        self.request_view_change();

        Ok(())
    }

    /// Fetches and decodes the payload of the active match. A payload the
    /// decode hook rejects is recoverable only while it is the local turn
    /// and the application permits starting over.
    fn load_active_match(&mut self) -> Result<(), RouterError> {
        let match_id = match &self.session.active_match {
            Some(active) => active.match_id.clone(),
            None => return Err(RouterError::NoActiveMatch),
        };
        let decoder = self.session.decoder.as_ref().ok_or(RouterError::MissingDecoder)?;

        let payload = self
            .matchmaking
            .fetch_payload(&match_id)
            .map_err(|err| {
                warn!("Failed to fetch payload of match {match_id}: {err}");
                RouterError::LoadFailed
            })?;

        if decoder(&payload) {
            return Ok(());
        }

        if !(self.session.is_local_turn() && self.session.start_fresh_on_decode_failure) {
            return Err(RouterError::LoadFailed);
        }

        let fresh = self
            .matchmaking
            .start_match()
            .map_err(|_| RouterError::LoadFailed)?;
        info!(
            "Payload of match {match_id} was undecodable; started fresh match {}",
            fresh.match_id
        );
        if let Some(handler) = &self.session.handlers.new_game_requested {
            handler();
        }
        self.session.active_match = Some(fresh);
        if let (Some(handler), Some(active)) = (
            &self.session.handlers.game_started,
            &self.session.active_match,
        ) {
            handler(active);
        }

        Ok(())
    }

    fn try_end_turn(&mut self) -> Result<(), RouterError> {
        let payload = self.encode_payload()?;
        let local_name = self.local_display_name()?;

        let active = self
            .session
            .active_match
            .as_ref()
            .ok_or(RouterError::NoActiveMatch)?;
        let recipients = next_players(&active.participants, &local_name);

        self.matchmaking
            .advance_turn(active, &recipients, self.session.turn_timeout, &payload)
            .context(PersistenceFailedSnafu)?;

        self.session.phase = MatchPhase::WaitingOnOpponent;
        info!("Turn ended; waiting on {} recipients", recipients.len());

        Ok(())
    }

    fn try_save_turn(&mut self) -> Result<(), RouterError> {
        let payload = self.encode_payload()?;
        let active = self
            .session
            .active_match
            .as_ref()
            .ok_or(RouterError::NoActiveMatch)?;

        self.matchmaking
            .save_turn_payload(active, &payload)
            .context(PersistenceFailedSnafu)?;

        Ok(())
    }

    /// Shared path for quitting or conceding while holding the turn:
    /// record the outcome, pass the turn on, then end the match once at
    /// most one contender is left.
    fn try_resign_in_turn(&mut self, outcome: MatchOutcome) -> Result<(), RouterError> {
        let payload = self.encode_payload()?;
        let local_name = self.local_display_name()?;

        let mut active = self
            .session
            .active_match
            .take()
            .ok_or(RouterError::NoActiveMatch)?;
        if let Some(local) = active.participant_mut(&local_name) {
            if local.is_contending() {
                local.outcome = outcome;
            }
        }

        let recipients = next_players(&active.participants, &local_name);
        let persisted =
            self.matchmaking
                .advance_turn(&active, &recipients, self.session.turn_timeout, &payload);
        self.session.active_match = Some(active);
        persisted.context(PersistenceFailedSnafu)?;
        self.session.phase = MatchPhase::WaitingOnOpponent;

        self.finish_if_decided(&payload)
    }

    fn try_quit_out_of_turn(&mut self) -> Result<(), RouterError> {
        let local_name = self.local_display_name()?;

        {
            let active = self
                .session
                .active_match
                .as_mut()
                .ok_or(RouterError::NoActiveMatch)?;
            if let Some(local) = active.participant_mut(&local_name) {
                if local.is_contending() {
                    local.outcome = MatchOutcome::Quit;
                }
            }
        }

        let active = self
            .session
            .active_match
            .as_ref()
            .ok_or(RouterError::NoActiveMatch)?;
        self.matchmaking
            .quit_out_of_turn(active, &local_name)
            .context(PersistenceFailedSnafu)?;

        Ok(())
    }

    fn try_declare_victory(&mut self, winner_display_name: &str) -> Result<(), RouterError> {
        let payload = self.encode_payload()?;

        let mut losers = Vec::new();
        {
            let active = self
                .session
                .active_match
                .as_mut()
                .ok_or(RouterError::NoActiveMatch)?;
            for participant in active.participants.iter_mut().filter(|p| p.is_contending()) {
                if participant.display_name == winner_display_name {
                    participant.outcome = MatchOutcome::Won;
                } else {
                    participant.outcome = MatchOutcome::Lost;
                    losers.push(participant.clone());
                }
            }
        }

        if let Some(handler) = &self.session.handlers.won {
            let winner = self
                .session
                .active_match
                .as_ref()
                .and_then(|m| m.participant(winner_display_name))
                .filter(|p| p.outcome == MatchOutcome::Won);
            if let Some(winner) = winner {
                handler(winner);
            }
        }
        if let Some(handler) = &self.session.handlers.lost {
            for loser in &losers {
                handler(loser);
            }
        }

        self.finish_match(&payload)
    }

    fn try_start_match(&mut self) -> Result<(), RouterError> {
        let fresh = self.matchmaking.start_match().context(PersistenceFailedSnafu)?;
        info!("Started match {}", fresh.match_id);

        self.session.active_match = Some(fresh);
        self.session.phase = MatchPhase::Active;
        if let (Some(handler), Some(active)) = (
            &self.session.handlers.game_started,
            &self.session.active_match,
        ) {
            handler(active);
        }
        self.request_view_change();

        Ok(())
    }

    fn try_report_achievement(
        &mut self,
        player_display_name: &str,
        achievement_id: &str,
        delta_percent: f64,
    ) -> Result<(), RouterError> {
        let authorized = self
            .session
            .local_player
            .as_ref()
            .map(|local| local.authenticated && local.display_name == player_display_name)
            .unwrap_or(false);
        if !authorized {
            return Err(RouterError::NotAuthorizedForAchievement);
        }

        let progress = self
            .achievements
            .load_progress(player_display_name)
            .context(PersistenceFailedSnafu)?;
        let current = progress
            .iter()
            .find(|a| a.achievement_id == achievement_id)
            .map(|a| a.percent)
            .unwrap_or(0.0);

        if current >= ACHIEVEMENT_COMPLETE_PERCENT {
            debug!("Achievement {achievement_id} is already complete");
            return Ok(());
        }

        let updated = (current + delta_percent).min(ACHIEVEMENT_COMPLETE_PERCENT);
        self.achievements
            .report_progress(player_display_name, achievement_id, updated)
            .context(PersistenceFailedSnafu)?;
        info!("Achievement {achievement_id} progressed to {updated}%");

        Ok(())
    }

    fn try_submit_score(&self, score: i64, board_ids: &[String]) -> Result<(), RouterError> {
        let local_name = self.local_display_name()?;

        self.leaderboards
            .submit_score(&local_name, score, board_ids)
            .context(PersistenceFailedSnafu)?;
        info!("Submitted score {score} to {} boards", board_ids.len());

        Ok(())
    }

    /// Someone wants to abandon the match. Routed to the quit-in-turn or
    /// quit-out-of-turn callback depending on whether the local player
    /// holds the turn in the delivered snapshot.
    fn quit_requested(&mut self, notice_match: TurnMatch) {
        self.session.active_match = Some(notice_match);
        self.session.phase = MatchPhase::Loaded;

        let slot = if self.session.is_local_turn() {
            &self.session.handlers.quit_in_turn
        } else {
            &self.session.handlers.quit_out_of_turn
        };
        if let (Some(handler), Some(active)) = (slot, &self.session.active_match) {
            handler(active);
        }
        self.fire_generic(MatchNoticeKind::WantsToQuit);
    }

    /// The service reports the match as over. Pure forwarding path.
    fn match_concluded(&mut self, notice_match: TurnMatch) {
        info!("Match {} ended by the service", notice_match.match_id);
        self.session.active_match = Some(notice_match);
        self.session.phase = MatchPhase::Ended;

        if let (Some(handler), Some(active)) = (
            &self.session.handlers.match_ended,
            &self.session.active_match,
        ) {
            handler(active);
        }
        self.fire_generic(MatchNoticeKind::MatchEnded);
    }

    /// Pure forwarding for invite, challenge and exchange notices: update
    /// the active reference, invoke the single matching callback, nothing
    /// else.
    fn forward(&mut self, kind: MatchNoticeKind, notice_match: TurnMatch) {
        self.session.active_match = Some(notice_match);
        self.session.phase = MatchPhase::Loaded;

        let handlers = &self.session.handlers;
        let slot = match kind {
            MatchNoticeKind::InviteReceived => &handlers.invite_received,
            MatchNoticeKind::ChallengeReceived => &handlers.challenge_received,
            MatchNoticeKind::ChallengeCompleted => &handlers.challenge_completed,
            MatchNoticeKind::ExchangeRequest => &handlers.exchange_request,
            MatchNoticeKind::ExchangeCancel => &handlers.exchange_cancel,
            MatchNoticeKind::ExchangeReply => &handlers.exchange_reply,
            MatchNoticeKind::TurnReceived
            | MatchNoticeKind::WantsToQuit
            | MatchNoticeKind::MatchEnded => return,
        };
        if let (Some(handler), Some(active)) = (slot, &self.session.active_match) {
            handler(active);
        }
        self.fire_generic(kind);
    }

    /// Ends the match once at most one contender is left.
    fn finish_if_decided(&mut self, payload: &[u8]) -> Result<(), RouterError> {
        let decided = match &self.session.active_match {
            Some(active) => active.contender_count() <= 1,
            None => return Err(RouterError::NoActiveMatch),
        };
        if !decided {
            return Ok(());
        }

        if let (Some(handler), Some(active)) = (
            &self.session.handlers.only_one_remaining,
            &self.session.active_match,
        ) {
            handler(active);
        }

        self.finish_match(payload)
    }

    fn finish_match(&mut self, payload: &[u8]) -> Result<(), RouterError> {
        {
            let active = self
                .session
                .active_match
                .as_mut()
                .ok_or(RouterError::NoActiveMatch)?;
            active.status = MatchStatus::Ended;
            info!("Match {} is over", active.match_id);
        }
        self.session.phase = MatchPhase::Ended;

        if let (Some(handler), Some(active)) = (
            &self.session.handlers.match_ended,
            &self.session.active_match,
        ) {
            handler(active);
        }

        let active = self
            .session
            .active_match
            .as_ref()
            .ok_or(RouterError::NoActiveMatch)?;
        self.matchmaking
            .end_match(active, payload)
            .context(PersistenceFailedSnafu)?;

        Ok(())
    }

    fn fire_generic(&self, kind: MatchNoticeKind) {
        if let (Some(handler), Some(active)) = (
            &self.session.handlers.match_event,
            &self.session.active_match,
        ) {
            handler(kind, active);
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>, RouterError> {
        let encoder = self
            .session
            .encoder
            .as_ref()
            .ok_or(RouterError::MissingEncoder)?;
        Ok(encoder())
    }

    fn local_display_name(&self) -> Result<String, RouterError> {
        self.session
            .local_player
            .as_ref()
            .map(|local| local.display_name.clone())
            .ok_or(RouterError::NoActiveMatch)
    }
}

/// Applies the failure semantics of the public surface: missing
/// dependencies degrade to a silent no-op, everything else is logged and
/// reported through the completion flag only.
fn conclude(operation: &str, completion: Option<Completion>, result: Result<(), RouterError>) {
    match result {
        Ok(()) => {
            if let Some(done) = completion {
                done(true);
            }
        }
        Err(
            err @ (RouterError::NoActiveMatch
            | RouterError::MissingEncoder
            | RouterError::MissingDecoder
            | RouterError::NotAuthorizedForAchievement),
        ) => {
            debug!("Skipping {operation}: {err}");
        }
        Err(err) => {
            warn!("Failed to {operation}: {err}");
            if let Some(done) = completion {
                done(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::participant::{Participant, ParticipantStatus};
    use crate::service::{
        AchievementProgress, AchievementService, LeaderboardService, MainThreadDispatcher,
        MatchmakingService,
    };
    use chrono::Duration;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingArena {
        payload: Mutex<Vec<u8>>,
        advanced_recipients: Mutex<Vec<Vec<String>>>,
        saved_payloads: Mutex<Vec<Vec<u8>>>,
        ended_matches: Mutex<Vec<String>>,
        started_matches: Mutex<u32>,
        out_of_turn_quits: Mutex<Vec<String>>,
        achievements: Mutex<HashMap<String, f64>>,
        reported_percents: Mutex<Vec<f64>>,
        submitted_scores: Mutex<Vec<(String, i64)>>,
        reject_persistence: bool,
    }

    impl MatchmakingService for RecordingArena {
        fn start_match(&self) -> Result<TurnMatch, ServiceError> {
            *self.started_matches.lock().unwrap() += 1;
            Ok(TurnMatch::new(
                "fresh-match",
                vec![Participant::new("Alice", ParticipantStatus::Active)],
                Some("Alice"),
                MatchStatus::Open,
            ))
        }

        fn fetch_payload(&self, _match_id: &str) -> Result<Vec<u8>, ServiceError> {
            Ok(self.payload.lock().unwrap().clone())
        }

        fn save_turn_payload(
            &self,
            _current: &TurnMatch,
            payload: &[u8],
        ) -> Result<(), ServiceError> {
            self.saved_payloads.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        fn advance_turn(
            &self,
            _current: &TurnMatch,
            recipients: &[Participant],
            _timeout: Duration,
            payload: &[u8],
        ) -> Result<(), ServiceError> {
            if self.reject_persistence {
                return Err(ServiceError::Rejected {
                    reason: "test rejection".to_string(),
                });
            }
            self.advanced_recipients.lock().unwrap().push(
                recipients
                    .iter()
                    .map(|p| p.display_name.clone())
                    .collect(),
            );
            self.saved_payloads.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        fn end_match(&self, current: &TurnMatch, _payload: &[u8]) -> Result<(), ServiceError> {
            self.ended_matches
                .lock()
                .unwrap()
                .push(current.match_id.clone());
            Ok(())
        }

        fn quit_out_of_turn(
            &self,
            _current: &TurnMatch,
            quitter_display_name: &str,
        ) -> Result<(), ServiceError> {
            self.out_of_turn_quits
                .lock()
                .unwrap()
                .push(quitter_display_name.to_string());
            Ok(())
        }
    }

    impl AchievementService for RecordingArena {
        fn load_progress(
            &self,
            player_display_name: &str,
        ) -> Result<Vec<AchievementProgress>, ServiceError> {
            let achievements = self.achievements.lock().unwrap();
            Ok(achievements
                .iter()
                .filter(|(key, _)| key.starts_with(player_display_name))
                .map(|(key, percent)| AchievementProgress {
                    achievement_id: key.split('/').nth(1).unwrap().to_string(),
                    percent: *percent,
                })
                .collect())
        }

        fn report_progress(
            &self,
            player_display_name: &str,
            achievement_id: &str,
            percent: f64,
        ) -> Result<(), ServiceError> {
            self.achievements
                .lock()
                .unwrap()
                .insert(format!("{player_display_name}/{achievement_id}"), percent);
            self.reported_percents.lock().unwrap().push(percent);
            Ok(())
        }
    }

    impl LeaderboardService for RecordingArena {
        fn submit_score(
            &self,
            player_display_name: &str,
            score: i64,
            board_ids: &[String],
        ) -> Result<(), ServiceError> {
            for board_id in board_ids {
                self.submitted_scores
                    .lock()
                    .unwrap()
                    .push((board_id.clone(), score));
            }
            let _ = player_display_name;
            Ok(())
        }
    }

    struct InlineDispatcher {
        dispatched: AtomicU32,
    }

    impl MainThreadDispatcher for InlineDispatcher {
        fn run_on_main(&self, task: Box<dyn FnOnce() + Send>) {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            task();
        }
    }

    fn active(display_name: &str) -> Participant {
        Participant::new(display_name, ParticipantStatus::Active)
    }

    fn three_player_match(current: &str) -> TurnMatch {
        TurnMatch::new(
            "match-1",
            vec![active("Alice"), active("Bob"), active("Carol")],
            Some(current),
            MatchStatus::Open,
        )
    }

    fn router_for(arena: &Arc<RecordingArena>) -> EventRouter {
        let mut session = MatchSession::new();
        session.authenticate("Alice");
        session.set_encoder(|| vec![0xAB, 0xCD]);
        session.set_decoder(|_| true);
        EventRouter::new(session, arena.clone(), arena.clone(), arena.clone())
    }

    fn completion_flag() -> (Rc<Cell<Option<bool>>>, Completion) {
        let flag = Rc::new(Cell::new(None));
        let inner = flag.clone();
        (flag, Box::new(move |ok| inner.set(Some(ok))))
    }

    #[test]
    fn ensure_end_turn_recipients_follow_the_rotation() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.turn_received(three_player_match("Alice"), None);

        let (flag, completion) = completion_flag();
        router.end_turn(Some(completion));

        assert_eq!(flag.get(), Some(true));
        assert_eq!(
            arena.advanced_recipients.lock().unwrap().as_slice(),
            &[vec![
                "Bob".to_string(),
                "Carol".to_string(),
                "Alice".to_string()
            ]]
        );
        assert_eq!(
            arena.saved_payloads.lock().unwrap().last().unwrap(),
            &vec![0xAB, 0xCD]
        );
        assert_eq!(router.session().phase(), MatchPhase::WaitingOnOpponent);
    }

    #[test]
    fn ensure_end_turn_without_encoder_is_a_silent_no_op() {
        let arena = Arc::new(RecordingArena::default());
        let mut session = MatchSession::new();
        session.authenticate("Alice");
        session.set_decoder(|_| true);
        let mut router =
            EventRouter::new(session, arena.clone(), arena.clone(), arena.clone());
        router.turn_received(three_player_match("Alice"), None);

        let (flag, completion) = completion_flag();
        router.end_turn(Some(completion));

        assert_eq!(flag.get(), None);
        assert!(arena.advanced_recipients.lock().unwrap().is_empty());
    }

    #[test]
    fn ensure_persistence_failure_is_reported_and_not_retried() {
        let arena = Arc::new(RecordingArena {
            reject_persistence: true,
            ..RecordingArena::default()
        });
        let mut router = router_for(&arena);
        router.turn_received(three_player_match("Alice"), None);

        let (flag, completion) = completion_flag();
        router.end_turn(Some(completion));

        assert_eq!(flag.get(), Some(false));
        assert!(arena.advanced_recipients.lock().unwrap().is_empty());
    }

    #[test]
    fn ensure_victory_marks_outcomes_and_fires_callbacks() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.turn_received(three_player_match("Alice"), None);

        let lost_fired = Rc::new(Cell::new(0));
        let counter = lost_fired.clone();
        router
            .session_mut()
            .handlers
            .on_lost(move |_| counter.set(counter.get() + 1));
        let ended_fired = Rc::new(Cell::new(0));
        let counter = ended_fired.clone();
        router
            .session_mut()
            .handlers
            .on_match_ended(move |_| counter.set(counter.get() + 1));
        let won_with = Rc::new(Cell::new(None));
        let winner_slot = won_with.clone();
        router.session_mut().handlers.on_won(move |winner| {
            winner_slot.set(Some(winner.outcome));
        });

        let (flag, completion) = completion_flag();
        router.declare_victory("Bob", Some(completion));

        assert_eq!(flag.get(), Some(true));
        assert_eq!(lost_fired.get(), 2);
        assert_eq!(ended_fired.get(), 1);
        assert_eq!(won_with.get(), Some(MatchOutcome::Won));

        let active = router.session().active_match().unwrap();
        assert_eq!(active.participant("Bob").unwrap().outcome, MatchOutcome::Won);
        assert_eq!(
            active.participant("Alice").unwrap().outcome,
            MatchOutcome::Lost
        );
        assert_eq!(
            active.participant("Carol").unwrap().outcome,
            MatchOutcome::Lost
        );
        assert_eq!(active.status, MatchStatus::Ended);
        assert_eq!(
            arena.ended_matches.lock().unwrap().as_slice(),
            &["match-1".to_string()]
        );
        assert_eq!(router.session().phase(), MatchPhase::Ended);
    }

    #[test]
    fn ensure_victory_never_overwrites_recorded_outcomes() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        let mut turn_match = three_player_match("Alice");
        turn_match.participant_mut("Carol").unwrap().outcome = MatchOutcome::Quit;
        router.turn_received(turn_match, None);

        router.declare_victory("Bob", None);

        let active = router.session().active_match().unwrap();
        assert_eq!(
            active.participant("Carol").unwrap().outcome,
            MatchOutcome::Quit
        );
        assert_eq!(active.participant("Bob").unwrap().outcome, MatchOutcome::Won);
    }

    #[test]
    fn ensure_quit_in_turn_ends_the_match_with_one_contender_left() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.turn_received(
            TurnMatch::new(
                "match-1",
                vec![active("Alice"), active("Bob")],
                Some("Alice"),
                MatchStatus::Open,
            ),
            None,
        );

        let remaining_fired = Rc::new(Cell::new(0));
        let counter = remaining_fired.clone();
        router
            .session_mut()
            .handlers
            .on_only_one_remaining(move |_| counter.set(counter.get() + 1));

        let (flag, completion) = completion_flag();
        router.quit_in_turn(Some(completion));

        assert_eq!(flag.get(), Some(true));
        assert_eq!(remaining_fired.get(), 1);
        // Rotation filters by seat status, not outcome, so the quitting
        // local player still closes the recipient list.
        assert_eq!(
            arena.advanced_recipients.lock().unwrap().as_slice(),
            &[vec!["Bob".to_string(), "Alice".to_string()]]
        );
        assert_eq!(arena.ended_matches.lock().unwrap().len(), 1);

        let active = router.session().active_match().unwrap();
        assert_eq!(
            active.participant("Alice").unwrap().outcome,
            MatchOutcome::Quit
        );
        assert_eq!(router.session().phase(), MatchPhase::Ended);
    }

    #[test]
    fn ensure_quit_in_turn_keeps_the_match_open_with_contenders_left() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.turn_received(three_player_match("Alice"), None);

        router.quit_in_turn(None);

        assert!(arena.ended_matches.lock().unwrap().is_empty());
        assert_eq!(router.session().phase(), MatchPhase::WaitingOnOpponent);
    }

    #[test]
    fn ensure_defeat_passes_the_turn_on() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.turn_received(three_player_match("Alice"), None);

        router.declare_defeat(None);

        let active = router.session().active_match().unwrap();
        assert_eq!(
            active.participant("Alice").unwrap().outcome,
            MatchOutcome::Lost
        );
        assert_eq!(
            arena.advanced_recipients.lock().unwrap().as_slice(),
            &[vec![
                "Bob".to_string(),
                "Carol".to_string(),
                "Alice".to_string()
            ]]
        );
        assert!(arena.ended_matches.lock().unwrap().is_empty());
    }

    #[test]
    fn ensure_out_of_turn_quit_uses_the_dedicated_operation() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.turn_received(three_player_match("Bob"), None);

        let (flag, completion) = completion_flag();
        router.quit_out_of_turn(Some(completion));

        assert_eq!(flag.get(), Some(true));
        assert_eq!(
            arena.out_of_turn_quits.lock().unwrap().as_slice(),
            &["Alice".to_string()]
        );
        assert!(arena.advanced_recipients.lock().unwrap().is_empty());
        assert_eq!(
            router
                .session()
                .active_match()
                .unwrap()
                .participant("Alice")
                .unwrap()
                .outcome,
            MatchOutcome::Quit
        );
    }

    #[test]
    fn ensure_achievement_progress_clamps_and_stays_complete() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        for _ in 0..5 {
            let (flag, completion) = completion_flag();
            router.report_achievement("Alice", "ach-1", 30.0, Some(completion));
            assert_eq!(flag.get(), Some(true));
        }

        assert_eq!(
            arena.reported_percents.lock().unwrap().as_slice(),
            &[30.0, 60.0, 90.0, 100.0]
        );
    }

    #[test]
    fn ensure_achievements_for_other_players_are_ignored() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        let (flag, completion) = completion_flag();
        router.report_achievement("Mallory", "ach-1", 30.0, Some(completion));

        assert_eq!(flag.get(), None);
        assert!(arena.reported_percents.lock().unwrap().is_empty());
    }

    #[test]
    fn ensure_achievements_require_an_authenticated_player() {
        let arena = Arc::new(RecordingArena::default());
        let session = MatchSession::new();
        let mut router =
            EventRouter::new(session, arena.clone(), arena.clone(), arena.clone());

        router.report_achievement("Alice", "ach-1", 30.0, None);

        assert!(arena.reported_percents.lock().unwrap().is_empty());
    }

    #[test]
    fn ensure_decode_failure_starts_a_fresh_match_when_permitted() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.session_mut().set_decoder(|_| false);
        router.session_mut().start_fresh_on_decode_failure = true;

        let started_fired = Rc::new(Cell::new(0));
        let counter = started_fired.clone();
        router
            .session_mut()
            .handlers
            .on_game_started(move |_| counter.set(counter.get() + 1));

        let (flag, completion) = completion_flag();
        router.turn_received(three_player_match("Alice"), Some(completion));

        assert_eq!(flag.get(), Some(true));
        assert_eq!(*arena.started_matches.lock().unwrap(), 1);
        assert_eq!(started_fired.get(), 1);
        assert_eq!(
            router.session().active_match().unwrap().match_id,
            "fresh-match"
        );
        assert_eq!(router.session().phase(), MatchPhase::Active);
    }

    #[test]
    fn ensure_decode_failure_out_of_turn_reports_a_load_failure() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.session_mut().set_decoder(|_| false);
        router.session_mut().start_fresh_on_decode_failure = true;

        let (flag, completion) = completion_flag();
        router.turn_received(three_player_match("Bob"), Some(completion));

        assert_eq!(flag.get(), Some(false));
        assert_eq!(*arena.started_matches.lock().unwrap(), 0);
        assert_eq!(router.session().phase(), MatchPhase::Loaded);
    }

    #[test]
    fn ensure_turn_notice_fires_the_turn_ended_callback() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        let turn_fired = Rc::new(Cell::new(0));
        let counter = turn_fired.clone();
        router
            .session_mut()
            .handlers
            .on_turn_ended(move |_| counter.set(counter.get() + 1));
        let generic_fired = Rc::new(Cell::new(0));
        let counter = generic_fired.clone();
        router
            .session_mut()
            .handlers
            .on_match_event(move |_, _| counter.set(counter.get() + 1));

        router.handle_notice(1, three_player_match("Alice"));

        assert_eq!(turn_fired.get(), 1);
        assert_eq!(generic_fired.get(), 1);
        assert_eq!(router.session().phase(), MatchPhase::Active);
        assert!(router.session().is_local_turn());
    }

    #[test]
    fn ensure_unknown_notice_codes_are_ignored() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        router.handle_notice(99, three_player_match("Alice"));

        assert!(router.session().active_match().is_none());
        assert_eq!(router.session().phase(), MatchPhase::Unloaded);
    }

    #[test]
    fn ensure_forwarded_invites_reach_the_single_matching_handler() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        let invite_fired = Rc::new(Cell::new(0));
        let counter = invite_fired.clone();
        router
            .session_mut()
            .handlers
            .on_invite_received(move |_| counter.set(counter.get() + 1));
        let challenge_fired = Rc::new(Cell::new(0));
        let counter = challenge_fired.clone();
        router
            .session_mut()
            .handlers
            .on_challenge_received(move |_| counter.set(counter.get() + 1));

        router.handle_notice(4, three_player_match("Bob"));

        assert_eq!(invite_fired.get(), 1);
        assert_eq!(challenge_fired.get(), 0);
        assert_eq!(router.session().phase(), MatchPhase::Loaded);
        assert_eq!(
            router.session().active_match().unwrap().match_id,
            "match-1"
        );
    }

    #[test]
    fn ensure_quit_notices_route_by_turn_holder() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        let in_turn_fired = Rc::new(Cell::new(0));
        let counter = in_turn_fired.clone();
        router
            .session_mut()
            .handlers
            .on_quit_in_turn(move |_| counter.set(counter.get() + 1));
        let out_of_turn_fired = Rc::new(Cell::new(0));
        let counter = out_of_turn_fired.clone();
        router
            .session_mut()
            .handlers
            .on_quit_out_of_turn(move |_| counter.set(counter.get() + 1));

        router.handle_notice(2, three_player_match("Alice"));
        router.handle_notice(2, three_player_match("Bob"));

        assert_eq!(in_turn_fired.get(), 1);
        assert_eq!(out_of_turn_fired.get(), 1);
    }

    #[test]
    fn ensure_view_changes_run_on_the_main_thread_dispatcher() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        let dispatcher = Arc::new(InlineDispatcher {
            dispatched: AtomicU32::new(0),
        });
        router.set_main_thread_dispatcher(dispatcher.clone());

        let view_fired = Arc::new(AtomicU32::new(0));
        let counter = view_fired.clone();
        router
            .session_mut()
            .handlers
            .on_view_change_requested(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        router.request_view_change();

        assert_eq!(dispatcher.dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(view_fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ensure_view_changes_without_dispatcher_are_dropped() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        let view_fired = Arc::new(AtomicU32::new(0));
        let counter = view_fired.clone();
        router
            .session_mut()
            .handlers
            .on_view_change_requested(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        router.request_view_change();

        assert_eq!(view_fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ensure_save_turn_persists_without_advancing() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);
        router.turn_received(three_player_match("Alice"), None);

        router.save_turn(None);

        assert_eq!(
            arena.saved_payloads.lock().unwrap().as_slice(),
            &[vec![0xAB, 0xCD]]
        );
        assert!(arena.advanced_recipients.lock().unwrap().is_empty());
    }

    #[test]
    fn ensure_scores_are_submitted_to_every_board() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        let boards = vec!["board-a".to_string(), "board-b".to_string()];
        let (flag, completion) = completion_flag();
        router.submit_score(1200, &boards, Some(completion));

        assert_eq!(flag.get(), Some(true));
        assert_eq!(
            arena.submitted_scores.lock().unwrap().as_slice(),
            &[
                ("board-a".to_string(), 1200),
                ("board-b".to_string(), 1200)
            ]
        );
    }

    #[test]
    fn ensure_ended_matches_are_forwarded_verbatim() {
        let arena = Arc::new(RecordingArena::default());
        let mut router = router_for(&arena);

        let ended_fired = Rc::new(Cell::new(0));
        let counter = ended_fired.clone();
        router
            .session_mut()
            .handlers
            .on_match_ended(move |_| counter.set(counter.get() + 1));

        router.handle_notice(3, three_player_match("Bob"));

        assert_eq!(ended_fired.get(), 1);
        assert_eq!(router.session().phase(), MatchPhase::Ended);
        assert!(arena.ended_matches.lock().unwrap().is_empty());
    }
}
