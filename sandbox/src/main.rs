mod arena;
mod config;
mod logger;

use crate::arena::InMemoryArena;
use crate::config::SandboxConfig;
use crate::logger::{initialize_log, log_match_context};
use chrono::Duration;
use log::info;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use turnbridge::events::MatchNoticeKind;
use turnbridge::router::EventRouter;
use turnbridge::service::MainThreadDispatcher;
use turnbridge::session::MatchSession;

/// The sandbox runs everything on the process main thread, so marshaling
/// a view change is a plain inline call.
struct InlineDispatcher;

impl MainThreadDispatcher for InlineDispatcher {
    fn run_on_main(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

fn main() {
    initialize_log();

    let config = SandboxConfig::load();
    let local_player = config.local_player().to_string();
    let arena = Arc::new(InMemoryArena::new(&local_player));

    // The whole application game state of the sandbox: a move counter the
    // hooks encode into and decode from the opaque payload.
    let moves = Rc::new(RefCell::new(0u8));

    let mut session = MatchSession::new();
    session.authenticate(&local_player);
    session.turn_timeout = Duration::seconds(config.turn_timeout_seconds());
    session.start_fresh_on_decode_failure = config.start_fresh_on_decode_failure();

    let encoder_moves = moves.clone();
    session.set_encoder(move || vec![*encoder_moves.borrow()]);
    let decoder_moves = moves.clone();
    session.set_decoder(move |payload| {
        *decoder_moves.borrow_mut() = payload.first().copied().unwrap_or(0);
        true
    });

    session
        .handlers
        .on_invite_received(|m| info!("Callback: invited to match {}", m.match_id));
    session
        .handlers
        .on_turn_ended(|m| info!("Callback: a turn ended in match {}", m.match_id));
    session
        .handlers
        .on_only_one_remaining(|m| info!("Callback: only one contender left in {}", m.match_id));
    session
        .handlers
        .on_won(|p| info!("Callback: {} won", p.display_name));
    session
        .handlers
        .on_lost(|p| info!("Callback: {} lost", p.display_name));
    session
        .handlers
        .on_match_ended(|m| info!("Callback: match {} is over", m.match_id));
    session
        .handlers
        .on_view_change_requested(|| info!("Callback: presenting the match view"));

    let mut router = EventRouter::new(session, arena.clone(), arena.clone(), arena.clone());
    router.set_main_thread_dispatcher(Arc::new(InlineDispatcher));

    // Scripted match: the invite lands first, then the opening turn.
    let seeded = arena.seed_match(&[&local_player, "Blair", "Casey"]);
    log_match_context(&seeded.match_id);

    router.handle_notice(MatchNoticeKind::InviteReceived as u8, seeded.clone());
    router.handle_notice(MatchNoticeKind::TurnReceived as u8, seeded.clone());

    *moves.borrow_mut() += 1;
    router.end_turn(Some(Box::new(|ok| info!("End turn acknowledged: {ok}"))));
    if let Some(deadline) = arena.turn_deadline(&seeded.match_id) {
        info!("Next turn times out at {deadline}");
    }

    // The opponents move and the service hands the turn back to us.
    let mut snapshot = arena
        .snapshot(&seeded.match_id)
        .expect("the seeded match is stored");
    snapshot.current_participant = Some(local_player.clone());
    router.handle_notice(MatchNoticeKind::TurnReceived as u8, snapshot);

    // We claim the win and report the ladder progress that comes with it.
    *moves.borrow_mut() += 1;
    router.declare_victory(
        &local_player,
        Some(Box::new(|ok| info!("Victory recorded: {ok}"))),
    );

    for _ in 0..4 {
        router.report_achievement(&local_player, "serial-winner", 30.0, None);
    }
    router.submit_score(
        1_200,
        &["weekly".to_string(), "all-time".to_string()],
        None,
    );

    for entry in arena.submitted_scores() {
        info!(
            "Board {}: {} scored {}",
            entry.board_id, entry.player_display_name, entry.score
        );
    }
    info!("Sandbox run complete");
}
