use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::RwLock;
use turnbridge::domain::participant::{Participant, ParticipantStatus};
use turnbridge::domain::turn_match::{MatchStatus, TurnMatch};
use turnbridge::service::{
    AchievementProgress, AchievementService, LeaderboardService, MatchmakingService, ServiceError,
};

struct StoredMatch {
    snapshot: TurnMatch,
    payload: Vec<u8>,
    turn_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SubmittedScore {
    pub board_id: String,
    pub player_display_name: String,
    pub score: i64,
}

/// In-memory stand-in for the vendor matchmaking backend, achievement
/// store and leaderboard store. The real services are remote and
/// closed-source; this one exists so the library can be exercised locally.
pub struct InMemoryArena {
    matches: RwLock<HashMap<String, StoredMatch>>,
    achievements: RwLock<HashMap<String, HashMap<String, f64>>>,
    scores: RwLock<Vec<SubmittedScore>>,
    local_player: String,
}

impl InMemoryArena {
    pub fn new(local_player: &str) -> InMemoryArena {
        InMemoryArena {
            matches: RwLock::new(HashMap::new()),
            achievements: RwLock::new(HashMap::new()),
            scores: RwLock::new(Vec::new()),
            local_player: local_player.to_string(),
        }
    }

    /// Creates a match with the given seat order, first seat to act.
    pub fn seed_match(&self, players: &[&str]) -> TurnMatch {
        let match_id = format!("match-{:08x}", rand::random::<u32>());
        let participants = players
            .iter()
            .map(|name| Participant::new(name, ParticipantStatus::Active))
            .collect();
        let snapshot = TurnMatch::new(&match_id, participants, players.first().copied(), MatchStatus::Open);

        info!("Seeding match {match_id} with {} seats", players.len());
        self.matches.write().unwrap().insert(
            match_id,
            StoredMatch {
                snapshot: snapshot.clone(),
                payload: Vec::new(),
                turn_deadline: None,
            },
        );

        snapshot
    }

    /// The latest stored snapshot, as another device would receive it.
    pub fn snapshot(&self, match_id: &str) -> Option<TurnMatch> {
        self.matches
            .read()
            .unwrap()
            .get(match_id)
            .map(|stored| stored.snapshot.clone())
    }

    pub fn submitted_scores(&self) -> Vec<SubmittedScore> {
        self.scores.read().unwrap().clone()
    }

    /// When the service would pass the turn on if the holder never acts.
    pub fn turn_deadline(&self, match_id: &str) -> Option<DateTime<Utc>> {
        self.matches
            .read()
            .unwrap()
            .get(match_id)
            .and_then(|stored| stored.turn_deadline)
    }
}

impl MatchmakingService for InMemoryArena {
    fn start_match(&self) -> Result<TurnMatch, ServiceError> {
        Ok(self.seed_match(&[self.local_player.as_str()]))
    }

    fn fetch_payload(&self, match_id: &str) -> Result<Vec<u8>, ServiceError> {
        let matches = self.matches.read().unwrap();
        matches
            .get(match_id)
            .map(|stored| stored.payload.clone())
            .ok_or_else(|| ServiceError::UnknownMatch {
                match_id: match_id.to_string(),
            })
    }

    fn save_turn_payload(&self, current: &TurnMatch, payload: &[u8]) -> Result<(), ServiceError> {
        info!(
            "Saving {} payload bytes for match {}",
            payload.len(),
            current.match_id
        );

        let mut matches = self.matches.write().unwrap();
        let stored = matches
            .get_mut(&current.match_id)
            .ok_or_else(|| ServiceError::UnknownMatch {
                match_id: current.match_id.clone(),
            })?;
        stored.payload = payload.to_vec();

        Ok(())
    }

    fn advance_turn(
        &self,
        current: &TurnMatch,
        recipients: &[Participant],
        timeout: Duration,
        payload: &[u8],
    ) -> Result<(), ServiceError> {
        let next_holder = match recipients.first() {
            Some(recipient) => recipient.display_name.clone(),
            None => {
                warn!("Turn advanced with no recipients for match {}", current.match_id);
                return Err(ServiceError::Rejected {
                    reason: "no recipients".to_string(),
                });
            }
        };

        info!(
            "Advancing turn of match {} to {next_holder} (timeout {}s)",
            current.match_id,
            timeout.num_seconds()
        );

        let mut matches = self.matches.write().unwrap();
        let stored = matches
            .get_mut(&current.match_id)
            .ok_or_else(|| ServiceError::UnknownMatch {
                match_id: current.match_id.clone(),
            })?;
        stored.snapshot = current.clone();
        stored.snapshot.current_participant = Some(next_holder);
        stored.payload = payload.to_vec();
        stored.turn_deadline = Some(Utc::now() + timeout);

        Ok(())
    }

    fn end_match(&self, current: &TurnMatch, payload: &[u8]) -> Result<(), ServiceError> {
        info!("Ending match {}", current.match_id);

        let mut matches = self.matches.write().unwrap();
        let stored = matches
            .get_mut(&current.match_id)
            .ok_or_else(|| ServiceError::UnknownMatch {
                match_id: current.match_id.clone(),
            })?;
        stored.snapshot = current.clone();
        stored.snapshot.status = MatchStatus::Ended;
        stored.snapshot.current_participant = None;
        stored.payload = payload.to_vec();
        stored.turn_deadline = None;

        Ok(())
    }

    fn quit_out_of_turn(
        &self,
        current: &TurnMatch,
        quitter_display_name: &str,
    ) -> Result<(), ServiceError> {
        info!(
            "Recording out-of-turn quit of {quitter_display_name} in match {}",
            current.match_id
        );

        let mut matches = self.matches.write().unwrap();
        let stored = matches
            .get_mut(&current.match_id)
            .ok_or_else(|| ServiceError::UnknownMatch {
                match_id: current.match_id.clone(),
            })?;
        stored.snapshot = current.clone();

        Ok(())
    }
}

impl AchievementService for InMemoryArena {
    fn load_progress(
        &self,
        player_display_name: &str,
    ) -> Result<Vec<AchievementProgress>, ServiceError> {
        let achievements = self.achievements.read().unwrap();
        let progress = achievements
            .get(player_display_name)
            .map(|per_player| {
                per_player
                    .iter()
                    .map(|(achievement_id, percent)| AchievementProgress {
                        achievement_id: achievement_id.clone(),
                        percent: *percent,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(progress)
    }

    fn report_progress(
        &self,
        player_display_name: &str,
        achievement_id: &str,
        percent: f64,
    ) -> Result<(), ServiceError> {
        info!("Recording {percent}% on {achievement_id} for {player_display_name}");

        let mut achievements = self.achievements.write().unwrap();
        achievements
            .entry(player_display_name.to_string())
            .or_default()
            .insert(achievement_id.to_string(), percent);

        Ok(())
    }
}

impl LeaderboardService for InMemoryArena {
    fn submit_score(
        &self,
        player_display_name: &str,
        score: i64,
        board_ids: &[String],
    ) -> Result<(), ServiceError> {
        info!(
            "Submitting score {score} for {player_display_name} to {} boards",
            board_ids.len()
        );

        let mut scores = self.scores.write().unwrap();
        for board_id in board_ids {
            scores.push(SubmittedScore {
                board_id: board_id.clone(),
                player_display_name: player_display_name.to_string(),
                score,
            });
        }

        Ok(())
    }
}
