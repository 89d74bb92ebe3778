use std::collections::{hash_map::Entry, HashMap};

use crate::model::{
    constants::{DEFAULT_PLACEMENT_GAMES, INTERVAL_SEED_HALF_WIDTH, MAX_RATING_JUMP, MAX_REMATCHES, STOP_SIGMA, STREAK_CONFIDENCE, STREAK_LENGTH},
    structures::{
        match_outcome::MatchResultKind,
        placement_session::{PlacementPhase, PlacementSession}
    }
};

#[derive(Debug, Clone, Copy)]
pub struct PlacementConfig {
    pub max_games: u32,
    pub max_rematches: u32,
    pub stop_sigma: f64,
    /// Minimum confidence for a win to extend the probe streak
    pub streak_confidence: f64,
    /// Consecutive high-confidence wins before probing upward
    pub streak_length: u32
}

impl Default for PlacementConfig {
    fn default() -> PlacementConfig {
        PlacementConfig {
            max_games: DEFAULT_PLACEMENT_GAMES,
            max_rematches: MAX_REMATCHES,
            stop_sigma: STOP_SIGMA,
            streak_confidence: STREAK_CONFIDENCE,
            streak_length: STREAK_LENGTH
        }
    }
}

/// What the controller wants to happen next for an agent in placement
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementDecision {
    /// Keep placing, against this opponent
    Continue { opponent: String },
    /// Replay the previous opponent without consuming a placement slot
    Rematch { opponent: String },
    /// Placement is over; the agent joins the regular pool
    Stable
}

/// An opponent as the selector sees it: identity plus published strength
#[derive(Debug, Clone, PartialEq)]
pub struct OpponentCandidate {
    pub agent_id: String,
    pub exposed: f64
}

/// Picks the most informative opponent for the session: the candidate whose
/// exposed rating sits closest to the selection target, preferring opponents
/// not yet faced. After a streak of convincing wins the target probes above
/// the interval midpoint, capped by `MAX_RATING_JUMP` per selection.
///
/// Pure with respect to its inputs, so identical session state always picks
/// the same opponent.
pub fn select_opponent(
    candidates: &[OpponentCandidate],
    session: &PlacementSession,
    config: &PlacementConfig
) -> Option<String> {
    let unseen: Vec<&OpponentCandidate> = candidates
        .iter()
        .filter(|c| c.agent_id != session.agent_id && !session.recent_opponents.contains(&c.agent_id))
        .collect();
    let pool = if unseen.is_empty() {
        // Small arenas run out of new faces; repeats are better than stopping
        candidates.iter().filter(|c| c.agent_id != session.agent_id).collect()
    } else {
        unseen
    };

    let target = if session.win_streak >= config.streak_length {
        session.midpoint() + MAX_RATING_JUMP
    } else {
        session.midpoint()
    };

    pool.into_iter()
        .min_by(|x, y| {
            (x.exposed - target)
                .abs()
                .partial_cmp(&(y.exposed - target).abs())
                .unwrap()
                .then_with(|| x.agent_id.cmp(&y.agent_id))
        })
        .map(|candidate| candidate.agent_id.clone())
}

/// Drives every agent's placement state machine.
///
/// `NotStarted -> Placing` happens in `begin`, the `Placing` self-loop and
/// `Placing -> Stable` happen in `next_action`. Finished sessions stay
/// around, inactive, so their final state can be persisted.
#[derive(Default)]
pub struct PlacementController {
    config: PlacementConfig,
    sessions: HashMap<String, PlacementSession>
}

impl PlacementController {
    pub fn new(config: PlacementConfig) -> PlacementController {
        PlacementController {
            config,
            sessions: HashMap::new()
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn session(&self, agent_id: &str) -> Option<&PlacementSession> {
        self.sessions.get(agent_id)
    }

    pub fn phase(&self, agent_id: &str, games_played: u32) -> PlacementPhase {
        match self.sessions.get(agent_id) {
            Some(session) => session.phase,
            None if games_played == 0 => PlacementPhase::NotStarted,
            None => PlacementPhase::Stable
        }
    }

    /// Rehydrates a session persisted by an earlier run
    pub fn restore(&mut self, session: PlacementSession) {
        self.sessions.insert(session.agent_id.clone(), session);
    }

    /// Opens a placement session for an agent, seeding the rating interval
    /// from the current leaderboard spread. Idempotent while a session is
    /// active; an agent whose previous session finished starts over.
    pub fn begin(&mut self, agent_id: &str, board_spread: Option<(f64, f64)>, prior_exposed: f64) -> &PlacementSession {
        let (low, high) = seed_interval(board_spread, prior_exposed);

        match self.sessions.entry(agent_id.to_string()) {
            Entry::Occupied(occupied) if occupied.get().is_active() => occupied.into_mut(),
            Entry::Occupied(occupied) => {
                let slot = occupied.into_mut();
                *slot = PlacementSession::new(agent_id, self.config.max_games, low, high);
                slot
            }
            Entry::Vacant(vacant) => vacant.insert(PlacementSession::new(agent_id, self.config.max_games, low, high))
        }
    }

    /// Decides the next step for an agent: a granted rematch first, then the
    /// stop conditions, then adaptive opponent selection. `sigma` is the
    /// agent's current uncertainty.
    ///
    /// An empty candidate pool ends placement immediately; a one-agent arena
    /// is not an error.
    pub fn next_action(&mut self, agent_id: &str, sigma: f64, candidates: &[OpponentCandidate]) -> PlacementDecision {
        let Some(session) = self.sessions.get_mut(agent_id) else {
            return PlacementDecision::Stable;
        };
        if !session.is_active() {
            return PlacementDecision::Stable;
        }

        if let Some(opponent) = session.pending_rematch.take() {
            return PlacementDecision::Rematch { opponent };
        }

        if session.games_played >= session.max_games || sigma <= self.config.stop_sigma {
            session.phase = PlacementPhase::Stable;
            return PlacementDecision::Stable;
        }

        match select_opponent(candidates, session, &self.config) {
            Some(opponent) => PlacementDecision::Continue { opponent },
            None => {
                session.phase = PlacementPhase::Stable;
                PlacementDecision::Stable
            }
        }
    }

    /// Folds one rated result into the session: narrows the rating interval,
    /// tracks the probe streak, and decides whether a fluky loss earns the
    /// agent a rematch instead of consuming a placement slot.
    ///
    /// `result` is from the placing agent's perspective; `opponent_exposed`
    /// is the opponent's published rating before the match.
    pub fn record_result(
        &mut self,
        agent_id: &str,
        opponent_id: &str,
        opponent_exposed: f64,
        result: MatchResultKind,
        confidence: f64,
        fluky_loss: bool
    ) {
        let Some(session) = self.sessions.get_mut(agent_id) else {
            return;
        };
        if !session.is_active() {
            return;
        }

        session.note_opponent(opponent_id);
        narrow_interval(session, opponent_exposed, result, confidence);

        if result == MatchResultKind::Won && confidence >= self.config.streak_confidence {
            session.win_streak += 1;
        } else {
            session.win_streak = 0;
        }

        if fluky_loss && result == MatchResultKind::Lost && session.rematch_count < self.config.max_rematches {
            session.rematch_count += 1;
            session.pending_rematch = Some(opponent_id.to_string());
        } else {
            session.games_played += 1;
        }
    }
}

fn seed_interval(board_spread: Option<(f64, f64)>, prior_exposed: f64) -> (f64, f64) {
    match board_spread {
        Some((low, high)) if high - low > f64::EPSILON => (low, high),
        Some((low, high)) => {
            let mid = (low + high) / 2.0;
            (mid - INTERVAL_SEED_HALF_WIDTH, mid + INTERVAL_SEED_HALF_WIDTH)
        }
        None => (prior_exposed - INTERVAL_SEED_HALF_WIDTH, prior_exposed + INTERVAL_SEED_HALF_WIDTH)
    }
}

/// Confidence-weighted interval narrowing. A win pulls the floor up toward
/// the beaten opponent, a loss pulls the ceiling down, a tie pulls both at
/// half weight. Bounds that cross collapse to their midpoint.
fn narrow_interval(session: &mut PlacementSession, opponent_exposed: f64, result: MatchResultKind, confidence: f64) {
    match result {
        MatchResultKind::Won => {
            if opponent_exposed > session.rating_interval_low {
                session.rating_interval_low += confidence * (opponent_exposed - session.rating_interval_low);
            }
        }
        MatchResultKind::Lost => {
            if opponent_exposed < session.rating_interval_high {
                session.rating_interval_high -= confidence * (session.rating_interval_high - opponent_exposed);
            }
        }
        MatchResultKind::Tied => {
            if opponent_exposed > session.rating_interval_low {
                session.rating_interval_low += 0.5 * confidence * (opponent_exposed - session.rating_interval_low);
            }
            if opponent_exposed < session.rating_interval_high {
                session.rating_interval_high -= 0.5 * confidence * (session.rating_interval_high - opponent_exposed);
            }
        }
    }

    if session.rating_interval_low > session.rating_interval_high {
        let mid = (session.rating_interval_low + session.rating_interval_high) / 2.0;
        session.rating_interval_low = mid;
        session.rating_interval_high = mid;
    }
}
