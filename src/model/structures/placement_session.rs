use serde::Serialize;

/// Lifecycle of an agent's placement. `NotStarted` never reaches storage; a
/// session row is only written once placement actually begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlacementPhase {
    NotStarted = 0,
    Placing = 1,
    Stable = 2
}

impl TryFrom<i16> for PlacementPhase {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PlacementPhase::NotStarted),
            1 => Ok(PlacementPhase::Placing),
            2 => Ok(PlacementPhase::Stable),
            _ => Err(format!("Unknown placement phase: {}", value))
        }
    }
}

/// Adaptive placement state for one agent. Created when a fresh agent enters
/// the arena and destroyed (marked `Stable`) once the cap or the uncertainty
/// stop is reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSession {
    pub agent_id: String,
    pub phase: PlacementPhase,
    /// Counted placement games. A granted rematch replays a slot instead of
    /// consuming a new one.
    pub games_played: u32,
    pub max_games: u32,
    /// Plausible band for the agent's exposed rating, narrowed as results
    /// arrive
    pub rating_interval_low: f64,
    pub rating_interval_high: f64,
    pub rematch_count: u32,
    /// Consecutive high-confidence wins, drives the upward probe
    pub win_streak: u32,
    /// Opponents already faced this session, oldest first
    pub recent_opponents: Vec<String>,
    /// Set when a fluky loss earned a replay against this opponent
    pub pending_rematch: Option<String>
}

impl PlacementSession {
    pub fn new(agent_id: &str, max_games: u32, interval_low: f64, interval_high: f64) -> PlacementSession {
        PlacementSession {
            agent_id: agent_id.to_string(),
            phase: PlacementPhase::Placing,
            games_played: 0,
            max_games,
            rating_interval_low: interval_low,
            rating_interval_high: interval_high,
            rematch_count: 0,
            win_streak: 0,
            recent_opponents: Vec::new(),
            pending_rematch: None
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == PlacementPhase::Placing
    }

    /// Center of the current rating interval, the default selection target
    pub fn midpoint(&self) -> f64 {
        (self.rating_interval_low + self.rating_interval_high) / 2.0
    }

    /// Records an opponent in order, without duplicates
    pub fn note_opponent(&mut self, agent_id: &str) {
        if !self.recent_opponents.iter().any(|o| o == agent_id) {
            self.recent_opponents.push(agent_id.to_string());
        }
    }
}
