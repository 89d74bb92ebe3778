use crate::model::constants::{DEFAULT_MU, DEFAULT_SIGMA, DISPLAY_MULTIPLIER};
use serde::{Deserialize, Serialize};

/// A single agent's skill belief. `mu` and `sigma` are the only stored rating
/// fields; everything shown to users is derived from them on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEstimate {
    pub agent_id: String,
    /// Mean of the skill belief
    pub mu: f64,
    /// Uncertainty of the skill belief
    pub sigma: f64,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32
}

impl SkillEstimate {
    pub fn new(agent_id: &str) -> SkillEstimate {
        SkillEstimate {
            agent_id: agent_id.to_string(),
            mu: DEFAULT_MU,
            sigma: DEFAULT_SIGMA,
            games_played: 0,
            wins: 0,
            losses: 0,
            ties: 0
        }
    }

    /// Conservative point estimate used for all ranking and opponent selection.
    /// A new agent starts at 0.0.
    pub fn exposed(&self) -> f64 {
        self.mu - 3.0 * self.sigma
    }

    /// The number rendered on the leaderboard
    pub fn display_score(&self) -> f64 {
        self.exposed() * DISPLAY_MULTIPLIER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn new_estimate_has_default_belief() {
        let estimate = SkillEstimate::new("agent-1");

        assert_eq!(estimate.agent_id, "agent-1");
        assert_abs_diff_eq!(estimate.mu, 25.0);
        assert_abs_diff_eq!(estimate.sigma, 25.0 / 3.0);
        assert_eq!(estimate.games_played, 0);
    }

    #[test]
    fn exposed_rating_of_new_agent_is_zero() {
        let estimate = SkillEstimate::new("agent-1");

        assert_abs_diff_eq!(estimate.exposed(), 0.0);
        assert_abs_diff_eq!(estimate.display_score(), 0.0);
    }

    #[test]
    fn display_score_scales_exposed_rating() {
        let estimate = SkillEstimate {
            agent_id: "agent-1".to_string(),
            mu: 30.0,
            sigma: 2.0,
            games_played: 25,
            wins: 14,
            losses: 10,
            ties: 1
        };

        assert_abs_diff_eq!(estimate.exposed(), 24.0);
        assert_abs_diff_eq!(estimate.display_score(), 1200.0);
    }
}
