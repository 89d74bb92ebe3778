use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

/// Result of a match from agent A's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum MatchResultKind {
    Won,
    Lost,
    Tied
}

impl MatchResultKind {
    /// Observed score for this side: 1.0 for a win, 0.5 for a tie, 0.0 for a loss
    pub fn actual_score(&self) -> f64 {
        match self {
            MatchResultKind::Won => 1.0,
            MatchResultKind::Tied => 0.5,
            MatchResultKind::Lost => 0.0
        }
    }

    /// The same result seen from the other side of the board
    pub fn flipped(&self) -> MatchResultKind {
        match self {
            MatchResultKind::Won => MatchResultKind::Lost,
            MatchResultKind::Lost => MatchResultKind::Won,
            MatchResultKind::Tied => MatchResultKind::Tied
        }
    }
}

/// How the game ended. Self-inflicted deaths say less about the winner's
/// skill than opponent-forced ones, so the rating engine weights them lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Natural,
    Timeout,
    Wall,
    CollisionSelf,
    CollisionOpponent,
    Error,
    Unknown
}

impl TerminationReason {
    /// Lenient parse of the free-form death reason strings the match runner
    /// reports. Anything unrecognized maps to `Unknown` rather than failing
    /// the whole result.
    pub fn parse(raw: &str) -> TerminationReason {
        match raw {
            "natural" => TerminationReason::Natural,
            "timeout" => TerminationReason::Timeout,
            "wall" => TerminationReason::Wall,
            "collision_self" => TerminationReason::CollisionSelf,
            "collision_opponent" => TerminationReason::CollisionOpponent,
            "error" => TerminationReason::Error,
            _ => TerminationReason::Unknown
        }
    }
}

/// Canonical record of one completed match, as consumed by the rating engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub agent_a: String,
    pub agent_b: String,
    /// From `agent_a`'s perspective
    pub result: MatchResultKind,
    pub score_a: u32,
    pub score_b: u32,
    pub termination_reason: TerminationReason,
    pub rounds_played: u32,
    /// False when the reported winner disagrees with the scores on a naturally
    /// terminated game. Degrades confidence instead of rejecting the result.
    pub score_consistent: bool
}

impl MatchOutcome {
    /// Absolute score difference between the two sides
    pub fn margin(&self) -> u32 {
        self.score_a.abs_diff(self.score_b)
    }

    pub fn winner(&self) -> Option<&str> {
        match self.result {
            MatchResultKind::Won => Some(&self.agent_a),
            MatchResultKind::Lost => Some(&self.agent_b),
            MatchResultKind::Tied => None
        }
    }

    pub fn loser(&self) -> Option<&str> {
        match self.result {
            MatchResultKind::Won => Some(&self.agent_b),
            MatchResultKind::Lost => Some(&self.agent_a),
            MatchResultKind::Tied => None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn actual_scores_sum_to_one_for_both_sides() {
        for result in MatchResultKind::iter() {
            assert_eq!(result.actual_score() + result.flipped().actual_score(), 1.0);
        }
    }

    #[test]
    fn parse_recognizes_known_death_reasons() {
        assert_eq!(TerminationReason::parse("natural"), TerminationReason::Natural);
        assert_eq!(TerminationReason::parse("wall"), TerminationReason::Wall);
        assert_eq!(TerminationReason::parse("collision_self"), TerminationReason::CollisionSelf);
        assert_eq!(TerminationReason::parse("collision_opponent"), TerminationReason::CollisionOpponent);
        assert_eq!(TerminationReason::parse("timeout"), TerminationReason::Timeout);
        assert_eq!(TerminationReason::parse("error"), TerminationReason::Error);
    }

    #[test]
    fn parse_maps_unrecognized_reasons_to_unknown() {
        assert_eq!(TerminationReason::parse("meteor_strike"), TerminationReason::Unknown);
        assert_eq!(TerminationReason::parse(""), TerminationReason::Unknown);
    }

    #[test]
    fn winner_and_loser_follow_result_orientation() {
        let outcome = MatchOutcome {
            agent_a: "a".to_string(),
            agent_b: "b".to_string(),
            result: MatchResultKind::Lost,
            score_a: 3,
            score_b: 9,
            termination_reason: TerminationReason::Natural,
            rounds_played: 40,
            score_consistent: true
        };

        assert_eq!(outcome.winner(), Some("b"));
        assert_eq!(outcome.loser(), Some("a"));
        assert_eq!(outcome.margin(), 6);
    }

    #[test]
    fn tie_has_no_winner() {
        let outcome = MatchOutcome {
            agent_a: "a".to_string(),
            agent_b: "b".to_string(),
            result: MatchResultKind::Tied,
            score_a: 5,
            score_b: 5,
            termination_reason: TerminationReason::Timeout,
            rounds_played: 100,
            score_consistent: true
        };

        assert_eq!(outcome.winner(), None);
        assert_eq!(outcome.loser(), None);
        assert_eq!(outcome.margin(), 0);
    }
}
