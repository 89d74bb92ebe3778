use std::collections::HashMap;

use crate::model::structures::match_outcome::{MatchOutcome, MatchResultKind, TerminationReason};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A completed game exactly as the external match runner reports it, before
/// any validation. Field names follow the runner's JSON contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMatchResult {
    /// Apples eaten, keyed by agent id
    pub scores: HashMap<String, i64>,
    /// Verdict per agent: "won", "lost" or "tied"
    pub results: HashMap<String, String>,
    pub rounds_played: Option<i64>,
    /// Death reason per agent, free-form
    pub death_reason: HashMap<String, String>
}

/// Why a raw result could not become a `MatchOutcome`.
///
/// `Schema` means the runner broke its own contract and someone should look
/// at it; everything else is a bad game that is skipped and logged.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Result pairs agent {0} against itself")]
    SelfPlay(String),
    #[error("Game between {0} and {1} never reached a terminal state")]
    NotTerminal(String, String),
    #[error("Negative score {score} reported for {agent_id}")]
    NegativeScore { agent_id: String, score: i64 },
    #[error("Round count {0} is not a positive integer")]
    InvalidRoundCount(i64),
    #[error("Result violates the runner schema: {0}")]
    Schema(String)
}

impl ValidationError {
    /// Fatal errors point at a runner bug rather than a bad game
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValidationError::Schema(_))
    }
}

/// Normalizes a raw runner report into the canonical outcome the rating
/// engine consumes. `agent_a` and `agent_b` come from the match request, not
/// from the payload, so the orientation of the outcome is always the
/// requester's.
pub fn normalize(agent_a: &str, agent_b: &str, raw: &RawMatchResult) -> Result<MatchOutcome, ValidationError> {
    if agent_a == agent_b {
        return Err(ValidationError::SelfPlay(agent_a.to_string()));
    }

    let result = verdict_for_pair(agent_a, agent_b, &raw.results)?;

    let score_a = score_for(agent_a, &raw.scores)?;
    let score_b = score_for(agent_b, &raw.scores)?;

    let rounds_played = raw
        .rounds_played
        .ok_or_else(|| ValidationError::Schema("missing roundsPlayed".to_string()))?;
    if rounds_played <= 0 {
        return Err(ValidationError::InvalidRoundCount(rounds_played));
    }

    let termination_reason = termination_for(agent_a, agent_b, result, &raw.death_reason);

    Ok(MatchOutcome {
        agent_a: agent_a.to_string(),
        agent_b: agent_b.to_string(),
        result,
        score_a: score_a as u32,
        score_b: score_b as u32,
        termination_reason,
        rounds_played: rounds_played as u32,
        score_consistent: scores_agree(result, score_a, score_b, termination_reason)
    })
}

/// Cross-checks both verdicts and returns agent A's. An empty verdict map
/// means the game never finished; a half-filled or self-contradictory one is
/// a contract violation.
fn verdict_for_pair(
    agent_a: &str,
    agent_b: &str,
    results: &HashMap<String, String>
) -> Result<MatchResultKind, ValidationError> {
    if results.is_empty() {
        return Err(ValidationError::NotTerminal(agent_a.to_string(), agent_b.to_string()));
    }

    let verdict_a = parse_verdict(agent_a, results)?;
    let verdict_b = parse_verdict(agent_b, results)?;

    if verdict_b != verdict_a.flipped() {
        return Err(ValidationError::Schema(format!(
            "contradictory verdicts: {} {:?} vs {} {:?}",
            agent_a, verdict_a, agent_b, verdict_b
        )));
    }

    Ok(verdict_a)
}

fn parse_verdict(agent_id: &str, results: &HashMap<String, String>) -> Result<MatchResultKind, ValidationError> {
    let raw = results
        .get(agent_id)
        .ok_or_else(|| ValidationError::Schema(format!("no verdict for {}", agent_id)))?;

    match raw.as_str() {
        "won" => Ok(MatchResultKind::Won),
        "lost" => Ok(MatchResultKind::Lost),
        "tied" => Ok(MatchResultKind::Tied),
        other => Err(ValidationError::Schema(format!(
            "unknown verdict {:?} for {}",
            other, agent_id
        )))
    }
}

fn score_for(agent_id: &str, scores: &HashMap<String, i64>) -> Result<i64, ValidationError> {
    let score = *scores
        .get(agent_id)
        .ok_or_else(|| ValidationError::Schema(format!("no score for {}", agent_id)))?;
    if score < 0 {
        return Err(ValidationError::NegativeScore {
            agent_id: agent_id.to_string(),
            score
        });
    }

    Ok(score)
}

/// Picks the death reason that ended the game: the loser's if present, else
/// whichever side reported one. Missing or unrecognized reasons degrade to
/// `Unknown` rather than invalidating the result.
fn termination_for(
    agent_a: &str,
    agent_b: &str,
    result: MatchResultKind,
    death_reason: &HashMap<String, String>
) -> TerminationReason {
    let loser = match result {
        MatchResultKind::Won => Some(agent_b),
        MatchResultKind::Lost => Some(agent_a),
        MatchResultKind::Tied => None
    };

    loser
        .and_then(|id| death_reason.get(id))
        .or_else(|| death_reason.get(agent_a))
        .or_else(|| death_reason.get(agent_b))
        .map(|raw| TerminationReason::parse(raw))
        .unwrap_or(TerminationReason::Unknown)
}

/// A naturally finished game should name the higher scorer as the winner.
/// Other terminations legitimately end with the lower scorer winning, so
/// only natural games are checked.
fn scores_agree(result: MatchResultKind, score_a: i64, score_b: i64, termination: TerminationReason) -> bool {
    if termination != TerminationReason::Natural {
        return true;
    }
    match result {
        MatchResultKind::Won => score_a >= score_b,
        MatchResultKind::Lost => score_b >= score_a,
        MatchResultKind::Tied => score_a == score_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(score_a: i64, score_b: i64, verdict_a: &str, verdict_b: &str, rounds: i64) -> RawMatchResult {
        RawMatchResult {
            scores: HashMap::from([("a".to_string(), score_a), ("b".to_string(), score_b)]),
            results: HashMap::from([("a".to_string(), verdict_a.to_string()), ("b".to_string(), verdict_b.to_string())]),
            rounds_played: Some(rounds),
            death_reason: HashMap::new()
        }
    }

    #[test]
    fn well_formed_result_normalizes() {
        let mut raw = raw(9, 3, "won", "lost", 42);
        raw.death_reason.insert("b".to_string(), "collision_opponent".to_string());

        let outcome = normalize("a", "b", &raw).unwrap();

        assert_eq!(outcome.result, MatchResultKind::Won);
        assert_eq!(outcome.score_a, 9);
        assert_eq!(outcome.score_b, 3);
        assert_eq!(outcome.rounds_played, 42);
        assert_eq!(outcome.termination_reason, TerminationReason::CollisionOpponent);
        assert!(outcome.score_consistent);
    }

    #[test]
    fn orientation_follows_the_request_not_the_payload() {
        let raw = raw(3, 9, "lost", "won", 42);

        let outcome = normalize("a", "b", &raw).unwrap();

        assert_eq!(outcome.result, MatchResultKind::Lost);
        assert_eq!(outcome.winner(), Some("b"));
    }

    #[test]
    fn self_play_is_rejected_and_recoverable() {
        let raw = raw(3, 9, "lost", "won", 42);

        let error = normalize("a", "a", &raw).unwrap_err();

        assert_eq!(error, ValidationError::SelfPlay("a".to_string()));
        assert!(!error.is_fatal());
    }

    #[test]
    fn empty_verdicts_mean_the_game_never_ended() {
        let mut raw = raw(0, 0, "", "", 42);
        raw.results.clear();

        let error = normalize("a", "b", &raw).unwrap_err();

        assert!(matches!(error, ValidationError::NotTerminal(..)));
        assert!(!error.is_fatal());
    }

    #[test]
    fn missing_verdict_for_one_agent_is_fatal() {
        let mut raw = raw(9, 3, "won", "lost", 42);
        raw.results.remove("b");

        let error = normalize("a", "b", &raw).unwrap_err();

        assert!(error.is_fatal());
    }

    #[test]
    fn contradictory_verdicts_are_fatal() {
        let raw = raw(9, 3, "won", "won", 42);

        let error = normalize("a", "b", &raw).unwrap_err();

        assert!(error.is_fatal());
    }

    #[test]
    fn unknown_verdict_literal_is_fatal() {
        let raw = raw(9, 3, "forfeited", "lost", 42);

        let error = normalize("a", "b", &raw).unwrap_err();

        assert!(error.is_fatal());
    }

    #[test]
    fn negative_score_is_recoverable() {
        let raw = raw(-1, 3, "lost", "won", 42);

        let error = normalize("a", "b", &raw).unwrap_err();

        assert_eq!(
            error,
            ValidationError::NegativeScore {
                agent_id: "a".to_string(),
                score: -1
            }
        );
        assert!(!error.is_fatal());
    }

    #[test]
    fn missing_round_count_is_fatal_but_zero_rounds_is_not() {
        let mut missing = raw(9, 3, "won", "lost", 42);
        missing.rounds_played = None;
        assert!(normalize("a", "b", &missing).unwrap_err().is_fatal());

        let zero = raw(9, 3, "won", "lost", 0);
        let error = normalize("a", "b", &zero).unwrap_err();
        assert_eq!(error, ValidationError::InvalidRoundCount(0));
        assert!(!error.is_fatal());
    }

    #[test]
    fn loser_death_reason_wins_over_the_other_side() {
        let mut raw = raw(9, 3, "won", "lost", 42);
        raw.death_reason.insert("a".to_string(), "timeout".to_string());
        raw.death_reason.insert("b".to_string(), "wall".to_string());

        let outcome = normalize("a", "b", &raw).unwrap();

        assert_eq!(outcome.termination_reason, TerminationReason::Wall);
    }

    #[test]
    fn absent_death_reason_degrades_to_unknown() {
        let raw = raw(9, 3, "won", "lost", 42);

        let outcome = normalize("a", "b", &raw).unwrap();

        assert_eq!(outcome.termination_reason, TerminationReason::Unknown);
    }

    #[test]
    fn natural_win_with_lower_score_is_flagged_not_rejected() {
        let mut raw = raw(2, 9, "won", "lost", 42);
        raw.death_reason.insert("b".to_string(), "natural".to_string());

        let outcome = normalize("a", "b", &raw).unwrap();

        assert!(!outcome.score_consistent);
    }

    #[test]
    fn wall_win_with_lower_score_is_fine() {
        let mut raw = raw(2, 9, "won", "lost", 42);
        raw.death_reason.insert("b".to_string(), "wall".to_string());

        let outcome = normalize("a", "b", &raw).unwrap();

        assert!(outcome.score_consistent);
    }

    #[test]
    fn payload_fields_deserialize_from_runner_json() {
        let parsed: RawMatchResult = serde_json::from_str(
            r#"{
                "scores": {"a": 4, "b": 7},
                "results": {"a": "lost", "b": "won"},
                "roundsPlayed": 58,
                "deathReason": {"a": "collision_self"}
            }"#
        )
        .unwrap();

        let outcome = normalize("a", "b", &parsed).unwrap();

        assert_eq!(outcome.result, MatchResultKind::Lost);
        assert_eq!(outcome.termination_reason, TerminationReason::CollisionSelf);
    }

    #[test]
    fn missing_optional_sections_fall_back_to_defaults() {
        let parsed: RawMatchResult = serde_json::from_str(r#"{"scores": {"a": 1, "b": 0}}"#).unwrap();

        let error = normalize("a", "b", &parsed).unwrap_err();

        assert!(matches!(error, ValidationError::NotTerminal(..)));
    }
}
