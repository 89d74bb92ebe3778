use crate::model::{
    constants::{
        BETA, DRAW_PROBABILITY, FLUKY_LOSS_THRESHOLD, MARGIN_NORMALIZATION, MIN_INFORMATIVE_ROUNDS, MIN_SIGMA,
        SCORE_MISMATCH_CONFIDENCE_CAP, SIGMA_REDUCTION_RATE, TAU
    },
    structures::{
        match_outcome::{MatchOutcome, MatchResultKind, TerminationReason},
        skill_estimate::SkillEstimate
    }
};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

/// Raised when an update would corrupt an estimate. These indicate a bug in
/// the caller or the engine itself, never a bad game, so the update is
/// rejected wholesale and both estimates stay untouched.
#[derive(Debug, Error, PartialEq)]
pub enum InvariantViolation {
    #[error("Refusing to rate {agent_id} against itself")]
    SelfRating { agent_id: String },
    #[error("Outcome pairs {outcome_a} vs {outcome_b} but estimates are for {estimate_a} vs {estimate_b}")]
    AgentMismatch {
        outcome_a: String,
        outcome_b: String,
        estimate_a: String,
        estimate_b: String
    },
    #[error("Prior for {agent_id} is unusable (mu = {mu}, sigma = {sigma})")]
    InvalidPrior { agent_id: String, mu: f64, sigma: f64 },
    #[error("Update for {agent_id} produced a non-finite posterior (mu = {mu}, sigma = {sigma})")]
    NonFinitePosterior { agent_id: String, mu: f64, sigma: f64 }
}

/// Output of one rating pass: both posteriors alongside the priors they
/// replaced, plus the confidence attached to the outcome that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct RatedMatch {
    pub before_a: SkillEstimate,
    pub before_b: SkillEstimate,
    pub after_a: SkillEstimate,
    pub after_b: SkillEstimate,
    pub confidence: f64,
    /// True when a decisive result looked noisy enough that the loser's
    /// placement may warrant a rematch
    pub fluky_loss: bool
}

impl RatedMatch {
    pub fn mu_delta_a(&self) -> f64 {
        self.after_a.mu - self.before_a.mu
    }

    pub fn mu_delta_b(&self) -> f64 {
        self.after_b.mu - self.before_b.mu
    }

    /// The result as experienced by `agent_id`, if that agent took part
    pub fn result_for(&self, agent_id: &str, outcome: &MatchOutcome) -> Option<MatchResultKind> {
        if agent_id == outcome.agent_a {
            Some(outcome.result)
        } else if agent_id == outcome.agent_b {
            Some(outcome.result.flipped())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RatingParameters {
    pub beta: f64,
    pub tau: f64,
    pub draw_probability: f64
}

impl Default for RatingParameters {
    fn default() -> RatingParameters {
        RatingParameters {
            beta: BETA,
            tau: TAU,
            draw_probability: DRAW_PROBABILITY
        }
    }
}

/// Pure Bayesian updater for pairs of skill estimates. Holds no agent state;
/// everything it needs arrives through `rate`, which makes replays and tests
/// deterministic.
pub struct RatingEngine {
    params: RatingParameters,
    normal: Normal
}

impl Default for RatingEngine {
    fn default() -> RatingEngine {
        RatingEngine::new(RatingParameters::default())
    }
}

impl RatingEngine {
    pub fn new(params: RatingParameters) -> RatingEngine {
        RatingEngine {
            params,
            normal: Normal::new(0.0, 1.0).expect("Unit normal is a valid distribution")
        }
    }

    /// Rates one completed match, producing updated estimates for both sides.
    ///
    /// The posterior movement of each agent is scaled by the outcome's
    /// confidence, so noisy games barely move ratings while clean decisive
    /// games move them at full strength.
    pub fn rate(
        &self,
        a: &SkillEstimate,
        b: &SkillEstimate,
        outcome: &MatchOutcome
    ) -> Result<RatedMatch, InvariantViolation> {
        self.validate_pair(a, b, outcome)?;

        let confidence = self.confidence(outcome);

        // Additive dynamics factor, applied before this game's evidence so a
        // long-stable agent can still move.
        let sigma_a = inflate(a.sigma, self.params.tau);
        let sigma_b = inflate(b.sigma, self.params.tau);

        let c = (2.0 * self.params.beta.powi(2) + sigma_a.powi(2) + sigma_b.powi(2)).sqrt();
        let expected_a = self.expected_score(a.mu - b.mu, c);

        let actual_a = outcome.result.actual_score();
        let mu_a = a.mu + (sigma_a.powi(2) / c) * (actual_a - expected_a) * confidence;
        let mu_b = b.mu + (sigma_b.powi(2) / c) * ((1.0 - actual_a) - (1.0 - expected_a)) * confidence;

        // Uncertainty only shrinks in proportion to how informative the game
        // was. Ties carry half the information of a decisive result.
        let mut step = SIGMA_REDUCTION_RATE * confidence * (0.5 + 0.5 * normalized_margin(outcome));
        if outcome.result == MatchResultKind::Tied {
            step /= 2.0;
        }
        let new_sigma_a = (sigma_a - step).max(MIN_SIGMA);
        let new_sigma_b = (sigma_b - step).max(MIN_SIGMA);

        let after_a = updated_estimate(a, mu_a, new_sigma_a, outcome.result);
        let after_b = updated_estimate(b, mu_b, new_sigma_b, outcome.result.flipped());
        for after in [&after_a, &after_b] {
            if !after.mu.is_finite() || !after.sigma.is_finite() {
                return Err(InvariantViolation::NonFinitePosterior {
                    agent_id: after.agent_id.clone(),
                    mu: after.mu,
                    sigma: after.sigma
                });
            }
        }

        Ok(RatedMatch {
            before_a: a.clone(),
            before_b: b.clone(),
            after_a,
            after_b,
            confidence,
            fluky_loss: outcome.result != MatchResultKind::Tied && confidence < FLUKY_LOSS_THRESHOLD
        })
    }

    /// How much this outcome should be trusted, in [0, 1].
    ///
    /// Three signals multiply together: score margin, termination reason and
    /// game length. A result that contradicts its own scores is additionally
    /// capped, whatever the signals say.
    pub fn confidence(&self, outcome: &MatchOutcome) -> f64 {
        let confidence =
            margin_weight(outcome) * termination_weight(outcome.termination_reason) * length_weight(outcome.rounds_played);

        if outcome.score_consistent {
            confidence
        } else {
            confidence.min(SCORE_MISMATCH_CONFIDENCE_CAP)
        }
    }

    /// Expected score for the side whose mean leads by `mu_diff`, with a draw
    /// band around zero sized so two equal agents tie with the configured
    /// draw probability.
    fn expected_score(&self, mu_diff: f64, c: f64) -> f64 {
        let epsilon = c * self.normal.inverse_cdf(0.5 + self.params.draw_probability / 2.0);
        let p_win = self.normal.cdf((mu_diff - epsilon) / c);
        let p_loss = self.normal.cdf((-mu_diff - epsilon) / c);
        let p_draw = (1.0 - p_win - p_loss).max(0.0);

        p_win + 0.5 * p_draw
    }

    fn validate_pair(
        &self,
        a: &SkillEstimate,
        b: &SkillEstimate,
        outcome: &MatchOutcome
    ) -> Result<(), InvariantViolation> {
        if a.agent_id == b.agent_id {
            return Err(InvariantViolation::SelfRating {
                agent_id: a.agent_id.clone()
            });
        }
        if outcome.agent_a != a.agent_id || outcome.agent_b != b.agent_id {
            return Err(InvariantViolation::AgentMismatch {
                outcome_a: outcome.agent_a.clone(),
                outcome_b: outcome.agent_b.clone(),
                estimate_a: a.agent_id.clone(),
                estimate_b: b.agent_id.clone()
            });
        }
        for prior in [a, b] {
            if !prior.mu.is_finite() || !prior.sigma.is_finite() || prior.sigma <= 0.0 {
                return Err(InvariantViolation::InvalidPrior {
                    agent_id: prior.agent_id.clone(),
                    mu: prior.mu,
                    sigma: prior.sigma
                });
            }
        }

        Ok(())
    }
}

fn inflate(sigma: f64, tau: f64) -> f64 {
    (sigma.powi(2) + tau.powi(2)).sqrt()
}

fn normalized_margin(outcome: &MatchOutcome) -> f64 {
    (outcome.margin() as f64 / MARGIN_NORMALIZATION).min(1.0)
}

fn margin_weight(outcome: &MatchOutcome) -> f64 {
    normalized_margin(outcome).max(0.5)
}

fn termination_weight(reason: TerminationReason) -> f64 {
    match reason {
        TerminationReason::Natural | TerminationReason::CollisionOpponent => 1.0,
        TerminationReason::Wall | TerminationReason::CollisionSelf => 0.6,
        TerminationReason::Timeout | TerminationReason::Error | TerminationReason::Unknown => 0.4
    }
}

fn length_weight(rounds_played: u32) -> f64 {
    if rounds_played < MIN_INFORMATIVE_ROUNDS {
        0.5
    } else {
        1.0
    }
}

fn updated_estimate(prior: &SkillEstimate, mu: f64, sigma: f64, result: MatchResultKind) -> SkillEstimate {
    SkillEstimate {
        agent_id: prior.agent_id.clone(),
        mu,
        sigma,
        games_played: prior.games_played + 1,
        wins: prior.wins + u32::from(result == MatchResultKind::Won),
        losses: prior.losses + u32::from(result == MatchResultKind::Lost),
        ties: prior.ties + u32::from(result == MatchResultKind::Tied)
    }
}
