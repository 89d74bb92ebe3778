use std::collections::{HashMap, VecDeque};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex
};

use crate::model::{
    ingest::RawMatchResult,
    structures::{
        match_outcome::{MatchOutcome, MatchResultKind, TerminationReason},
        skill_estimate::SkillEstimate
    }
};
use crate::scheduler::runner::{MatchRequest, MatchRunner, RunnerError};
use futures::future::BoxFuture;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn generate_estimate(agent_id: &str, mu: f64, sigma: f64, games_played: u32) -> SkillEstimate {
    SkillEstimate {
        agent_id: agent_id.to_string(),
        mu,
        sigma,
        games_played,
        wins: games_played / 2,
        losses: games_played / 2,
        ties: games_played % 2
    }
}

/// A pool of established agents with exposed ratings spread over a seeded
/// random range, for leaderboard and selection tests
pub fn generate_pool(size: usize) -> Vec<SkillEstimate> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    (0..size)
        .map(|i| {
            let mu: f64 = rng.random_range(18.0..35.0);
            let sigma: f64 = rng.random_range(2.0..4.0);
            generate_estimate(&format!("agent-{}", i), mu, sigma, rng.random_range(10..60))
        })
        .collect()
}

pub fn generate_outcome(
    agent_a: &str,
    agent_b: &str,
    result: MatchResultKind,
    score_a: u32,
    score_b: u32,
    termination_reason: TerminationReason,
    rounds_played: u32
) -> MatchOutcome {
    MatchOutcome {
        agent_a: agent_a.to_string(),
        agent_b: agent_b.to_string(),
        result,
        score_a,
        score_b,
        termination_reason,
        rounds_played,
        score_consistent: true
    }
}

/// Declarative result for one scripted match, instantiated with the real
/// agent ids when the request arrives
#[derive(Debug, Clone, Copy)]
pub struct ScriptedOutcome {
    /// "won", "lost" or "tied", from the requesting agent's perspective
    pub verdict_a: &'static str,
    pub score_a: i64,
    pub score_b: i64,
    pub rounds: i64,
    /// Attached to the losing side
    pub death_reason: Option<&'static str>
}

pub fn decisive_win() -> ScriptedOutcome {
    ScriptedOutcome {
        verdict_a: "won",
        score_a: 12,
        score_b: 0,
        rounds: 40,
        death_reason: Some("collision_opponent")
    }
}

pub fn decisive_loss() -> ScriptedOutcome {
    ScriptedOutcome {
        verdict_a: "lost",
        score_a: 0,
        score_b: 12,
        rounds: 40,
        death_reason: Some("collision_opponent")
    }
}

pub fn fluky_loss() -> ScriptedOutcome {
    ScriptedOutcome {
        verdict_a: "lost",
        score_a: 3,
        score_b: 5,
        rounds: 8,
        death_reason: Some("wall")
    }
}

pub fn narrow_tie() -> ScriptedOutcome {
    ScriptedOutcome {
        verdict_a: "tied",
        score_a: 4,
        score_b: 4,
        rounds: 100,
        death_reason: None
    }
}

/// Expands a scripted outcome into the raw payload the runner would send for
/// this pairing
pub fn instantiate(outcome: &ScriptedOutcome, agent_a: &str, agent_b: &str) -> RawMatchResult {
    let verdict_b = match outcome.verdict_a {
        "won" => "lost",
        "lost" => "won",
        other => other
    };
    let mut death_reason = HashMap::new();
    if let Some(reason) = outcome.death_reason {
        let dead = if outcome.verdict_a == "lost" { agent_a } else { agent_b };
        death_reason.insert(dead.to_string(), reason.to_string());
    }

    RawMatchResult {
        scores: HashMap::from([(agent_a.to_string(), outcome.score_a), (agent_b.to_string(), outcome.score_b)]),
        results: HashMap::from([
            (agent_a.to_string(), outcome.verdict_a.to_string()),
            (agent_b.to_string(), verdict_b.to_string())
        ]),
        rounds_played: Some(outcome.rounds),
        death_reason
    }
}

enum ScriptItem {
    Outcome(ScriptedOutcome),
    Raw(RawMatchResult),
    Error(RunnerError),
    /// Never resolves; exercises the scheduler's per-match timeout
    Hang
}

#[derive(Default)]
struct ScriptState {
    script: Mutex<VecDeque<ScriptItem>>,
    requests: Mutex<Vec<MatchRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize
}

/// Match runner double that serves pre-scripted results in order and records
/// every request, so tests can assert strict sequencing
#[derive(Default)]
pub struct ScriptedRunner {
    state: Arc<ScriptState>
}

impl ScriptedRunner {
    pub fn new() -> ScriptedRunner {
        ScriptedRunner::default()
    }

    pub fn push(&self, outcome: ScriptedOutcome) {
        self.state.script.lock().unwrap().push_back(ScriptItem::Outcome(outcome));
    }

    pub fn push_raw(&self, raw: RawMatchResult) {
        self.state.script.lock().unwrap().push_back(ScriptItem::Raw(raw));
    }

    pub fn push_error(&self, error: RunnerError) {
        self.state.script.lock().unwrap().push_back(ScriptItem::Error(error));
    }

    pub fn push_hang(&self) {
        self.state.script.lock().unwrap().push_back(ScriptItem::Hang);
    }

    /// Handle that stays valid after the runner moves into the scheduler
    pub fn observer(&self) -> ScriptObserver {
        ScriptObserver {
            state: self.state.clone()
        }
    }
}

pub struct ScriptObserver {
    state: Arc<ScriptState>
}

impl ScriptObserver {
    pub fn requests(&self) -> Vec<MatchRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Highest number of matches ever running at the same time. A sequential
    /// scheduler keeps this at 1.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl MatchRunner for ScriptedRunner {
    fn run_match(&self, request: MatchRequest) -> BoxFuture<'_, Result<RawMatchResult, RunnerError>> {
        let state = self.state.clone();
        Box::pin(async move {
            let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_in_flight.fetch_max(current, Ordering::SeqCst);
            state.requests.lock().unwrap().push(request.clone());

            let item = state.script.lock().unwrap().pop_front();
            let result = match item {
                Some(ScriptItem::Outcome(outcome)) => Ok(instantiate(&outcome, &request.agent_a, &request.agent_b)),
                Some(ScriptItem::Raw(raw)) => Ok(raw),
                Some(ScriptItem::Error(error)) => Err(error),
                Some(ScriptItem::Hang) => {
                    // The pending future is dropped by the timeout, so the
                    // in-flight count has to come down first.
                    state.in_flight.fetch_sub(1, Ordering::SeqCst);
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
                None => Err(RunnerError::Runner("script exhausted".to_string()))
            };

            state.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}
