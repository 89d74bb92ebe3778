pub mod events;
pub mod runner;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex
};
use std::time::Duration;

use crate::{
    database::db::DbClient,
    model::{
        ingest::{self, ValidationError},
        leaderboard,
        placement::{OpponentCandidate, PlacementConfig, PlacementController, PlacementDecision},
        rating::{InvariantViolation, RatedMatch, RatingEngine},
        store::EstimateStore,
        structures::{match_outcome::MatchOutcome, placement_session::PlacementSession}
    }
};
use events::{CompletedMatch, EventSink, ProgressEvent};
use rand::seq::IndexedRandom;
use runner::{MatchRequest, MatchRunner, RunnerError};
use serde::Serialize;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Cooperative cancellation, checked between matches and never mid-match so
/// an in-flight game always finishes and rates
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub game: runner::GameConfig,
    /// Per-match wall clock budget; an elapsed timer counts the match as
    /// failed and moves on
    pub match_timeout: Duration
}

impl Default for BatchConfig {
    fn default() -> BatchConfig {
        BatchConfig {
            game: runner::GameConfig::default(),
            match_timeout: Duration::from_secs(120)
        }
    }
}

/// Terminal accounting for one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub completed_matches: usize,
    pub failed_matches: usize,
    pub cancelled: bool
}

#[derive(Debug, Error)]
enum MatchFailure {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation)
}

/// Runs batches of matches strictly one at a time.
///
/// Sequencing is the point: each match's rating update is applied before the
/// next match starts, so later opponent selections see the movement earlier
/// games caused. Concurrency lives across batches for different agents, not
/// within one.
pub struct MatchScheduler {
    runner: Arc<dyn MatchRunner>,
    store: Arc<EstimateStore>,
    engine: RatingEngine,
    placement: Mutex<PlacementController>,
    db: Option<DbClient>
}

impl MatchScheduler {
    pub fn new(runner: Arc<dyn MatchRunner>, store: Arc<EstimateStore>) -> MatchScheduler {
        MatchScheduler {
            runner,
            store,
            engine: RatingEngine::default(),
            placement: Mutex::new(PlacementController::default()),
            db: None
        }
    }

    /// Persist estimates and sessions through this database after each match
    pub fn with_database(mut self, db: DbClient) -> MatchScheduler {
        self.db = Some(db);
        self
    }

    pub fn with_placement_config(mut self, config: PlacementConfig) -> MatchScheduler {
        self.placement = Mutex::new(PlacementController::new(config));
        self
    }

    /// Rehydrates an interrupted placement session before running
    pub fn restore_session(&self, session: PlacementSession) {
        self.placement.lock().expect("Placement lock poisoned").restore(session);
    }

    /// Plays `agent_id` against a fixed opponent list, in order.
    ///
    /// A failed match is logged, reported and skipped; it never aborts the
    /// batch. Cancellation is honored between matches. Exactly one
    /// `batch.complete` event is emitted no matter how the batch ends.
    pub async fn run_batch(
        &self,
        agent_id: &str,
        opponents: &[String],
        config: &BatchConfig,
        cancel: &CancelFlag,
        events: &EventSink
    ) -> BatchSummary {
        events.emit(ProgressEvent::BatchInit {
            agent_id: agent_id.to_string(),
            total: opponents.len()
        });
        info!(agent_id, matches = opponents.len(), "Starting batch");

        let mut completed_matches = 0;
        let mut failed_matches = 0;
        let mut cancelled = false;

        for (index, opponent) in opponents.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(agent_id, remaining = opponents.len() - index, "Batch cancelled between matches");
                cancelled = true;
                break;
            }

            match self.execute_match(index, opponents.len(), agent_id, opponent, config, events).await {
                Ok(_) => completed_matches += 1,
                Err(_) => failed_matches += 1
            }
        }

        let summary = BatchSummary {
            total: opponents.len(),
            completed_matches,
            failed_matches,
            cancelled
        };
        events.emit(ProgressEvent::BatchComplete {
            total: summary.total,
            completed_matches,
            failed_matches
        });
        info!(agent_id, completed_matches, failed_matches, cancelled, "Batch finished");

        summary
    }

    /// Places a fresh (or re-placed) agent: opponents are chosen adaptively
    /// by the placement controller after every result, instead of coming
    /// from a fixed list.
    pub async fn run_placement(
        &self,
        agent_id: &str,
        config: &BatchConfig,
        cancel: &CancelFlag,
        events: &EventSink
    ) -> BatchSummary {
        let prior = self.store.get_or_create(agent_id);
        let (max_games, max_rematches) = {
            let mut placement = self.placement.lock().expect("Placement lock poisoned");
            let spread = leaderboard::spread_excluding(&self.store, agent_id);
            let session = placement.begin(agent_id, spread, prior.exposed());
            info!(
                agent_id,
                interval_low = session.rating_interval_low,
                interval_high = session.rating_interval_high,
                "Placement session open"
            );
            (placement.config().max_games, placement.config().max_rematches)
        };
        events.emit(ProgressEvent::BatchInit {
            agent_id: agent_id.to_string(),
            total: max_games as usize
        });

        // Failed matches consume no placement slot, so a wedged runner needs
        // a separate attempt cap to keep the loop finite.
        let attempt_cap = (2 * max_games + max_rematches) as usize;

        let mut attempts = 0;
        let mut completed_matches = 0;
        let mut failed_matches = 0;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                warn!(agent_id, "Placement cancelled between matches");
                cancelled = true;
                break;
            }
            if attempts >= attempt_cap {
                warn!(agent_id, attempts, "Giving up on placement, too many failed matches");
                break;
            }

            let sigma = self.store.get_or_create(agent_id).sigma;
            let candidates = self.candidates_for(agent_id);
            let decision = {
                let mut placement = self.placement.lock().expect("Placement lock poisoned");
                placement.next_action(agent_id, sigma, &candidates)
            };
            let opponent = match decision {
                PlacementDecision::Continue { opponent } => opponent,
                PlacementDecision::Rematch { opponent } => {
                    info!(agent_id, %opponent, "Rematch granted after fluky loss");
                    opponent
                }
                PlacementDecision::Stable => break
            };

            let opponent_exposed = self.store.get_or_create(&opponent).exposed();
            let index = attempts;
            attempts += 1;

            match self.execute_match(index, max_games as usize, agent_id, &opponent, config, events).await {
                Ok((outcome, rated)) => {
                    completed_matches += 1;
                    {
                        let mut placement = self.placement.lock().expect("Placement lock poisoned");
                        placement.record_result(
                            agent_id,
                            &opponent,
                            opponent_exposed,
                            outcome.result,
                            rated.confidence,
                            rated.fluky_loss
                        );
                    }
                    self.persist_session(agent_id).await;
                }
                Err(_) => failed_matches += 1
            }
        }

        let summary = BatchSummary {
            total: attempts,
            completed_matches,
            failed_matches,
            cancelled
        };
        events.emit(ProgressEvent::BatchComplete {
            total: summary.total,
            completed_matches,
            failed_matches
        });
        self.persist_session(agent_id).await;
        info!(agent_id, completed_matches, failed_matches, cancelled, "Placement finished");

        summary
    }

    pub fn placement_session(&self, agent_id: &str) -> Option<PlacementSession> {
        self.placement
            .lock()
            .expect("Placement lock poisoned")
            .session(agent_id)
            .cloned()
    }

    /// One match end to end: run, normalize, rate, persist, report. Failure
    /// at any stage emits `batch.error` and leaves ratings untouched.
    async fn execute_match(
        &self,
        index: usize,
        total: usize,
        agent_id: &str,
        opponent: &str,
        config: &BatchConfig,
        events: &EventSink
    ) -> Result<(MatchOutcome, RatedMatch), MatchFailure> {
        events.emit(ProgressEvent::MatchStart {
            index,
            total,
            agent_id: agent_id.to_string(),
            opponent: opponent.to_string()
        });

        let request = MatchRequest {
            agent_a: agent_id.to_string(),
            agent_b: opponent.to_string(),
            config: config.game.clone()
        };

        let raw = match timeout(config.match_timeout, self.runner.run_match(request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(error)) => {
                warn!(agent_id, opponent, %error, "Match failed, continuing with the next opponent");
                return Err(self.fail(index, events, error.into()));
            }
            Err(_) => {
                let error = RunnerError::Timeout(config.match_timeout.as_secs());
                warn!(agent_id, opponent, %error, "Match timed out, continuing with the next opponent");
                return Err(self.fail(index, events, error.into()));
            }
        };

        let outcome = match ingest::normalize(agent_id, opponent, &raw) {
            Ok(outcome) => outcome,
            Err(error) => {
                if error.is_fatal() {
                    error!(agent_id, opponent, %error, "Runner violated its result contract");
                } else {
                    warn!(agent_id, opponent, %error, "Skipping unusable result");
                }
                return Err(self.fail(index, events, error.into()));
            }
        };

        let rated = match self.store.apply_outcome(&self.engine, &outcome) {
            Ok(rated) => rated,
            Err(violation) => return Err(self.fail(index, events, violation.into()))
        };

        if let Some(db) = &self.db {
            // The in-memory update already happened; a persistence hiccup on
            // one match must not fail the batch.
            if let Err(error) = db.save_estimate_pair(&rated.after_a, &rated.after_b).await {
                warn!(%error, "Failed to persist estimates");
            }
        }

        info!(
            agent_id,
            opponent,
            result = ?outcome.result,
            confidence = rated.confidence,
            mu = rated.after_a.mu,
            "Match rated"
        );
        events.emit(ProgressEvent::MatchComplete {
            index,
            result: Box::new(CompletedMatch::from_rated(outcome.clone(), &rated))
        });

        Ok((outcome, rated))
    }

    fn fail(&self, index: usize, events: &EventSink, failure: MatchFailure) -> MatchFailure {
        events.emit(ProgressEvent::BatchError {
            index,
            error: failure.to_string()
        });
        failure
    }

    fn candidates_for(&self, agent_id: &str) -> Vec<OpponentCandidate> {
        self.store
            .snapshot()
            .into_iter()
            .filter(|estimate| estimate.agent_id != agent_id)
            .map(|estimate| OpponentCandidate {
                exposed: estimate.exposed(),
                agent_id: estimate.agent_id
            })
            .collect()
    }

    async fn persist_session(&self, agent_id: &str) {
        let Some(db) = &self.db else { return };
        let session = self.placement_session(agent_id);
        if let Some(session) = session {
            if let Err(error) = db.save_placement_session(&session).await {
                warn!(%error, agent_id, "Failed to persist placement session");
            }
        }
    }
}

/// Draws distinct random opponents for an established agent's batch
pub fn random_opponents<R: rand::Rng + ?Sized>(pool: &[String], count: usize, rng: &mut R) -> Vec<String> {
    pool.choose_multiple(rng, count).cloned().collect()
}
