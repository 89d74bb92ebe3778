use std::sync::{Arc, Mutex, RwLock};

use crate::model::{
    rating::{InvariantViolation, RatedMatch, RatingEngine},
    structures::{match_outcome::MatchOutcome, skill_estimate::SkillEstimate}
};
use indexmap::IndexMap;
use tracing::error;

/// Shared collection of skill estimates with one lock per agent.
///
/// The outer map lock is only ever held for lookups and insertions, never
/// across a rating computation, so concurrent updates to unrelated agents do
/// not contend. A pair update locks exactly its two rows, lowest agent id
/// first, which rules out deadlock between overlapping pairs.
#[derive(Default)]
pub struct EstimateStore {
    rows: RwLock<IndexMap<String, Arc<Mutex<SkillEstimate>>>>
}

impl EstimateStore {
    pub fn new() -> EstimateStore {
        EstimateStore::default()
    }

    /// Seeds or replaces an agent's estimate, typically from storage at startup
    pub fn insert_or_update(&self, estimate: SkillEstimate) {
        let mut rows = self.rows.write().expect("Estimate map lock poisoned");
        match rows.get(&estimate.agent_id) {
            Some(row) => {
                let mut guard = row.lock().expect("Estimate row lock poisoned");
                *guard = estimate;
            }
            None => {
                rows.insert(estimate.agent_id.clone(), Arc::new(Mutex::new(estimate)));
            }
        }
    }

    /// Current estimate for an agent, if one exists
    pub fn get(&self, agent_id: &str) -> Option<SkillEstimate> {
        let rows = self.rows.read().expect("Estimate map lock poisoned");

        rows.get(agent_id)
            .map(|row| row.lock().expect("Estimate row lock poisoned").clone())
    }

    /// Current estimate for an agent, creating the default belief on first
    /// sight
    pub fn get_or_create(&self, agent_id: &str) -> SkillEstimate {
        self.row(agent_id).lock().expect("Estimate row lock poisoned").clone()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.rows.read().expect("Estimate map lock poisoned").contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.rows.read().expect("Estimate map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of every estimate, in insertion order
    pub fn snapshot(&self) -> Vec<SkillEstimate> {
        let rows = self.rows.read().expect("Estimate map lock poisoned");

        rows.values()
            .map(|row| row.lock().expect("Estimate row lock poisoned").clone())
            .collect()
    }

    /// Applies one rated outcome to both participants atomically.
    ///
    /// Both rows stay locked for the duration of the read-modify-write, so a
    /// concurrent reader sees either neither update or both. A rejected
    /// update leaves both estimates exactly as they were.
    pub fn apply_outcome(&self, engine: &RatingEngine, outcome: &MatchOutcome) -> Result<RatedMatch, InvariantViolation> {
        if outcome.agent_a == outcome.agent_b {
            return Err(InvariantViolation::SelfRating {
                agent_id: outcome.agent_a.clone()
            });
        }

        let row_a = self.row(&outcome.agent_a);
        let row_b = self.row(&outcome.agent_b);

        let a_first = outcome.agent_a < outcome.agent_b;
        let (first, second) = if a_first { (&row_a, &row_b) } else { (&row_b, &row_a) };

        let mut first_guard = first.lock().expect("Estimate row lock poisoned");
        let mut second_guard = second.lock().expect("Estimate row lock poisoned");

        let (prior_a, prior_b) = if a_first {
            (first_guard.clone(), second_guard.clone())
        } else {
            (second_guard.clone(), first_guard.clone())
        };

        let rated = match engine.rate(&prior_a, &prior_b, outcome) {
            Ok(rated) => rated,
            Err(violation) => {
                error!(error = %violation, "Rating update rejected, estimates left untouched");
                return Err(violation);
            }
        };

        if a_first {
            *first_guard = rated.after_a.clone();
            *second_guard = rated.after_b.clone();
        } else {
            *first_guard = rated.after_b.clone();
            *second_guard = rated.after_a.clone();
        }

        Ok(rated)
    }

    fn row(&self, agent_id: &str) -> Arc<Mutex<SkillEstimate>> {
        {
            let rows = self.rows.read().expect("Estimate map lock poisoned");
            if let Some(row) = rows.get(agent_id) {
                return row.clone();
            }
        }

        let mut rows = self.rows.write().expect("Estimate map lock poisoned");
        rows.entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SkillEstimate::new(agent_id))))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::structures::match_outcome::{MatchResultKind, TerminationReason};
    use approx::assert_abs_diff_eq;

    fn decisive(agent_a: &str, agent_b: &str) -> MatchOutcome {
        MatchOutcome {
            agent_a: agent_a.to_string(),
            agent_b: agent_b.to_string(),
            result: MatchResultKind::Won,
            score_a: 12,
            score_b: 0,
            termination_reason: TerminationReason::CollisionOpponent,
            rounds_played: 40,
            score_consistent: true
        }
    }

    #[test]
    fn unknown_agents_get_the_default_belief() {
        let store = EstimateStore::new();

        assert_eq!(store.get("a"), None);
        let created = store.get_or_create("a");

        assert_abs_diff_eq!(created.mu, 25.0);
        assert!(store.contains("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn apply_outcome_updates_both_sides() {
        let store = EstimateStore::new();
        let engine = RatingEngine::default();

        let rated = store.apply_outcome(&engine, &decisive("a", "b")).unwrap();

        assert_eq!(store.get("a").unwrap(), rated.after_a);
        assert_eq!(store.get("b").unwrap(), rated.after_b);
        assert!(store.get("a").unwrap().mu > 25.0);
        assert_eq!(store.get("b").unwrap().games_played, 1);
    }

    #[test]
    fn lock_order_is_by_id_not_by_outcome_orientation() {
        let store = EstimateStore::new();
        let engine = RatingEngine::default();

        // b beats a: the outcome names "b" first but "a" must still be locked
        // first, and each update must land on the right agent.
        let rated = store.apply_outcome(&engine, &decisive("b", "a")).unwrap();

        assert!(store.get("b").unwrap().mu > 25.0);
        assert!(store.get("a").unwrap().mu < 25.0);
        assert_eq!(rated.after_a.agent_id, "b");
    }

    #[test]
    fn self_play_outcome_is_rejected_before_locking() {
        let store = EstimateStore::new();
        let engine = RatingEngine::default();

        let result = store.apply_outcome(&engine, &decisive("a", "a"));

        assert!(matches!(result, Err(InvariantViolation::SelfRating { .. })));
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn rejected_update_leaves_estimates_untouched() {
        let store = EstimateStore::new();
        let engine = RatingEngine::default();
        store.insert_or_update(SkillEstimate {
            sigma: f64::NAN,
            ..SkillEstimate::new("b")
        });

        let result = store.apply_outcome(&engine, &decisive("a", "b"));

        assert!(result.is_err());
        assert_eq!(store.get("a").unwrap().games_played, 0);
        assert!(store.get("b").unwrap().sigma.is_nan());
    }

    #[test]
    fn insert_or_update_replaces_in_place() {
        let store = EstimateStore::new();
        store.insert_or_update(SkillEstimate::new("a"));
        store.insert_or_update(SkillEstimate {
            mu: 30.0,
            ..SkillEstimate::new("a")
        });

        assert_eq!(store.len(), 1);
        assert_abs_diff_eq!(store.get("a").unwrap().mu, 30.0);
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let store = EstimateStore::new();
        for id in ["c", "a", "b"] {
            store.insert_or_update(SkillEstimate::new(id));
        }

        let ids: Vec<String> = store.snapshot().into_iter().map(|e| e.agent_id).collect();

        assert_eq!(ids, vec!["c".to_string(), "a".to_string(), "b".to_string()]);
    }

    #[test]
    fn concurrent_disjoint_updates_all_land() {
        let store = Arc::new(EstimateStore::new());

        std::thread::scope(|scope| {
            for pair in [("a", "b"), ("c", "d"), ("e", "f"), ("g", "h")] {
                let store = store.clone();
                scope.spawn(move || {
                    let engine = RatingEngine::default();
                    for _ in 0..50 {
                        store.apply_outcome(&engine, &decisive(pair.0, pair.1)).unwrap();
                    }
                });
            }
        });

        for id in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            assert_eq!(store.get(id).unwrap().games_played, 50);
        }
    }

    #[test]
    fn concurrent_overlapping_pairs_do_not_deadlock() {
        let store = Arc::new(EstimateStore::new());

        // a-b and b-a in opposite orientations from two threads exercise the
        // sorted lock order.
        std::thread::scope(|scope| {
            for pair in [("a", "b"), ("b", "a")] {
                let store = store.clone();
                scope.spawn(move || {
                    let engine = RatingEngine::default();
                    for _ in 0..100 {
                        store.apply_outcome(&engine, &decisive(pair.0, pair.1)).unwrap();
                    }
                });
            }
        });

        let total: u32 = store.snapshot().iter().map(|e| e.games_played).sum();
        assert_eq!(total, 400);
    }
}
