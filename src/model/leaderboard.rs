use std::cmp::Ordering;

use crate::model::{store::EstimateStore, structures::skill_estimate::SkillEstimate};
use itertools::Itertools;
use serde::Serialize;

/// One display-ready leaderboard row, derived entirely from the stored
/// estimate at read time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: String,
    pub mu: f64,
    pub sigma: f64,
    pub exposed: f64,
    pub display_score: f64,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub rank: i32,
    pub percentile: Option<f64>
}

/// Produces the full leaderboard: exposed rating descending, with games
/// played and then agent id breaking ties so equal ratings order stably.
pub fn ranked(store: &EstimateStore) -> Vec<AgentSummary> {
    let estimates = store.snapshot();
    let total = estimates.len() as i32;

    estimates
        .into_iter()
        .sorted_by(|a, b| compare(a, b))
        .enumerate()
        .map(|(index, estimate)| summarize(estimate, index as i32 + 1, total))
        .collect()
}

/// Min and max exposed rating across every agent except `excluded`, used to
/// seed placement intervals. `None` when no other agents exist.
pub fn spread_excluding(store: &EstimateStore, excluded: &str) -> Option<(f64, f64)> {
    store
        .snapshot()
        .iter()
        .filter(|estimate| estimate.agent_id != excluded)
        .map(|estimate| estimate.exposed())
        .fold(None, |acc, exposed| match acc {
            None => Some((exposed, exposed)),
            Some((low, high)) => Some((low.min(exposed), high.max(exposed)))
        })
}

/// Percentage of agents at or below this rank. `None` for ranks below 1.
pub fn percentile(rank: i32, total: i32) -> Option<f64> {
    if rank < 1 || total < 1 {
        return None;
    }

    Some((total - rank) as f64 / total as f64 * 100.0)
}

fn compare(a: &SkillEstimate, b: &SkillEstimate) -> Ordering {
    b.exposed()
        .partial_cmp(&a.exposed())
        .unwrap()
        .then_with(|| b.games_played.cmp(&a.games_played))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

fn summarize(estimate: SkillEstimate, rank: i32, total: i32) -> AgentSummary {
    AgentSummary {
        exposed: estimate.exposed(),
        display_score: estimate.display_score(),
        rank,
        percentile: percentile(rank, total),
        agent_id: estimate.agent_id,
        mu: estimate.mu,
        sigma: estimate.sigma,
        games_played: estimate.games_played,
        wins: estimate.wins,
        losses: estimate.losses,
        ties: estimate.ties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn estimate(agent_id: &str, mu: f64, sigma: f64, games_played: u32) -> SkillEstimate {
        SkillEstimate {
            agent_id: agent_id.to_string(),
            mu,
            sigma,
            games_played,
            wins: 0,
            losses: 0,
            ties: 0
        }
    }

    #[test]
    fn orders_by_exposed_rating_descending() {
        let store = EstimateStore::new();
        store.insert_or_update(estimate("mid", 25.0, 4.0, 10));
        store.insert_or_update(estimate("top", 32.0, 3.0, 10));
        store.insert_or_update(estimate("low", 20.0, 6.0, 10));

        let board = ranked(&store);

        let ids: Vec<&str> = board.iter().map(|row| row.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["top", "mid", "low"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[2].rank, 3);
    }

    #[test]
    fn equal_exposed_ratings_break_ties_deterministically() {
        let store = EstimateStore::new();
        store.insert_or_update(estimate("veteran", 30.0, 2.0, 40));
        store.insert_or_update(estimate("newcomer", 30.0, 2.0, 5));
        store.insert_or_update(estimate("alpha", 30.0, 2.0, 5));

        let board = ranked(&store);

        // More games first, then lexicographic id
        let ids: Vec<&str> = board.iter().map(|row| row.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["veteran", "alpha", "newcomer"]);
    }

    #[test]
    fn summaries_carry_derived_fields() {
        let store = EstimateStore::new();
        store.insert_or_update(estimate("a", 30.0, 2.0, 12));
        store.insert_or_update(estimate("b", 20.0, 5.0, 12));

        let board = ranked(&store);

        assert_abs_diff_eq!(board[0].exposed, 24.0);
        assert_abs_diff_eq!(board[0].display_score, 1200.0);
        assert_abs_diff_eq!(board[0].percentile.unwrap(), 50.0);
        assert_abs_diff_eq!(board[1].percentile.unwrap(), 0.0);
    }

    #[test]
    fn percentile_needs_a_valid_rank() {
        assert_eq!(percentile(0, 10), None);
        assert_eq!(percentile(1, 0), None);
        assert_abs_diff_eq!(percentile(1, 4).unwrap(), 75.0);
    }

    #[test]
    fn empty_store_ranks_to_an_empty_board() {
        let store = EstimateStore::new();

        assert!(ranked(&store).is_empty());
    }

    #[test]
    fn spread_ignores_the_excluded_agent() {
        let store = EstimateStore::new();
        store.insert_or_update(estimate("fresh", 25.0, 25.0 / 3.0, 0));
        store.insert_or_update(estimate("a", 30.0, 2.0, 12));
        store.insert_or_update(estimate("b", 22.0, 3.0, 9));

        let (low, high) = spread_excluding(&store, "fresh").unwrap();

        assert_abs_diff_eq!(low, 13.0);
        assert_abs_diff_eq!(high, 24.0);
    }

    #[test]
    fn spread_is_none_when_no_one_else_exists() {
        let store = EstimateStore::new();
        store.insert_or_update(estimate("fresh", 25.0, 25.0 / 3.0, 0));

        assert_eq!(spread_excluding(&store, "fresh"), None);
    }
}
