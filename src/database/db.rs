use std::sync::Arc;

use crate::model::structures::{
    placement_session::{PlacementPhase, PlacementSession},
    skill_estimate::SkillEstimate
};
use postgres_types::ToSql;
use tokio_postgres::{Client, Error, NoTls, Row};
use tracing::error;

/// Thin asynchronous wrapper over the ratings database
#[derive(Clone)]
pub struct DbClient {
    client: Arc<Client>
}

impl DbClient {
    pub async fn connect(connection_str: &str) -> Result<DbClient, Error> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Database connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(client)
        })
    }

    /// Creates the tables this process needs if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.client.batch_execute(include_str!("schema.sql")).await
    }

    pub async fn get_estimates(&self) -> Result<Vec<SkillEstimate>, Error> {
        let rows = self
            .client
            .query(
                "SELECT agent_id, mu, sigma, games_played, wins, losses, ties FROM agent_ratings",
                &[]
            )
            .await?;

        Ok(rows.iter().map(estimate_from_row).collect())
    }

    pub async fn get_estimate(&self, agent_id: &str) -> Result<Option<SkillEstimate>, Error> {
        let row = self
            .client
            .query_opt(
                "SELECT agent_id, mu, sigma, games_played, wins, losses, ties FROM agent_ratings WHERE agent_id = $1",
                &[&agent_id]
            )
            .await?;

        Ok(row.as_ref().map(estimate_from_row))
    }

    pub async fn save_estimate(&self, estimate: &SkillEstimate) -> Result<(), Error> {
        let query = "INSERT INTO agent_ratings (agent_id, mu, sigma, games_played, wins, losses, ties)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (agent_id) DO UPDATE SET
                 mu = EXCLUDED.mu, sigma = EXCLUDED.sigma, games_played = EXCLUDED.games_played,
                 wins = EXCLUDED.wins, losses = EXCLUDED.losses, ties = EXCLUDED.ties, updated_at = now()";
        let (games_played, wins, losses, ties) = counters(estimate);
        let values: &[&(dyn ToSql + Sync)] =
            &[&estimate.agent_id, &estimate.mu, &estimate.sigma, &games_played, &wins, &losses, &ties];

        self.client.execute(query, values).await?;

        Ok(())
    }

    /// Writes both sides of a rated match in one statement, so a reader never
    /// observes one update without the other
    pub async fn save_estimate_pair(&self, a: &SkillEstimate, b: &SkillEstimate) -> Result<(), Error> {
        let query = "INSERT INTO agent_ratings (agent_id, mu, sigma, games_played, wins, losses, ties)
             VALUES ($1, $2, $3, $4, $5, $6, $7), ($8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (agent_id) DO UPDATE SET
                 mu = EXCLUDED.mu, sigma = EXCLUDED.sigma, games_played = EXCLUDED.games_played,
                 wins = EXCLUDED.wins, losses = EXCLUDED.losses, ties = EXCLUDED.ties, updated_at = now()";
        let (games_played_a, wins_a, losses_a, ties_a) = counters(a);
        let (games_played_b, wins_b, losses_b, ties_b) = counters(b);
        let values: &[&(dyn ToSql + Sync)] = &[
            &a.agent_id,
            &a.mu,
            &a.sigma,
            &games_played_a,
            &wins_a,
            &losses_a,
            &ties_a,
            &b.agent_id,
            &b.mu,
            &b.sigma,
            &games_played_b,
            &wins_b,
            &losses_b,
            &ties_b
        ];

        self.client.execute(query, values).await?;

        Ok(())
    }

    pub async fn get_placement_session(&self, agent_id: &str) -> Result<Option<PlacementSession>, Error> {
        let row = self
            .client
            .query_opt(
                "SELECT agent_id, phase, games_played, max_games, rating_interval_low, rating_interval_high,
                        rematch_count, win_streak, recent_opponents, pending_rematch
                 FROM placement_sessions WHERE agent_id = $1",
                &[&agent_id]
            )
            .await?;

        Ok(row.as_ref().map(session_from_row))
    }

    pub async fn save_placement_session(&self, session: &PlacementSession) -> Result<(), Error> {
        let query = "INSERT INTO placement_sessions (agent_id, phase, games_played, max_games, rating_interval_low,
                    rating_interval_high, rematch_count, win_streak, recent_opponents, pending_rematch)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (agent_id) DO UPDATE SET
                 phase = EXCLUDED.phase, games_played = EXCLUDED.games_played, max_games = EXCLUDED.max_games,
                 rating_interval_low = EXCLUDED.rating_interval_low,
                 rating_interval_high = EXCLUDED.rating_interval_high, rematch_count = EXCLUDED.rematch_count,
                 win_streak = EXCLUDED.win_streak, recent_opponents = EXCLUDED.recent_opponents,
                 pending_rematch = EXCLUDED.pending_rematch, updated_at = now()";
        let values: &[&(dyn ToSql + Sync)] = &[
            &session.agent_id,
            &(session.phase as i16),
            &(session.games_played as i32),
            &(session.max_games as i32),
            &session.rating_interval_low,
            &session.rating_interval_high,
            &(session.rematch_count as i32),
            &(session.win_streak as i32),
            &session.recent_opponents,
            &session.pending_rematch
        ];

        self.client.execute(query, values).await?;

        Ok(())
    }
}

fn counters(estimate: &SkillEstimate) -> (i32, i32, i32, i32) {
    (
        estimate.games_played as i32,
        estimate.wins as i32,
        estimate.losses as i32,
        estimate.ties as i32
    )
}

fn estimate_from_row(row: &Row) -> SkillEstimate {
    SkillEstimate {
        agent_id: row.get("agent_id"),
        mu: row.get("mu"),
        sigma: row.get("sigma"),
        games_played: row.get::<_, i32>("games_played") as u32,
        wins: row.get::<_, i32>("wins") as u32,
        losses: row.get::<_, i32>("losses") as u32,
        ties: row.get::<_, i32>("ties") as u32
    }
}

fn session_from_row(row: &Row) -> PlacementSession {
    PlacementSession {
        agent_id: row.get("agent_id"),
        phase: PlacementPhase::try_from(row.get::<_, i16>("phase")).expect("Invalid placement phase in storage"),
        games_played: row.get::<_, i32>("games_played") as u32,
        max_games: row.get::<_, i32>("max_games") as u32,
        rating_interval_low: row.get("rating_interval_low"),
        rating_interval_high: row.get("rating_interval_high"),
        rematch_count: row.get::<_, i32>("rematch_count") as u32,
        win_streak: row.get::<_, i32>("win_streak") as u32,
        recent_opponents: row.get("recent_opponents"),
        pending_rematch: row.get("pending_rematch")
    }
}
