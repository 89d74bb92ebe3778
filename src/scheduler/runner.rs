use crate::model::ingest::RawMatchResult;
use futures::future::BoxFuture;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Board parameters forwarded verbatim to the match runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub board_width: u32,
    pub board_height: u32,
    pub max_rounds: u32,
    pub num_apples: u32
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            board_width: 20,
            board_height: 20,
            max_rounds: 100,
            num_apples: 5
        }
    }
}

/// One game the scheduler wants played
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub agent_a: String,
    pub agent_b: String,
    pub config: GameConfig
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Match runner request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Match runner returned an unreadable result: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Match runner reported a failure: {0}")]
    Runner(String),
    #[error("Match timed out after {0} seconds")]
    Timeout(u64)
}

/// Boundary to the external service that actually plays games. Implemented
/// over HTTP in production; tests script it.
pub trait MatchRunner: Send + Sync {
    fn run_match(&self, request: MatchRequest) -> BoxFuture<'_, Result<RawMatchResult, RunnerError>>;
}

/// Drives matches through the runner's HTTP API
pub struct HttpMatchRunner {
    client: Client,
    base_url: String
}

impl HttpMatchRunner {
    pub fn new(base_url: &str) -> HttpMatchRunner {
        let client = ClientBuilder::new().build().expect("Expected valid client configuration");

        HttpMatchRunner {
            client,
            base_url: base_url.trim_end_matches('/').to_string()
        }
    }
}

impl MatchRunner for HttpMatchRunner {
    fn run_match(&self, request: MatchRequest) -> BoxFuture<'_, Result<RawMatchResult, RunnerError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(format!("{}/matches", self.base_url))
                .json(&request)
                .send()
                .await?
                .error_for_status()?;

            let body = response.text().await?;
            let raw: RawMatchResult = serde_json::from_str(&body)?;

            Ok(raw)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized_away() {
        let runner = HttpMatchRunner::new("http://localhost:9000/");

        assert_eq!(runner.base_url, "http://localhost:9000");
    }

    #[test]
    fn request_serializes_with_the_runner_contract() {
        let request = MatchRequest {
            agent_a: "a".to_string(),
            agent_b: "b".to_string(),
            config: GameConfig::default()
        };

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["agentA"], "a");
        assert_eq!(json["config"]["boardWidth"], 20);
        assert_eq!(json["config"]["numApples"], 5);
    }
}
