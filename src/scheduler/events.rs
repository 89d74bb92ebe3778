use crate::model::{rating::RatedMatch, structures::match_outcome::MatchOutcome};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Rating movement of one side of a match, as exposed to progress consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingMovement {
    pub agent_id: String,
    pub mu_before: f64,
    pub mu_after: f64,
    pub sigma_before: f64,
    pub sigma_after: f64,
    pub exposed_after: f64
}

/// Payload of `batch.match.complete`: the canonical outcome plus the rating
/// movement it caused
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMatch {
    pub outcome: MatchOutcome,
    pub confidence: f64,
    pub fluky_loss: bool,
    pub rating_a: RatingMovement,
    pub rating_b: RatingMovement
}

impl CompletedMatch {
    pub fn from_rated(outcome: MatchOutcome, rated: &RatedMatch) -> CompletedMatch {
        CompletedMatch {
            outcome,
            confidence: rated.confidence,
            fluky_loss: rated.fluky_loss,
            rating_a: movement(rated, true),
            rating_b: movement(rated, false)
        }
    }
}

fn movement(rated: &RatedMatch, side_a: bool) -> RatingMovement {
    let (before, after) = if side_a {
        (&rated.before_a, &rated.after_a)
    } else {
        (&rated.before_b, &rated.after_b)
    };

    RatingMovement {
        agent_id: after.agent_id.clone(),
        mu_before: before.mu,
        mu_after: after.mu,
        sigma_before: before.sigma,
        sigma_after: after.sigma,
        exposed_after: after.exposed()
    }
}

/// Everything a batch reports while it runs. The `type` strings are a wire
/// contract; frontends key on them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    #[serde(rename = "batch.init", rename_all = "camelCase")]
    BatchInit { agent_id: String, total: usize },
    #[serde(rename = "batch.match.start", rename_all = "camelCase")]
    MatchStart {
        index: usize,
        total: usize,
        agent_id: String,
        opponent: String
    },
    #[serde(rename = "batch.match.complete", rename_all = "camelCase")]
    MatchComplete { index: usize, result: Box<CompletedMatch> },
    #[serde(rename = "batch.error", rename_all = "camelCase")]
    BatchError { index: usize, error: String },
    #[serde(rename = "batch.complete", rename_all = "camelCase")]
    BatchComplete {
        total: usize,
        completed_matches: usize,
        failed_matches: usize
    }
}

/// Fan-out handle for progress events.
///
/// A slow or dropped consumer must never stall a batch, so the channel is
/// unbounded and a failed send only logs. `disabled` gives fire-and-forget
/// runs a sink that swallows everything.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<ProgressEvent>>
}

impl EventSink {
    pub fn channel() -> (EventSink, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> EventSink {
        EventSink { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        debug!(event = ?event, "Progress");
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("Progress consumer went away, event dropped");
            }
        }
    }
}
