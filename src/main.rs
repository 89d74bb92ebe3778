use std::{sync::Arc, time::Duration};

use arena_processor::{
    args::Args,
    database::db::DbClient,
    messaging::{BatchProcessedMessage, RabbitMqConfig, RabbitMqPublisher},
    model::{leaderboard, placement::PlacementConfig, store::EstimateStore},
    scheduler::{
        events::{EventSink, ProgressEvent},
        random_opponents,
        runner::{GameConfig, HttpMatchRunner},
        BatchConfig, CancelFlag, MatchScheduler
    },
    utils::progress_utils::progress_bar
};
use clap::Parser;
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenv().ok();
    let args = Args::parse();

    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();

    let db = DbClient::connect(&args.connection_string)
        .await
        .expect("Expected database connection to succeed");
    db.ensure_schema().await.expect("Expected schema creation to succeed");

    let store = Arc::new(EstimateStore::new());
    let estimates = db.get_estimates().await.expect("Expected estimates to load");
    info!(agents = estimates.len(), "Loaded estimates");
    for estimate in estimates {
        store.insert_or_update(estimate);
    }

    let runner = Arc::new(HttpMatchRunner::new(&args.runner_url));
    let scheduler = MatchScheduler::new(runner, store.clone())
        .with_placement_config(PlacementConfig {
            max_games: args.max_games,
            ..PlacementConfig::default()
        })
        .with_database(db.clone());

    let session = db
        .get_placement_session(&args.agent)
        .await
        .expect("Expected placement session lookup to succeed");
    if let Some(session) = session {
        if session.is_active() {
            info!(agent_id = %args.agent, games_played = session.games_played, "Resuming placement session");
            scheduler.restore_session(session);
        }
    }

    let config = BatchConfig {
        game: GameConfig {
            board_width: args.board_width,
            board_height: args.board_height,
            max_rounds: args.max_rounds,
            num_apples: args.num_apples
        },
        match_timeout: Duration::from_secs(args.match_timeout_secs)
    };

    // Ctrl-C requests a stop between matches; the in-flight game still rates
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing the current match before stopping");
                cancel.cancel();
            }
        });
    }

    let (events, mut rx) = EventSink::channel();
    let progress = tokio::spawn(async move {
        let mut bar = None;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::BatchInit { total, .. } => {
                    bar = Some(progress_bar(total as u64, "Rating matches".to_string()));
                }
                ProgressEvent::MatchComplete { .. } | ProgressEvent::BatchError { .. } => {
                    if let Some(bar) = &bar {
                        bar.inc(1);
                    }
                }
                ProgressEvent::BatchComplete { .. } => {
                    if let Some(bar) = bar.take() {
                        bar.finish_and_clear();
                    }
                }
                _ => {}
            }
        }
    });

    let agent_games = store.get_or_create(&args.agent).games_played;
    let summary = if !args.opponents.is_empty() {
        scheduler
            .run_batch(&args.agent, &args.opponents, &config, &cancel, &events)
            .await
    } else if agent_games == 0 || args.replace {
        scheduler.run_placement(&args.agent, &config, &cancel, &events).await
    } else {
        let pool: Vec<String> = store
            .snapshot()
            .into_iter()
            .map(|estimate| estimate.agent_id)
            .filter(|id| id != &args.agent)
            .collect();
        let opponents = random_opponents(&pool, args.batch_size, &mut rand::rng());
        scheduler
            .run_batch(&args.agent, &opponents, &config, &cancel, &events)
            .await
    };

    drop(events);
    let _ = progress.await;

    info!(
        completed = summary.completed_matches,
        failed = summary.failed_matches,
        cancelled = summary.cancelled,
        "Processing finished"
    );

    if args.publish {
        match RabbitMqPublisher::connect(&RabbitMqConfig::from_env()).await {
            Ok(publisher) => {
                let message = BatchProcessedMessage::from_summary(&args.agent, &summary);
                if let Err(e) = publisher.publish_batch_processed(message).await {
                    warn!(error = %e, "Failed to publish batch processed message");
                }
                if let Err(e) = publisher.close().await {
                    warn!(error = %e, "Failed to close RabbitMQ connection");
                }
            }
            Err(e) => warn!(error = %e, "Could not reach RabbitMQ, skipping publish")
        }
    }

    println!();
    println!(" # {:<24} {:>10} {:>7} {:>5} {:>5} {:>5}", "Agent", "Score", "Games", "W", "L", "T");
    for row in leaderboard::ranked(&store) {
        println!(
            "{:>2} {:<24} {:>10.1} {:>7} {:>5} {:>5} {:>5}",
            row.rank, row.agent_id, row.display_score, row.games_played, row.wins, row.losses, row.ties
        );
    }
}
