use arena_processor::{
    model::{
        leaderboard,
        placement::{select_opponent, OpponentCandidate, PlacementConfig},
        rating::RatingEngine,
        store::EstimateStore,
        structures::{
            match_outcome::{MatchOutcome, MatchResultKind, TerminationReason},
            placement_session::PlacementSession
        }
    },
    utils::test_utils::generate_pool
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

pub fn criterion_benchmark(c: &mut Criterion) {
    let engine = RatingEngine::default();
    let pool = generate_pool(1000);
    let a = pool[0].clone();
    let b = pool[1].clone();
    let outcome = MatchOutcome {
        agent_a: a.agent_id.clone(),
        agent_b: b.agent_id.clone(),
        result: MatchResultKind::Won,
        score_a: 12,
        score_b: 3,
        termination_reason: TerminationReason::CollisionOpponent,
        rounds_played: 47,
        score_consistent: true
    };

    c.bench_function("rate_match", |bench| {
        bench.iter(|| engine.rate(black_box(&a), black_box(&b), black_box(&outcome)).unwrap())
    });

    let store = EstimateStore::new();
    for estimate in pool.iter().cloned() {
        store.insert_or_update(estimate);
    }
    c.bench_function("rank_1000_agents", |bench| bench.iter(|| leaderboard::ranked(black_box(&store))));

    let candidates: Vec<OpponentCandidate> = pool
        .iter()
        .map(|estimate| OpponentCandidate {
            agent_id: estimate.agent_id.clone(),
            exposed: estimate.exposed()
        })
        .collect();
    let session = PlacementSession::new("fresh", 9, 0.0, 30.0);
    let config = PlacementConfig::default();
    c.bench_function("select_opponent_1000", |bench| {
        bench.iter(|| select_opponent(black_box(&candidates), &session, &config))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
