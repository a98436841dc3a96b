use chrono::{Duration, TimeZone, Utc};
use mathstake_inputs::*;
use mathstake_sandbox::{ExecutorConfig, NoHost, ProcessRunner, SandboxExecutor};
use mathstake_types::{
    AlgorithmicSpec, Amount, FixedClock, Problem, ProblemId, ProblemStatus, ProfileId,
    SolutionProtocol, TestInputSource,
};
use std::sync::Arc;

fn problem_with(source: TestInputSource) -> Problem {
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    Problem {
        id: ProblemId::new(b"determinism"),
        creator: ProfileId::new(b"creator"),
        description: "predict the close".into(),
        protocol: SolutionProtocol::Algorithmic(AlgorithmicSpec {
            cost_function: "def cost(test_input, solution_output):\n    return 0\n".into(),
            test_input: source,
            time_penalty_per_ms: 0.0,
            evaluation_delay_hours: 24,
        }),
        bounty: Amount::from_decimal(10.0),
        deadline: now,
        status: ProblemStatus::Closed,
        test_input: None,
        created_at: now - Duration::days(3),
        claimed_at: None,
        evaluated_at: None,
    }
}

fn generator_at(clock: Arc<FixedClock>, seed: u64) -> TestInputGenerator {
    let data = Arc::new(MarketDataSource::new(clock, Some(seed)));
    let executor = Arc::new(SandboxExecutor::new(
        Arc::new(ProcessRunner::default()),
        ExecutorConfig::default(),
    ));
    TestInputGenerator::new(data, executor)
}

#[tokio::test]
async fn test_same_symbol_same_day_same_input() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 6, 2, 1, 0, 0).unwrap()));
    let first = generator_at(clock.clone(), 1);
    let second = generator_at(clock.clone(), 99);

    for source in [
        TestInputSource::Stock { symbol: "TSLA".into() },
        TestInputSource::Crypto { symbol: "eth".into() },
        TestInputSource::Weather { city: "Sydney".into() },
    ] {
        let problem = problem_with(source);
        let a = first.generate(&problem).await.unwrap();
        clock.advance(Duration::hours(3));
        let b = second.generate(&problem).await.unwrap();
        clock.set(Utc.with_ymd_and_hms(2026, 6, 2, 1, 0, 0).unwrap());

        let key = if a.value.get("price").is_some() { "price" } else { "temperature" };
        assert_eq!(a.value[key], b.value[key], "{}", a.source);
        assert_eq!(a.source, b.source);
    }
}

#[tokio::test]
async fn test_quotes_move_between_days() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 6, 2, 1, 0, 0).unwrap()));
    let data = MarketDataSource::new(clock.clone(), Some(1));

    let mut prices = Vec::new();
    for _ in 0..5 {
        prices.push(data.stock_price("AAPL"));
        clock.advance(Duration::days(1));
    }
    prices.dedup();
    assert!(prices.len() > 1, "price never varied: {:?}", prices);
}

#[tokio::test]
async fn test_seeded_range_is_reproducible() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 6, 2, 1, 0, 0).unwrap()));
    let problem = problem_with(TestInputSource::Range { count: 10, min: 0.0, max: 100.0 });

    let a = generator_at(clock.clone(), 42).generate(&problem).await.unwrap();
    let b = generator_at(clock.clone(), 42).generate(&problem).await.unwrap();
    assert_eq!(a.value, b.value);
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[tokio::test]
async fn test_data_source_serves_as_host() {
    use mathstake_sandbox::{Capability, HostFunctions};
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 6, 2, 1, 0, 0).unwrap()));
    let data = MarketDataSource::new(clock, Some(3));
    let via_host = data
        .call(Capability::FetchCrypto, &[serde_json::json!("SOL")])
        .await
        .unwrap();
    assert_eq!(via_host["price"], serde_json::json!(data.crypto_price("SOL")));

    // Solvers get no fetchers at all.
    assert!(NoHost.call(Capability::FetchCrypto, &[]).await.is_err());
}
