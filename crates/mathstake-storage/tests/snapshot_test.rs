use chrono::{Duration, Utc};
use mathstake_storage::*;
use mathstake_types::*;
use serde_json::json;
use tempfile::TempDir;

async fn populated_store() -> (MemoryStore, ProblemId, SolutionId) {
    let store = MemoryStore::new();
    let now = Utc::now();
    let creator = Profile::new(ProfileId::new(b"creator")).with_currency(Amount::from_decimal(90.0));
    let solver = Profile::new(ProfileId::new(b"solver"))
        .with_currency(Amount::from_decimal(4.5))
        .with_wallet("0xfeed");
    store.put_profile(&creator).await.unwrap();
    store.put_profile(&solver).await.unwrap();

    let problem = Problem {
        id: ProblemId::new(b"snapshot-problem"),
        creator: creator.id,
        description: "sum the inputs".into(),
        protocol: SolutionProtocol::Algorithmic(AlgorithmicSpec {
            cost_function: "def cost(test_input, solution_output):\n    return abs(sum(test_input) - solution_output)\n".into(),
            test_input: TestInputSource::Range { count: 3, min: 0.0, max: 1.0 },
            time_penalty_per_ms: 0.0001,
            evaluation_delay_hours: 0,
        }),
        bounty: Amount::from_decimal(10.0),
        deadline: now - Duration::hours(1),
        status: ProblemStatus::Open,
        test_input: Some(TestInput::new(json!([0.25, 0.5, 0.75]), "range", now)),
        created_at: now - Duration::days(1),
        claimed_at: None,
        evaluated_at: None,
    };
    store.insert_problem(&problem).await.unwrap();

    let solution = Solution::new(
        problem.id,
        solver.id,
        Submission::Algorithm { code: "def solve(x):\n    return sum(x)\n".into() },
        Amount::from_decimal(0.5),
        now - Duration::hours(2),
    );
    store.insert_solution(&solution).await.unwrap();
    store
        .record_evaluation(
            &solution.id,
            SolutionEvaluation {
                output: None,
                cost: f64::INFINITY,
                error: Some("timed out".into()),
                execution_time_ms: 5000,
                gross_payout: Amount::ZERO,
                payout: SignedAmount::from_decimal(-0.5),
                evaluated_at: now,
            },
        )
        .await
        .unwrap();

    let tx = Transaction::new(
        solver.id,
        TransactionType::StakeLock,
        SignedAmount::from_decimal(-0.5),
        "Stake locked",
        now,
    )
    .for_problem(problem.id)
    .for_solution(solution.id);
    store.append_transaction(&tx).await.unwrap();

    (store, problem.id, solution.id)
}

#[tokio::test]
async fn test_snapshot_round_trip_preserves_market() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let (store, problem_id, solution_id) = populated_store().await;
    store.save(&path).await.unwrap();

    let restored = MemoryStore::open(&path).await.unwrap();
    assert_eq!(restored.get_stats().await.unwrap(), store.get_stats().await.unwrap());

    let solution = restored.get_solution(&solution_id).await.unwrap().unwrap();
    let evaluation = solution.evaluation.unwrap();
    assert!(evaluation.cost.is_infinite());
    assert_eq!(evaluation.payout, SignedAmount::from_decimal(-0.5));

    let problem = restored.get_problem(&problem_id).await.unwrap().unwrap();
    assert_eq!(problem.test_input.unwrap().value, json!([0.25, 0.5, 0.75]));

    // Unique indexes survive the reload.
    let duplicate = Solution::new(
        problem_id,
        ProfileId::new(b"solver"),
        Submission::Algorithm { code: "def solve(x):\n    return 0\n".into() },
        Amount::from_decimal(1.0),
        Utc::now(),
    );
    assert!(matches!(
        restored.insert_solution(&duplicate).await,
        Err(StorageError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_open_missing_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::open(&dir.path().join("absent.json")).await.unwrap();
    assert_eq!(store.get_stats().await.unwrap(), StoreStats::default());
}

#[tokio::test]
async fn test_tampered_snapshot_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let (store, _, _) = populated_store().await;
    store.save(&path).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let tampered = text.replacen("sum the inputs", "sum the outputs", 1);
    assert_ne!(text, tampered);
    std::fs::write(&path, tampered).unwrap();

    assert!(matches!(
        MemoryStore::open(&path).await,
        Err(StorageError::SerializationError(_))
    ));
}

#[tokio::test]
async fn test_flush_writes_back_to_opened_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.json");

    let store = MemoryStore::open(&path).await.unwrap();
    let profile = Profile::new(ProfileId::new(b"flusher")).with_currency(Amount::from_decimal(3.0));
    store.put_profile(&profile).await.unwrap();
    store.flush().await.unwrap();

    let reopened = MemoryStore::open(&path).await.unwrap();
    assert_eq!(reopened.get_profile(&profile.id).await.unwrap(), Some(profile));

    // A store that was never opened from disk has nothing to flush to.
    MemoryStore::new().flush().await.unwrap();
}
