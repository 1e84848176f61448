//! Concurrent streams sharing one orchestrator, worker-pool bounds and
//! cancellation between attempts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{base_config, build, server_error, task, ScriptedAdapter, Step};
use coordination::{
    CircuitState, ExecutionState, Orchestrator, ProviderStateStore, RetryStrategy, TerminalState,
};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_worker_pool_bounds_in_flight_calls() {
    let mut config = base_config();
    config.worker_pool_size = 2;

    let adapter = Arc::new(ScriptedAdapter::new().with_latency(Duration::from_millis(50)));
    let (orch, _clock) = build(&config, &adapter);

    let outcomes = join_all((0..8).map(|_| orch.execute(task()))).await;

    assert!(outcomes.iter().all(|o| o.is_success()));
    assert_eq!(adapter.calls().len(), 8);
    assert!(adapter.peak_in_flight() <= 2);
    assert_eq!(orch.state_store().snapshot("p1").total_attempts, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_health_counters_are_exact() {
    let mut config = base_config();
    config.circuit_breaker.failure_threshold = 5;
    config.escalation.on_fail_attempts = 10;
    config.retry.server = RetryStrategy::fixed(Duration::ZERO, 0);
    config.worker_pool_size = 8;

    let adapter = Arc::new(ScriptedAdapter::new().script("p1", vec![server_error(); 64]));
    let (orch, _clock) = build(&config, &adapter);
    let orch = Arc::new(orch);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let orch = orch.clone();
            tokio::spawn(async move { orch.execute(task()).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    let p1 = orch.state_store().snapshot("p1");
    assert_eq!(p1.total_attempts as usize, adapter.call_count("p1"));
    assert_eq!(p1.total_failures, p1.total_attempts);
    assert_eq!(p1.circuit, CircuitState::Open);
    assert!(p1.consecutive_failures >= 5);

    let p2 = orch.state_store().snapshot("p2");
    assert_eq!(p2.total_attempts, 32);
    assert_eq!(p2.total_failures, 0);
}

#[tokio::test]
async fn test_orchestrators_share_a_state_store() {
    let mut config = base_config();
    config.circuit_breaker.failure_threshold = 1;
    config.escalation.on_fail_attempts = 10;

    let store = ProviderStateStore::new().shared();
    let adapter = Arc::new(ScriptedAdapter::new().script("p1", [server_error()]));
    let first = Orchestrator::new(&config, adapter.clone())
        .unwrap()
        .with_state_store(store.clone());
    let second = Orchestrator::new(&config, adapter.clone())
        .unwrap()
        .with_state_store(store.clone());

    first.execute(task()).await;
    let outcome = second.execute(task()).await;

    assert_eq!(outcome.providers_tried(), vec!["p2"]);
    assert_eq!(store.snapshot("p1").circuit, CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let mut config = base_config();
    config.retry.server = RetryStrategy::exponential(Duration::from_secs(30), 3);

    let adapter = Arc::new(ScriptedAdapter::new().script("p1", [server_error()]));
    let (orch, _clock) = build(&config, &adapter);

    let cancel = CancellationToken::new();
    let started = tokio::time::Instant::now();
    let (outcome, _) = tokio::join!(orch.execute_with_cancel(task(), cancel.clone()), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    assert_eq!(outcome.terminal, TerminalState::Cancelled);
    assert_eq!(outcome.attempts.len(), 1);
    assert!(started.elapsed() < Duration::from_secs(30));
    let last = outcome.transitions.last().unwrap();
    assert_eq!(last.from, ExecutionState::Retry);
    assert_eq!(last.to, ExecutionState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_never_interrupts_an_attempt() {
    let config = base_config();
    let adapter = Arc::new(
        ScriptedAdapter::new()
            .with_latency(Duration::from_secs(5))
            .script("p1", [Step::Succeed("finished".into())]),
    );
    let (orch, _clock) = build(&config, &adapter);

    let cancel = CancellationToken::new();
    let (outcome, _) = tokio::join!(orch.execute_with_cancel(task(), cancel.clone()), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    assert!(outcome.is_success());
    assert_eq!(outcome.output(), Some("finished"));
}
