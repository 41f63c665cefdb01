//! Tests for the lifecycle coordinator.

use super::*;
use crate::error::JunbanError;
use crate::service::{HookError, HookResult, Service};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type EventLog = Arc<Mutex<Vec<String>>>;

/// Service recording every hook invocation into a shared log.
struct MockService {
    name: String,
    kinds: Vec<String>,
    depends_on: Vec<String>,
    start_delay: Duration,
    start_error: Option<String>,
    stop_error: Option<String>,
    log: EventLog,
}

impl MockService {
    fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            kinds: vec![],
            depends_on: vec![],
            start_delay: Duration::ZERO,
            start_error: None,
            stop_error: None,
            log: Arc::clone(log),
        }
    }

    fn provides(mut self, kinds: &[&str]) -> Self {
        self.kinds = kinds.iter().map(|k| k.to_string()).collect();
        self
    }

    fn after(mut self, kinds: &[&str]) -> Self {
        self.depends_on = kinds.iter().map(|k| k.to_string()).collect();
        self
    }

    fn slow(mut self, millis: u64) -> Self {
        self.start_delay = Duration::from_millis(millis);
        self
    }

    fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    fn failing_stop(mut self, message: &str) -> Self {
        self.stop_error = Some(message.to_string());
        self
    }

    fn shared(self) -> Arc<dyn Service> {
        Arc::new(self)
    }

    fn record(&self, event: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", event, self.name));
    }
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kinds(&self) -> &[String] {
        &self.kinds
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    async fn start(&self) -> HookResult {
        self.record("start");
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if let Some(message) = &self.start_error {
            return Err(HookError::from(message.clone()));
        }
        self.record("started");
        Ok(())
    }

    async fn stop(&self) -> HookResult {
        self.record("stop");
        match &self.stop_error {
            Some(message) => Err(HookError::from(message.clone())),
            None => Ok(()),
        }
    }
}

fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn position(log: &EventLog, event: &str) -> usize {
    events(log)
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("event {} not recorded", event))
}

fn count(log: &EventLog, event: &str) -> usize {
    events(log).iter().filter(|e| *e == event).count()
}

fn lifecycle(builder: GraphBuilder) -> Lifecycle {
    let graph = builder.build().unwrap();
    Lifecycle::new(graph, Arc::new(TokioExecutor::current().unwrap()))
}

fn state_of(lifecycle: &Lifecycle, name: &str) -> NodeState {
    lifecycle
        .status()
        .into_iter()
        .find(|s| s.name == name)
        .map(|s| s.state)
        .unwrap_or_else(|| panic!("service {} not in graph", name))
}

#[tokio::test]
async fn test_empty_graph() {
    let lifecycle = lifecycle(GraphBuilder::new());

    assert!(lifecycle.is_empty());
    lifecycle.start().await.unwrap();
    lifecycle.stop().await;
    assert!(lifecycle.status().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependency_orders_start_and_stop() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("B", &log).after(&["A"]).shared())
            .service(MockService::new("A", &log).slow(20).shared()),
    );

    lifecycle.start().await.unwrap();
    assert!(position(&log, "started:A") < position(&log, "start:B"));
    assert_eq!(state_of(&lifecycle, "A"), NodeState::Started);
    assert_eq!(state_of(&lifecycle, "B"), NodeState::Started);

    lifecycle.stop().await;
    assert!(position(&log, "stop:B") < position(&log, "stop:A"));
    assert_eq!(state_of(&lifecycle, "A"), NodeState::Stopped);
    assert_eq!(state_of(&lifecycle, "B"), NodeState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kind_dependency_waits_for_every_provider() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("api", &log).after(&["database"]).shared())
            .service(MockService::new("postgres", &log).provides(&["database"]).slow(20).shared())
            .service(MockService::new("mysql", &log).provides(&["database"]).slow(5).shared()),
    );

    lifecycle.start().await.unwrap();
    let api = position(&log, "start:api");
    assert!(position(&log, "started:postgres") < api);
    assert!(position(&log, "started:mysql") < api);

    lifecycle.stop().await;
    let api = position(&log, "stop:api");
    assert!(api < position(&log, "stop:postgres"));
    assert!(api < position(&log, "stop:mysql"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_services_start_concurrently() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("one", &log).slow(50).shared())
            .service(MockService::new("two", &log).slow(50).shared()),
    );

    lifecycle.start().await.unwrap();

    // Both start hooks begin before either completes.
    assert!(position(&log, "start:two") < position(&log, "started:one"));
    assert!(position(&log, "start:one") < position(&log, "started:two"));
    lifecycle.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cycle_is_reported_and_nothing_starts() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("X", &log).shared())
            .service(MockService::new("Y", &log).shared())
            .rule(DependencyRule::from_predicates(named("X"), named("Y")))
            .rule(DependencyRule::from_predicates(named("Y"), named("X"))),
    );

    let err = lifecycle.start().await.unwrap_err();
    match &err {
        JunbanError::DependencyCycle { services } => {
            assert_eq!(services, &vec!["X".to_string(), "Y".to_string()]);
        }
        other => panic!("expected dependency cycle, got {}", other),
    }
    assert!(err.to_string().contains("X"));
    assert!(err.to_string().contains("Y"));

    assert!(events(&log).is_empty());
    assert_eq!(state_of(&lifecycle, "X"), NodeState::NotStarted);
    assert_eq!(state_of(&lifecycle, "Y"), NodeState::NotStarted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_cycle_stops_started_services() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("A", &log).shared())
            .service(MockService::new("B", &log).after(&["C"]).shared())
            .service(MockService::new("C", &log).after(&["A", "B"]).shared()),
    );

    let err = lifecycle.start().await.unwrap_err();
    match err {
        JunbanError::DependencyCycle { services } => {
            assert_eq!(services, vec!["B".to_string(), "C".to_string()]);
        }
        other => panic!("expected dependency cycle, got {}", other),
    }

    // A was started before the cycle was detected and is stopped again.
    assert_eq!(count(&log, "started:A"), 1);
    assert_eq!(count(&log, "stop:A"), 1);
    assert_eq!(count(&log, "start:B"), 0);
    assert_eq!(count(&log, "start:C"), 0);
    assert_eq!(state_of(&lifecycle, "A"), NodeState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_failure_stops_started_services() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("X", &log).slow(20).failing_start("boom").shared())
            .service(MockService::new("Y", &log).shared()),
    );

    let err = lifecycle.start().await.unwrap_err();
    match &err {
        JunbanError::Startup(failure) => {
            assert_eq!(failure.primary().service, "X");
            assert!(failure.secondary().is_empty());
            assert_eq!(failure.primary().cause.to_string(), "boom");
        }
        other => panic!("expected startup failure, got {}", other),
    }
    assert_eq!(err.to_string(), "Service 'X' failed to start");

    // Y is stopped before start returns; X never ran so it is not stopped.
    assert_eq!(count(&log, "stop:Y"), 1);
    assert_eq!(count(&log, "stop:X"), 0);
    assert_eq!(state_of(&lifecycle, "X"), NodeState::Failed);
    assert_eq!(state_of(&lifecycle, "Y"), NodeState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multiple_start_failures_are_aggregated() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("first", &log).slow(10).failing_start("one").shared())
            .service(MockService::new("second", &log).slow(10).failing_start("two").shared())
            .service(MockService::new("third", &log).slow(10).failing_start("three").shared()),
    );

    let err = lifecycle.start().await.unwrap_err();
    let JunbanError::Startup(failure) = &err else {
        panic!("expected startup failure, got {}", err);
    };

    assert_eq!(failure.services(), vec!["first", "second", "third"]);
    assert_eq!(failure.secondary().len(), 2);
    assert_eq!(
        err.to_string(),
        "Service 'first' failed to start (2 other services also failed)"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependents_of_failed_service_are_skipped() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("X", &log).slow(10).failing_start("broken").shared())
            .service(MockService::new("Y", &log).slow(50).shared())
            .service(MockService::new("Z", &log).after(&["Y"]).shared()),
    );

    let err = lifecycle.start().await.unwrap_err();
    assert!(matches!(err, JunbanError::Startup(_)));

    // Z became eligible only after X had failed.
    assert_eq!(count(&log, "start:Z"), 0);
    assert_eq!(state_of(&lifecycle, "Z"), NodeState::Skipped);
    assert_eq!(state_of(&lifecycle, "X"), NodeState::Failed);
    assert_eq!(state_of(&lifecycle, "Y"), NodeState::Stopped);
    assert_eq!(count(&log, "stop:Y"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_runs_in_reverse_dependency_order() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("A", &log).shared())
            .service(MockService::new("B", &log).after(&["A"]).shared())
            .service(MockService::new("C", &log).after(&["B"]).shared()),
    );

    lifecycle.start().await.unwrap();
    lifecycle.stop().await;

    let stops: Vec<String> = events(&log)
        .into_iter()
        .filter(|e| e.starts_with("stop:"))
        .collect();
    assert_eq!(stops, vec!["stop:C", "stop:B", "stop:A"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_diamond_runs_every_hook_once() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("base", &log).shared())
            .service(MockService::new("left", &log).after(&["base"]).slow(10).shared())
            .service(MockService::new("right", &log).after(&["base"]).slow(20).shared())
            .service(MockService::new("top", &log).after(&["left", "right"]).shared()),
    );

    lifecycle.start().await.unwrap();
    lifecycle.stop().await;

    for name in ["base", "left", "right", "top"] {
        assert_eq!(count(&log, &format!("start:{}", name)), 1);
        assert_eq!(count(&log, &format!("stop:{}", name)), 1);
    }
    assert!(position(&log, "started:left") < position(&log, "start:top"));
    assert!(position(&log, "started:right") < position(&log, "start:top"));
    assert!(position(&log, "stop:left") < position(&log, "stop:base"));
    assert!(position(&log, "stop:right") < position(&log, "stop:base"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_error_does_not_block_cascade() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("db", &log).shared())
            .service(
                MockService::new("app", &log)
                    .after(&["db"])
                    .failing_stop("refused to die")
                    .shared(),
            ),
    );

    lifecycle.start().await.unwrap();
    lifecycle.stop().await;

    assert!(position(&log, "stop:app") < position(&log, "stop:db"));
    assert_eq!(state_of(&lifecycle, "app"), NodeState::StopFailed);
    assert_eq!(state_of(&lifecycle, "db"), NodeState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_and_stop_are_idempotent() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("A", &log).shared())
            .service(MockService::new("B", &log).after(&["A"]).shared()),
    );

    lifecycle.start().await.unwrap();
    lifecycle.start().await.unwrap();
    assert_eq!(count(&log, "start:A"), 1);
    assert_eq!(count(&log, "start:B"), 1);

    lifecycle.stop().await;
    lifecycle.stop().await;
    assert_eq!(count(&log, "stop:A"), 1);
    assert_eq!(count(&log, "stop:B"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_start_replays_failure() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new().service(MockService::new("X", &log).failing_start("boom").shared()),
    );

    let first = lifecycle.start().await.unwrap_err();
    let second = lifecycle.start().await.unwrap_err();

    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(count(&log, "start:X"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_without_start_runs_no_hooks() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("A", &log).shared())
            .service(MockService::new("B", &log).after(&["A"]).shared()),
    );

    lifecycle.stop().await;

    assert!(events(&log).is_empty());
    assert_eq!(state_of(&lifecycle, "A"), NodeState::NotStarted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_after_stop_starts_nothing() {
    let log = new_log();
    let lifecycle = lifecycle(
        GraphBuilder::new()
            .service(MockService::new("A", &log).shared())
            .service(MockService::new("B", &log).after(&["A"]).shared()),
    );

    lifecycle.stop().await;
    lifecycle.start().await.unwrap();
    lifecycle.stop().await;

    assert_eq!(count(&log, "start:A"), count(&log, "stop:A"));
    assert!(events(&log).is_empty());
    assert_eq!(state_of(&lifecycle, "A"), NodeState::NotStarted);
    assert_eq!(state_of(&lifecycle, "B"), NodeState::NotStarted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_waits_for_abandoned_start() {
    let log = new_log();
    let lifecycle = Arc::new(lifecycle(
        GraphBuilder::new()
            .service(MockService::new("A", &log).slow(50).shared())
            .service(MockService::new("B", &log).after(&["A"]).shared()),
    ));

    // The start caller gives up; the start pass itself keeps running.
    let starting = Arc::clone(&lifecycle);
    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), async move { starting.start().await })
            .await;
    assert!(abandoned.is_err());

    lifecycle.stop().await;

    assert_eq!(count(&log, "start:B"), 1);
    assert!(position(&log, "stop:B") < position(&log, "stop:A"));
    assert_eq!(state_of(&lifecycle, "A"), NodeState::Stopped);
    assert_eq!(state_of(&lifecycle, "B"), NodeState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status_serializes() {
    let log = new_log();
    let lifecycle = lifecycle(GraphBuilder::new().service(MockService::new("db", &log).shared()));

    lifecycle.start().await.unwrap();
    let json = serde_json::to_string(&lifecycle.status()).unwrap();
    assert_eq!(json, r#"[{"name":"db","state":"started"}]"#);
    lifecycle.stop().await;
}

#[test]
fn test_runs_on_explicit_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let log = new_log();
    let graph = GraphBuilder::new()
        .service(MockService::new("A", &log).shared())
        .service(MockService::new("B", &log).after(&["A"]).shared())
        .build()
        .unwrap();
    let lifecycle = Lifecycle::new(graph, Arc::new(TokioExecutor::new(runtime.handle().clone())));

    tokio_test::block_on(async {
        lifecycle.start().await.unwrap();
        lifecycle.stop().await;
    });

    assert_eq!(
        events(&log),
        vec!["start:A", "started:A", "start:B", "started:B", "stop:B", "stop:A"]
    );
}
