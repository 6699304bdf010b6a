//! Integration Tests for the Request Pipeline
//!
//! Drives the full pipeline against a scripted in-memory transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pm_gateway::config::{BulkConfig, LimiterConfig, RetryConfig};
use pm_gateway::{
    Config, Method, Pipeline, PipelineError, Priority, RequestDescriptor, Transport,
    TransportError,
};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

type Responder = dyn Fn(usize, Method, &str, Option<&Value>) -> Result<Value, TransportError>
    + Send
    + Sync;

/// Answers every call through `respond`, given the zero-based call number.
struct ScriptedTransport {
    respond: Box<Responder>,
    delay: Duration,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(usize, Method, &str, Option<&Value>) -> Result<Value, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self::with_delay(Duration::ZERO, respond)
    }

    fn with_delay<F>(delay: Duration, respond: F) -> Arc<Self>
    where
        F: Fn(usize, Method, &str, Option<&Value>) -> Result<Value, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            delay,
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    fn echo() -> Arc<Self> {
        Self::new(|n, _, endpoint, body| {
            Ok(json!({ "call": n, "endpoint": endpoint, "body": body }))
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(endpoint.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(n, method, endpoint, body)
    }
}

fn test_config() -> Config {
    Config {
        limiter: LimiterConfig {
            refill_interval: Duration::from_secs(60),
            ..LimiterConfig::default()
        },
        retry: RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            request_timeout: Duration::from_secs(5),
        },
        bulk: BulkConfig {
            batch_delay: Duration::from_millis(10),
            ..BulkConfig::default()
        },
        ..Config::default()
    }
}

// == Request Executor ==

#[tokio::test]
async fn test_transient_failures_yield_one_success() {
    let transport = ScriptedTransport::new(|n, method, endpoint, _| {
        if n < 2 {
            Err(TransportError::status(method, endpoint, 502, "bad gateway"))
        } else {
            Ok(json!({ "id": 7, "name": "Roadmap" }))
        }
    });
    let pipeline = assert_ok!(Pipeline::from_config(&test_config(), transport.clone()));

    let project: Value = assert_ok!(pipeline.executor().fetch("/projects/7").await);

    assert_eq!(project["name"], "Roadmap");
    assert_eq!(transport.calls(), 3);
    let stats = pipeline.stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.success_rate(), 100.0);
}

#[tokio::test]
async fn test_exhausted_retries_carry_diagnostics() {
    let transport = ScriptedTransport::new(|_, method, endpoint, _| {
        Err(TransportError::status(method, endpoint, 404, "project not found"))
    });
    let pipeline = assert_ok!(Pipeline::from_config(&test_config(), transport.clone()));

    let err = assert_err!(pipeline.executor().delete("/projects/404").await);

    assert_eq!(err.endpoint(), Some("/projects/404"));
    let message = err.to_string();
    assert!(message.contains("DELETE"));
    assert!(message.contains("4 attempts"));
    assert!(message.contains("project not found"));
    assert_eq!(transport.calls(), 4);
    assert_eq!(pipeline.stats().failed_requests, 1);
}

#[tokio::test]
async fn test_cached_reads_skip_transport_until_flush() {
    let transport = ScriptedTransport::echo();
    let pipeline = assert_ok!(Pipeline::from_config(&test_config(), transport.clone()));
    let query = json!({ "state": "open", "assignee": "me" });

    let first: Value = assert_ok!(pipeline.executor().search("/issues", query.clone()).await);
    let second: Value = assert_ok!(pipeline.executor().search("/issues", query.clone()).await);
    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);

    pipeline.executor().flush_cache().await;
    let third: Value = assert_ok!(pipeline.executor().search("/issues", query).await);
    assert_ne!(first, third);
    assert_eq!(transport.calls(), 2);

    let stats = pipeline.stats();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.cache_hits, 0);
    assert_eq!(stats.cache_misses, 1);
}

#[tokio::test]
async fn test_short_ttl_entries_expire() {
    let transport = ScriptedTransport::echo();
    let pipeline = assert_ok!(Pipeline::from_config(&test_config(), transport.clone()));
    let descriptor = RequestDescriptor::get("/me").cache_ttl(Duration::from_millis(30));

    assert_ok!(pipeline.executor().execute_raw(&descriptor).await);
    assert_ok!(pipeline.executor().execute_raw(&descriptor).await);
    assert_eq!(transport.calls(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_ok!(pipeline.executor().execute_raw(&descriptor).await);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_garbled_payload_is_a_failure() {
    #[derive(Debug, serde::Deserialize)]
    #[allow(dead_code)]
    struct Issue {
        id: u64,
        title: String,
    }

    let transport = ScriptedTransport::new(|_, _, _, _| Ok(json!({ "id": "not-a-number" })));
    let pipeline = assert_ok!(Pipeline::from_config(&test_config(), transport));

    let err = assert_err!(pipeline.executor().fetch::<Issue>("/issues/1").await);
    assert!(matches!(err, PipelineError::Decode { .. }));
}

// == Rate Limiter ==

#[tokio::test]
async fn test_high_priority_overtakes_queued_low_priority() {
    let mut config = test_config();
    config.limiter.max_concurrent = 1;
    let transport = ScriptedTransport::with_delay(Duration::from_millis(20), |_, _, endpoint, _| {
        Ok(json!(endpoint))
    });
    let pipeline = Arc::new(assert_ok!(Pipeline::from_config(&config, transport.clone())));

    let mut handles = Vec::new();
    for i in 0..10 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let descriptor = RequestDescriptor::get(format!("/low/{}", i)).priority(Priority::Low);
            pipeline.executor().execute_raw(&descriptor).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(5)).await;

    let urgent = RequestDescriptor::get("/urgent").priority(Priority::High);
    assert_ok!(pipeline.executor().execute_raw(&urgent).await);
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    let log = transport.log();
    let position = log.iter().position(|e| e == "/urgent").unwrap();
    // Behind at most the job already executing
    assert!(position <= 1, "urgent ran at position {}: {:?}", position, log);
}

#[tokio::test]
async fn test_empty_reservoir_expires_admission() {
    let mut config = test_config();
    config.limiter.reservoir_initial = 0;
    config.limiter.refill_interval = Duration::from_secs(3600);
    config.limiter.admission_timeout = Some(Duration::from_millis(50));
    let transport = ScriptedTransport::echo();
    let pipeline = assert_ok!(Pipeline::from_config(&config, transport.clone()));

    let request = pipeline.executor().fetch::<Value>("/x");
    let result = tokio::time::timeout(Duration::from_millis(500), request).await;

    let err = assert_err!(assert_ok!(result, "request never expired"));
    assert!(matches!(err, PipelineError::AdmissionExpired { .. }));
    assert_eq!(transport.calls(), 0);
    assert_eq!(pipeline.limiter_counts().queued, 0);
    assert_eq!(pipeline.stats().failed_requests, 1);
}

#[tokio::test]
async fn test_reservoir_defers_overflow_to_refill() {
    let mut config = test_config();
    config.limiter.refill_interval = Duration::from_millis(300);
    let transport = ScriptedTransport::echo();
    let pipeline = Arc::new(assert_ok!(Pipeline::from_config(&config, transport.clone())));

    let started = Instant::now();
    let mut handles = Vec::new();
    for i in 0..60 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let descriptor = RequestDescriptor::post("/events", json!({ "n": i }));
            pipeline.executor().execute_raw(&descriptor).await
        }));
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.calls(), 50);
    assert_eq!(pipeline.limiter_counts().queued, 10);

    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert_eq!(transport.calls(), 60);
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[tokio::test]
async fn test_shutdown_fails_queued_requests_and_finishes_executing() {
    let mut config = test_config();
    config.limiter.max_concurrent = 1;
    config.retry.max_retries = 0;
    let transport = ScriptedTransport::with_delay(Duration::from_millis(50), |_, _, endpoint, _| {
        Ok(json!(endpoint))
    });
    let pipeline = Arc::new(assert_ok!(Pipeline::from_config(&config, transport.clone())));

    let mut handles = Vec::new();
    for i in 0..3 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline
                .executor()
                .update::<Value>(&format!("/issues/{}", i), json!({ "state": "done" }))
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    pipeline.shutdown(true).await;

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, PipelineError::LimiterStopped)));
    assert_eq!(transport.calls(), 1);
}

// == Bulk Executor ==

#[tokio::test]
async fn test_bulk_create_partial_failure() {
    let transport = ScriptedTransport::new(|_, method, endpoint, body| {
        let n = body.and_then(|b| b["n"].as_u64()).unwrap_or_default();
        if n == 3 || n == 7 {
            Err(TransportError::status(method, endpoint, 422, "validation failed"))
        } else {
            Ok(json!({ "id": n }))
        }
    });
    let mut config = test_config();
    config.retry.max_retries = 1;
    let pipeline = assert_ok!(Pipeline::from_config(&config, transport.clone()));
    let bodies: Vec<Value> = (0..10).map(|n| json!({ "n": n, "title": "task" })).collect();

    let outcome = assert_ok!(pipeline.bulk().bulk_create("/issues", bodies).await);

    assert_eq!(outcome.success_count(), 8);
    assert_eq!(outcome.failure_count(), 2);
    assert_eq!(outcome.success_rate(), 80.0);
    assert_eq!(outcome.failed[0].input["n"], 3);
    assert_eq!(outcome.failed[1].input["n"], 7);
    assert!(outcome.failed[0].error.contains("validation failed"));
    // Eight successes plus two attempts for each failure
    assert_eq!(transport.calls(), 12);
    assert_eq!(pipeline.stats().total_requests, 10);
}

#[tokio::test]
async fn test_bulk_rejects_oversized_input_up_front() {
    let transport = ScriptedTransport::echo();
    let pipeline = assert_ok!(Pipeline::from_config(&test_config(), transport.clone()));
    let ids: Vec<String> = (0..51).map(|i| i.to_string()).collect();

    let err = assert_err!(pipeline.bulk().bulk_archive("/issues", ids).await);

    assert!(matches!(err, PipelineError::BatchSizeExceeded { size: 51, max: 50 }));
    assert_eq!(transport.calls(), 0);
    assert_eq!(pipeline.stats().total_requests, 0);
}

#[tokio::test]
async fn test_bulk_move_targets_each_member() {
    let transport = ScriptedTransport::echo();
    let pipeline = assert_ok!(Pipeline::from_config(&test_config(), transport.clone()));
    let ids = vec!["a".to_string(), "b".to_string()];

    let outcome = assert_ok!(
        pipeline
            .bulk()
            .bulk_move("/issues/", ids, "cycle_id", json!("c-9"))
            .await
    );

    assert_eq!(outcome.success_count(), 2);
    assert_eq!(transport.log(), vec!["/issues/a", "/issues/b"]);
    assert_eq!(outcome.succeeded[0]["body"], json!({ "cycle_id": "c-9" }));
}
