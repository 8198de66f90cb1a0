//! Integration tests for the driver and its join barrier.

use std::sync::Once;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_loadgen::driver::{Driver, DriverError};
use rust_loadgen::metrics::{register_metrics, REQUEST_TOTAL};
use rust_loadgen::target::{self, TargetConfig};
use rust_loadgen::workload::{Profile, RequestMethod, WorkloadConfig};

// Register metrics once across all tests in this file.
// Calling register_metrics() more than once would fail due to duplicate registration.
static INIT_METRICS: Once = Once::new();

fn init_metrics() {
    INIT_METRICS.call_once(|| {
        register_metrics().expect("Failed to register metrics");
    });
}

fn light_workload(url: String, total_requests: u64, worker_count: usize) -> WorkloadConfig {
    WorkloadConfig {
        target_url: url,
        total_requests,
        worker_count,
        request_delay: Duration::ZERO,
        ..Profile::Light.defaults()
    }
}

fn unused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

/// Accepts connections and never answers, keeping every socket open.
async fn start_silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{}/", addr)
}

#[tokio::test]
async fn remainder_requests_are_dropped() {
    init_metrics();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(6)
        .mount(&server)
        .await;

    let summary = Driver::new(light_workload(server.uri(), 7, 3))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.total_requests, 7, "summary reports the configured total");
    assert_eq!(summary.issued_requests, 6);
    assert_eq!(summary.workers.len(), 3);
    assert!(summary.workers.iter().all(|w| w.iterations == 2));
    assert!(!summary.cancelled);
    assert_eq!(summary.line().split(" in ").next(), Some("Completed 7 requests"));
}

#[tokio::test]
async fn even_split_issues_every_request() {
    init_metrics();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(40)
        .mount(&server)
        .await;

    let summary = Driver::new(light_workload(server.uri(), 40, 8))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.issued_requests, 40);
    let iterations: u64 = summary.workers.iter().map(|w| w.iterations).sum();
    assert_eq!(iterations, 40);

    let mut ids: Vec<_> = summary.workers.iter().map(|w| w.task_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn fewer_requests_than_workers_issues_nothing() {
    init_metrics();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let summary = Driver::new(light_workload(server.uri(), 3, 5))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.total_requests, 3);
    assert_eq!(summary.issued_requests, 0);
    assert_eq!(summary.workers.len(), 5);
}

#[tokio::test]
async fn duration_covers_the_slowest_worker() {
    init_metrics();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut workload = light_workload(server.uri(), 20, 4);
    workload.request_delay = Duration::from_millis(20);

    let summary = Driver::new(workload).run().await.unwrap();

    // 5 requests per worker, each followed by a 20ms pause, all workers concurrent.
    assert!(summary.elapsed >= Duration::from_millis(100));
    assert!(summary.slowest_worker >= Duration::from_millis(100));
    assert!(summary.elapsed >= summary.slowest_worker);
    for worker in &summary.workers {
        assert!(summary.elapsed >= worker.elapsed);
    }
}

#[tokio::test]
async fn unreachable_target_still_reaches_summary() {
    init_metrics();
    let before = REQUEST_TOTAL.get();

    let summary = Driver::new(light_workload(unused_url(), 12, 3))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.total_requests, 12);
    assert_eq!(summary.workers.len(), 3);
    for worker in &summary.workers {
        assert_eq!(worker.iterations, 4);
        assert_eq!(worker.failed, 4);
    }
    assert!(REQUEST_TOTAL.get() >= before + 12);
}

#[tokio::test]
async fn bounded_timeout_lets_silent_target_finish() {
    init_metrics();
    let url = start_silent_server().await;

    let mut workload = light_workload(url, 4, 2);
    workload.client_timeout = Some(Duration::from_millis(100));

    let summary = tokio::time::timeout(Duration::from_secs(10), Driver::new(workload).run())
        .await
        .expect("bounded client timeout must let the run finish")
        .unwrap();

    assert!(summary.workers.iter().all(|w| w.failed == 2));
}

#[tokio::test]
async fn heavy_profile_hangs_on_silent_target() {
    init_metrics();
    let url = start_silent_server().await;

    let workload = WorkloadConfig {
        target_url: url,
        total_requests: 2,
        worker_count: 2,
        payload_size: 1024,
        ..Profile::Heavy.defaults()
    };
    assert_eq!(workload.client_timeout, None);

    // Without a client timeout the run never completes; the test itself
    // supplies the deadline.
    let result = tokio::time::timeout(Duration::from_millis(750), Driver::new(workload).run()).await;
    assert!(result.is_err(), "run should still be waiting on the silent target");
}

#[tokio::test]
async fn shutdown_hook_aborts_hung_workers() {
    init_metrics();
    let url = start_silent_server().await;

    let workload = WorkloadConfig {
        target_url: url,
        total_requests: 3,
        worker_count: 3,
        payload_size: 1024,
        ..Profile::Heavy.defaults()
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = shutdown_tx.send(());
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        Driver::new(workload).run_until(shutdown_rx),
    )
    .await
    .expect("shutdown hook must end the run")
    .unwrap();

    assert!(summary.cancelled);
    assert!(summary.workers.is_empty());
    assert!(summary.elapsed >= Duration::from_millis(200));
    assert_eq!(summary.line().split(';').nth(1), Some(" 0 of 3 workers finished"));
}

#[tokio::test]
async fn dropped_shutdown_sender_is_not_a_signal() {
    init_metrics();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .expect(4)
        .mount(&server)
        .await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    drop(shutdown_tx);

    let summary = Driver::new(light_workload(server.uri(), 4, 2))
        .run_until(shutdown_rx)
        .await
        .unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.workers.len(), 2);
}

#[tokio::test]
async fn invalid_url_is_rejected_before_spawning() {
    init_metrics();
    let workload = light_workload("localhost:8081".to_string(), 10, 2);

    let err = Driver::new(workload).run().await.unwrap_err();
    assert!(matches!(err, DriverError::Config(_)));
}

#[tokio::test]
async fn heavy_shape_against_target_server() {
    init_metrics();
    let handle = target::spawn(&TargetConfig {
        listen_addr: ([127, 0, 0, 1], 0).into(),
        latency_threshold: Duration::from_secs(1),
    })
    .await
    .unwrap();

    let workload = WorkloadConfig {
        target_url: handle.url(),
        total_requests: 8,
        worker_count: 4,
        payload_size: 256 * 1024,
        request_delay: Duration::ZERO,
        ..Profile::Heavy.defaults()
    };
    assert_eq!(workload.method, RequestMethod::Post);

    let summary = tokio::time::timeout(Duration::from_secs(30), Driver::new(workload).run())
        .await
        .expect("target answers every request")
        .unwrap();

    assert!(summary.workers.iter().all(|w| w.succeeded == 2));
    assert_eq!(
        handle
            .state
            .metrics
            .requests("/", "POST", hyper::StatusCode::OK),
        8
    );
    assert!(handle.state.status.is_up());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn slow_target_is_reported_down() {
    init_metrics();
    let handle = target::spawn(&TargetConfig {
        listen_addr: ([127, 0, 0, 1], 0).into(),
        latency_threshold: Duration::ZERO,
    })
    .await
    .unwrap();

    Driver::new(light_workload(handle.url(), 2, 1))
        .run()
        .await
        .unwrap();

    let status = reqwest::get(format!("{}status", handle.url()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(status, "Service is DOWN");

    handle.shutdown().await.unwrap();
}
