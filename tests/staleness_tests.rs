//! Integration tests for snapshot staleness tracking.
//!
//! These tests drive the snapshot builder through a scripted sequence of
//! endpoint responses and verify the accumulated data-age offset and the
//! backdated capture timestamps.

use axum::routing::get;
use axum::Router;
use chrono::Local;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metriscope::fetch::FetchClient;
use metriscope::snapshot::MetricsSnapshotBuilder;

/// Helper to bind a mock endpoint on an ephemeral port.
async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test app");
    });
    format!("http://{addr}")
}

/// Helper serving a fixed sequence of bodies, one per request.
fn scripted_app(bodies: Vec<&str>) -> Router {
    let queue: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(
        bodies.into_iter().map(String::from).collect(),
    ));
    Router::new().route(
        "/api/v1/metrics",
        get(move || {
            let queue = queue.clone();
            async move {
                queue
                    .lock()
                    .expect("body queue lock")
                    .pop_front()
                    .unwrap_or_default()
            }
        }),
    )
}

fn test_builder(base_url: &str, poll_interval: u64) -> MetricsSnapshotBuilder {
    let client = FetchClient::new(None, Duration::from_secs(5))
        .expect("build http client")
        .with_backoff(Duration::from_millis(10));
    MetricsSnapshotBuilder::new(client, base_url, poll_interval)
}

const LIVE_BODY: &str = "app_disk_free_bytes 25\napp_disk_total_bytes 100\n";

#[tokio::test]
async fn test_offset_grows_per_empty_poll_and_resets() {
    let base = spawn_server(scripted_app(vec![LIVE_BODY, "", "", LIVE_BODY])).await;
    let mut builder = test_builder(&base, 5);

    let first = builder.build_snapshot().await.expect("first poll");
    assert_eq!(first.poll_offset_seconds, 0);
    assert!(!first.families.is_empty());

    let second = builder.build_snapshot().await.expect("second poll");
    assert_eq!(second.poll_offset_seconds, 5);
    assert!(second.families.is_empty());

    let third = builder.build_snapshot().await.expect("third poll");
    assert_eq!(third.poll_offset_seconds, 10);

    // Data is back, the accumulated gap resets
    let fourth = builder.build_snapshot().await.expect("fourth poll");
    assert_eq!(fourth.poll_offset_seconds, 0);
    assert!(!fourth.families.is_empty());
}

#[tokio::test]
async fn test_captured_at_is_backdated_by_the_offset() {
    let base = spawn_server(scripted_app(vec![LIVE_BODY, "", ""])).await;
    let mut builder = test_builder(&base, 5);

    let fresh = builder.build_snapshot().await.expect("fresh poll");
    let age = (Local::now() - fresh.captured_at).num_seconds();
    assert!(age <= 1, "fresh snapshot should carry the current time");

    let stale = builder.build_snapshot().await.expect("first empty poll");
    let age = (Local::now() - stale.captured_at).num_seconds();
    assert!(
        (4..=8).contains(&age),
        "expected roughly 5 seconds of lag, got {age}"
    );

    let staler = builder.build_snapshot().await.expect("second empty poll");
    let age = (Local::now() - staler.captured_at).num_seconds();
    assert!(
        (9..=13).contains(&age),
        "expected roughly 10 seconds of lag, got {age}"
    );
}

#[tokio::test]
async fn test_fully_unparsable_body_counts_as_a_miss() {
    let base = spawn_server(scripted_app(vec!["!!! static garbage !!!\n<html></html>"])).await;
    let mut builder = test_builder(&base, 5);

    let snapshot = builder.build_snapshot().await.expect("garbage poll");
    assert!(snapshot.families.is_empty());
    assert_eq!(snapshot.poll_offset_seconds, 5);
}
