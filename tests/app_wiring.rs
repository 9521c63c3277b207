// tests/app_wiring.rs
//
// Radar assembled from a config file: stores land under state_dir, the
// router and scheduler come up, and shutdown flushes state.

use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _;

use job_radar::notify::LogTransport;
use job_radar::store::DEDUP_FILE;
use job_radar::{Radar, RadarConfig};

fn config_in(dir: &std::path::Path) -> RadarConfig {
    let toml = format!(
        r#"
rotation_period_secs = 3600
state_dir = "{state}"

[roles]
keywords = ["junior"]

[[sources]]
id = "local-rss"
kind = "rss"
url = "http://127.0.0.1:9/feed.xml"
trust_absent_date = false
timeout_secs = 2

[[sources]]
id = "local-json"
kind = "json"
url = "http://127.0.0.1:9/jobs.json"
trust_absent_date = true
"#,
        state = dir.join("state").display()
    );
    RadarConfig::from_toml_str(&toml).expect("valid config")
}

#[tokio::test]
async fn radar_serves_status_and_flushes_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    let radar = Radar::from_config(&cfg, Arc::new(LogTransport)).await.expect("radar");

    let resp = radar
        .router()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["sources"].as_array().map(Vec::len), Some(2));
    assert_eq!(v["role_keywords"], 1);

    let shutdown = CancellationToken::new();
    let handle = radar.spawn_scheduler(shutdown.clone());
    // first tick fires immediately; the unreachable source just fails
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("scheduler stops")
        .expect("scheduler task");

    assert!(cfg.state_dir.join(DEDUP_FILE).exists(), "dedup flushed on shutdown");
}
