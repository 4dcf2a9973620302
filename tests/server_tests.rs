use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use streetwise::{app::Application, shutdown::ShutdownManager};
use streetwise_api::auth::{JwtService, Permission};
use streetwise_config::AppConfig;
use streetwise_testing_utils::{TestEnv, TEST_JWT_SECRET};

async fn start_server() -> (String, ShutdownManager, tokio::task::JoinHandle<()>) {
    let app = Application::new(TestEnv::app_config()).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let shutdown = ShutdownManager::new();
    let shutdown_rx = shutdown.subscribe().await;
    let handle = tokio::spawn(async move {
        app.serve(listener, shutdown_rx).await.unwrap();
    });

    (base_url, shutdown, handle)
}

fn bearer(user_id: &str) -> String {
    let token = JwtService::new(TEST_JWT_SECRET, 1)
        .generate_token(user_id, &Permission::DEFAULT_USER)
        .unwrap();
    format!("Bearer {token}")
}

#[tokio::test]
async fn test_server_round_trip_and_graceful_shutdown() {
    let (base_url, shutdown, handle) = start_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let response = client
        .post(format!("{base_url}/api/jobs"))
        .header("Authorization", bearer("user-a"))
        .json(&json!({ "type": "performance_analysis", "priority": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    assert!(response.headers().contains_key("x-request-id"));
    let created: Value = response.json().await.unwrap();
    let id = created["data"]["id"].as_i64().unwrap();

    let response = client
        .get(format!("{base_url}/api/jobs/{id}"))
        .header("Authorization", bearer("user-a"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let fetched: Value = response.json().await.unwrap();
    assert_eq!(fetched["data"]["priority"], 5);

    let response = client
        .get(format!("{base_url}/api/jobs/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    shutdown.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_config_file_is_loaded_and_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streetwise.toml");
    std::fs::write(
        &path,
        r#"
[database]
url = "sqlite::memory:"
max_connections = 1

[api]
bind_address = "127.0.0.1:9000"

[api.auth]
jwt_secret = "a-very-long-secret-used-only-in-this-test"

[jobs]
default_max_retries = 5
stale_detection_enabled = false

[observability]
log_format = "json"
"#,
    )
    .unwrap();

    let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(config.api.bind_address, "127.0.0.1:9000");
    assert_eq!(config.jobs.default_max_retries, 5);
    assert!(!config.jobs.stale_detection_enabled);
    assert_eq!(config.observability.log_format.to_string(), "json");
    assert_eq!(config.notifications.max_page_size, 50);

    std::fs::write(
        &path,
        r#"
[api.auth]
jwt_secret = "short"
"#,
    )
    .unwrap();
    assert!(AppConfig::load(Some(path.to_str().unwrap())).is_err());

    assert!(AppConfig::load(Some("/nonexistent/streetwise.toml")).is_err());
}

#[tokio::test]
async fn test_run_returns_bind_error_without_waiting_for_signal() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = TestEnv::app_config();
    config.api.bind_address = occupied.local_addr().unwrap().to_string();

    let app = Application::new(config).await.unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        app.run_until(ShutdownManager::new(), std::future::pending()),
    )
    .await
    .expect("run_until kept waiting after the server failed to start");

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("绑定API地址失败"));
}

#[tokio::test]
async fn test_run_until_shuts_down_when_signalled() {
    let free_port = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = TestEnv::app_config();
    config.api.bind_address = free_port.local_addr().unwrap().to_string();
    drop(free_port);

    let app = Application::new(config).await.unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        app.run_until(
            ShutdownManager::new(),
            tokio::time::sleep(Duration::from_millis(100)),
        ),
    )
    .await
    .expect("server did not stop after the signal");
    assert!(result.is_ok());
}
