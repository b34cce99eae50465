//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;

use atlas_gateway::auth::hash_password;
use atlas_gateway::config::{AccessConfig, Config, DatasetConfig, DatasetKind, PasswordBackend};
use atlas_gateway::otel::GatewayMetrics;
use atlas_gateway::server::AppState;
use tempfile::TempDir;

pub const TEST_USER: &str = "alice";
pub const TEST_PASSWORD: &str = "wonderland";

pub const GPKG_ATLAS: &str = r#"{
    "tile_a": {"filename": "tile_a.gpkg",
               "minx": 270000, "miny": 6475000, "maxx": 272000, "maxy": 6477000},
    "tile_b": {"filename": "tile_b.gpkg",
               "minx": "500000", "miny": "7000000", "maxx": "501000", "maxy": "7001000"}
}"#;

pub const LIDAR_ATLAS: &str = r#"{
    "270000": {
        "6475000": {"filename": "270000_6475000.laz", "width": 2000, "height": 2000},
        "6477000": {"filename": "270000_6477000.laz", "width": 2000, "height": 2000}
    }
}"#;

/// Lay out catalogs and tile files for the `gpkg` and `lidar` datasets
pub fn write_datasets(root: &Path) {
    std::fs::create_dir_all(root.join("gpkg")).expect("create gpkg dir");
    std::fs::create_dir_all(root.join("lidar")).expect("create lidar dir");
    std::fs::write(root.join("gpkg_atlas.json"), GPKG_ATLAS).expect("write gpkg atlas");
    std::fs::write(root.join("lidar_atlas.json"), LIDAR_ATLAS).expect("write lidar atlas");
    std::fs::write(root.join("gpkg").join("tile_a.gpkg"), b"SQLite format 3\0")
        .expect("write tile");
    std::fs::write(root.join("lidar").join("270000_6475000.laz"), b"LASF tile")
        .expect("write tile");
    std::fs::write(root.join("passwd"), b"root:x:0:0").expect("write outside file");
}

/// Configuration pointing at datasets under `dir`, static password backend
///
/// `github_api` enables the GitHub routes against a mock server.
pub fn create_test_config(dir: &TempDir, github_api: Option<&str>) -> Config {
    let root = dir.path();
    write_datasets(root);

    let mut config = Config::default();
    config.datasets.clear();
    config.datasets.insert(
        "gpkg".to_string(),
        DatasetConfig {
            kind: DatasetKind::Gpkg,
            atlas_path: root.join("gpkg_atlas.json"),
            data_dir: root.join("gpkg"),
        },
    );
    config.datasets.insert(
        "lidar".to_string(),
        DatasetConfig {
            kind: DatasetKind::Lidar,
            atlas_path: root.join("lidar_atlas.json"),
            data_dir: root.join("lidar"),
        },
    );

    config.auth.password_backend = PasswordBackend::Static;
    config.auth.static_users.insert(
        TEST_USER.to_string(),
        hash_password(TEST_PASSWORD).expect("hash password"),
    );
    config.rate_limit.enabled = false;

    config.access = AccessConfig {
        requests_dir: root.join("requests"),
        min_interval_secs: 0,
        ..AccessConfig::default()
    };

    match github_api {
        Some(url) => {
            config.github.enabled = true;
            config.github.api_url = url.to_string();
            config.github.repo = "org/auth".to_string();
        }
        None => {
            config.github.enabled = false;
            config.access.verify_identity = false;
            // Unroutable so the best-effort tracker calls fail fast
            config.github.api_url = "http://127.0.0.1:9".to_string();
        }
    }

    config
}

/// Build the application state with a no-op meter
pub fn create_test_state(config: Config) -> AppState {
    let metrics = GatewayMetrics::new(&opentelemetry::global::meter("atlas-gateway-test"));
    AppState::from_config(config, metrics).expect("Failed to build state")
}

/// Run a test server in the background and return the address
///
/// The server shuts down when the returned sender is dropped or sent.
pub async fn run_test_server(state: AppState) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = atlas_gateway::server::build_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("Server error");
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}

/// Exchange the test user's password for a bearer token
pub async fn login(client: &reqwest::Client, addr: SocketAddr) -> String {
    let response = client
        .post(format!("http://{}/auth/token", addr))
        .json(&serde_json::json!({"username": TEST_USER, "password": TEST_PASSWORD}))
        .send()
        .await
        .expect("token request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("token body");
    body["token"].as_str().expect("token field").to_string()
}

/// A bounding box covering `tile_a` and both LiDAR tiles
pub fn scenario_query() -> serde_json::Value {
    serde_json::json!({
        "minx": 268234.462,
        "miny": 6473567.915,
        "maxx": 278234.462,
        "maxy": 6483567.915
    })
}
