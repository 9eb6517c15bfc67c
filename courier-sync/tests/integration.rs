use std::io::Write;
use std::process::Output;

use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tokio::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(base_url: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "[api]\nbase_url = \"{}\"\n\n[retry]\ninterval = \"10ms\"\nattempts = 1\n",
        base_url
    )
    .unwrap();
    file
}

async fn run_sync(config: &NamedTempFile, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_courier-sync"))
        .env("COURIER_CONFIG", config.path())
        .env_remove("RUST_LOG")
        .args(extra)
        .output()
        .await
        .expect("Failed to run courier-sync")
}

async fn mount_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/deliveries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "next": null,
            "previous": null,
            "results": [{
                "id": "17",
                "address": "Damrak 1",
                "city": "Amsterdam",
                "zipCode": "1012 LG",
                "latitude": 52.376,
                "longitude": 4.896,
                "customer": "Carla",
            }],
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_text_output() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    let config = write_config(&server.uri());

    let output = run_sync(&config, &[]).await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("17  Carla  Damrak 1, 1012 LG Amsterdam"));
}

#[tokio::test]
async fn test_json_output() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    let config = write_config(&server.uri());

    let output = run_sync(&config, &["--format", "json"]).await;

    assert!(output.status.success());
    let state: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(state["deliveries"]["17"]["customer"], "Carla");
    assert_eq!(state["list_request"]["requesting"], false);
    assert_eq!(state["list_request"]["error"], Value::Null);
}

#[tokio::test]
async fn test_base_url_flag_overrides_config() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    let config = write_config("http://127.0.0.1:9");

    let output = run_sync(&config, &["--base-url", &server.uri()]).await;

    assert!(output.status.success());
}

#[tokio::test]
async fn test_unauthorized_exits_with_two() {
    let server = MockServer::start().await;
    Mock::given(path("/deliveries"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let config = write_config(&server.uri());

    let output = run_sync(&config, &[]).await;

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"));
}

#[tokio::test]
async fn test_unreachable_server_exits_with_one() {
    let config = write_config("http://127.0.0.1:9");

    let output = run_sync(&config, &["--retry-interval", "5ms", "--retry-attempts", "1"]).await;

    assert_eq!(output.status.code(), Some(1));
}

#[tokio::test]
async fn test_invalid_config_exits_with_one() {
    let mut config = NamedTempFile::new().unwrap();
    write!(config, "[api\nbase_url = ").unwrap();

    let output = run_sync(&config, &[]).await;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config"));
}

fn write_snapshot(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("state.json");
    let snapshot = json!({
        "deliveries": {
            "99": {
                "id": "99",
                "address": "Coolsingel 40",
                "city": "Rotterdam",
                "zipCode": "3011 AD",
                "latitude": 51.922,
                "longitude": 4.479,
                "customer": "Daan",
            }
        },
        "list_request": {"requesting": false, "error": "api.CONNECTION_ERROR"},
        "finish_requests": {},
    });
    std::fs::write(&path, snapshot.to_string()).unwrap();
    path
}

#[tokio::test]
async fn test_state_snapshot_is_resumed_and_updated() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    let config = write_config(&server.uri());
    let dir = tempfile::TempDir::new().unwrap();
    let snapshot = write_snapshot(&dir);

    let output = run_sync(&config, &["--state", snapshot.to_str().unwrap()]).await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("17  Carla"));
    assert!(stdout.contains("99  Daan"));

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(saved["list_request"]["error"], Value::Null);
    assert!(saved["deliveries"]["99"].is_object());
}

#[tokio::test]
async fn test_clear_drops_snapshot_deliveries() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    let config = write_config(&server.uri());
    let dir = tempfile::TempDir::new().unwrap();
    let snapshot = write_snapshot(&dir);

    let output = run_sync(&config, &["--state", snapshot.to_str().unwrap(), "--clear"]).await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("17  Carla"));
    assert!(!stdout.contains("Daan"));

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert!(saved["deliveries"].get("99").is_none());
}

#[tokio::test]
async fn test_missing_snapshot_starts_empty_and_is_written() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    let config = write_config(&server.uri());
    let dir = tempfile::TempDir::new().unwrap();
    let snapshot = dir.path().join("fresh.json");

    let output = run_sync(&config, &["--state", snapshot.to_str().unwrap()]).await;

    assert!(output.status.success());
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(saved["deliveries"]["17"]["customer"], "Carla");
}
