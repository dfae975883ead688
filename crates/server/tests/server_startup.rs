use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use printsort_core::testing::acknowledgement_for;

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a config with an on-disk store and shell-based inspector
fn test_config(dir: &Path, http_port: u16, device_port: u16) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {http_port}

[device]
host = "127.0.0.1"
port = {device_port}
pickup_timeout_ms = 2000
placement_timeout_ms = 2000

[orchestrator]
link_retry_interval_ms = 50
idle_poll_interval_ms = 50
inter_job_delay_ms = 10
print_duration_ms = 10

[store.sqlite]
path = "{db}"

[upload]
backend = "fs"

[upload.fs]
dir = "{artifacts}"

[inspector]
capture_command = ["sh", "-c", "touch {{output_dir}}/{{job_id}}.jpg && echo {{output_dir}}/{{job_id}}.jpg"]
analyze_command = ["sh", "-c", "echo 95"]
output_dir = "{captures}"
timeout_secs = 10
"#,
        db = dir.join("jobs.db").display(),
        artifacts = dir.join("artifacts").display(),
        captures = dir.join("captures").display(),
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_printsort"))
        .env("PRINTSORT_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Connect as a robot controller that acknowledges every command.
async fn connect_robot(port: u16) -> tokio::task::JoinHandle<Vec<String>> {
    let mut stream = None;
    for _ in 0..40 {
        if let Ok(s) = TcpStream::connect(("127.0.0.1", port)).await {
            stream = Some(s);
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    let mut stream = stream.expect("Device port never opened");

    tokio::spawn(async move {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let command = String::from_utf8_lossy(&buf[..n]).trim().to_string();
            if let Some(ack) = acknowledgement_for(&command) {
                if stream.write_all(format!("{}\n", ack).as_bytes()).await.is_err() {
                    break;
                }
            }
            received.push(command);
            if received.len() == 2 {
                break;
            }
        }
        received
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&test_config(dir.path(), port, get_available_port()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    server.kill().await.ok();
}

#[tokio::test]
async fn test_config_endpoint_returns_sanitized() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let device_port = get_available_port();
    let config = write_config(&test_config(dir.path(), port, device_port));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let json: serde_json::Value = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["server"]["port"], port);
    assert_eq!(json["device"]["port"], device_port);
    assert_eq!(json["store"]["backend"], "sqlite");
    assert!(json.get("inspector").is_none());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_status_reports_no_controller() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&test_config(dir.path(), port, get_available_port()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let json: serde_json::Value = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/status", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["link"]["connected"], false);
    assert_eq!(json["orchestrator_enabled"], true);
    assert_eq!(json["poll"]["running"], true);
    assert_eq!(json["poll"]["jobs_processed"], 0);

    server.kill().await.ok();
}

#[cfg(unix)]
#[tokio::test]
async fn test_job_sorted_end_to_end() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let device_port = get_available_port();
    let config = write_config(&test_config(dir.path(), port, device_port));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let created: serde_json::Value = client
        .post(format!("http://127.0.0.1:{}/api/v1/jobs", port))
        .json(&serde_json::json!({ "title": "Part A" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let job_id = created["id"].as_str().unwrap().to_string();

    let robot = connect_robot(device_port).await;

    let mut job = serde_json::Value::Null;
    for _ in 0..100 {
        job = client
            .get(format!("http://127.0.0.1:{}/api/v1/jobs/{}", port, job_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if job["state"] == "completed" || job["state"] == "failed" {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(job["state"], "completed", "job: {}", job);
    assert_eq!(job["quality_score"], 95.0);
    assert_eq!(job["verdict"], "good");
    assert!(job["artifact_url"].as_str().unwrap().starts_with("file://"));

    let commands = timeout(Duration::from_secs(5), robot)
        .await
        .expect("Robot did not finish")
        .unwrap();
    assert_eq!(
        commands,
        vec![
            format!("ROBOT_PICKUP_PRINT {}", job_id),
            format!("ROBOT_PLACE_GOOD {}", job_id),
        ]
    );

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_printsort"))
            .env("PRINTSORT_CONFIG", "/nonexistent/config.toml")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_missing_inspector_section_exits_with_error() {
    let config = write_config(
        r#"
[server]
port = 8080
"#,
    );

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_printsort"))
            .env("PRINTSORT_CONFIG", config.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}
