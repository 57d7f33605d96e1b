use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;
use probr_testserver::TestServer;

const USER: &str = "apiuser";
const PASS: &str = "s3cret";

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn probr() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_probr"));
    for var in [
        "PROBR_BASE_URL",
        "PROBR_HOST",
        "PROBR_PORT",
        "PROBR_USER",
        "PROBR_PASS",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn write_scenario(dir: &Path, body: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join("scenario.yaml");
    std::fs::write(&path, body).context("write scenario")?;
    Ok(path)
}

async fn run_against(server: &TestServer, scenario: PathBuf, pass: &str) -> anyhow::Result<Output> {
    let base_url = server.base_url().to_string();
    let pass = pass.to_string();

    tokio::task::spawn_blocking(move || {
        probr()
            .arg("run")
            .arg(&scenario)
            .arg("--base-url")
            .arg(&base_url)
            .arg("--user")
            .arg(USER)
            .arg("--pass")
            .arg(&pass)
            .arg("--output")
            .arg("json")
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run probr binary")
}

fn ensure_code(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn summary_line(out: &Output) -> anyhow::Result<serde_json::Value> {
    let stdout = String::from_utf8_lossy(&out.stdout);
    let last = stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .last()
        .context("no output lines")?;
    let v: serde_json::Value = serde_json::from_str(last).context("parse summary line")?;
    anyhow::ensure!(
        v.get("kind").and_then(serde_json::Value::as_str) == Some("summary"),
        "last line is not a summary: {last}"
    );
    Ok(v)
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = probr()
        .arg("run")
        .arg("--duration")
        .arg("10x")
        .output()
        .context("run probr binary")?;

    ensure_code(&out, 30)
}

#[test]
fn missing_scenario_file_exits_30() -> anyhow::Result<()> {
    let out = probr()
        .arg("run")
        .arg("./does-not-exist.yaml")
        .output()
        .context("run probr binary")?;

    ensure_code(&out, 30)
}

#[test]
fn unknown_threshold_tag_exits_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scenario = write_scenario(
        dir.path(),
        r#"
vus: 1
duration: 1s
targets: [/api/healthz]
thresholds:
  error_rate{tag=/api/nope}: < 0.01
"#,
    )?;

    let out = probr()
        .arg("run")
        .arg(&scenario)
        .arg("--base-url")
        .arg("http://127.0.0.1:9")
        .output()
        .context("run probr binary")?;

    ensure_code(&out, 30)
}

#[tokio::test]
async fn healthy_target_exits_0() -> anyhow::Result<()> {
    let server = TestServer::start_with_basic_auth(USER, PASS)
        .await
        .context("start test server")?;
    let dir = tempfile::tempdir()?;
    let scenario = write_scenario(
        dir.path(),
        r#"
name: e2e
vus: 2
duration: 1s
targets:
  - /api/healthz
  - /api/measurements?limit=5
thresholds:
  http_req_failed: rate<0.01
  http_req_duration: p(95)<9000
"#,
    )?;

    let out = run_against(&server, scenario, PASS).await?;
    let requests = server.stats().requests_total();
    server.shutdown().await;

    ensure_code(&out, 0)?;
    let summary = summary_line(&out)?;
    anyhow::ensure!(summary.get("passed").and_then(serde_json::Value::as_bool) == Some(true));
    anyhow::ensure!(summary.get("scenario").and_then(serde_json::Value::as_str) == Some("e2e"));
    anyhow::ensure!(requests > 0, "server saw no requests");
    Ok(())
}

#[tokio::test]
async fn failing_target_exits_11() -> anyhow::Result<()> {
    let server = TestServer::start_with_basic_auth(USER, PASS)
        .await
        .context("start test server")?;
    let dir = tempfile::tempdir()?;
    let scenario = write_scenario(
        dir.path(),
        r#"
vus: 1
duration: 1s
targets: [/fail]
thresholds:
  error_rate: < 0.01
"#,
    )?;

    let out = run_against(&server, scenario, PASS).await?;
    server.shutdown().await;

    ensure_code(&out, 11)?;
    let summary = summary_line(&out)?;
    anyhow::ensure!(
        summary
            .pointer("/thresholds/0/status")
            .and_then(serde_json::Value::as_str)
            == Some("fail")
    );
    Ok(())
}

#[tokio::test]
async fn wrong_credentials_fail_thresholds() -> anyhow::Result<()> {
    let server = TestServer::start_with_basic_auth(USER, PASS)
        .await
        .context("start test server")?;
    let dir = tempfile::tempdir()?;
    let scenario = write_scenario(
        dir.path(),
        r#"
vus: 1
duration: 500ms
targets: [/api/healthz]
thresholds:
  error_rate: < 0.01
"#,
    )?;

    let out = run_against(&server, scenario, "wrong").await?;
    let unauthorized = server.stats().unauthorized_total();
    server.shutdown().await;

    ensure_code(&out, 11)?;
    anyhow::ensure!(unauthorized > 0, "server saw no unauthorized requests");
    Ok(())
}

#[test]
fn export_writes_a_loadable_preset() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("presets").join("stress.yaml");

    let out = probr()
        .arg("export")
        .arg("--preset")
        .arg("stress")
        .arg(&path)
        .output()
        .context("run probr binary")?;
    ensure_code(&out, 0)?;

    let yaml = std::fs::read_to_string(&path).context("read exported file")?;
    anyhow::ensure!(yaml.contains("executor: ramping-arrival-rate"), "{yaml}");
    anyhow::ensure!(yaml.contains("maxVUs: 20"), "{yaml}");
    Ok(())
}
