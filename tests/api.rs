use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use xjp_hydro_agent::api::router;
use xjp_hydro_agent::config::EnvConfig;
use xjp_hydro_agent::engine::{
    EngineError, EngineResult, NetworkModel, ResultsTable, SimulationEngine,
};
use xjp_hydro_agent::state::AppState;

const TWO_LOOP: &str = include_str!("fixtures/two_loop.inp");
const PUMPED: &str = include_str!("fixtures/pumped.inp");

struct TestApp {
    server: TestServer,
    upload_dir: TempDir,
    _static_root: TempDir,
}

fn test_config(upload_dir: &Path, static_root: &Path) -> EnvConfig {
    EnvConfig {
        upload_dir: upload_dir.to_path_buf(),
        static_dir: static_root.join("static"),
        well_known_dir: static_root.join(".well-known"),
        ..EnvConfig::default()
    }
}

fn spawn_with(engine: Option<Arc<dyn SimulationEngine>>, with_static: bool) -> TestApp {
    let upload_dir = tempfile::tempdir().expect("Failed to create upload dir");
    let static_root = tempfile::tempdir().expect("Failed to create static root");
    if with_static {
        std::fs::create_dir(static_root.path().join("static")).unwrap();
        std::fs::write(static_root.path().join("static/hello.txt"), "hello").unwrap();
        std::fs::create_dir(static_root.path().join(".well-known")).unwrap();
        std::fs::write(static_root.path().join(".well-known/security.txt"), "Contact: ops").unwrap();
    }

    let config = test_config(upload_dir.path(), static_root.path());
    let state = match engine {
        Some(engine) => AppState::with_engine(config, engine),
        None => AppState::new(config),
    };
    let server = TestServer::new(router(Arc::new(state))).expect("Failed to create test server");
    TestApp {
        server,
        upload_dir,
        _static_root: static_root,
    }
}

fn spawn() -> TestApp {
    spawn_with(None, false)
}

fn upload(content: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "inp_file",
        Part::bytes(content.as_bytes().to_vec())
            .file_name("network.inp")
            .mime_type("application/octet-stream"),
    )
}

fn upload_dir_entries(dir: &TempDir) -> Vec<PathBuf> {
    std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

/// 从 markdown 表格中解析出 (节点, [max, mean, min])
fn markdown_rows(markdown: &str) -> Vec<(String, Vec<f64>)> {
    markdown
        .lines()
        .skip(2)
        .map(|line| {
            let cells: Vec<&str> = line
                .trim_matches('|')
                .split('|')
                .map(str::trim)
                .collect();
            let values = cells[1..].iter().map(|v| v.parse().unwrap()).collect();
            (cells[0].to_string(), values)
        })
        .collect()
}

#[tokio::test]
async fn test_simulate_round_trip_consistency() {
    let app = spawn();
    let response = app.server.post("/simulate").multipart(upload(TWO_LOOP)).await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "success");

    let summary = body["summary"].as_object().unwrap();
    let ids: Vec<&str> = summary.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["J1", "J2", "J3", "J4", "R1", "T1"]);

    let markdown = body["markdown"].as_str().unwrap();
    assert!(markdown.starts_with("| Node ID | Max (m) | Mean (m) | Min (m) |"));
    let rows = markdown_rows(markdown);
    assert_eq!(rows.len(), ids.len());
    for ((id, values), expected_id) in rows.iter().zip(&ids) {
        assert_eq!(id, expected_id);
        let stats = &summary[id.as_str()];
        for (value, key) in values.iter().zip(["max", "mean", "min"]) {
            let raw = stats[key].as_f64().unwrap();
            assert!(
                (value - (raw * 100.0).round() / 100.0).abs() < 1e-9,
                "{} {}: {} vs {}",
                id,
                key,
                value,
                raw
            );
        }
        assert!(stats["max"].as_f64() >= stats["mean"].as_f64());
        assert!(stats["mean"].as_f64() >= stats["min"].as_f64());
    }

    let chart = body["html_chart"].as_str().unwrap();
    assert!(chart.starts_with("<img src=\"data:image/png;base64,iVBORw0KGgo"));
    assert!(chart.contains("alt=\"Pressure Chart\""));
    assert!(chart.contains("width=\"600\""));

    // 水池压力即水位，应在 [min, max] 之间
    let tank = &summary["T1"];
    assert!(tank["min"].as_f64().unwrap() >= 1.0);
    assert!(tank["max"].as_f64().unwrap() <= 8.0);
}

#[tokio::test]
async fn test_us_units_are_reported_in_metres() {
    let app = spawn();
    let response = app.server.post("/simulate").multipart(upload(PUMPED)).await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    let summary = body["summary"].as_object().unwrap();
    assert_eq!(
        summary.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["10", "11", "12", "9"]
    );
    // 约 430 ft 的压力，即 130 m 左右
    let p10 = summary["10"]["max"].as_f64().unwrap();
    assert!(p10 > 120.0 && p10 < 140.0, "{}", p10);
    assert_eq!(summary["9"]["max"].as_f64().unwrap(), 0.0);
}

#[tokio::test]
async fn test_upload_dir_is_empty_after_requests() {
    let app = spawn();

    let ok = app.server.post("/simulate").multipart(upload(TWO_LOOP)).await;
    assert_eq!(ok.status_code(), 200);
    assert!(upload_dir_entries(&app.upload_dir).is_empty());

    let bad = app.server.post("/simulate").multipart(upload("garbage")).await;
    assert_eq!(bad.status_code(), 400);
    assert!(upload_dir_entries(&app.upload_dir).is_empty());

    let failing = spawn_with(Some(Arc::new(FailingEngine)), false);
    let err = failing.server.post("/simulate").multipart(upload(TWO_LOOP)).await;
    assert_eq!(err.status_code(), 500);
    assert!(upload_dir_entries(&failing.upload_dir).is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let app = spawn();
    let first = app.server.post("/simulate").multipart(upload(TWO_LOOP)).into_future();
    let second = app.server.post("/simulate").multipart(upload(PUMPED)).into_future();
    let (first, second) = tokio::join!(first, second);

    let first: serde_json::Value = first.json();
    let second: serde_json::Value = second.json();
    assert!(first["summary"].get("J1").is_some());
    assert!(first["summary"].get("10").is_none());
    assert!(second["summary"].get("10").is_some());
    assert!(second["summary"].get("J1").is_none());
    assert!(upload_dir_entries(&app.upload_dir).is_empty());
}

#[tokio::test]
async fn test_non_epanet_input_is_bad_request() {
    let app = spawn();
    for content in ["", "this is not an EPANET file\njust some text\n"] {
        let response = app.server.post("/simulate").multipart(upload(content)).await;
        assert_eq!(response.status_code(), 400, "content {:?}", content);
        let body: serde_json::Value = response.json();
        let detail = body["detail"].as_str().unwrap();
        assert!(
            detail.starts_with("Invalid EPANET input file: "),
            "{}",
            detail
        );
    }
}

#[tokio::test]
async fn test_missing_field_is_unprocessable() {
    let app = spawn();
    let form = MultipartForm::new().add_text("other", "value");
    let response = app.server.post("/simulate").multipart(form).await;
    assert_eq!(response.status_code(), 422);
    let body: serde_json::Value = response.json();
    assert_eq!(body["detail"], "Missing required field: inp_file");
}

#[tokio::test]
async fn test_non_multipart_body_is_bad_request() {
    let app = spawn();
    let response = app.server.post("/simulate").text("plain body").await;
    assert_eq!(response.status_code(), 400);
    assert!(response.json::<serde_json::Value>()["detail"].is_string());
}

#[tokio::test]
async fn test_known_series_statistics() {
    let app = spawn_with(Some(Arc::new(FixedSeriesEngine)), false);
    let response = app.server.post("/simulate").multipart(upload("ignored")).await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(
        body["summary"],
        serde_json::json!({ "N1": { "max": 30.0, "mean": 20.0, "min": 10.0 } })
    );
    let markdown = body["markdown"].as_str().unwrap();
    assert!(markdown.lines().any(|l| l == "| N1 | 30.0 | 20.0 | 10.0 |"));
}

#[tokio::test]
async fn test_simulation_failure_is_server_error() {
    let app = spawn_with(Some(Arc::new(FailingEngine)), false);
    let response = app.server.post("/simulate").multipart(upload(TWO_LOOP)).await;
    assert_eq!(response.status_code(), 500);
    let body: serde_json::Value = response.json();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Simulation error: "), "{}", detail);
}

#[tokio::test]
async fn test_empty_results_are_server_error() {
    let app = spawn_with(Some(Arc::new(EmptySeriesEngine)), false);
    let response = app.server.post("/simulate").multipart(upload("ignored")).await;
    assert_eq!(response.status_code(), 500);
    assert_eq!(
        response.json::<serde_json::Value>()["detail"],
        "Simulation error: simulation produced no results"
    );
    assert!(upload_dir_entries(&app.upload_dir).is_empty());
}

#[tokio::test]
async fn test_oversized_time_settings_are_bad_request() {
    let app = spawn();
    for duration in ["1e15", "9999999999999999:00"] {
        let content = TWO_LOOP.replace("Duration            6:00", &format!("Duration {}", duration));
        assert_ne!(content, TWO_LOOP);
        let response = app.server.post("/simulate").multipart(upload(&content)).await;
        assert_eq!(response.status_code(), 400, "duration {}", duration);
        let detail = response.json::<serde_json::Value>()["detail"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(detail.starts_with("Invalid EPANET input file: "), "{}", detail);
    }

    // 服务仍可处理正常请求
    let response = app.server.post("/simulate").multipart(upload(TWO_LOOP)).await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_static_mount_is_conditional() {
    let app = spawn();
    let response = app.server.get("/static/hello.txt").await;
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<serde_json::Value>()["detail"], "Not Found");
    let response = app.server.get("/well-known/security.txt").await;
    assert_eq!(response.status_code(), 404);

    let app = spawn_with(None, true);
    let response = app.server.get("/static/hello.txt").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text(), "hello");

    let response = app.server.get("/well-known/security.txt").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text(), "Contact: ops");

    let response = app.server.get("/well-known/missing.txt").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_import_diagnostics() {
    let app = spawn();
    for path in ["/", "/test_import"] {
        let response = app.server.get(path).await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(
            response.json::<serde_json::Value>(),
            serde_json::json!({ "message": "WNTR imported successfully" })
        );
    }

    let broken = spawn_with(Some(Arc::new(FailingEngine)), false);
    let response = broken.server.get("/test_import").await;
    assert_eq!(response.status_code(), 500);
    assert_eq!(
        response.json::<serde_json::Value>(),
        serde_json::json!({ "error": "engine unavailable" })
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = spawn();
    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "xjp-hydro-agent");
    assert_eq!(body["engine"], "epanet-gga");
    assert!(body.get("version").is_some());
    assert!(body.get("started_at").is_some());
    assert!(body.get("timestamp").is_some());
}

/// 返回固定压力序列 N1 = [10, 20, 30] 的引擎
struct FixedSeriesEngine;

impl SimulationEngine for FixedSeriesEngine {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn build_model(&self, _path: &Path) -> EngineResult<NetworkModel> {
        Ok(NetworkModel::default())
    }

    fn run_simulation(&self, _model: &NetworkModel) -> EngineResult<ResultsTable> {
        let mut table = ResultsTable::new(vec!["N1".to_string()], vec![]);
        table.times = vec![0, 3600, 7200];
        table.pressure = vec![vec![10.0], vec![20.0], vec![30.0]];
        Ok(table)
    }

    fn self_check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 只有列、没有任何时刻的引擎
struct EmptySeriesEngine;

impl SimulationEngine for EmptySeriesEngine {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn build_model(&self, _path: &Path) -> EngineResult<NetworkModel> {
        Ok(NetworkModel::default())
    }

    fn run_simulation(&self, _model: &NetworkModel) -> EngineResult<ResultsTable> {
        Ok(ResultsTable::new(vec!["N1".to_string()], vec![]))
    }

    fn self_check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 模拟阶段总是失败的引擎
struct FailingEngine;

impl SimulationEngine for FailingEngine {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn build_model(&self, _path: &Path) -> EngineResult<NetworkModel> {
        Ok(NetworkModel::default())
    }

    fn run_simulation(&self, _model: &NetworkModel) -> EngineResult<ResultsTable> {
        Err(EngineError::Singular { time: 0 })
    }

    fn self_check(&self) -> Result<(), String> {
        Err("engine unavailable".to_string())
    }
}
