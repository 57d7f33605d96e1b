use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use base64::Engine as _;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HEALTHZ: &str = "/api/healthz";
pub const PATH_MEASUREMENTS: &str = "/api/measurements";
pub const PATH_OBSERVATIONS: &str = "/api/observations";
pub const PATH_INGESTIONS_LATEST: &str = "/api/ingestions/latest";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_FAIL: &str = "/fail";
pub const PATH_HANG: &str = "/hang";

/// Delay of [`PATH_SLOW`].
pub const SLOW_DELAY: Duration = Duration::from_millis(50);
/// Delay of [`PATH_HANG`]; long enough to outlive any probe timeout used in tests.
pub const HANG_DELAY: Duration = Duration::from_secs(30);

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    unauthorized_total: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_unauthorized_total(&self) {
        self.unauthorized_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn unauthorized_total(&self) -> u64 {
        self.unauthorized_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub healthz: String,
    pub measurements: String,
    pub observations: String,
    pub ingestions_latest: String,
    pub slow: String,
    pub fail: String,
    pub hang: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            healthz: format!("{base_url}{PATH_HEALTHZ}"),
            measurements: format!("{base_url}{PATH_MEASUREMENTS}"),
            observations: format!("{base_url}{PATH_OBSERVATIONS}"),
            ingestions_latest: format!("{base_url}{PATH_INGESTIONS_LATEST}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            fail: format!("{base_url}{PATH_FAIL}"),
            hang: format!("{base_url}{PATH_HANG}"),
            base_url,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct AppState {
    stats: TestServerStats,
    /// Expected `Authorization` header value, if the server requires Basic auth.
    auth: Option<Arc<str>>,
}

impl AppState {
    /// Counts the request and checks credentials.
    fn admit(&self, headers: &HeaderMap) -> Result<(), Response> {
        self.stats.inc_requests_total();

        let Some(expected) = self.auth.as_deref() else {
            return Ok(());
        };

        let got = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if got == Some(expected) {
            return Ok(());
        }

        self.stats.inc_unauthorized_total();
        Err(StatusCode::UNAUTHORIZED.into_response())
    }
}

#[derive(Debug, Serialize)]
struct Measurement {
    id: u64,
    station: String,
    value: f64,
    observed_at: String,
}

#[derive(Debug, Serialize)]
struct Observation {
    id: u64,
    taxon: String,
    observed_at: String,
}

#[derive(Debug, Serialize)]
struct Ingestion {
    source: &'static str,
    status: &'static str,
    rows: u64,
    finished_at: &'static str,
}

fn parse_limit(query: &HashMap<String, String>) -> Result<usize, Response> {
    match query.get("limit") {
        None => Ok(DEFAULT_LIMIT),
        Some(raw) => match raw.parse::<usize>() {
            Ok(v) if (1..=MAX_LIMIT).contains(&v) => Ok(v),
            _ => Err((StatusCode::UNPROCESSABLE_ENTITY, "invalid limit").into_response()),
        },
    }
}

fn timestamp(i: u64) -> String {
    format!("2024-01-01T00:{:02}:00Z", i % 60)
}

async fn handle_healthz(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(res) = state.admit(&headers) {
        return res;
    }
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

async fn handle_measurements(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(res) = state.admit(&headers) {
        return res;
    }
    let limit = match parse_limit(&query) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let items: Vec<Measurement> = (0..limit as u64)
        .map(|i| Measurement {
            id: i + 1,
            station: format!("station-{}", i % 3),
            value: 10.0 + i as f64 * 0.5,
            observed_at: timestamp(i),
        })
        .collect();
    Json(items).into_response()
}

async fn handle_observations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(res) = state.admit(&headers) {
        return res;
    }
    let limit = match parse_limit(&query) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let items: Vec<Observation> = (0..limit as u64)
        .map(|i| Observation {
            id: i + 1,
            taxon: format!("taxon-{i}"),
            observed_at: timestamp(i),
        })
        .collect();
    Json(items).into_response()
}

async fn handle_ingestions_latest(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(res) = state.admit(&headers) {
        return res;
    }
    Json(Ingestion {
        source: "inat",
        status: "succeeded",
        rows: 42,
        finished_at: "2024-01-01T00:00:00Z",
    })
    .into_response()
}

async fn handle_slow(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(res) = state.admit(&headers) {
        return res;
    }
    sleep(SLOW_DELAY).await;
    "slow".into_response()
}

async fn handle_fail(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(res) = state.admit(&headers) {
        return res;
    }
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn handle_hang(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(res) = state.admit(&headers) {
        return res;
    }
    sleep(HANG_DELAY).await;
    "late".into_response()
}

fn router_with_state(state: AppState) -> Router {
    Router::new()
        .route(PATH_HEALTHZ, get(handle_healthz))
        .route(PATH_MEASUREMENTS, get(handle_measurements))
        .route(PATH_OBSERVATIONS, get(handle_observations))
        .route(PATH_INGESTIONS_LATEST, get(handle_ingestions_latest))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_FAIL, get(handle_fail))
        .route(PATH_HANG, get(handle_hang))
        .with_state(state)
}

pub fn router(stats: TestServerStats) -> Router {
    router_with_state(AppState { stats, auth: None })
}

/// [`router`] guarded by HTTP Basic auth.
pub fn router_with_basic_auth(stats: TestServerStats, user: &str, pass: &str) -> Router {
    router_with_state(AppState {
        stats,
        auth: Some(Arc::from(basic_auth_value(user, pass))),
    })
}

/// `Authorization` header value for HTTP Basic auth.
pub fn basic_auth_value(user: &str, pass: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
    format!("Basic {token}")
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with_state(AppState::default()).await
    }

    /// Like [`TestServer::start`], but every route answers 401 unless the request carries
    /// `Authorization: Basic base64(user:pass)`.
    pub async fn start_with_basic_auth(user: &str, pass: &str) -> std::io::Result<Self> {
        Self::start_with_state(AppState {
            stats: TestServerStats::default(),
            auth: Some(Arc::from(basic_auth_value(user, pass))),
        })
        .await
    }

    async fn start_with_state(state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = state.stats.clone();
        let app = router_with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let base_url = format!("http://{addr}");
        let urls = TestServerUrls::new(base_url.clone());

        Ok(Self {
            addr,
            base_url,
            urls,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            // In-flight /hang requests hold graceful shutdown open; abort after a bound.
            let abort = task.abort_handle();
            if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
                abort.abort();
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
