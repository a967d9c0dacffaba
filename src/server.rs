use std::sync::Arc;
use std::time::Duration;

use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    config::{EmptyHostPolicy, ScanConfig, ScanScope},
    error::{ConfigError, ScanError},
    fleet::FleetScanner,
    netdetect, ports,
    probe::{Connector, TcpConnector},
    progress::{ProgressSnapshot, ScanProgress},
    targets,
    types::{Protocol, ScanReport},
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>,
    connector: Arc<dyn Connector>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(TcpConnector))
    }

    /// State whose scans go through `connector` instead of real TCP.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState::default())),
            connector,
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    state: ScanState,
    // Bumped on every new scan so a superseded scan cannot overwrite newer state.
    generation: u64,
    report: Option<ScanReport>,
    progress: Option<ScanProgress>,
    cancel: Option<CancellationToken>,
    started_at: Option<String>,
    finished_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Idle,
    Running,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: ScanState,
    #[serde(flatten)]
    pub progress: ProgressSnapshot,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

/// Body of `POST /api/scan`.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub targets: Vec<String>,
    /// Port spec such as `1-1024` or `22,80,443`. Takes precedence over `scope`.
    #[serde(default)]
    pub ports: Option<String>,
    #[serde(default)]
    pub scope: Option<ScanScope>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_concurrent_hosts: Option<usize>,
    #[serde(default)]
    pub max_concurrent_ports_per_host: Option<usize>,
    #[serde(default)]
    pub keep_empty: bool,
}

impl ScanRequest {
    /// Expand targets and build a validated config. Target files are not read.
    pub fn into_plan(self) -> Result<(Vec<String>, ScanConfig), ConfigError> {
        let targets = targets::expand_inline_targets(&self.targets)?;
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let protocol = match self.protocol.as_deref() {
            Some(p) => p.parse()?,
            None => Protocol::Tcp,
        };
        let port_spec = match (self.ports.as_deref(), self.scope) {
            (Some(spec), _) => ports::parse_port_spec(spec)?,
            (None, Some(scope)) => scope.ports(),
            (None, None) => ScanScope::Quick.ports(),
        };

        let mut config = ScanConfig::new(port_spec);
        config.protocol = protocol;
        if let Some(ms) = self.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
        config.max_concurrent_hosts = self.max_concurrent_hosts;
        config.max_concurrent_ports_per_host = self.max_concurrent_ports_per_host;
        if self.keep_empty {
            config.empty_hosts = EmptyHostPolicy::Keep;
        }
        config.validate()?;
        Ok((targets, config))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(code: StatusCode, msg: impl ToString) -> Response {
    (code, Json(ErrorBody { error: msg.to_string() })).into_response()
}

/// The `/api` routes, ready to be served or driven directly in tests.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/cancel", post(post_cancel))
        .route("/results", get(get_results))
        .route("/interfaces", get(get_interfaces))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind HTTP server to {bind}"))?;
    info!(%bind, "serving API");
    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let progress = s
        .progress
        .as_ref()
        .map(ScanProgress::snapshot)
        .unwrap_or_default();
    let out = Status {
        state: s.state,
        progress,
        started_at: s.started_at.clone(),
        finished_at: s.finished_at.clone(),
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> Response {
    let s = app.inner.read().await;
    match s.report.as_ref() {
        Some(report) => (StatusCode::OK, Json(report.clone())).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn get_interfaces() -> Response {
    match netdetect::list_interfaces() {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn post_cancel(State(app): State<AppState>) -> Response {
    let s = app.inner.read().await;
    match (&s.state, s.cancel.as_ref()) {
        (ScanState::Running, Some(cancel)) => {
            cancel.cancel();
            StatusCode::ACCEPTED.into_response()
        }
        _ => error_response(StatusCode::CONFLICT, "no scan is running"),
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> Response {
    let (targets, config) = match req.into_plan() {
        Ok(plan) => plan,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let progress = ScanProgress::new();
    let cancel = CancellationToken::new();
    let started_at = now_rfc3339();

    let generation = {
        let mut s = app.inner.write().await;
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.generation += 1;
        s.state = ScanState::Running;
        s.report = None;
        s.progress = Some(progress.clone());
        s.cancel = Some(cancel.clone());
        s.started_at = Some(started_at.clone());
        s.finished_at = None;
        s.generation
    };

    let scanner = FleetScanner::new()
        .with_connector(app.connector.clone())
        .with_cancel(cancel)
        .with_progress(progress.clone());
    let app2 = app.clone();
    tokio::spawn(async move {
        let res = scanner.scan(targets.as_slice(), &config).await;

        let mut s = app2.inner.write().await;
        if s.generation != generation {
            return;
        }
        s.cancel = None;
        s.finished_at = Some(now_rfc3339());
        match res {
            Ok(report) => {
                s.state = ScanState::Done;
                s.report = Some(report);
            }
            Err(ScanError::Cancelled) => s.state = ScanState::Cancelled,
            Err(e) => {
                warn!(error = %e, "scan failed");
                s.state = ScanState::Idle;
            }
        }
    });

    let status = Status {
        state: ScanState::Running,
        progress: progress.snapshot(),
        started_at: Some(started_at),
        finished_at: None,
    };
    (StatusCode::ACCEPTED, Json(status)).into_response()
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
