use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use reqwest::Url;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::challenge::{ChallengeContext, ChallengeProgress, PoseDetector, SessionPool};
use crate::domain::{AccessVerdict, Domain, NavigationEvent, NavigationOutcome};
use crate::engine::{AccessEngine, FailMode, NavigationInterceptor, UnblockManager};
use crate::error::{GateError, Result};
use crate::observability::MetricsRegistry;
use crate::settings::SettingsService;
use crate::storage::StateStore;

use super::request::{
    AddSiteRequest, BlockedSitesRequest, CreateChallengeRequest, DecisionQuery, FrameRequest,
    GrantRequest, RepCountRequest,
};
use super::response::{
    BlockedSitesResponse, ErrorResponse, GrantResponse, HealthResponse, ReadyResponse,
    RepCountResponse,
};

/// Requests handled at once; further requests wait for a slot.
const MAX_IN_FLIGHT_REQUESTS: usize = 256;

/// Shared application state.
pub struct AppState {
    pub store: StateStore,
    pub engine: AccessEngine,
    pub unblock: UnblockManager,
    pub interceptor: NavigationInterceptor,
    pub settings: SettingsService,

    /// Live challenge sessions
    pub sessions: Arc<SessionPool>,

    pub metrics: Arc<MetricsRegistry>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

impl AppState {
    /// Wire every service over one state store.
    pub fn new(
        store: StateStore,
        pose: Arc<dyn PoseDetector>,
        challenge_page: Url,
        fail_mode: FailMode,
        exemption_duration: Duration,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let engine = AccessEngine::new(store.clone());
        let unblock = UnblockManager::new(store.clone()).with_default_duration(exemption_duration);
        let interceptor =
            NavigationInterceptor::new(engine.clone(), challenge_page, fail_mode, metrics.clone());
        let sessions = Arc::new(SessionPool::new(ChallengeContext {
            pose,
            unblock: unblock.clone(),
            metrics: metrics.clone(),
        }));

        AppState {
            settings: SettingsService::new(store.clone()),
            store,
            engine,
            unblock,
            interceptor,
            sessions,
            metrics,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/navigation", post(handle_navigation))
        .route("/v1/decision", get(handle_decision))
        .route(
            "/v1/settings/blocked-sites",
            get(handle_get_blocked_sites)
                .put(handle_put_blocked_sites)
                .post(handle_add_blocked_site),
        )
        .route(
            "/v1/settings/blocked-sites/:site",
            delete(handle_remove_blocked_site),
        )
        .route(
            "/v1/settings/rep-count",
            get(handle_get_rep_count).put(handle_put_rep_count),
        )
        .route("/v1/exemptions", post(handle_grant))
        .route("/v1/challenges", post(handle_create_challenge))
        .route("/v1/challenges/:id", get(handle_get_challenge))
        .route("/v1/challenges/:id/start", post(handle_start_challenge))
        .route("/v1/challenges/:id/frames", post(handle_submit_frame))
        .route("/v1/challenges/:id/stop", post(handle_stop_challenge))
        .route("/v1/challenges/:id/reset", post(handle_reset_challenge))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Gate one navigation. Always answers; state errors resolve per fail mode.
async fn handle_navigation(
    State(state): State<Arc<AppState>>,
    Json(event): Json<NavigationEvent>,
) -> Json<NavigationOutcome> {
    Json(state.interceptor.intercept(&event, Utc::now()).await)
}

async fn handle_decision(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<AccessVerdict>> {
    let domain = Domain::new(&query.domain);
    if domain.is_empty() {
        return Err(GateError::invalid("domain must not be empty"));
    }

    let verdict = state.engine.evaluate(&domain, Utc::now()).await?;
    state.metrics.record_decision(verdict.decision);

    Ok(Json(verdict))
}

async fn handle_get_blocked_sites(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BlockedSitesResponse>> {
    Ok(Json(state.settings.blocked_sites().await?.into()))
}

async fn handle_put_blocked_sites(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BlockedSitesRequest>,
) -> Result<Json<BlockedSitesResponse>> {
    Ok(Json(state.settings.set_blocked_sites(&req.sites).await?.into()))
}

async fn handle_add_blocked_site(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddSiteRequest>,
) -> Result<(StatusCode, Json<BlockedSitesResponse>)> {
    let list = state.settings.add_site(&req.site).await?;
    Ok((StatusCode::CREATED, Json(list.into())))
}

async fn handle_remove_blocked_site(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
) -> Result<Json<BlockedSitesResponse>> {
    Ok(Json(state.settings.remove_site(&site).await?.into()))
}

async fn handle_get_rep_count(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RepCountResponse>> {
    Ok(Json(state.settings.required_reps().await?.into()))
}

async fn handle_put_rep_count(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RepCountRequest>,
) -> Result<Json<RepCountResponse>> {
    Ok(Json(state.settings.set_required_reps(req.count).await?.into()))
}

/// Grant an exemption. Acknowledged only after the table write completes.
async fn handle_grant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GrantRequest>,
) -> Result<Json<GrantResponse>> {
    let domain = Domain::new(&req.domain);
    let result = state.unblock.grant(&domain, req.duration(), Utc::now()).await;
    state.metrics.record_grant(result.is_ok());

    let exemption = result?;
    Ok(Json(GrantResponse::new(exemption, req.redirect_url)))
}

async fn handle_create_challenge(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateChallengeRequest>,
) -> Result<(StatusCode, Json<ChallengeProgress>)> {
    let required = state.settings.required_reps().await?;
    let session = state.sessions.create(Domain::new(&req.domain), required)?;

    let progress = session.lock().await.progress();
    Ok((StatusCode::CREATED, Json(progress)))
}

async fn handle_get_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeProgress>> {
    let session = state.sessions.get(id)?;
    let progress = session.lock().await.progress();
    Ok(Json(progress))
}

async fn handle_start_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeProgress>> {
    let session = state.sessions.get(id)?;
    let mut session = session.lock().await;
    Ok(Json(session.start(state.sessions.context()).await?))
}

async fn handle_submit_frame(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<FrameRequest>,
) -> Result<Json<ChallengeProgress>> {
    let session = state.sessions.get(id)?;
    let mut session = session.lock().await;
    let progress = session
        .submit_frame(state.sessions.context(), &req.frame, Utc::now())
        .await?;
    Ok(Json(progress))
}

async fn handle_stop_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeProgress>> {
    let session = state.sessions.get(id)?;
    let mut session = session.lock().await;
    Ok(Json(session.stop(state.sessions.context())))
}

async fn handle_reset_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeProgress>> {
    let session = state.sessions.get(id)?;
    let mut session = session.lock().await;
    Ok(Json(session.reset(state.sessions.context()).await?))
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint. Ready once the persisted settings can be read.
async fn handle_ready(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let settings = async {
        let list = state.store.block_list().await?;
        let reps = state.store.required_reps().await?;
        Ok::<_, GateError>((list, reps))
    };

    match settings.await {
        Ok((list, reps)) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                blocked_sites: list.len(),
                required_reps: reps.get(),
                active_sessions: state.sessions.session_count(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(e.to_string(), "NOT_READY")),
            )
                .into_response()
        }
    }
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut metrics = state.metrics.to_prometheus();
    metrics.push_str(&format!(
        r#"
# HELP repgate_uptime_seconds Application uptime in seconds
# TYPE repgate_uptime_seconds counter
repgate_uptime_seconds {}

# HELP repgate_challenge_sessions Live challenge sessions
# TYPE repgate_challenge_sessions gauge
repgate_challenge_sessions {}
"#,
        state.start_time.elapsed().as_secs(),
        state.sessions.session_count(),
    ));

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics,
    )
}
