use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use uuid::Uuid;

use gluco_core::dashboard::{Analysis, Dashboard};
use gluco_core::export::{ExportOrder, default_file_name, parse_csv, to_csv};
use gluco_core::models::{
    DiabetesType, GlucoseReading, MealRequest, NewReading, RecommendationEntry, TargetRange,
    UserProfile, parse_date, parse_time,
};
use gluco_core::period::Period;
use gluco_core::recommendation::RecommendationProvider;
use gluco_core::session::RequestState;
use gluco_core::{GlucoseError, Session, SessionRegistry};

const BODY_LIMIT: usize = 2 * 1024 * 1024; // 2 MB

#[derive(Clone)]
struct AppState {
    sessions: Arc<Mutex<SessionRegistry>>,
    provider: Arc<dyn RecommendationProvider>,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Serialize)]
struct SessionCreated {
    id: Uuid,
}

#[derive(Deserialize)]
struct CreateReadingRequest {
    value: i64,
    period: String,
    /// YYYY-MM-DD, default today
    date: Option<String>,
    /// HH:MM, default now
    time: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct WindowQuery {
    window: Option<String>,
}

#[derive(Deserialize)]
struct SetTargetRequest {
    min: i64,
    max: i64,
}

#[derive(Deserialize)]
struct SetProfileRequest {
    #[serde(default)]
    name: String,
    diabetes_type: Option<String>,
}

#[derive(Deserialize)]
struct CreateRecommendationRequest {
    #[serde(flatten)]
    meal: MealRequest,
    morning: Option<i64>,
    afternoon: Option<i64>,
    evening: Option<i64>,
}

#[derive(Deserialize)]
struct ExportQuery {
    order: Option<String>,
}

#[derive(Serialize)]
struct RecommendationsResponse {
    current: Option<RecommendationEntry>,
    history: Vec<RecommendationEntry>,
    request_state: RequestState,
}

#[derive(Serialize)]
struct ImportResponse {
    imported: usize,
    total: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    troubleshooting: Option<&'static [&'static str]>,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    BadGateway(GlucoseError),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, troubleshooting) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            Self::BadGateway(err) => (
                StatusCode::BAD_GATEWAY,
                err.to_string(),
                Some(err.troubleshooting()),
            ),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                troubleshooting,
            }),
        )
            .into_response()
    }
}

impl From<GlucoseError> for ApiError {
    fn from(err: GlucoseError) -> Self {
        match err {
            GlucoseError::Validation(msg) => Self::BadRequest(msg),
            GlucoseError::RequestInFlight => Self::Conflict(err.to_string()),
            GlucoseError::Recommendation(_) => Self::BadGateway(err),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<GlucoseError>() {
            Ok(e) => e.into(),
            Err(err) => Self::Internal(err),
        }
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                    troubleshooting: None,
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Session access ---

/// Run `f` against one session with the registry locked.
fn with_session<T>(
    state: &AppState,
    id: &str,
    f: impl FnOnce(&mut Session) -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    let not_found = || ApiError::NotFound(format!("Session '{id}' not found"));
    let id = Uuid::parse_str(id).map_err(|_| not_found())?;
    let mut sessions = state
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let session = sessions.get_mut(&id).ok_or_else(not_found)?;
    f(session)
}

fn today() -> chrono::NaiveDate {
    Local::now().date_naive()
}

// --- Handlers ---

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let id = state
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .create();
    info!(%id, "session created");
    (StatusCode::CREATED, Json(SessionCreated { id }))
}

async fn list_readings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<GlucoseReading>>, ApiError> {
    let mut readings = with_session(&state, &id, |s| Ok(s.readings().sorted_by_recency()))?;
    if let Some(limit) = q.limit {
        readings.truncate(limit);
    }
    Ok(Json(readings))
}

async fn create_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateReadingRequest>,
) -> Result<(StatusCode, Json<GlucoseReading>), ApiError> {
    let date = match req.date.as_deref() {
        None => today(),
        Some(d) => parse_date(d)?,
    };
    let time = match req.time.as_deref() {
        None => {
            let now = Local::now().time();
            NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now)
        }
        Some(t) => parse_time(t)?,
    };

    let reading = with_session(&state, &id, |s| {
        Ok(s.log_reading(NewReading {
            date,
            time,
            value: req.value,
            period: req.period,
            notes: req.notes,
        })?)
    })?;
    Ok((StatusCode::CREATED, Json(reading)))
}

async fn get_dashboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Dashboard>, ApiError> {
    let dashboard = with_session(&state, &id, |s| Ok(s.dashboard(today())))?;
    Ok(Json(dashboard))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<WindowQuery>,
) -> Result<Json<Analysis>, ApiError> {
    let window = match q.window.as_deref() {
        None => gluco_core::window::Window::default(),
        Some(w) => w.parse()?,
    };
    let analysis = with_session(&state, &id, |s| Ok(s.analysis(window, today())))?;
    Ok(Json(analysis))
}

async fn get_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TargetRange>, ApiError> {
    Ok(Json(with_session(&state, &id, |s| Ok(s.target()))?))
}

async fn set_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetTargetRequest>,
) -> Result<Json<TargetRange>, ApiError> {
    let target = with_session(&state, &id, |s| Ok(s.set_target_range(req.min, req.max)?))?;
    Ok(Json(target))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(with_session(&state, &id, |s| Ok(s.profile().clone()))?))
}

async fn set_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let diabetes_type = req
        .diabetes_type
        .as_deref()
        .map(str::parse::<DiabetesType>)
        .transpose()?;
    let profile = with_session(&state, &id, |s| {
        s.set_profile(UserProfile {
            name: req.name,
            diabetes_type,
        });
        Ok(s.profile().clone())
    })?;
    Ok(Json(profile))
}

async fn list_recommendations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let response = with_session(&state, &id, |s| {
        let log = s.recommendations();
        Ok(RecommendationsResponse {
            current: log.current().cloned(),
            history: log.history().to_vec(),
            request_state: s.request_state().clone(),
        })
    })?;
    Ok(Json(response))
}

/// Runs on its own task so the session leaves `Requesting` even when the
/// client goes away mid-request. The registry lock is not held while the
/// provider runs.
async fn create_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateRecommendationRequest>,
) -> Result<(StatusCode, Json<RecommendationEntry>), ApiError> {
    let overrides: BTreeMap<Period, i64> = [
        (Period::Morning, req.morning),
        (Period::Afternoon, req.afternoon),
        (Period::Evening, req.evening),
    ]
    .into_iter()
    .filter_map(|(p, v)| v.map(|v| (p, v)))
    .collect();

    let task = tokio::spawn(async move {
        let pending = with_session(&state, &id, |s| {
            Ok(s.begin_recommendation(&req.meal, &overrides)?)
        })?;

        let provider = Arc::clone(&state.provider);
        let payload = pending.payload.clone();
        let result = tokio::task::spawn_blocking(move || provider.generate(&payload))
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("recommendation task failed: {e}")));

        with_session(&state, &id, |s| {
            Ok(s
                .finish_recommendation(&pending, result, Local::now().naive_local())?
                .clone())
        })
    });

    let entry = task
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("recommendation task failed: {e}")))??;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn export_readings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let order: ExportOrder = match q.order.as_deref() {
        None => ExportOrder::default(),
        Some(o) => o.parse()?,
    };
    let readings = with_session(&state, &id, |s| Ok(order.apply(s.readings())))?;
    let csv = to_csv(&readings)?;
    let disposition = format!("attachment; filename=\"{}\"", default_file_name(today()));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

async fn import_readings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<Json<ImportResponse>, ApiError> {
    let readings =
        parse_csv(body.as_bytes()).map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    let response = with_session(&state, &id, |s| {
        let imported = s.import_readings(readings)?;
        Ok(ImportResponse {
            imported,
            total: s.readings().len(),
        })
    })?;
    Ok(Json(response))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/{id}/readings",
            get(list_readings).post(create_reading),
        )
        .route("/api/sessions/{id}/dashboard", get(get_dashboard))
        .route("/api/sessions/{id}/analysis", get(get_analysis))
        .route(
            "/api/sessions/{id}/target",
            get(get_target).put(set_target),
        )
        .route(
            "/api/sessions/{id}/profile",
            get(get_profile).put(set_profile),
        )
        .route(
            "/api/sessions/{id}/recommendations",
            get(list_recommendations).post(create_recommendation),
        )
        .route("/api/sessions/{id}/export", get(export_readings))
        .route("/api/sessions/{id}/import", post(import_readings))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of a key, or a mask for short keys.
fn key_preview(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    provider: Arc<dyn RecommendationProvider>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        sessions: Arc::new(Mutex::new(SessionRegistry::new())),
        provider,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            key_preview(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!("Listening on http://{bind}:{port}");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use axum::body::Body;
    use gluco_core::recommendation::PromptPayload;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct FakeProvider {
        fail: bool,
        delay: Option<std::time::Duration>,
    }

    impl RecommendationProvider for FakeProvider {
        fn generate(&self, payload: &PromptPayload) -> anyhow::Result<String> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.fail {
                bail!("connection refused");
            }
            Ok(format!("Advice for: {}", payload.user.lines().count()))
        }
    }

    fn test_state(api_key: Option<String>, fail: bool) -> AppState {
        AppState {
            sessions: Arc::new(Mutex::new(SessionRegistry::new())),
            provider: Arc::new(FakeProvider { fail, delay: None }),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key, false))
    }

    async fn send(
        app: &Router,
        request: axum::http::Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    fn json_request(
        method: &str,
        uri: &str,
        body: &serde_json::Value,
    ) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn new_session(app: &Router) -> String {
        let request = axum::http::Request::post("/api/sessions")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        json["id"].as_str().unwrap().to_string()
    }

    async fn add_reading(app: &Router, id: &str, body: serde_json::Value) -> StatusCode {
        let uri = format!("/api/sessions/{id}/readings");
        send(app, json_request("POST", &uri, &body)).await.0
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let (status, json) = send(&app, get("/api/sessions/x/dashboard")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let request = axum::http::Request::post("/api/sessions")
            .header("Authorization", "Bearer test-key-abc123")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);

        let request = axum::http::Request::post("/api/sessions")
            .header("Authorization", "Bearer wrong-key")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(Some("secret".to_string()));

        let response = app.oneshot(get("/api/sessions/x/target")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(None);
        let id = new_session(&app).await;

        let big_body = vec![b'a'; BODY_LIMIT + 1];
        let request = axum::http::Request::post(format!("/api/sessions/{id}/import"))
            .header("content-type", "text/csv")
            .body(Body::from(big_body))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret path /home/user/.gluco"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn unknown_session_returns_404() {
        let app = test_app(None);

        let uri = format!("/api/sessions/{}/dashboard", Uuid::new_v4());
        let (status, json) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("not found"));

        let (status, _) = send(&app, get("/api/sessions/not-a-uuid/readings")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn readings_are_validated_and_listed_newest_first() {
        let app = test_app(None);
        let id = new_session(&app).await;

        let status = add_reading(
            &app,
            &id,
            serde_json::json!({
                "value": 110, "period": "Morning (Before Breakfast)",
                "date": "2024-01-01", "time": "08:00"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let status = add_reading(
            &app,
            &id,
            serde_json::json!({
                "value": 150, "period": "evening (after dinner)",
                "date": "2024-01-02", "time": "19:30", "notes": "pasta"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let status = add_reading(
            &app,
            &id,
            serde_json::json!({ "value": 700, "period": "Bedtime" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let status = add_reading(
            &app,
            &id,
            serde_json::json!({ "value": 100, "period": "Brunch" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(&app, get(&format!("/api/sessions/{id}/readings"))).await;
        assert_eq!(status, StatusCode::OK);
        let list = json.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["value"], 150);
        assert_eq!(list[0]["period"], "Evening (After Dinner)");
        assert_eq!(list[0]["time"], "19:30");

        let (_, json) = send(&app, get(&format!("/api/sessions/{id}/readings?limit=1"))).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let app = test_app(None);
        let a = new_session(&app).await;
        let b = new_session(&app).await;

        add_reading(&app, &a, serde_json::json!({ "value": 120, "period": "Bedtime" })).await;

        let (_, json) = send(&app, get(&format!("/api/sessions/{b}/readings"))).await;
        assert!(json.as_array().unwrap().is_empty());
        let (_, json) = send(&app, get(&format!("/api/sessions/{a}/dashboard"))).await;
        assert_eq!(json["total"], 1);
    }

    #[tokio::test]
    async fn target_update_applies_to_dashboard() {
        let app = test_app(None);
        let id = new_session(&app).await;
        add_reading(&app, &id, serde_json::json!({ "value": 135, "period": "Bedtime" })).await;

        let (_, json) = send(&app, get(&format!("/api/sessions/{id}/dashboard"))).await;
        assert_eq!(json["in_range_count"], 0);
        assert_eq!(json["in_range_percentage"], 0.0);

        let uri = format!("/api/sessions/{id}/target");
        let (status, _) = send(
            &app,
            json_request("PUT", &uri, &serde_json::json!({ "min": 140, "max": 90 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            &app,
            json_request("PUT", &uri, &serde_json::json!({ "min": 90, "max": 140 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["max"], 140);

        let (_, json) = send(&app, get(&format!("/api/sessions/{id}/dashboard"))).await;
        assert_eq!(json["in_range_count"], 1);
        assert_eq!(json["in_range_percentage"], 100.0);
    }

    #[tokio::test]
    async fn analysis_window_parameter() {
        let app = test_app(None);
        let id = new_session(&app).await;
        add_reading(
            &app,
            &id,
            serde_json::json!({ "value": 100, "period": "Morning (Before Breakfast)" }),
        )
        .await;
        add_reading(
            &app,
            &id,
            serde_json::json!({
                "value": 200, "period": "Morning (Before Breakfast)", "date": "2000-01-01"
            }),
        )
        .await;

        let (status, json) = send(&app, get(&format!("/api/sessions/{id}/analysis"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["window"], "last7");
        assert_eq!(json["statistics"]["count"], 1);
        assert!(json["statistics"]["std_dev"].is_null());
        assert_eq!(json["periods"]["Morning"]["values"][0], 100);

        let uri = format!("/api/sessions/{id}/analysis?window=all");
        let (_, json) = send(&app, get(&uri)).await;
        assert_eq!(json["statistics"]["count"], 2);

        let uri = format!("/api/sessions/{id}/analysis?window=90");
        let (status, _) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn profile_round_trip() {
        let app = test_app(None);
        let id = new_session(&app).await;
        let uri = format!("/api/sessions/{id}/profile");

        let (status, json) = send(
            &app,
            json_request(
                "PUT",
                &uri,
                &serde_json::json!({ "name": "Sam", "diabetes_type": "type 2" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["diabetes_type"], "Type 2");

        let (_, json) = send(&app, get(&uri)).await;
        assert_eq!(json["name"], "Sam");

        let (status, _) = send(
            &app,
            json_request("PUT", &uri, &serde_json::json!({ "diabetes_type": "type 9" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recommendation_success_is_recorded() {
        let app = test_app(None);
        let id = new_session(&app).await;
        let uri = format!("/api/sessions/{id}/recommendations");

        let (status, json) = send(
            &app,
            json_request(
                "POST",
                &uri,
                &serde_json::json!({
                    "meal_type": "dinner",
                    "restrictions": ["Vegan"],
                    "evening": 180
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["meal_type"], "Dinner");
        assert!(json["text"].as_str().unwrap().starts_with("Advice for"));

        let (_, json) = send(&app, get(&uri)).await;
        assert_eq!(json["history"].as_array().unwrap().len(), 1);
        assert_eq!(json["current"]["meal_type"], "Dinner");
        assert_eq!(json["request_state"]["state"], "done");

        let (_, json) = send(&app, get(&format!("/api/sessions/{id}/dashboard"))).await;
        assert_eq!(json["latest_recommendation"]["meal_type"], "Dinner");
    }

    #[tokio::test]
    async fn recommendation_failure_returns_502_with_guidance() {
        let app = build_router(test_state(None, true));
        let id = new_session(&app).await;
        let uri = format!("/api/sessions/{id}/recommendations");

        let (status, json) = send(
            &app,
            json_request("POST", &uri, &serde_json::json!({ "meal_type": "Lunch" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json["error"].as_str().unwrap().contains("connection refused"));
        assert_eq!(json["troubleshooting"].as_array().unwrap().len(), 3);

        let (_, json) = send(&app, get(&uri)).await;
        assert!(json["history"].as_array().unwrap().is_empty());
        assert!(json["current"].is_null());
    }

    #[tokio::test]
    async fn recommendation_rejects_bad_meal_type() {
        let app = test_app(None);
        let id = new_session(&app).await;
        let uri = format!("/api/sessions/{id}/recommendations");

        let (status, _) = send(
            &app,
            json_request("POST", &uri, &serde_json::json!({ "meal_type": "Brunch" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recommendation_in_flight_returns_409() {
        let state = test_state(None, false);
        let app = build_router(state.clone());
        let id = new_session(&app).await;

        let meal = MealRequest {
            meal_type: "Lunch".to_string(),
            foods: String::new(),
            restrictions: Vec::new(),
            cuisine: "Any".to_string(),
        };
        {
            let mut sessions = state.sessions.lock().unwrap();
            let session = sessions.get_mut(&Uuid::parse_str(&id).unwrap()).unwrap();
            let _pending = session.begin_recommendation(&meal, &BTreeMap::new()).unwrap();
        }

        let uri = format!("/api/sessions/{id}/recommendations");
        let (status, json) = send(
            &app,
            json_request("POST", &uri, &serde_json::json!({ "meal_type": "Lunch" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("already in progress"));

        // Reads still work while a request is outstanding
        let (status, json) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["request_state"]["state"], "requesting");
    }

    #[tokio::test]
    async fn recommendation_survives_client_disconnect() {
        let state = AppState {
            sessions: Arc::new(Mutex::new(SessionRegistry::new())),
            provider: Arc::new(FakeProvider {
                fail: false,
                delay: Some(std::time::Duration::from_millis(300)),
            }),
            api_key: None,
        };
        let app = build_router(state.clone());
        let id = new_session(&app).await;
        let uri = format!("/api/sessions/{id}/recommendations");
        let body = serde_json::json!({ "meal_type": "Lunch" });

        // Client gives up while the provider is still working
        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            app.clone().oneshot(json_request("POST", &uri, &body)),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;

        let (_, json) = send(&app, get(&uri)).await;
        assert_eq!(json["request_state"]["state"], "done");
        assert_eq!(json["history"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, json_request("POST", &uri, &body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[test]
    fn key_preview_masks_short_keys() {
        assert_eq!(key_preview("abcd1234efgh"), "abcd...efgh");
        assert_eq!(key_preview("abc"), "****");
        assert_eq!(key_preview("ключ-ключ"), "ключ...ключ");
    }

    #[tokio::test]
    async fn export_returns_csv() {
        let app = test_app(None);
        let id = new_session(&app).await;
        add_reading(
            &app,
            &id,
            serde_json::json!({
                "value": 101, "period": "Bedtime", "date": "2024-03-01", "time": "22:00"
            }),
        )
        .await;

        let response = app
            .clone()
            .oneshot(get(&format!("/api/sessions/{id}/export?order=oldest")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/csv; charset=utf-8"
        );
        assert!(
            response
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("glucose_readings_")
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(
            text,
            "Date,Time,Reading,Period,Notes\n2024-03-01,22:00,101,Bedtime,\n"
        );

        let (status, _) = send(
            &app,
            get(&format!("/api/sessions/{id}/export?order=sideways")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn import_accepts_exported_csv() {
        let app = test_app(None);
        let id = new_session(&app).await;
        let csv = "Date,Time,Reading,Period,Notes\n2024-03-01,22:00,101,Bedtime,late\n";

        let request = axum::http::Request::post(format!("/api/sessions/{id}/import"))
            .header("content-type", "text/csv")
            .body(Body::from(csv))
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["imported"], 1);

        let bad = "Date,Time,Reading,Period\n2024-03-01,22:00,9000,Bedtime\n";
        let request = axum::http::Request::post(format!("/api/sessions/{id}/import"))
            .header("content-type", "text/csv")
            .body(Body::from(bad))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, json) = send(&app, get(&format!("/api/sessions/{id}/readings"))).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["notes"], "late");
    }
}
