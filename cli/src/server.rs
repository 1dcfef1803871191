use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use nutrify_core::analysis::{ImageAnalyzer, SimulatedAnalyzer};
use nutrify_core::calculator::MacroSplit;
use nutrify_core::models::{
    ActivityLevel, FoodPortion, Goal, ProfileUpdate, Sex, validate_birth_date,
    validate_meal_type, validate_name, validate_positive,
};
use nutrify_core::service::{MAX_WINDOW_DAYS, NutrifyService};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB, enough for a phone photo

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<NutrifyService>>,
    analyzer: Arc<dyn ImageAnalyzer>,
    api_key: Option<String>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, NutrifyService> {
        self.svc
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdateProfileRequest {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    birth_date: Option<Option<NaiveDate>>,
    sex: Option<Sex>,
    weight_kg: Option<f64>,
    height_m: Option<f64>,
    activity_level: Option<ActivityLevel>,
    goal: Option<Goal>,
}

#[derive(Deserialize)]
struct CreateRecordRequest {
    meal_type: String,
    portions: Vec<FoodPortion>,
    #[serde(default)]
    notes: String,
    logged_at: Option<NaiveDateTime>,
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct AnalyzeQuery {
    meal_type: String,
}

#[derive(Deserialize)]
struct RecentQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Deserialize)]
struct TargetsQuery {
    split: Option<String>,
}

#[derive(Deserialize)]
struct DaysQuery {
    #[serde(default = "default_days")]
    days: u32,
}

fn default_days() -> u32 {
    7
}

#[derive(Deserialize)]
struct WaterQuery {
    #[serde(default)]
    hot: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                log::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

fn parse_date_param(date: Option<&str>) -> Result<NaiveDate, ApiError> {
    match date {
        None => Ok(Local::now().date_naive()),
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest(format!("Invalid date '{d}'. Use YYYY-MM-DD"))),
    }
}

fn check_days(days: u32) -> Result<(), ApiError> {
    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }
    Ok(())
}

/// First and last four characters of the key, or nothing for short keys.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
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

// --- Handlers ---

async fn get_profile(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state.svc().profile_summary(Local::now().date_naive());
    let value = serde_json::to_value(summary).context("failed to serialize profile")?;
    Ok(Json(value))
}

async fn update_profile(
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let today = Local::now().date_naive();
    let update = ProfileUpdate {
        name: req.name,
        birth_date: req.birth_date,
        sex: req.sex,
        weight_kg: req.weight_kg,
        height_m: req.height_m,
        activity_level: req.activity_level,
        goal: req.goal,
    };
    if update.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    if let Some(name) = &update.name {
        validate_name(name).map_err(|e| bad_request(&e))?;
    }
    if let Some(Some(birth)) = update.birth_date {
        validate_birth_date(birth, today).map_err(|e| bad_request(&e))?;
    }
    if let Some(w) = update.weight_kg {
        validate_positive("weight_kg", w).map_err(|e| bad_request(&e))?;
    }
    if let Some(h) = update.height_m {
        validate_positive("height_m", h).map_err(|e| bad_request(&e))?;
    }

    let summary = {
        let mut svc = state.svc();
        svc.update_profile(&update, today)
            .context("failed to update profile")?;
        svc.profile_summary(today)
    };
    let value = serde_json::to_value(summary).context("failed to serialize profile")?;
    Ok(Json(value))
}

async fn create_record(
    State(state): State<AppState>,
    Json(req): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let meal_type = validate_meal_type(&req.meal_type).map_err(|e| bad_request(&e))?;
    if req.portions.is_empty() {
        return Err(ApiError::BadRequest(
            "portions must not be empty".to_string(),
        ));
    }
    for p in &req.portions {
        p.validate().map_err(|e| bad_request(&e))?;
    }
    let at = req
        .logged_at
        .unwrap_or_else(|| Local::now().naive_local());

    let record = state
        .svc()
        .log_manual(&meal_type, req.portions, &req.notes, at)
        .context("failed to save record")?;
    let value = serde_json::to_value(record).context("failed to serialize record")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn list_records(
    State(state): State<AppState>,
    Query(q): Query<DateQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = parse_date_param(q.date.as_deref())?;
    let records = state
        .svc()
        .records_for_date(date)
        .context("failed to load records")?;
    let value = serde_json::to_value(records).context("failed to serialize records")?;
    Ok(Json(value))
}

async fn recent_records(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let records = state
        .svc()
        .recent_records(q.limit.min(500))
        .context("failed to load records")?;
    let value = serde_json::to_value(records).context("failed to serialize records")?;
    Ok(Json(value))
}

async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.svc().delete_record(&id).context("failed to delete record")? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Record {id} not found")))
    }
}

async fn analyze_image(
    State(state): State<AppState>,
    Query(q): Query<AnalyzeQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let meal_type = validate_meal_type(&q.meal_type).map_err(|e| bad_request(&e))?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("Image body is empty".to_string()));
    }
    let record = state
        .svc()
        .analyze_and_log(
            state.analyzer.as_ref(),
            &body,
            &meal_type,
            Local::now().naive_local(),
        )
        .context("failed to analyze image")?;
    let value = serde_json::to_value(record).context("failed to serialize record")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn get_daily_summary(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = parse_date_param(Some(&date_str))?;
    let summary = state
        .svc()
        .daily_summary(date)
        .context("failed to build summary")?;
    let value = serde_json::to_value(summary).context("failed to serialize summary")?;
    Ok(Json(value))
}

async fn get_history(
    State(state): State<AppState>,
    Query(q): Query<DaysQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_days(q.days)?;
    let history = state
        .svc()
        .history(q.days, Local::now().date_naive())
        .context("failed to build history")?;
    let value = serde_json::to_value(history).context("failed to serialize history")?;
    Ok(Json(value))
}

async fn get_bmi(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let today = Local::now().date_naive();
    let (report, body_fat, history) = {
        let svc = state.svc();
        (
            svc.bmi_report(today).context("failed to compute BMI")?,
            svc.body_fat(today).context("failed to compute body fat")?,
            svc.bmi_history().context("failed to load BMI history")?,
        )
    };
    Ok(Json(serde_json::json!({
        "report": report,
        "body_fat_pct": body_fat,
        "history": history,
    })))
}

async fn get_targets(
    State(state): State<AppState>,
    Query(q): Query<TargetsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let split = q
        .split
        .as_deref()
        .map(str::parse::<MacroSplit>)
        .transpose()
        .map_err(|e| bad_request(&e))?;
    let today = Local::now().date_naive();
    let (targets, bmr, water) = {
        let svc = state.svc();
        let targets = match split {
            Some(s) => svc.macro_targets(s, today),
            None => svc.goal_macro_targets(today),
        };
        (targets, svc.bmr_summary(None, today), svc.water(false))
    };
    Ok(Json(serde_json::json!({
        "targets": targets,
        "percentages": targets.percentages(),
        "bmr": bmr,
        "water_liters": water.recommended_liters,
    })))
}

async fn get_water(
    State(state): State<AppState>,
    Query(q): Query<WaterQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let water = state.svc().water(q.hot);
    let value = serde_json::to_value(water).context("failed to serialize water")?;
    Ok(Json(value))
}

async fn get_progress(
    State(state): State<AppState>,
    Query(q): Query<DaysQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_days(q.days)?;
    let today = Local::now().date_naive();
    let report = {
        let svc = state.svc();
        let logged = svc
            .history(q.days, today)
            .context("failed to build history")?
            .iter()
            .any(|d| d.record_count > 0);
        if !logged {
            return Err(ApiError::NotFound(format!(
                "No records in the last {} days",
                q.days
            )));
        }
        svc.progress(q.days, today)
            .context("failed to build progress report")?
    };
    let value = serde_json::to_value(report).context("failed to serialize report")?;
    Ok(Json(value))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/records", post(create_record).get(list_records))
        .route("/api/records/recent", get(recent_records))
        .route("/api/records/{id}", delete(delete_record))
        .route("/api/analyze", post(analyze_image))
        .route("/api/summary/{date}", get(get_daily_summary))
        .route("/api/history", get(get_history))
        .route("/api/bmi", get(get_bmi))
        .route("/api/targets", get(get_targets))
        .route("/api/water", get(get_water))
        .route("/api/progress", get(get_progress))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: NutrifyService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    new_api_key: bool,
) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        analyzer: Arc::new(SimulatedAnalyzer),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    match &api_key {
        Some(key) if new_api_key => {
            eprintln!("Generated new API key: {key}");
            eprintln!("Include in requests: Authorization: Bearer {key}");
        }
        Some(key) => eprintln!(
            "API key: {} (see api_key file in data directory)",
            mask_key(key)
        ),
        None => eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone."),
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    log::info!("server started on {bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
