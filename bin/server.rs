// Entity Risk Scoring - Web Server
// HTTP intake for affected-entities messages, ad-hoc evaluation and score lookup

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use entity_risk_scoring::{
    AffectedEntitiesMessage, AppConfig, CliOverrides, EntityDocument, JsonDirEntitySource,
    ProgressReporter, RiskError, RiskScoringService, ScoringRules, SqliteStore,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type Service = RiskScoringService<JsonDirEntitySource, SqliteStore>;

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<Service>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

fn error_response(err: RiskError) -> Response {
    let status = match &err {
        RiskError::MalformedMatchKey(_) | RiskError::Json(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RiskError::CollaboratorUnavailable { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "Request failed");
    }
    failure(status, err.to_string())
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// POST /api/messages - Process an affected-entities message
async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<AffectedEntitiesMessage>,
) -> Response {
    let Ok(service) = state.service.lock() else {
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Service state poisoned");
    };

    match service.process_message(&message) {
        Ok(summary) => ApiResponse::ok(summary),
        Err(e) => error_response(e),
    }
}

/// POST /api/evaluate - Score an entity document without storing it
async fn post_evaluate(
    State(state): State<AppState>,
    Json(doc): Json<EntityDocument>,
) -> Response {
    let Ok(service) = state.service.lock() else {
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Service state poisoned");
    };

    match service.assess(&doc) {
        Ok(assessment) => ApiResponse::ok(assessment),
        Err(e) => error_response(e),
    }
}

/// GET /api/scores/:entity_id - Stored score of an entity
async fn get_score(State(state): State<AppState>, Path(entity_id): Path<i64>) -> Response {
    let Ok(service) = state.service.lock() else {
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Service state poisoned");
    };

    match service.store().get_score(entity_id, service.lens_id()) {
        Ok(Some(record)) => ApiResponse::ok(record),
        Ok(None) => failure(
            StatusCode::NOT_FOUND,
            format!("No risk score for entity {}", entity_id),
        ),
        Err(e) => error_response(e),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/messages", post(post_message))
        .route("/evaluate", post(post_evaluate))
        .route("/scores/:entity_id", get(get_score))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[derive(Parser)]
#[command(name = "risk-server")]
#[command(version, about = "HTTP intake for entity risk scoring")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RISK_SCORER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:3000
    #[arg(long)]
    bind: Option<String>,

    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = Args::parse();
    let overrides = CliOverrides {
        bind: args.bind,
        database: args.database,
        ..Default::default()
    };
    let config = AppConfig::load(args.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")?;

    let rules = Arc::new(ScoringRules::from_config(&config).context("Failed to load scoring rules")?);
    let store = SqliteStore::open(&config.database)
        .with_context(|| format!("Failed to open {}", config.database.display()))?;
    let service = RiskScoringService::new(rules, JsonDirEntitySource::new(&config.entity_dir), store)
        .with_lens(config.lens_id)
        .with_failure_policy(config.collaborator_failure)
        .with_progress(Arc::new(ProgressReporter::new(config.progress_interval)));

    let state = AppState {
        service: Arc::new(Mutex::new(service)),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(bind = %config.bind, database = %config.database.display(), "🚀 Risk server running");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}
