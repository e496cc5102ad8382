//! Bulk match import server: spreadsheet analysis and points commit for
//! tournament results.

mod analysis;
mod commit;
mod config;
mod directory;
mod report;
mod scoring;
mod template;
mod workbook;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use commit::{Committer, CommitResponse, DirectoryCommitter};
use config::{CompetitionStore, ServerConfig};
use directory::PlayerDirectory;
use report::AnalyzeResponse;
use scoring::ScoringPolicy;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    directory: PlayerDirectory,
    competitions: Arc<CompetitionStore>,
    policy: Arc<ScoringPolicy>,
    committer: Arc<dyn Committer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "match_import_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let directory = PlayerDirectory::load_from_csv(&config.players_csv)?;
    info!("Player directory ready ({} players)", directory.len());

    let competitions = match &config.competitions_json {
        Some(path) => CompetitionStore::load_from_file(path)?,
        None => CompetitionStore::empty(),
    };

    let policy = ScoringPolicy::from_env();
    info!(
        "Scoring policy: singles {} / doubles {} / pickle ×{} / cross-gender ×{}",
        policy.singles_base, policy.doubles_base, policy.pickle_factor, policy.cross_gender_factor
    );

    let state = AppState {
        committer: Arc::new(DirectoryCommitter::new(directory.clone())),
        directory,
        competitions: Arc::new(competitions),
        policy: Arc::new(policy),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/admin/udf-bulk/analyze-excel", post(analyze_excel))
        .route("/api/admin/bulk-upload/matches", post(commit_matches))
        .route("/api/admin/bulk-upload/template", get(download_template))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Read the `excelFile` multipart field: (filename, bytes).
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), (StatusCode, String)> {
    let mut filename = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("excelFile") {
            filename = field.file_name().unwrap_or("upload.xlsx").to_string();
            file_data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?
                .to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }
    Ok((filename, file_data))
}

/// Analyze an uploaded workbook without committing anything.
///
/// Recoverable issues (bad rows, unmatched players) come back inside the
/// report; an unreadable workbook yields a structured failure, not an
/// HTTP error.
async fn analyze_excel(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, (StatusCode, String)> {
    let (filename, file_data) = read_upload(&mut multipart).await?;
    info!("Analyzing upload: {} ({} bytes)", filename, file_data.len());

    let workbook = match workbook::parse_workbook(&filename, &file_data) {
        Ok(wb) => wb,
        Err(e) => {
            error!("Workbook parse failed for {}: {}", filename, e);
            return Ok(Json(AnalyzeResponse::failure(filename, e.to_string())));
        }
    };

    let snapshot = state.directory.snapshot();
    let result = analysis::analyze(&workbook, &snapshot, &state.competitions, &state.policy);
    info!(
        "Analysis {} complete: {} matches, ready_to_import={}",
        result.id, result.summary.total_matches, result.ready_to_import
    );

    Ok(Json(AnalyzeResponse::ok(filename, result)))
}

/// Re-analyze the uploaded workbook and commit it. Rows are applied
/// independently; the response carries the successful/failed split.
async fn commit_matches(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CommitResponse>, (StatusCode, String)> {
    let (filename, file_data) = read_upload(&mut multipart).await?;
    info!("Committing upload: {} ({} bytes)", filename, file_data.len());

    let workbook = workbook::parse_workbook(&filename, &file_data).map_err(|e| {
        error!("Workbook parse failed for {}: {}", filename, e);
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let snapshot = state.directory.snapshot();
    let result = analysis::analyze(&workbook, &snapshot, &state.competitions, &state.policy);
    let results = state.committer.commit(&workbook, &result).await;

    Ok(Json(CommitResponse { results }))
}

/// Download the spreadsheet upload template.
async fn download_template() -> Result<impl IntoResponse, (StatusCode, String)> {
    let bytes = template::build_template().map_err(|e| {
        error!("Template generation failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", template::TEMPLATE_FILENAME),
            ),
        ],
        bytes,
    ))
}
