use crate::{
    app::{App, AppError},
    notes::{Note, NoteDraft},
    semantic::ScoredNote,
};
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
pub(crate) struct SharedState {
    app: Arc<App>,
}

impl SharedState {
    pub(crate) fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

async fn start_app(app: App) {
    let app = Arc::new(app);
    let shared_state = Arc::new(SharedState::new(app.clone()));

    // Reconcile in the background so the API accepts requests while
    // stale or missing vectors are re-embedded
    tokio::spawn({
        let app = app.clone();
        async move {
            if let Err(err) = app.reconcile(false).await {
                log::warn!("startup reconcile failed: {err}; serving whatever is indexed");
            }
        }
    });

    let signal = shutdown_signal(app.clone());

    async fn shutdown_signal(app: Arc<App>) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        // The snapshot is saved on the way out so a restart does not
        // re-embed the whole store
        log::info!("shutting down, saving vector snapshot");
        if let Err(err) = app.save_vectors() {
            log::error!("failed to save vector snapshot: {err}");
        }
    }

    let listen = app.config().server.listen.clone();
    let router = api_router(shared_state);

    let listener = tokio::net::TcpListener::bind(&listen).await.unwrap();
    log::info!("listening on {listen}");
    axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .await
        .unwrap();
}

pub fn start_daemon(app: App) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app).await });
}

pub(crate) fn api_router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/api/search", post(search))
        .route("/api/related/:id", get(related))
        .route("/api/related-by-content", post(related_by_content))
        .route("/api/check-duplicates", post(check_duplicates))
        .route("/api/notes", get(list_notes))
        .route("/api/notes", post(create_note))
        .route("/api/notes/:id", get(get_note))
        .route("/api/notes/:id", axum::routing::put(update_note))
        .route("/api/notes/:id", axum::routing::delete(delete_note))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::EmbeddingUnavailable(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

// This enables using `?` on functions that return `Result<_, AppError>` to
// turn them into `Result<_, HttpError>`. That way you don't need to do that
// manually.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    /// Maximum number of results. Config default when omitted.
    #[serde(default)]
    pub limit: Option<usize>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<axum::Json<Vec<ScoredNote>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let results = state.app.search(&payload.query, payload.limit).await?;
    Ok(results.into())
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

async fn related(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
    Query(params): Query<LimitQuery>,
) -> Result<axum::Json<Vec<ScoredNote>>, HttpError> {
    let results = state.app.related_to(id, params.limit)?;
    Ok(results.into())
}

#[derive(Debug, Deserialize)]
pub struct RelatedByContentRequest {
    pub content: String,

    #[serde(default)]
    pub limit: Option<usize>,
}

async fn related_by_content(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<RelatedByContentRequest>,
) -> Result<axum::Json<Vec<ScoredNote>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let results = state
        .app
        .related_by_content(&payload.content, payload.limit)
        .await?;
    Ok(results.into())
}

#[derive(Debug, Deserialize)]
pub struct CheckDuplicatesRequest {
    pub title: String,
    pub content: String,

    /// Note being edited, excluded so it never flags itself
    #[serde(default)]
    pub exclude_id: Option<u64>,
}

async fn check_duplicates(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<CheckDuplicatesRequest>,
) -> Result<axum::Json<Vec<ScoredNote>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let results = state
        .app
        .check_duplicates(&payload.title, &payload.content, payload.exclude_id)
        .await?;
    Ok(results.into())
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub title: String,
    pub content: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<NoteRequest> for NoteDraft {
    fn from(payload: NoteRequest) -> Self {
        NoteDraft {
            title: payload.title,
            content: payload.content,
            tags: payload.tags,
        }
    }
}

async fn list_notes(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<Vec<Note>>, HttpError> {
    let notes = state.app.list_notes()?;
    Ok(notes.into())
}

async fn create_note(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<NoteRequest>,
) -> Result<(StatusCode, axum::Json<Note>), HttpError> {
    log::debug!("payload: {payload:?}");

    let note = state.app.create_note(payload.into()).await?;
    Ok((StatusCode::CREATED, note.into()))
}

async fn get_note(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
) -> Result<axum::Json<Note>, HttpError> {
    let note = state.app.get_note(id)?;
    Ok(note.into())
}

async fn update_note(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
    Json(payload): Json<NoteRequest>,
) -> Result<axum::Json<Note>, HttpError> {
    log::debug!("payload: {payload:?}");

    let note = state.app.update_note(id, payload.into()).await?;
    Ok(note.into())
}

async fn delete_note(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
) -> Result<(), HttpError> {
    state.app.delete_note(id)?;
    Ok(())
}

async fn health(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<serde_json::Value>, HttpError> {
    let notes = state.app.list_notes()?.len();
    Ok(json!({
        "status": "ok",
        "notes": notes,
        "indexed": state.app.indexed_count(),
    })
    .into())
}
