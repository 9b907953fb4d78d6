//! HTTP surface: ingest, search, and recommend over axum.
//!
//! Also hosts the shared setup (medium, embedding provider, store, narrator)
//! that the CLI commands reuse.

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{CourtsideConfig, StorageBackend};
use crate::db::SqliteMedium;
use crate::embedding::{self, EmbeddingProvider};
use crate::ingest::{build_records, GameLogRow};
use crate::narrative;
use crate::recommend::{RecommendError, RecommendRequest, RecommendResponse, Recommender};
use crate::store::medium::{FileMedium, PersistenceMedium};
use crate::store::types::{Filters, RankedHit};
use crate::store::{SearchOptions, StoreError, StoreOptions, VectorStore};

/// Store tunables from the `[embedding]` and `[retrieval]` sections.
pub fn store_options(config: &CourtsideConfig) -> StoreOptions {
    StoreOptions {
        embed_timeout: config.embedding.timeout(),
        persist_timeout: config.retrieval.persist_timeout(),
        strict_filters: config.retrieval.strict_filters,
    }
}

/// Open the configured persistence medium under the data directory.
pub fn open_medium(config: &CourtsideConfig) -> Result<Arc<dyn PersistenceMedium>> {
    let dir = config.resolved_data_dir();
    let medium: Arc<dyn PersistenceMedium> = match config.storage.backend {
        StorageBackend::File => Arc::new(FileMedium::open(&dir)?),
        StorageBackend::Sqlite => {
            let medium = SqliteMedium::open(&dir)?;
            if let Some(stored) = medium.check_embedding_model(&config.embedding.model)? {
                tracing::warn!(
                    stored = %stored,
                    configured = %config.embedding.model,
                    "embedding model changed; re-ingest to rebuild the corpus"
                );
            }
            Arc::new(medium)
        }
    };
    tracing::info!(dir = %dir.display(), backend = %medium.describe(), "storage ready");
    Ok(medium)
}

/// Build the embedding provider and open the store over the configured medium.
pub async fn open_store(config: &CourtsideConfig) -> Result<Arc<VectorStore>> {
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    tracing::info!(model = %provider.model_name(), "embedding provider ready");

    let medium = open_medium(config)?;
    let store = VectorStore::open(provider, medium, store_options(config))
        .await
        .context("failed to load persisted corpus")?;
    Ok(Arc::new(store))
}

/// Store plus optional narrator, wired into a [`Recommender`].
pub async fn build_recommender(config: &CourtsideConfig) -> Result<Recommender> {
    let store = open_store(config).await?;
    let narrator = narrative::from_config(&config.narrative)?.map(Arc::from);
    Ok(Recommender::new(store, narrator, config.recommend.clone()))
}

pub struct AppState {
    pub recommender: Recommender,
    pub default_k: usize,
    pub last_games: usize,
}

impl AppState {
    fn store(&self) -> &VectorStore {
        self.recommender.store()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/search", post(search))
        .route("/recommend", post(recommend))
        .with_state(state)
}

/// Start the HTTP server and run until ctrl-c.
pub async fn serve(config: CourtsideConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState {
        recommender: build_recommender(&config).await?,
        default_k: config.retrieval.default_k,
        last_games: config.recommend.last_games,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    Recommend(RecommendError),
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: u16,
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::InvalidArgument(_) | StoreError::DimensionMismatch { .. } => StatusCode::BAD_REQUEST,
        StoreError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        StoreError::EmbeddingProvider { .. } => StatusCode::BAD_GATEWAY,
        StoreError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(e) => store_status(e),
            ApiError::Recommend(RecommendError::EmptyStore | RecommendError::NoTeamData { .. }) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Recommend(RecommendError::Store(e)) => store_status(e),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Store(e) => e.to_string(),
            ApiError::Recommend(e) => e.to_string(),
            ApiError::BadRequest(msg) => msg,
        };
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %message, "request failed");
        }
        let body = ErrorBody {
            error: message,
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<RecommendError> for ApiError {
    fn from(e: RecommendError) -> Self {
        ApiError::Recommend(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

// ── Handlers ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub loaded_docs: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        loaded_docs: state.store().len().await,
    })
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub team: String,
    pub season: String,
    /// Most recent games kept per player; defaults to `recommend.last_games`.
    #[serde(default)]
    pub last: Option<usize>,
    pub rows: Vec<GameLogRow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub docs_added: usize,
    pub total: usize,
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(req) = body?;
    let last = req.last.unwrap_or(state.last_games);
    let records = build_records(&req.team, &req.season, &req.rows, last);
    tracing::info!(
        team = %req.team,
        season = %req.season,
        rows = req.rows.len(),
        records = records.len(),
        "ingest request"
    );
    let result = state.store().add_documents(records).await?;
    Ok(Json(IngestResponse {
        status: "ok".into(),
        docs_added: result.added,
        total: result.total,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub filters: Filters,
    /// Overrides `retrieval.strict_filters` for this call.
    #[serde(default)]
    pub strict: Option<bool>,
}

async fn search(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Vec<RankedHit>>, ApiError> {
    let Json(req) = body?;
    let store = state.store();
    let options = SearchOptions {
        strict: req.strict.unwrap_or(store.options().strict_filters),
    };
    let hits = store
        .search_with(&req.query, req.k.unwrap_or(state.default_k), &req.filters, options)
        .await?;
    Ok(Json(hits))
}

async fn recommend(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let Json(req) = body?;
    let response = state.recommender.recommend(req).await?;
    Ok(Json(response))
}
