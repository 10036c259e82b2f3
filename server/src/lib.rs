use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tfidx_core::analyzer::{Analyzer, StandardAnalyzer};
use tfidx_core::config::SearchConfig;
use tfidx_core::loader::{load_index, spawn_load, LoadHandle};
use tfidx_core::search::{QueryEngine, SearchHit, SearchOutcome};
use tfidx_core::{DocId, InvertedIndex};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct DocResponse {
    pub doc_id: DocId,
    pub title: String,
    pub path: String,
    pub highest_term_frequency: u32,
    pub text: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

enum IndexStatus {
    /// Handle is taken once the load has been collected
    Loading(Option<LoadHandle>),
    Ready(Arc<QueryEngine>),
    Failed(String),
}

#[derive(Clone)]
pub struct AppState {
    status: Arc<RwLock<IndexStatus>>,
    config: SearchConfig,
}

impl AppState {
    fn ready(index: InvertedIndex, config: SearchConfig) -> Self {
        let engine = make_engine(index, &config);
        Self { status: Arc::new(RwLock::new(IndexStatus::Ready(engine))), config }
    }

    fn loading(handle: LoadHandle, config: SearchConfig) -> Self {
        Self { status: Arc::new(RwLock::new(IndexStatus::Loading(Some(handle)))), config }
    }

    /// Collects a finished background load.
    fn refresh(&self) {
        {
            let status = self.status.read();
            match &*status {
                IndexStatus::Loading(Some(handle)) if handle.is_finished() => {}
                _ => return,
            }
        }
        let mut status = self.status.write();
        let IndexStatus::Loading(slot) = &mut *status else { return };
        let Some(handle) = slot.take() else { return };
        *status = match handle.wait() {
            Ok(index) => {
                tracing::info!(documents = index.num_docs(), terms = index.num_terms(), "index ready");
                IndexStatus::Ready(make_engine(index, &self.config))
            }
            Err(e) => {
                tracing::error!(error = %e, "index load failed");
                IndexStatus::Failed(e.to_string())
            }
        };
    }

    fn engine(&self) -> Result<Arc<QueryEngine>, ApiError> {
        self.refresh();
        match &*self.status.read() {
            IndexStatus::Ready(engine) => Ok(engine.clone()),
            IndexStatus::Loading(_) => Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "index is loading")),
            IndexStatus::Failed(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("index unavailable: {e}"))),
        }
    }
}

fn make_engine(index: InvertedIndex, config: &SearchConfig) -> Arc<QueryEngine> {
    let analyzer: Arc<dyn Analyzer> = Arc::new(StandardAnalyzer::new());
    Arc::new(QueryEngine::new(Arc::new(index), analyzer, config.clone()))
}

/// Router over an index loaded before returning.
pub fn build_app(index_dir: PathBuf, config: SearchConfig) -> Result<Router> {
    let index = load_index(&index_dir)?;
    Ok(router(AppState::ready(index, config)))
}

/// Router that answers immediately while the index loads in the background;
/// search requests get 503 until loading completes.
pub fn build_app_background(index_dir: PathBuf, config: SearchConfig) -> Result<Router> {
    let handle = spawn_load(index_dir)?;
    Ok(router(AppState::loading(handle, config)))
}

fn router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    state.refresh();
    let response = match &*state.status.read() {
        IndexStatus::Loading(_) => HealthResponse { status: "loading", documents: None, terms: None, error: None },
        IndexStatus::Ready(engine) => HealthResponse {
            status: "ready",
            documents: Some(engine.index().num_docs()),
            terms: Some(engine.index().num_terms()),
            error: None,
        },
        IndexStatus::Failed(e) => HealthResponse { status: "failed", documents: None, terms: None, error: Some(e.clone()) },
    };
    Json(response)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let engine = state.engine()?;
    let query = params.q.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.search(&query))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("search task failed: {e}")))?;
    let results = match outcome {
        SearchOutcome::NoMatch => Vec::new(),
        SearchOutcome::Hits(hits) => hits,
    };
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<DocResponse>, ApiError> {
    let engine = state.engine()?;
    let Some(doc) = engine.index().doc(doc_id).cloned() else {
        return Err(api_error(StatusCode::NOT_FOUND, "not found"));
    };
    let location = doc.resolve(&engine.config().doc_root);
    let text = tokio::task::spawn_blocking(move || match std::fs::read_to_string(&location) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(path = %location.display(), error = %e, "document text unavailable");
            None
        }
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("read task failed: {e}")))?;
    Ok(Json(DocResponse {
        doc_id,
        title: doc.title,
        path: doc.path,
        highest_term_frequency: doc.highest_term_frequency,
        text,
    }))
}
