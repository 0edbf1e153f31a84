//! HTTP surface: routing, query parsing and the JSON error envelope.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::counts::{self, FieldMatchCounts};
use crate::error::{CatalogError, CatalogResult};
use crate::mutate;
use crate::pager::{self, DEFAULT_PAGE_LIMIT, Page, PageRequest};
use crate::query::{FilterCompiler, ListParams};
use crate::record::VideoRecord;
use crate::store::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub compiler: Arc<FilterCompiler>,
    pub max_page_limit: u64,
}

impl AppState {
    pub fn new(store: SqliteStore, compiler: FilterCompiler, max_page_limit: u64) -> Self {
        Self {
            store: Arc::new(store),
            compiler: Arc::new(compiler),
            max_page_limit,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
        }
    }

    fn rejected(status: StatusCode, message: String) -> Self {
        Self {
            status,
            code: "VALIDATION_ERROR",
            message,
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let (status, code) = match &err {
            CatalogError::Validation(_)
            | CatalogError::MissingTitle
            | CatalogError::NoValidFields => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            CatalogError::InvalidIdentifier(_) => (StatusCode::BAD_REQUEST, "INVALID_IDENTIFIER"),
            CatalogError::InvalidCursor(_) => (StatusCode::BAD_REQUEST, "INVALID_CURSOR"),
            CatalogError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CatalogError::AggregationFailure(inner) => {
                tracing::error!(error = %format!("{inner:#}"), "filter count aggregation failed");
                return Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "AGGREGATION_FAILURE",
                    message: "Failed to aggregate filter counts".to_string(),
                };
            }
            CatalogError::Store(inner) => {
                tracing::error!(error = %format!("{inner:#}"), "store error");
                return Self::internal("An internal error occurred");
            }
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// Malformed query strings, bodies and paths get the same envelope as every
// other client error.
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
            "code": self.code,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/videos", get(list_videos).post(create_video))
        .route("/api/videos/filter_counts", get(filter_counts))
        .route("/api/videos/{id}", put(update_video).delete(delete_video))
        .route("/api/filter_counts", get(filter_counts))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs blocking store work off the async executor.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> CatalogResult<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
        .map_err(ApiError::from)
}

async fn root() -> Json<Value> {
    Json(json!({"message": "Video catalog API is running"}))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub last_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "transcriptText")]
    pub transcript_text: Option<String>,
    pub search: Option<String>,
    pub search_field: Option<String>,
    #[serde(default)]
    pub filter_counts: bool,
}

async fn list_videos(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Page>> {
    let Query(query) = query?;
    let limit = match query.limit {
        None => DEFAULT_PAGE_LIMIT,
        Some(raw) => u64::try_from(raw).map_err(|_| {
            CatalogError::validation(format!(
                "limit must be between 1 and {}, got {raw}",
                state.max_page_limit
            ))
        })?,
    };

    let params = ListParams {
        title: query.title,
        description: query.description,
        transcript_text: query.transcript_text,
        search: query.search,
        search_field: query.search_field,
    };
    let request = PageRequest {
        limit,
        last_id: query.last_id,
        with_filter_counts: query.filter_counts,
    };

    let compiled = state.compiler.compile(&params);
    let store = state.store.clone();
    let max_limit = state.max_page_limit;
    let page = blocking(move || pager::fetch_page(&*store, &compiled, &request, max_limit)).await?;
    Ok(Json(page))
}

fn into_object(payload: Value) -> CatalogResult<Map<String, Value>> {
    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(CatalogError::validation("request body must be a JSON object")),
    }
}

async fn create_video(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<VideoRecord>> {
    let Json(payload) = payload?;
    let payload = into_object(payload)?;
    let store = state.store.clone();
    let paths = state.compiler.paths().clone();
    let record = blocking(move || mutate::create(&*store, &paths, &payload)).await?;
    Ok(Json(record))
}

async fn update_video(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<VideoRecord>> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let payload = into_object(payload)?;
    let store = state.store.clone();
    let paths = state.compiler.paths().clone();
    let record = blocking(move || mutate::update(&*store, &paths, &id, &payload)).await?;
    Ok(Json(record))
}

async fn delete_video(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let store = state.store.clone();
    blocking(move || mutate::delete(&*store, &id)).await?;
    Ok(Json(json!({"message": "Video deleted successfully"})))
}

#[derive(Debug, Default, Deserialize)]
pub struct CountsQuery {
    pub search: Option<String>,
    pub keyword: Option<String>,
}

async fn filter_counts(
    State(state): State<AppState>,
    query: Result<Query<CountsQuery>, QueryRejection>,
) -> ApiResult<Json<FieldMatchCounts>> {
    let Query(query) = query?;
    let keyword = query.search.or(query.keyword).unwrap_or_default();
    let store = state.store.clone();
    let counts = blocking(move || counts::count_field_matches(&*store, &keyword)).await?;
    Ok(Json(counts))
}
