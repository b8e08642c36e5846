// REST API over the cat service (feature "server")

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        OriginalUri, Path, Query, State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, patch},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::cat::Cat;
use crate::db::SqliteCatMapper;
use crate::error::{CatServiceError, ServiceResult};
use crate::service::CatService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Mutex<CatService<SqliteCatMapper>>>,
}

impl AppState {
    pub fn new(service: CatService<SqliteCatMapper>) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
        }
    }

    fn with_service<T>(
        &self,
        uri: &Uri,
        op: impl FnOnce(&CatService<SqliteCatMapper>) -> ServiceResult<T>,
    ) -> Result<T, ApiError> {
        let service = self
            .service
            .lock()
            .map_err(|_| ApiError::internal(uri, "service lock poisoned"))?;
        op(&service).map_err(|e| ApiError::from_service(uri, e))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: String,
    error: String,
    message: String,
    path: String,
    timestamp: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    path: String,
}

impl ApiError {
    fn from_service(uri: &Uri, err: CatServiceError) -> Self {
        match err {
            CatServiceError::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                message,
                path: uri.path().to_string(),
            },
            CatServiceError::Mapper(e) => {
                error!(error = %e, path = uri.path(), "mapper failure");
                Self::internal(uri, &e.to_string())
            }
        }
    }

    /// Malformed query string or body, reported in the same envelope
    fn rejected(uri: &Uri, status: StatusCode, message: String) -> Self {
        Self {
            status,
            message,
            path: uri.path().to_string(),
        }
    }

    fn internal(uri: &Uri, message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.to_string(),
            path: uri.path().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: self.status.as_u16().to_string(),
            error: self
                .status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.message,
            path: self.path,
            timestamp: Utc::now().to_rfc3339(),
        };

        let response: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some(body),
        };

        (self.status, Json(response)).into_response()
    }
}

// ============================================================================
// Request payloads
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CatQuery {
    pub name: Option<String>,
    pub sex: Option<String>,
    pub age: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCatRequest {
    pub name: String,
    pub sex: String,
    pub age: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCatRequest {
    pub sex: String,
    pub age: i32,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/cats?name=&sex=&age= - Find cats by an optional filter
async fn find_cats(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<CatQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Cat>>>, ApiError> {
    let Query(query) =
        query.map_err(|r| ApiError::rejected(&uri, r.status(), r.body_text()))?;
    let cats = state.with_service(&uri, |service| {
        service.find_cat(query.name.as_deref(), query.sex.as_deref(), query.age)
    })?;

    Ok(Json(ApiResponse::ok(cats)))
}

/// POST /api/cats - Register a new cat
async fn create_cat(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    request: Result<Json<CreateCatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        request.map_err(|r| ApiError::rejected(&uri, r.status(), r.body_text()))?;
    let cat = state.with_service(&uri, |service| {
        service.insert_cat(&request.name, &request.sex, request.age)
    })?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(cat))))
}

/// PATCH /api/cats/:name - Replace sex and age
async fn update_cat(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(name): Path<String>,
    request: Result<Json<UpdateCatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        request.map_err(|r| ApiError::rejected(&uri, r.status(), r.body_text()))?;
    state.with_service(&uri, |service| {
        service.update_cat(&name, &request.sex, request.age)
    })?;

    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "ねこの情報を更新しました。",
    })))
}

/// DELETE /api/cats/:name - Remove a cat
async fn delete_cat(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.with_service(&uri, |service| service.delete_cat(&name))?;

    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "ねこの情報を削除しました。",
    })))
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/cats", get(find_cats).post(create_cat))
        .route("/cats/:name", patch(update_cat).delete(delete_cat))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
