// HTTP layer: axum router, shared state and request extractors
//
// Every route is served twice, at the root and under `/api`. Handlers are
// stateless: each one opens its own connection through `Database::read` or
// `Database::write` and returns `AppError` for every failure.

mod admin;
mod billing;
mod packages;
mod users;

use crate::auth::TokenSigner;
use crate::db::Database;
use crate::error::AppError;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub tokens: Arc<TokenSigner>,
}

impl AppState {
    pub fn new(db: Database, tokens: TokenSigner) -> Self {
        AppState {
            db,
            tokens: Arc::new(tokens),
        }
    }
}

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(health_check))
        .merge(users::routes())
        .merge(packages::routes())
        .merge(admin::routes())
        .merge(billing::routes());

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET / - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Package Delivery API is running." }))
}

// ============================================================================
// Extractors
// ============================================================================

/// JSON body whose rejections become `{"error": ...}` 400 responses
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Numeric id from the path, rejected with a JSON 400 when malformed
pub struct IdPath(pub i64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state).await?;
        Ok(IdPath(id))
    }
}
