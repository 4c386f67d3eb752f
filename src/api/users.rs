use super::{AppState, JsonBody};
use crate::accounts::{self, Credentials};
use crate::error::AppResult;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
}

/// POST /login - Exchange email + password for a bearer token
async fn login(
    State(state): State<AppState>,
    JsonBody(creds): JsonBody<Credentials>,
) -> AppResult<impl IntoResponse> {
    let user = state.db.read(|conn| accounts::login(conn, &creds))?;
    let token = state.tokens.issue(user.user_id)?;

    tracing::info!(user_id = user.user_id, role = %user.role, "login");
    Ok(Json(json!({ "token": token, "user": user })))
}

/// POST /register - Create a customer account
async fn register(
    State(state): State<AppState>,
    JsonBody(creds): JsonBody<Credentials>,
) -> AppResult<impl IntoResponse> {
    let user = state.db.write(|tx| accounts::register(tx, &creds, Utc::now()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": user.user_id, "email": user.email, "role": user.role })),
    ))
}
