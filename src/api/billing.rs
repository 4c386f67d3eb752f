use super::{AppState, IdPath, JsonBody};
use crate::auth::CustomerAuth;
use crate::billing::{self, PaymentRequest};
use crate::error::AppResult;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/billing/statements", get(list_statements))
        .route("/billing/statements/:id", get(statement_detail))
        .route("/billing/payment-history", get(payment_history))
        .route("/billing/make-payment", post(make_payment))
}

/// GET /billing/statements - Contract customers only
async fn list_statements(State(state): State<AppState>, auth: CustomerAuth) -> AppResult<impl IntoResponse> {
    let list = state
        .db
        .read(|conn| billing::statements_for_user(conn, auth.user_id()))?;
    Ok(Json(list))
}

async fn statement_detail(
    State(state): State<AppState>,
    auth: CustomerAuth,
    IdPath(statement_id): IdPath,
) -> AppResult<impl IntoResponse> {
    let detail = state
        .db
        .read(|conn| billing::statement_detail(conn, auth.user_id(), statement_id))?;
    Ok(Json(detail))
}

async fn payment_history(State(state): State<AppState>, auth: CustomerAuth) -> AppResult<impl IntoResponse> {
    let payments = state
        .db
        .read(|conn| billing::payment_history(conn, auth.user_id()))?;
    Ok(Json(json!({ "payments": payments })))
}

/// POST /billing/make-payment - Record a payment, optionally settling a statement
async fn make_payment(
    State(state): State<AppState>,
    auth: CustomerAuth,
    JsonBody(req): JsonBody<PaymentRequest>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .db
        .write(|tx| billing::make_payment(tx, auth.user_id(), &req, Utc::now()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Payment processed successfully",
            "payment_id": record.payment_id,
            "payment": record,
        })),
    ))
}
