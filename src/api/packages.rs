use super::{AppState, IdPath, JsonBody};
use crate::auth::CustomerAuth;
use crate::entities::customer::CustomerProfile;
use crate::entities::package::{Address, NewPackage, PaymentType};
use crate::error::AppResult;
use crate::{shipping, tracking};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/services", get(list_services))
        .route("/ship", post(ship))
        .route("/customer/profile", get(get_profile).post(save_profile))
        .route("/tracking/:id", get(track_package))
        .route("/user/packages", get(user_packages))
}

/// Ship form as posted by clients: flat sender_*/recipient_* fields
#[derive(Debug, Deserialize)]
struct ShipRequest {
    sender_name: String,
    sender_addr1: String,
    #[serde(default)]
    sender_addr2: Option<String>,
    sender_city: String,
    sender_state: String,
    sender_zip: String,
    recipient_name: String,
    recipient_addr1: String,
    #[serde(default)]
    recipient_addr2: Option<String>,
    recipient_city: String,
    recipient_state: String,
    recipient_zip: String,
    service_id: i64,
    weight_lb: f64,
    #[serde(default)]
    is_hazardous: bool,
    #[serde(default)]
    is_international: bool,
    #[serde(default)]
    declared_value: Option<f64>,
    #[serde(default)]
    customs_desc: Option<String>,
    payment_type: PaymentType,
}

impl From<ShipRequest> for NewPackage {
    fn from(req: ShipRequest) -> Self {
        NewPackage {
            sender: Address {
                name: req.sender_name,
                addr1: req.sender_addr1,
                addr2: req.sender_addr2.filter(|s| !s.trim().is_empty()),
                city: req.sender_city,
                state: req.sender_state,
                zip: req.sender_zip,
            },
            recipient: Address {
                name: req.recipient_name,
                addr1: req.recipient_addr1,
                addr2: req.recipient_addr2.filter(|s| !s.trim().is_empty()),
                city: req.recipient_city,
                state: req.recipient_state,
                zip: req.recipient_zip,
            },
            service_id: req.service_id,
            weight_lb: req.weight_lb,
            is_hazardous: req.is_hazardous,
            is_international: req.is_international,
            declared_value: req.declared_value,
            customs_desc: req.customs_desc,
            payment_type: req.payment_type,
        }
    }
}

/// GET /services - Service catalog (public)
async fn list_services(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let services = state.db.read(shipping::list_services)?;
    Ok(Json(json!({ "services": services })))
}

/// POST /ship - Create a shipment for the caller's customer profile
async fn ship(
    State(state): State<AppState>,
    auth: CustomerAuth,
    JsonBody(req): JsonBody<ShipRequest>,
) -> AppResult<impl IntoResponse> {
    let shipment = NewPackage::from(req);
    let receipt = state
        .db
        .write(|tx| shipping::create_shipment(tx, auth.user_id(), &shipment, Utc::now()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Package created successfully",
            "tracking_number": receipt.tracking_number,
            "estimated_cost": receipt.estimated_cost,
        })),
    ))
}

/// GET /customer/profile
async fn get_profile(State(state): State<AppState>, auth: CustomerAuth) -> AppResult<impl IntoResponse> {
    let lookup = state.db.read(|conn| shipping::get_profile(conn, auth.user_id()))?;
    Ok(Json(lookup))
}

/// POST /customer/profile - Create or update the caller's profile
async fn save_profile(
    State(state): State<AppState>,
    auth: CustomerAuth,
    JsonBody(profile): JsonBody<CustomerProfile>,
) -> AppResult<impl IntoResponse> {
    let customer = state
        .db
        .write(|tx| shipping::save_profile(tx, auth.user_id(), &profile))?;

    Ok(Json(json!({
        "message": "Profile created/updated successfully",
        "customer": customer,
    })))
}

/// GET /tracking/:id - Package details, current status and history (owner only)
async fn track_package(
    State(state): State<AppState>,
    auth: CustomerAuth,
    IdPath(package_id): IdPath,
) -> AppResult<impl IntoResponse> {
    let report = state
        .db
        .read(|conn| tracking::package_tracking(conn, package_id, auth.user_id()))?;
    Ok(Json(report))
}

/// GET /user/packages - Packages sent by the caller
async fn user_packages(State(state): State<AppState>, auth: CustomerAuth) -> AppResult<impl IntoResponse> {
    let packages = state
        .db
        .read(|conn| tracking::user_packages(conn, auth.user_id()))?;
    Ok(Json(json!({ "packages": packages })))
}
