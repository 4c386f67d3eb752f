use super::{AppState, IdPath, JsonBody};
use crate::admin::{self, NewStaffUser};
use crate::auth::{AdminAuth, StaffAuth};
use crate::billing;
use crate::entities::customer;
use crate::entities::location::{self, NewLocation};
use crate::entities::user;
use crate::error::AppResult;
use crate::tracking::{self, StatusUpdate};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{de, Deserialize, Deserializer};
use serde_json::json;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        // Staff
        .route("/admin/locations", get(list_locations).post(create_location))
        .route("/admin/packages", get(list_packages))
        .route("/admin/packages/:id/update-status", post(update_status))
        .route("/admin/packages/:id/location", get(package_location))
        .route("/admin/stats", get(stats))
        // Admin
        .route("/admin/users", get(list_users))
        .route("/admin/users/create", post(create_user))
        .route("/admin/users/:id", delete(delete_user))
        .route("/admin/users/:id/update-role", put(update_role))
        .route("/admin/customers", get(list_customers))
        .route("/admin/customers/:id/contract", post(set_contract))
        .route("/admin/customers/:id/statements", post(generate_statement))
}

// ============================================================================
// Staff handlers
// ============================================================================

async fn list_locations(State(state): State<AppState>, _auth: StaffAuth) -> AppResult<impl IntoResponse> {
    let locations = state.db.read(location::list_locations)?;
    Ok(Json(json!({ "locations": locations })))
}

async fn create_location(
    State(state): State<AppState>,
    _auth: StaffAuth,
    JsonBody(new_location): JsonBody<NewLocation>,
) -> AppResult<impl IntoResponse> {
    let location_id = state
        .db
        .write(|tx| location::insert_location(tx, &new_location))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Location created successfully", "location_id": location_id })),
    ))
}

async fn list_packages(State(state): State<AppState>, _auth: StaffAuth) -> AppResult<impl IntoResponse> {
    let packages = state.db.read(admin::all_packages)?;
    Ok(Json(json!({ "packages": packages })))
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    /// Form clients post the `<select>` value, so `"3"` is as good as `3`
    #[serde(deserialize_with = "number_or_numeric_string")]
    location_id: i64,
    status: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    signature: Option<String>,
}

fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer) {
        Ok(Raw::Number(id)) => Ok(id),
        Ok(Raw::Text(text)) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected a numeric id, got \"{}\"", text))),
        Err(_) => Err(de::Error::custom("expected a numeric id")),
    }
}

/// POST /admin/packages/:id/update-status - Append a tracking event
async fn update_status(
    State(state): State<AppState>,
    auth: StaffAuth,
    IdPath(package_id): IdPath,
    JsonBody(req): JsonBody<StatusUpdateRequest>,
) -> AppResult<impl IntoResponse> {
    let update = StatusUpdate {
        location_id: req.location_id,
        status: req.status.parse()?,
        notes: req.notes,
        signature: req.signature,
    };

    let applied = state
        .db
        .write(|tx| tracking::append_event(tx, package_id, &update, Utc::now()))?;
    tracing::info!(staff = auth.user_id(), package_id, status = %applied.status, "status updated");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Package status updated successfully",
            "event_id": applied.event_id,
            "event": applied,
        })),
    ))
}

async fn package_location(
    State(state): State<AppState>,
    _auth: StaffAuth,
    IdPath(package_id): IdPath,
) -> AppResult<impl IntoResponse> {
    let location = state.db.read(|conn| admin::package_location(conn, package_id))?;
    Ok(Json(json!({ "location": location })))
}

async fn stats(State(state): State<AppState>, _auth: StaffAuth) -> AppResult<impl IntoResponse> {
    let dashboard = state.db.read(|conn| admin::dashboard(conn, Utc::now()))?;
    Ok(Json(dashboard))
}

// ============================================================================
// Admin handlers
// ============================================================================

async fn list_users(State(state): State<AppState>, _auth: AdminAuth) -> AppResult<impl IntoResponse> {
    let users = state.db.read(user::list_staff_users)?;
    Ok(Json(json!({ "users": users })))
}

async fn create_user(
    State(state): State<AppState>,
    _auth: AdminAuth,
    JsonBody(new_user): JsonBody<NewStaffUser>,
) -> AppResult<impl IntoResponse> {
    let created = state
        .db
        .write(|tx| admin::create_staff_user(tx, &new_user, Utc::now()))?;

    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: AdminAuth,
    IdPath(target): IdPath,
) -> AppResult<impl IntoResponse> {
    state
        .db
        .write(|tx| admin::delete_user(tx, auth.user_id(), target))?;

    Ok(Json(json!({ "message": "User deleted successfully", "user_id": target })))
}

#[derive(Debug, Deserialize)]
struct RoleRequest {
    role: String,
}

async fn update_role(
    State(state): State<AppState>,
    auth: AdminAuth,
    IdPath(target): IdPath,
    JsonBody(req): JsonBody<RoleRequest>,
) -> AppResult<impl IntoResponse> {
    let role = state
        .db
        .write(|tx| admin::update_role(tx, auth.user_id(), target, &req.role))?;

    Ok(Json(json!({
        "message": "Role updated successfully",
        "user_id": target,
        "new_role": role,
    })))
}

async fn list_customers(State(state): State<AppState>, _auth: AdminAuth) -> AppResult<impl IntoResponse> {
    let customers = state.db.read(customer::list_customers)?;
    Ok(Json(json!({ "customers": customers })))
}

#[derive(Debug, Deserialize)]
struct ContractRequest {
    #[serde(default)]
    has_contract: bool,
}

async fn set_contract(
    State(state): State<AppState>,
    _auth: AdminAuth,
    IdPath(customer_id): IdPath,
    JsonBody(req): JsonBody<ContractRequest>,
) -> AppResult<impl IntoResponse> {
    let change = state
        .db
        .write(|tx| billing::set_contract(tx, customer_id, req.has_contract))?;
    Ok(Json(change))
}

#[derive(Debug, Deserialize)]
struct StatementRequest {
    /// `YYYY-MM`
    month: String,
}

async fn generate_statement(
    State(state): State<AppState>,
    _auth: AdminAuth,
    IdPath(customer_id): IdPath,
    JsonBody(req): JsonBody<StatementRequest>,
) -> AppResult<impl IntoResponse> {
    let detail = state
        .db
        .write(|tx| billing::generate_statement(tx, customer_id, req.month.trim()))?;
    Ok((StatusCode::CREATED, Json(detail)))
}
