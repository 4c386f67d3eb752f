// Staff and admin operations: package oversight, dashboard stats, user management

use crate::accounts;
use crate::db::format_timestamp;
use crate::entities::location::LocationType;
use crate::entities::user::{self, Role, StaffRecord, User};
use crate::error::{AppError, AppResult};
use crate::tracking::{self, DerivedStatus, TrackingStatus, UNKNOWN_STATUS};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Rows returned by the package overview
pub const PACKAGE_OVERVIEW_LIMIT: i64 = 100;
pub const RECENT_ACTIVITY_LIMIT: i64 = 10;

// ============================================================================
// PACKAGES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PackageOverview {
    pub tracking_number: i64,
    pub sender: String,
    pub recipient: String,
    pub destination: String,
    pub customer: String,
    pub service: String,
    pub date_shipped: String,
    pub date_delivered: Option<String>,
    pub current_status: DerivedStatus,
    pub current_location: String,
}

/// Most recently shipped packages with their derived status and location
pub fn all_packages(conn: &Connection) -> AppResult<Vec<PackageOverview>> {
    let mut stmt = conn.prepare(
        "SELECT p.package_id, p.sender_name, p.recipient_name, p.recipient_city,
                p.recipient_state, p.date_shipped, p.date_delivered,
                c.name AS customer_name, st.name AS service_name,
                latest.status AS current_status, l.name AS current_location
         FROM Package p
         JOIN Customer c ON p.customer_id = c.customer_id
         JOIN ServiceType st ON p.service_id = st.service_id
         LEFT JOIN TrackingEvent latest ON latest.event_id = (
             SELECT te.event_id FROM TrackingEvent te
             WHERE te.package_id = p.package_id
             ORDER BY te.timestamp DESC LIMIT 1)
         LEFT JOIN Location l ON latest.location_id = l.location_id
         ORDER BY p.date_shipped DESC
         LIMIT ?1",
    )?;

    let packages = stmt
        .query_map([PACKAGE_OVERVIEW_LIMIT], |row| {
            let city: String = row.get("recipient_city")?;
            let state: String = row.get("recipient_state")?;
            let status: Option<TrackingStatus> = row.get("current_status")?;
            let location: Option<String> = row.get("current_location")?;
            Ok(PackageOverview {
                tracking_number: row.get("package_id")?,
                sender: row.get("sender_name")?,
                recipient: row.get("recipient_name")?,
                destination: format!("{}, {}", city, state),
                customer: row.get("customer_name")?,
                service: row.get("service_name")?,
                date_shipped: row.get("date_shipped")?,
                date_delivered: row.get("date_delivered")?,
                current_status: status.into(),
                current_location: location.unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(packages)
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageLocation {
    pub location_id: i64,
    #[serde(rename = "type")]
    pub location_type: LocationType,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub last_update: String,
    pub status: TrackingStatus,
}

/// Where the latest event put the package; NotFound when it has none
pub fn package_location(conn: &Connection, package_id: i64) -> AppResult<PackageLocation> {
    let latest = tracking::latest_event(conn, package_id)?
        .ok_or_else(|| AppError::not_found("Package not found or no location data"))?;

    Ok(PackageLocation {
        location_id: latest.location_id,
        location_type: latest.location_type,
        name: latest.location_name,
        city: latest.city,
        state: latest.state,
        last_update: latest.timestamp,
        status: latest.status,
    })
}

// ============================================================================
// DASHBOARD
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total_packages: i64,
    pub in_transit: i64,
    pub delivered_today: i64,
    pub total_customers: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub timestamp: String,
    pub status: TrackingStatus,
    pub tracking_number: i64,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub stats: Stats,
    pub recent_activity: Vec<ActivityEntry>,
}

/// Counts plus the latest events system-wide. "Today" is the UTC date of `now`.
pub fn dashboard(conn: &Connection, now: DateTime<Utc>) -> AppResult<Dashboard> {
    let today = now.format("%Y-%m-%d").to_string();
    let count = |sql: &str| -> AppResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

    let delivered_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM Package WHERE substr(date_delivered, 1, 10) = ?1",
        [&today],
        |row| row.get(0),
    )?;

    let stats = Stats {
        total_packages: count("SELECT COUNT(*) FROM Package")?,
        in_transit: count("SELECT COUNT(*) FROM Package WHERE date_delivered IS NULL")?,
        delivered_today,
        total_customers: count("SELECT COUNT(*) FROM Customer")?,
    };

    let mut stmt = conn.prepare(
        "SELECT te.timestamp, te.status, te.package_id, l.name AS location_name
         FROM TrackingEvent te
         JOIN Location l ON te.location_id = l.location_id
         ORDER BY te.timestamp DESC
         LIMIT ?1",
    )?;
    let recent_activity = stmt
        .query_map([RECENT_ACTIVITY_LIMIT], |row| {
            Ok(ActivityEntry {
                timestamp: row.get("timestamp")?,
                status: row.get("status")?,
                tracking_number: row.get("package_id")?,
                location: row.get("location_name")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Dashboard { stats, recent_activity })
}

// ============================================================================
// USER MANAGEMENT
// ============================================================================

/// Only staff and admin roles are managed here
fn staff_role(role: &str) -> AppResult<Role> {
    match role.parse::<Role>() {
        Ok(role) if role.is_staff_or_admin() => Ok(role),
        _ => Err(AppError::validation("Role must be staff or admin")),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaffUser {
    pub email: String,
    pub password: String,
    pub role: String,
    #[serde(default)]
    pub employee_number: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedStaffUser {
    #[serde(flatten)]
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_record: Option<StaffRecord>,
}

/// Create a staff or admin account, with an HR record when one is described
pub fn create_staff_user(conn: &Connection, new_user: &NewStaffUser, now: DateTime<Utc>) -> AppResult<CreatedStaffUser> {
    let role = staff_role(&new_user.role)?;
    let email = new_user.email.trim();
    accounts::validate_email(email)?;
    accounts::validate_password(&new_user.password)?;

    let user = accounts::create_user(conn, email, &new_user.password, role, now)?;

    let staff_record = if new_user.employee_number.is_some() || new_user.department.is_some() {
        let record = StaffRecord {
            employee_number: new_user
                .employee_number
                .clone()
                .unwrap_or_else(|| format!("EMP{:05}", user.user_id)),
            hire_date: format_timestamp(now)[..10].to_string(),
            department: new_user
                .department
                .clone()
                .unwrap_or_else(|| "General".to_string()),
        };
        user::insert_staff_record(conn, user.user_id, &record)?;
        Some(record)
    } else {
        None
    };

    Ok(CreatedStaffUser { user, staff_record })
}

/// Delete a staff/admin account other than the caller's own
pub fn delete_user(conn: &Connection, acting_user: i64, target: i64) -> AppResult<()> {
    if acting_user == target {
        return Err(AppError::validation("Cannot delete your own account"));
    }

    let role = user::get_role(conn, target)?.ok_or_else(|| AppError::not_found("User not found"))?;
    if role == Role::Customer {
        return Err(AppError::forbidden(
            "Cannot delete customer accounts from this interface",
        ));
    }

    user::delete_user(conn, target)?;
    tracing::info!(acting_user, target, "user deleted");
    Ok(())
}

/// Move another user between staff and admin
pub fn update_role(conn: &Connection, acting_user: i64, target: i64, role: &str) -> AppResult<Role> {
    if acting_user == target {
        return Err(AppError::validation("Cannot modify your own role"));
    }
    let role = staff_role(role)?;

    if user::update_staff_role(conn, target, role)? == 0 {
        return Err(AppError::not_found("User not found or not a staff/admin"));
    }

    tracing::info!(acting_user, target, role = %role, "role changed");
    Ok(role)
}
