// 📦 Tracking - status derivation and the delivery transition
//
// A package's history is an append-only log of TrackingEvent rows. Its current
// status is never stored: it is the status of the event with the greatest
// timestamp. Recording a "delivered" event also stamps the package's delivery
// date and signature, in the same transaction as the event insert.
//
// Events sharing one timestamp have no defined order (SQLite resolves
// `ORDER BY timestamp DESC LIMIT 1` by row order). Events appended here get
// strictly increasing timestamps per package, so they never tie.

use crate::db::{format_timestamp, parse_timestamp};
use crate::entities::customer;
use crate::entities::location::{self, LocationType};
use crate::entities::package::{self, Address, Package};
use crate::entities::parse_text_column;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Reported by tracking and admin views when a package has no events yet
pub const UNKNOWN_STATUS: &str = "Unknown";

/// Reported by the customer's own package list when a package has no events yet
pub const PENDING_STATUS: &str = "Processing";

/// Signature recorded when a delivery update does not carry one
pub const DEFAULT_SIGNATURE: &str = "Staff";

// ============================================================================
// TRACKING STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingStatus {
    Processing,
    Arrived,
    Departed,
    Loaded,
    OutForDelivery,
    /// Terminal: sets the package's delivery date and signature
    Delivered,
}

impl TrackingStatus {
    pub const ALL: [TrackingStatus; 6] = [
        TrackingStatus::Processing,
        TrackingStatus::Arrived,
        TrackingStatus::Departed,
        TrackingStatus::Loaded,
        TrackingStatus::OutForDelivery,
        TrackingStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Processing => "processing",
            TrackingStatus::Arrived => "arrived",
            TrackingStatus::Departed => "departed",
            TrackingStatus::Loaded => "loaded",
            TrackingStatus::OutForDelivery => "out-for-delivery",
            TrackingStatus::Delivered => "delivered",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingStatus::Delivered)
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingStatus {
    type Err = AppError;

    /// Accepts the canonical form plus the spaced and underscored spellings
    /// of "out-for-delivery"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        TrackingStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                let expected: Vec<&str> = TrackingStatus::ALL.iter().map(|s| s.as_str()).collect();
                AppError::validation(format!(
                    "Invalid status '{}'; expected one of: {}",
                    s,
                    expected.join(", ")
                ))
            })
    }
}

impl ToSql for TrackingStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TrackingStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

/// Status as reported to clients: either a recorded event status or one of
/// the no-events sentinels (`Unknown`, or `Processing` in customer listings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedStatus {
    Recorded(TrackingStatus),
    Unknown,
    Pending,
}

impl DerivedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedStatus::Recorded(status) => status.as_str(),
            DerivedStatus::Unknown => UNKNOWN_STATUS,
            DerivedStatus::Pending => PENDING_STATUS,
        }
    }

    pub fn recorded(&self) -> Option<TrackingStatus> {
        match self {
            DerivedStatus::Recorded(status) => Some(*status),
            DerivedStatus::Unknown | DerivedStatus::Pending => None,
        }
    }
}

impl From<Option<TrackingStatus>> for DerivedStatus {
    fn from(status: Option<TrackingStatus>) -> Self {
        status.map_or(DerivedStatus::Unknown, DerivedStatus::Recorded)
    }
}

impl Serialize for DerivedStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// EVENTS & REPORTS
// ============================================================================

/// One history entry, joined with the location it happened at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingEntry {
    pub event_id: i64,
    pub timestamp: String,
    pub status: TrackingStatus,
    pub notes: Option<String>,
    pub location_id: i64,
    #[serde(rename = "location")]
    pub location_name: String,
    pub location_type: LocationType,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl TrackingEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(TrackingEntry {
            event_id: row.get("event_id")?,
            timestamp: row.get("timestamp")?,
            status: row.get("status")?,
            notes: row.get("notes")?,
            location_id: row.get("location_id")?,
            location_name: row.get("location_name")?,
            location_type: row.get("location_type")?,
            city: row.get("location_city")?,
            state: row.get("location_state")?,
        })
    }
}

const ENTRY_SELECT: &str = "SELECT te.event_id, te.timestamp, te.status, te.notes,
            l.location_id, l.name AS location_name, l.type AS location_type,
            l.city AS location_city, l.state AS location_state
     FROM TrackingEvent te
     JOIN Location l ON te.location_id = l.location_id";

/// Current status of a package, never null
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentStatus {
    pub status: DerivedStatus,
    pub location: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub timestamp: Option<String>,
}

impl CurrentStatus {
    pub fn unknown() -> Self {
        CurrentStatus {
            status: DerivedStatus::Unknown,
            location: UNKNOWN_STATUS.to_string(),
            city: None,
            state: None,
            timestamp: None,
        }
    }

    pub fn from_entry(entry: &TrackingEntry) -> Self {
        CurrentStatus {
            status: DerivedStatus::Recorded(entry.status),
            location: entry.location_name.clone(),
            city: entry.city.clone(),
            state: entry.state.clone(),
            timestamp: Some(entry.timestamp.clone()),
        }
    }
}

/// Current status of a history: the entry with the greatest timestamp.
///
/// Does not rely on the order of `history`.
pub fn derive_current_status(history: &[TrackingEntry]) -> CurrentStatus {
    history
        .iter()
        .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
        .map(CurrentStatus::from_entry)
        .unwrap_or_else(CurrentStatus::unknown)
}

/// Static package attributes shown alongside tracking data
#[derive(Debug, Clone, Serialize)]
pub struct PackageView {
    pub tracking_number: i64,
    pub service: String,
    pub delivery_speed: String,
    pub weight: f64,
    pub date_shipped: String,
    pub date_delivered: Option<String>,
    pub delivered_signature: Option<String>,
    pub is_hazardous: bool,
    pub is_international: bool,
    pub sender: Address,
    pub recipient: Address,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingReport {
    pub package: PackageView,
    pub current_status: CurrentStatus,
    /// Newest first
    pub tracking_history: Vec<TrackingEntry>,
}

/// Row of the "my packages" listing
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub tracking_number: i64,
    pub recipient_name: String,
    pub recipient_location: String,
    pub service: String,
    pub date_shipped: String,
    pub date_delivered: Option<String>,
    pub current_status: DerivedStatus,
}

// ============================================================================
// QUERIES
// ============================================================================

/// Full event history of a package, newest first
pub fn history(conn: &Connection, package_id: i64) -> AppResult<Vec<TrackingEntry>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE te.package_id = ?1 ORDER BY te.timestamp DESC",
        ENTRY_SELECT
    ))?;

    let entries = stmt
        .query_map([package_id], TrackingEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// The chronologically latest event of a package, if any
pub fn latest_event(conn: &Connection, package_id: i64) -> AppResult<Option<TrackingEntry>> {
    let entry = conn
        .query_row(
            &format!(
                "{} WHERE te.package_id = ?1 ORDER BY te.timestamp DESC LIMIT 1",
                ENTRY_SELECT
            ),
            [package_id],
            TrackingEntry::from_row,
        )
        .optional()?;
    Ok(entry)
}

pub fn current_status(conn: &Connection, package_id: i64) -> AppResult<CurrentStatus> {
    Ok(latest_event(conn, package_id)?
        .as_ref()
        .map(CurrentStatus::from_entry)
        .unwrap_or_else(CurrentStatus::unknown))
}

/// Package details, current status and history for the package's owner.
///
/// NotFound when the package does not exist; Forbidden when `user_id` is not
/// the account linked to the sending customer.
pub fn package_tracking(conn: &Connection, package_id: i64, user_id: i64) -> AppResult<TrackingReport> {
    let package = package::get_package(conn, package_id)?
        .ok_or_else(|| AppError::not_found("Package not found"))?;

    let owner = customer::get_customer(conn, package.customer_id)?;
    if !owner.map_or(false, |c| c.is_owned_by(user_id)) {
        return Err(AppError::forbidden("Unauthorized to view this package"));
    }

    let view = package_view(conn, package)?;
    let tracking_history = history(conn, package_id)?;
    let current_status = derive_current_status(&tracking_history);

    Ok(TrackingReport {
        package: view,
        current_status,
        tracking_history,
    })
}

fn package_view(conn: &Connection, package: Package) -> AppResult<PackageView> {
    let (service, delivery_speed): (String, String) = conn.query_row(
        "SELECT name, delivery_speed FROM ServiceType WHERE service_id = ?1",
        [package.service_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(PackageView {
        tracking_number: package.package_id,
        service,
        delivery_speed,
        weight: package.weight_lb,
        date_shipped: package.date_shipped,
        date_delivered: package.date_delivered,
        delivered_signature: package.delivered_signature,
        is_hazardous: package.is_hazardous,
        is_international: package.is_international,
        sender: package.sender,
        recipient: package.recipient,
    })
}

/// Every package sent by the customer linked to `user_id`, newest first
pub fn user_packages(conn: &Connection, user_id: i64) -> AppResult<Vec<PackageSummary>> {
    let mut stmt = conn.prepare(
        "SELECT p.package_id, p.recipient_name, p.recipient_city, p.recipient_state,
                p.date_shipped, p.date_delivered, st.name AS service_name,
                (SELECT te.status FROM TrackingEvent te
                 WHERE te.package_id = p.package_id
                 ORDER BY te.timestamp DESC LIMIT 1) AS current_status
         FROM Package p
         JOIN ServiceType st ON p.service_id = st.service_id
         JOIN Customer c ON p.customer_id = c.customer_id
         WHERE c.user_id = ?1
         ORDER BY p.date_shipped DESC",
    )?;

    let packages = stmt
        .query_map([user_id], |row| {
            let city: String = row.get("recipient_city")?;
            let state: String = row.get("recipient_state")?;
            let status: Option<TrackingStatus> = row.get("current_status")?;
            Ok(PackageSummary {
                tracking_number: row.get("package_id")?,
                recipient_name: row.get("recipient_name")?,
                recipient_location: format!("{}, {}", city, state),
                service: row.get("service_name")?,
                date_shipped: row.get("date_shipped")?,
                date_delivered: row.get("date_delivered")?,
                current_status: status.map_or(DerivedStatus::Pending, DerivedStatus::Recorded),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(packages)
}

// ============================================================================
// STATUS UPDATES
// ============================================================================

/// A new tracking event for one package
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub location_id: i64,
    pub status: TrackingStatus,
    pub notes: Option<String>,
    /// Only used for delivered events
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedUpdate {
    pub event_id: i64,
    pub package_id: i64,
    pub status: TrackingStatus,
    pub timestamp: String,
    /// Set when this update recorded a delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_delivered: Option<String>,
}

/// Timestamp for the next event of a package: `now`, or one microsecond after
/// the latest existing event when `now` would not sort after it.
pub fn next_event_timestamp(latest: Option<&str>, now: DateTime<Utc>) -> String {
    let floor = latest
        .and_then(parse_timestamp)
        .map(|ts| ts + Duration::microseconds(1));

    match floor {
        Some(floor) if floor > now => format_timestamp(floor),
        _ => format_timestamp(now),
    }
}

/// Append one tracking event; on "delivered" also stamp the package.
///
/// Run this inside a transaction: the event insert and the package update
/// must commit or roll back together. Prior events are never modified.
pub fn append_event(
    conn: &Connection,
    package_id: i64,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> AppResult<AppliedUpdate> {
    if !package::package_exists(conn, package_id)? {
        return Err(AppError::not_found("Package not found"));
    }
    if location::get_location(conn, update.location_id)?.is_none() {
        return Err(AppError::validation(format!(
            "Unknown location {}",
            update.location_id
        )));
    }

    let latest: Option<String> = conn.query_row(
        "SELECT MAX(timestamp) FROM TrackingEvent WHERE package_id = ?1",
        [package_id],
        |row| row.get(0),
    )?;
    let timestamp = next_event_timestamp(latest.as_deref(), now);

    conn.execute(
        "INSERT INTO TrackingEvent (package_id, location_id, timestamp, status, notes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            package_id,
            update.location_id,
            timestamp,
            update.status,
            update.notes.as_deref().map(str::trim).filter(|n| !n.is_empty())
        ],
    )?;
    let event_id = conn.last_insert_rowid();

    let date_delivered = if update.status.is_terminal() {
        let signature = update
            .signature
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SIGNATURE);
        package::mark_delivered(conn, package_id, &timestamp, signature)?;
        tracing::info!(package_id, signature, "package delivered");
        Some(timestamp.clone())
    } else {
        None
    };

    tracing::debug!(package_id, event_id, status = %update.status, "tracking event appended");

    Ok(AppliedUpdate {
        event_id,
        package_id,
        status: update.status,
        timestamp,
        date_delivered,
    })
}
