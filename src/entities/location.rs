// Locations: warehouses, trucks and planes that can hold a package

use super::parse_text_column;
use crate::error::{is_unique_violation, AppError, AppResult};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Warehouse,
    Truck,
    Plane,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Warehouse => "warehouse",
            LocationType::Truck => "truck",
            LocationType::Plane => "plane",
        }
    }
}

impl FromStr for LocationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warehouse" => Ok(LocationType::Warehouse),
            "truck" => Ok(LocationType::Truck),
            "plane" => Ok(LocationType::Plane),
            other => Err(AppError::validation(format!(
                "Unknown location type '{}'; expected warehouse, truck or plane",
                other
            ))),
        }
    }
}

impl ToSql for LocationType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LocationType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub location_id: i64,
    #[serde(rename = "type")]
    pub location_type: LocationType,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl Location {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Location {
            location_id: row.get("location_id")?,
            location_type: row.get("type")?,
            name: row.get("name")?,
            city: row.get("city")?,
            state: row.get("state")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLocation {
    #[serde(rename = "type")]
    pub location_type: LocationType,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

pub fn list_locations(conn: &Connection) -> AppResult<Vec<Location>> {
    let mut stmt = conn.prepare(
        "SELECT location_id, type, name, city, state FROM Location ORDER BY type, name",
    )?;

    let locations = stmt
        .query_map([], Location::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(locations)
}

pub fn get_location(conn: &Connection, location_id: i64) -> AppResult<Option<Location>> {
    let location = conn
        .query_row(
            "SELECT location_id, type, name, city, state FROM Location WHERE location_id = ?1",
            [location_id],
            Location::from_row,
        )
        .optional()?;
    Ok(location)
}

pub fn insert_location(conn: &Connection, location: &NewLocation) -> AppResult<i64> {
    if location.name.trim().is_empty() {
        return Err(AppError::validation("Location name is required"));
    }

    let result = conn.execute(
        "INSERT INTO Location (type, name, city, state) VALUES (?1, ?2, ?3, ?4)",
        params![
            location.location_type,
            location.name.trim(),
            location.city,
            location.state
        ],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(AppError::validation(format!(
            "A {} named '{}' already exists",
            location.location_type.as_str(),
            location.name.trim()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Where newly shipped packages are received: the oldest warehouse
pub fn intake_warehouse(conn: &Connection) -> AppResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT location_id FROM Location WHERE type = 'warehouse'
             ORDER BY location_id LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}
