// Shipping service catalog (static price / weight-limit / speed data)

use super::parse_text_column;
use crate::error::{AppError, AppResult};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliverySpeed {
    #[serde(rename = "overnight")]
    Overnight,
    #[serde(rename = "2-day")]
    TwoDay,
    #[serde(rename = "ground")]
    Ground,
}

impl DeliverySpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliverySpeed::Overnight => "overnight",
            DeliverySpeed::TwoDay => "2-day",
            DeliverySpeed::Ground => "ground",
        }
    }
}

impl FromStr for DeliverySpeed {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overnight" => Ok(DeliverySpeed::Overnight),
            "2-day" => Ok(DeliverySpeed::TwoDay),
            "ground" => Ok(DeliverySpeed::Ground),
            other => Err(AppError::validation(format!("Unknown delivery speed '{}'", other))),
        }
    }
}

impl ToSql for DeliverySpeed {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DeliverySpeed {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceType {
    pub service_id: i64,
    pub name: String,
    pub max_weight_lb: f64,
    pub base_price: f64,
    pub delivery_speed: DeliverySpeed,
}

impl ServiceType {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ServiceType {
            service_id: row.get("service_id")?,
            name: row.get("name")?,
            max_weight_lb: row.get("max_weight_lb")?,
            base_price: row.get("base_price")?,
            delivery_speed: row.get("delivery_speed")?,
        })
    }

    /// Check a package weight against this service's limit
    pub fn accepts_weight(&self, weight_lb: f64) -> bool {
        weight_lb > 0.0 && weight_lb <= self.max_weight_lb
    }
}

/// Catalog ordered fastest first, then cheapest
pub fn list_services(conn: &Connection) -> AppResult<Vec<ServiceType>> {
    let mut stmt = conn.prepare(
        "SELECT service_id, name, max_weight_lb, base_price, delivery_speed
         FROM ServiceType
         ORDER BY CASE delivery_speed
                      WHEN 'overnight' THEN 0
                      WHEN '2-day' THEN 1
                      ELSE 2
                  END,
                  base_price",
    )?;

    let services = stmt
        .query_map([], ServiceType::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(services)
}

pub fn get_service(conn: &Connection, service_id: i64) -> AppResult<Option<ServiceType>> {
    let service = conn
        .query_row(
            "SELECT service_id, name, max_weight_lb, base_price, delivery_speed
             FROM ServiceType WHERE service_id = ?1",
            [service_id],
            ServiceType::from_row,
        )
        .optional()?;
    Ok(service)
}

pub fn insert_service(
    conn: &Connection,
    name: &str,
    max_weight_lb: f64,
    base_price: f64,
    delivery_speed: DeliverySpeed,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO ServiceType (name, max_weight_lb, base_price, delivery_speed)
         VALUES (?1, ?2, ?3, ?4)",
        params![name, max_weight_lb, base_price, delivery_speed],
    )?;
    Ok(conn.last_insert_rowid())
}
