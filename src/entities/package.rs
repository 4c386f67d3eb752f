// Packages: one shipment, owned by the sending customer

use super::parse_text_column;
use crate::error::{AppError, AppResult};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// PAYMENT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Billed to the customer's contract account on the monthly statement
    Account,
    CreditCard,
    Prepaid,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Account => "account",
            PaymentType::CreditCard => "credit_card",
            PaymentType::Prepaid => "prepaid",
        }
    }
}

impl FromStr for PaymentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(PaymentType::Account),
            "credit_card" => Ok(PaymentType::CreditCard),
            "prepaid" => Ok(PaymentType::Prepaid),
            other => Err(AppError::validation(format!(
                "Unknown payment type '{}'; expected account, credit_card or prepaid",
                other
            ))),
        }
    }
}

impl ToSql for PaymentType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PaymentType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

// ============================================================================
// ADDRESS BLOCK
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    #[serde(rename = "address")]
    pub addr1: String,
    #[serde(rename = "address2", default, skip_serializing_if = "Option::is_none")]
    pub addr2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Address {
    /// Names of required fields that are blank
    pub fn missing_fields(&self, prefix: &str) -> Vec<String> {
        [
            ("name", &self.name),
            ("addr1", &self.addr1),
            ("city", &self.city),
            ("state", &self.state),
            ("zip", &self.zip),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| format!("{}_{}", prefix, field))
        .collect()
    }

    fn from_row(row: &Row<'_>, prefix: &str) -> rusqlite::Result<Self> {
        Ok(Address {
            name: row.get(format!("{}_name", prefix).as_str())?,
            addr1: row.get(format!("{}_addr1", prefix).as_str())?,
            addr2: row
                .get::<_, Option<String>>(format!("{}_addr2", prefix).as_str())?
                .filter(|s| !s.is_empty()),
            city: row.get(format!("{}_city", prefix).as_str())?,
            state: row.get(format!("{}_state", prefix).as_str())?,
            zip: row.get(format!("{}_zip", prefix).as_str())?,
        })
    }
}

// ============================================================================
// PACKAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
    #[serde(rename = "tracking_number")]
    pub package_id: i64,
    #[serde(skip_serializing)]
    pub customer_id: i64,
    pub sender: Address,
    pub recipient: Address,
    pub service_id: i64,
    #[serde(rename = "weight")]
    pub weight_lb: f64,
    pub is_hazardous: bool,
    pub is_international: bool,
    pub declared_value: Option<f64>,
    pub customs_desc: Option<String>,
    pub payment_type: PaymentType,
    pub date_shipped: String,
    pub date_delivered: Option<String>,
    pub delivered_signature: Option<String>,
}

impl Package {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Package {
            package_id: row.get("package_id")?,
            customer_id: row.get("customer_id")?,
            sender: Address::from_row(row, "sender")?,
            recipient: Address::from_row(row, "recipient")?,
            service_id: row.get("service_id")?,
            weight_lb: row.get("weight_lb")?,
            is_hazardous: row.get("is_hazardous")?,
            is_international: row.get("is_international")?,
            declared_value: row.get("declared_value")?,
            customs_desc: row.get("customs_desc")?,
            payment_type: row.get("payment_type")?,
            date_shipped: row.get("date_shipped")?,
            date_delivered: row.get("date_delivered")?,
            delivered_signature: row.get("delivered_signature")?,
        })
    }
}

/// Shipment payload accepted from the sender
#[derive(Debug, Clone, Deserialize)]
pub struct NewPackage {
    pub sender: Address,
    pub recipient: Address,
    pub service_id: i64,
    pub weight_lb: f64,
    #[serde(default)]
    pub is_hazardous: bool,
    #[serde(default)]
    pub is_international: bool,
    #[serde(default)]
    pub declared_value: Option<f64>,
    #[serde(default)]
    pub customs_desc: Option<String>,
    pub payment_type: PaymentType,
}

pub fn get_package(conn: &Connection, package_id: i64) -> AppResult<Option<Package>> {
    let package = conn
        .query_row(
            "SELECT * FROM Package WHERE package_id = ?1",
            [package_id],
            Package::from_row,
        )
        .optional()?;
    Ok(package)
}

pub fn package_exists(conn: &Connection, package_id: i64) -> AppResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM Package WHERE package_id = ?1)",
        [package_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn insert_package(
    conn: &Connection,
    customer_id: i64,
    package: &NewPackage,
    date_shipped: &str,
) -> AppResult<i64> {
    let (s, r) = (&package.sender, &package.recipient);

    conn.execute(
        "INSERT INTO Package (
            customer_id, sender_name, sender_addr1, sender_addr2,
            sender_city, sender_state, sender_zip,
            recipient_name, recipient_addr1, recipient_addr2,
            recipient_city, recipient_state, recipient_zip,
            service_id, weight_lb, is_hazardous, is_international,
            declared_value, customs_desc, payment_type, date_shipped
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        params![
            customer_id,
            s.name,
            s.addr1,
            s.addr2,
            s.city,
            s.state,
            s.zip,
            r.name,
            r.addr1,
            r.addr2,
            r.city,
            r.state,
            r.zip,
            package.service_id,
            package.weight_lb,
            package.is_hazardous,
            package.is_international,
            package.declared_value,
            package.customs_desc,
            package.payment_type,
            date_shipped,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Record delivery. A later call overwrites the earlier date and signature.
pub fn mark_delivered(
    conn: &Connection,
    package_id: i64,
    delivered_at: &str,
    signature: &str,
) -> AppResult<()> {
    let updated = conn.execute(
        "UPDATE Package SET date_delivered = ?1, delivered_signature = ?2 WHERE package_id = ?3",
        params![delivered_at, signature, package_id],
    )?;

    if updated == 0 {
        return Err(AppError::not_found("Package not found"));
    }
    Ok(())
}
