// Customers: billing/shipping identities, optionally linked to a user account

use crate::error::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub customer_id: i64,
    #[serde(skip_serializing)]
    pub user_id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub has_contract: bool,
    pub account_number: Option<i64>,
}

const CUSTOMER_COLUMNS: &str = "customer_id, user_id, name, email, phone, address_line1,
     address_line2, city, state, zip, has_contract, account_number";

impl Customer {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Customer {
            customer_id: row.get("customer_id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            phone: row.get("phone")?,
            address_line1: row.get("address_line1")?,
            address_line2: row.get("address_line2")?,
            city: row.get("city")?,
            state: row.get("state")?,
            zip: row.get("zip")?,
            has_contract: row.get("has_contract")?,
            account_number: row.get("account_number")?,
        })
    }

    /// Whether `user_id` is the account this customer belongs to
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }
}

/// Profile fields a user may set on their own customer record
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerProfile {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

/// Customer row for the admin listing
#[derive(Debug, Clone, Serialize)]
pub struct CustomerSummary {
    pub customer_id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub has_contract: bool,
    pub account_number: Option<i64>,
    pub total_packages: i64,
}

pub fn get_customer(conn: &Connection, customer_id: i64) -> AppResult<Option<Customer>> {
    let customer = conn
        .query_row(
            &format!("SELECT {} FROM Customer WHERE customer_id = ?1", CUSTOMER_COLUMNS),
            [customer_id],
            Customer::from_row,
        )
        .optional()?;
    Ok(customer)
}

pub fn find_by_user(conn: &Connection, user_id: i64) -> AppResult<Option<Customer>> {
    let customer = conn
        .query_row(
            &format!("SELECT {} FROM Customer WHERE user_id = ?1", CUSTOMER_COLUMNS),
            [user_id],
            Customer::from_row,
        )
        .optional()?;
    Ok(customer)
}

/// The caller's customer record, or NotFound when they never created a profile
pub fn require_for_user(conn: &Connection, user_id: i64) -> AppResult<Customer> {
    find_by_user(conn, user_id)?.ok_or_else(|| AppError::not_found("Customer profile not found"))
}

/// Create or update the profile linked to `user_id`.
///
/// Contract status and account number are left as they are.
pub fn upsert_profile(
    conn: &Connection,
    user_id: i64,
    email: Option<&str>,
    profile: &CustomerProfile,
) -> AppResult<i64> {
    if profile.name.trim().is_empty() {
        return Err(AppError::validation("Customer name is required"));
    }

    conn.execute(
        "INSERT INTO Customer (user_id, name, email, phone, address_line1, address_line2, city, state, zip)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(user_id) DO UPDATE SET
             name = excluded.name,
             phone = excluded.phone,
             address_line1 = excluded.address_line1,
             address_line2 = excluded.address_line2,
             city = excluded.city,
             state = excluded.state,
             zip = excluded.zip",
        params![
            user_id,
            profile.name.trim(),
            email,
            profile.phone,
            profile.address_line1,
            profile.address_line2,
            profile.city,
            profile.state,
            profile.zip,
        ],
    )?;

    let customer_id = conn.query_row(
        "SELECT customer_id FROM Customer WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(customer_id)
}

pub fn list_customers(conn: &Connection) -> AppResult<Vec<CustomerSummary>> {
    let mut stmt = conn.prepare(
        "SELECT c.customer_id, c.user_id, c.name, COALESCE(u.email, c.email) AS email,
                c.phone, c.has_contract, c.account_number,
                COUNT(p.package_id) AS total_packages
         FROM Customer c
         LEFT JOIN User u ON c.user_id = u.user_id
         LEFT JOIN Package p ON c.customer_id = p.customer_id
         GROUP BY c.customer_id
         ORDER BY c.customer_id DESC",
    )?;

    let customers = stmt
        .query_map([], |row| {
            Ok(CustomerSummary {
                customer_id: row.get("customer_id")?,
                user_id: row.get("user_id")?,
                name: row.get("name")?,
                email: row.get("email")?,
                phone: row.get("phone")?,
                has_contract: row.get("has_contract")?,
                account_number: row.get("account_number")?,
                total_packages: row.get("total_packages")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(customers)
}
