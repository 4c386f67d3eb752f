// 💳 Contract billing - account numbers, monthly statements, payments
//
// Statements are stored aggregates, written once by `generate_statement` and
// never recomputed on read. A package lands on at most one statement.
// Payments are append-only and are never matched to statements automatically;
// only an explicit statement reference marks one paid.

use crate::db::format_timestamp;
use crate::entities::customer::{self, Customer};
use crate::entities::parse_text_column;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Account number given to the first contract customer
pub const FIRST_ACCOUNT_NUMBER: i64 = 1001;

// ============================================================================
// CONTRACTS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ContractChange {
    pub customer_id: i64,
    pub has_contract: bool,
    pub account_number: Option<i64>,
    pub message: String,
}

/// One more than the highest account number in use, or the first number
pub fn next_account_number(conn: &Connection) -> AppResult<i64> {
    let max: Option<i64> = conn.query_row("SELECT MAX(account_number) FROM Customer", [], |row| {
        row.get(0)
    })?;
    Ok(max.map_or(FIRST_ACCOUNT_NUMBER, |n| n + 1))
}

/// Turn contract billing on or off for a customer.
///
/// Enabling keeps an existing account number, so repeating it changes nothing.
/// Disabling clears the flag only; the number stays reserved for the customer.
pub fn set_contract(conn: &Connection, customer_id: i64, enabled: bool) -> AppResult<ContractChange> {
    let customer = customer::get_customer(conn, customer_id)?
        .ok_or_else(|| AppError::not_found("Customer not found"))?;

    if !enabled {
        conn.execute(
            "UPDATE Customer SET has_contract = 0 WHERE customer_id = ?1",
            [customer_id],
        )?;
        tracing::info!(customer_id, "contract removed");
        return Ok(ContractChange {
            customer_id,
            has_contract: false,
            account_number: customer.account_number,
            message: "Contract status removed".to_string(),
        });
    }

    let account_number = match customer.account_number {
        Some(n) => n,
        None => next_account_number(conn)?,
    };

    conn.execute(
        "UPDATE Customer SET has_contract = 1, account_number = ?1 WHERE customer_id = ?2",
        params![account_number, customer_id],
    )?;
    tracing::info!(customer_id, account_number, "contract enabled");

    Ok(ContractChange {
        customer_id,
        has_contract: true,
        account_number: Some(account_number),
        message: format!("Customer converted to contract account #{}", account_number),
    })
}

// ============================================================================
// STATEMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementStatus {
    Unpaid,
    Paid,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementStatus::Unpaid => "unpaid",
            StatementStatus::Paid => "paid",
        }
    }
}

impl FromStr for StatementStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(StatementStatus::Unpaid),
            "paid" => Ok(StatementStatus::Paid),
            other => Err(AppError::validation(format!("Unknown statement status '{}'", other))),
        }
    }
}

impl ToSql for StatementStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StatementStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub statement_id: i64,
    #[serde(skip_serializing)]
    pub customer_id: i64,
    pub statement_month: String,
    pub total_amount: f64,
    pub status: StatementStatus,
}

impl Statement {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Statement {
            statement_id: row.get("statement_id")?,
            customer_id: row.get("customer_id")?,
            statement_month: row.get("statement_month")?,
            total_amount: row.get("total_amount")?,
            status: row.get("status")?,
        })
    }
}

/// A package billed on a statement, priced at its service's base price
#[derive(Debug, Clone, Serialize)]
pub struct StatementLine {
    pub tracking_number: i64,
    pub recipient_name: String,
    pub recipient_location: String,
    pub date_shipped: String,
    pub weight: f64,
    pub service: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementDetail {
    pub statement: Statement,
    pub packages: Vec<StatementLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementList {
    pub account_number: Option<i64>,
    pub statements: Vec<Statement>,
}

/// Check a `YYYY-MM` month and return its `[start, end)` date bounds
fn month_bounds(month: &str) -> AppResult<(String, String)> {
    let invalid = || AppError::validation(format!("Invalid statement month '{}'; expected YYYY-MM", month));

    if month.len() != 7 {
        return Err(invalid());
    }
    let start = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").map_err(|_| invalid())?;
    let end = start
        .checked_add_months(chrono::Months::new(1))
        .ok_or_else(invalid)?;

    Ok((start.format("%Y-%m-%d").to_string(), end.format("%Y-%m-%d").to_string()))
}

fn get_statement(conn: &Connection, statement_id: i64) -> AppResult<Option<Statement>> {
    let statement = conn
        .query_row(
            "SELECT statement_id, customer_id, statement_month, total_amount, status
             FROM BillingStatement WHERE statement_id = ?1",
            [statement_id],
            Statement::from_row,
        )
        .optional()?;
    Ok(statement)
}

/// Bill a contract customer's account-paid packages shipped in `month`.
///
/// Packages already on another statement are skipped. The statement row and
/// its package links are written together; run inside a transaction.
pub fn generate_statement(conn: &Connection, customer_id: i64, month: &str) -> AppResult<StatementDetail> {
    let customer = customer::get_customer(conn, customer_id)?
        .ok_or_else(|| AppError::not_found("Customer not found"))?;
    if !customer.has_contract {
        return Err(AppError::validation(
            "Only contract customers have billing statements",
        ));
    }

    let (start, end) = month_bounds(month)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM BillingStatement
                       WHERE customer_id = ?1 AND statement_month = ?2)",
        params![customer_id, month],
        |row| row.get(0),
    )?;
    if exists {
        return Err(AppError::validation(format!(
            "A statement for {} already exists",
            month
        )));
    }

    let (count, total): (i64, f64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(st.base_price), 0.0)
         FROM Package p
         JOIN ServiceType st ON p.service_id = st.service_id
         WHERE p.customer_id = ?1
           AND p.payment_type = 'account'
           AND p.date_shipped >= ?2 AND p.date_shipped < ?3
           AND NOT EXISTS (SELECT 1 FROM StatementPackage sp WHERE sp.package_id = p.package_id)",
        params![customer_id, start, end],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    conn.execute(
        "INSERT INTO BillingStatement (customer_id, statement_month, total_amount, status)
         VALUES (?1, ?2, ?3, ?4)",
        params![customer_id, month, total, StatementStatus::Unpaid],
    )?;
    let statement_id = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO StatementPackage (statement_id, package_id)
         SELECT ?1, p.package_id
         FROM Package p
         WHERE p.customer_id = ?2
           AND p.payment_type = 'account'
           AND p.date_shipped >= ?3 AND p.date_shipped < ?4
           AND NOT EXISTS (SELECT 1 FROM StatementPackage sp WHERE sp.package_id = p.package_id)",
        params![statement_id, customer_id, start, end],
    )?;

    tracing::info!(customer_id, statement_id, month, packages = count, total, "statement generated");

    Ok(StatementDetail {
        statement: Statement {
            statement_id,
            customer_id,
            statement_month: month.to_string(),
            total_amount: total,
            status: StatementStatus::Unpaid,
        },
        packages: statement_lines(conn, statement_id)?,
    })
}

fn statement_lines(conn: &Connection, statement_id: i64) -> AppResult<Vec<StatementLine>> {
    let mut stmt = conn.prepare(
        "SELECT p.package_id, p.recipient_name, p.recipient_city, p.recipient_state,
                p.date_shipped, p.weight_lb, st.name AS service_name, st.base_price AS cost
         FROM Package p
         JOIN ServiceType st ON p.service_id = st.service_id
         JOIN StatementPackage sp ON p.package_id = sp.package_id
         WHERE sp.statement_id = ?1
         ORDER BY p.date_shipped DESC",
    )?;

    let lines = stmt
        .query_map([statement_id], |row| {
            let city: String = row.get("recipient_city")?;
            let state: String = row.get("recipient_state")?;
            Ok(StatementLine {
                tracking_number: row.get("package_id")?,
                recipient_name: row.get("recipient_name")?,
                recipient_location: format!("{}, {}", city, state),
                date_shipped: row.get("date_shipped")?,
                weight: row.get("weight_lb")?,
                service: row.get("service_name")?,
                cost: row.get("cost")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lines)
}

fn contract_customer(conn: &Connection, user_id: i64) -> AppResult<Customer> {
    let customer = customer::require_for_user(conn, user_id)?;
    if !customer.has_contract {
        return Err(AppError::forbidden(
            "Only contract customers have billing statements",
        ));
    }
    Ok(customer)
}

/// Statements of the caller's customer record, newest month first
pub fn statements_for_user(conn: &Connection, user_id: i64) -> AppResult<StatementList> {
    let customer = contract_customer(conn, user_id)?;

    let mut stmt = conn.prepare(
        "SELECT statement_id, customer_id, statement_month, total_amount, status
         FROM BillingStatement
         WHERE customer_id = ?1
         ORDER BY statement_month DESC",
    )?;
    let statements = stmt
        .query_map([customer.customer_id], Statement::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StatementList {
        account_number: customer.account_number,
        statements,
    })
}

/// One statement with its packages. NotFound if absent, Forbidden if not the caller's.
pub fn statement_detail(conn: &Connection, user_id: i64, statement_id: i64) -> AppResult<StatementDetail> {
    let customer = customer::require_for_user(conn, user_id)?;
    let statement = owned_statement(conn, &customer, statement_id)?;
    let packages = statement_lines(conn, statement_id)?;

    Ok(StatementDetail { statement, packages })
}

fn owned_statement(conn: &Connection, customer: &Customer, statement_id: i64) -> AppResult<Statement> {
    let statement = get_statement(conn, statement_id)?
        .ok_or_else(|| AppError::not_found("Statement not found"))?;

    if statement.customer_id != customer.customer_id {
        return Err(AppError::forbidden("Unauthorized to view this statement"));
    }
    Ok(statement)
}

// ============================================================================
// PAYMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Account,
    Prepaid,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Account => "account",
            PaymentMethod::Prepaid => "prepaid",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "account" => Ok(PaymentMethod::Account),
            "prepaid" => Ok(PaymentMethod::Prepaid),
            other => Err(AppError::validation(format!("Unknown payment method '{}'", other))),
        }
    }
}

impl ToSql for PaymentMethod {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PaymentMethod {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub amount: f64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub statement_id: Option<i64>,
    #[serde(default, alias = "tracking_number")]
    pub package_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecord {
    pub payment_id: i64,
    pub date_paid: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub statement_id: Option<i64>,
    pub tracking_number: Option<i64>,
}

/// Payments made by the caller's customer record, newest first
pub fn payment_history(conn: &Connection, user_id: i64) -> AppResult<Vec<PaymentRecord>> {
    let customer = customer::require_for_user(conn, user_id)?;

    let mut stmt = conn.prepare(
        "SELECT payment_id, date_paid, amount, method, statement_id, package_id
         FROM Payment
         WHERE customer_id = ?1
         ORDER BY date_paid DESC, payment_id DESC",
    )?;

    let payments = stmt
        .query_map([customer.customer_id], |row| {
            Ok(PaymentRecord {
                payment_id: row.get("payment_id")?,
                date_paid: row.get("date_paid")?,
                amount: row.get("amount")?,
                method: row.get("method")?,
                statement_id: row.get("statement_id")?,
                tracking_number: row.get("package_id")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(payments)
}

/// Record a payment; a statement reference also marks that statement paid.
///
/// Run inside a transaction so the payment and the status change commit together.
pub fn make_payment(
    conn: &Connection,
    user_id: i64,
    request: &PaymentRequest,
    now: DateTime<Utc>,
) -> AppResult<PaymentRecord> {
    if !(request.amount.is_finite() && request.amount > 0.0) {
        return Err(AppError::validation("Payment amount must be greater than zero"));
    }

    let customer = customer::require_for_user(conn, user_id)?;

    if let Some(statement_id) = request.statement_id {
        owned_statement(conn, &customer, statement_id)?;
    }
    if let Some(package_id) = request.package_id {
        let owner: Option<i64> = conn
            .query_row(
                "SELECT customer_id FROM Package WHERE package_id = ?1",
                [package_id],
                |row| row.get(0),
            )
            .optional()?;
        match owner {
            None => return Err(AppError::not_found("Package not found")),
            Some(owner) if owner != customer.customer_id => {
                return Err(AppError::forbidden("Unauthorized to pay for this package"))
            }
            Some(_) => {}
        }
    }

    let date_paid = format_timestamp(now);
    conn.execute(
        "INSERT INTO Payment (customer_id, statement_id, package_id, date_paid, amount, method)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            customer.customer_id,
            request.statement_id,
            request.package_id,
            date_paid,
            request.amount,
            request.method
        ],
    )?;
    let payment_id = conn.last_insert_rowid();

    if let Some(statement_id) = request.statement_id {
        conn.execute(
            "UPDATE BillingStatement SET status = ?1 WHERE statement_id = ?2",
            params![StatementStatus::Paid, statement_id],
        )?;
    }

    tracing::info!(
        customer_id = customer.customer_id,
        payment_id,
        amount = request.amount,
        "payment recorded"
    );

    Ok(PaymentRecord {
        payment_id,
        date_paid,
        amount: request.amount,
        method: request.method,
        statement_id: request.statement_id,
        tracking_number: request.package_id,
    })
}
