use crate::error::AppResult;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stored timestamp format. Fixed width, so string order is chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts values with or without a fractional part.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// DATABASE HANDLE
// ============================================================================

/// Handle to the SQLite file.
///
/// Holds no connection. Every `read`/`write` scope opens its own connection and
/// closes it when the scope ends, whatever the outcome.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Database { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a configured connection (foreign keys on, busy timeout set)
    pub fn connect(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.path)?;
        configure_connection(&conn)?;
        Ok(conn)
    }

    /// Create the schema if it does not exist yet
    pub fn init(&self) -> AppResult<()> {
        let conn = self.connect()?;
        setup_database(&conn)
    }

    /// Run a read-only unit of work on a fresh connection
    pub fn read<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Run a unit of work inside one transaction.
    ///
    /// Commits when `f` returns `Ok`. On `Err` (or a panic) the transaction is
    /// dropped uncommitted, which rolls back every statement `f` issued.
    pub fn write<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> AppResult<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

pub fn configure_connection(conn: &Connection) -> AppResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> AppResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    configure_connection(conn)?;

    // ==========================================================================
    // Users & staff
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS User (
            user_id          INTEGER PRIMARY KEY AUTOINCREMENT,
            email            TEXT NOT NULL UNIQUE CHECK (email LIKE '%_@_%'),
            password_hash    TEXT NOT NULL,
            password_salt    TEXT NOT NULL,
            role             TEXT NOT NULL DEFAULT 'customer'
                             CHECK (role IN ('customer', 'staff', 'admin')),
            created_at       TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Staff (
            staff_id         INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id          INTEGER NOT NULL UNIQUE,
            employee_number  TEXT NOT NULL UNIQUE,
            hire_date        TEXT NOT NULL,
            department       TEXT NOT NULL DEFAULT 'General',
            FOREIGN KEY (user_id) REFERENCES User(user_id) ON DELETE CASCADE
        )",
        [],
    )?;

    // ==========================================================================
    // Customers & billing
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS Customer (
            customer_id       INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id           INTEGER UNIQUE,
            name              TEXT NOT NULL,
            email             TEXT,
            phone             TEXT,
            address_line1     TEXT,
            address_line2     TEXT,
            city              TEXT,
            state             TEXT,
            zip               TEXT,
            has_contract      INTEGER NOT NULL DEFAULT 0 CHECK (has_contract IN (0, 1)),
            account_number    INTEGER UNIQUE,
            credit_card_last4 TEXT,
            FOREIGN KEY (user_id) REFERENCES User(user_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS BillingStatement (
            statement_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id      INTEGER NOT NULL,
            statement_month  TEXT NOT NULL,
            total_amount     REAL NOT NULL DEFAULT 0.0,
            status           TEXT NOT NULL DEFAULT 'unpaid'
                             CHECK (status IN ('unpaid', 'paid')),
            UNIQUE (customer_id, statement_month),
            FOREIGN KEY (customer_id) REFERENCES Customer(customer_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Services, locations, packages
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ServiceType (
            service_id       INTEGER PRIMARY KEY AUTOINCREMENT,
            name             TEXT NOT NULL UNIQUE,
            max_weight_lb    REAL NOT NULL CHECK (max_weight_lb > 0),
            base_price       REAL NOT NULL CHECK (base_price >= 0),
            delivery_speed   TEXT NOT NULL
                             CHECK (delivery_speed IN ('overnight', '2-day', 'ground'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Location (
            location_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            type             TEXT NOT NULL CHECK (type IN ('warehouse', 'truck', 'plane')),
            name             TEXT NOT NULL,
            city             TEXT,
            state            TEXT,
            UNIQUE (type, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Package (
            package_id          INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id         INTEGER NOT NULL,
            sender_name         TEXT NOT NULL,
            sender_addr1        TEXT NOT NULL,
            sender_addr2        TEXT,
            sender_city         TEXT NOT NULL,
            sender_state        TEXT NOT NULL,
            sender_zip          TEXT NOT NULL,
            recipient_name      TEXT NOT NULL,
            recipient_addr1     TEXT NOT NULL,
            recipient_addr2     TEXT,
            recipient_city      TEXT NOT NULL,
            recipient_state     TEXT NOT NULL,
            recipient_zip       TEXT NOT NULL,
            service_id          INTEGER NOT NULL,
            weight_lb           REAL NOT NULL CHECK (weight_lb > 0),
            is_hazardous        INTEGER NOT NULL DEFAULT 0,
            is_international    INTEGER NOT NULL DEFAULT 0,
            declared_value      REAL,
            customs_desc        TEXT,
            payment_type        TEXT NOT NULL
                                CHECK (payment_type IN ('account', 'credit_card', 'prepaid')),
            date_shipped        TEXT NOT NULL,
            date_delivered      TEXT,
            delivered_signature TEXT,
            FOREIGN KEY (customer_id) REFERENCES Customer(customer_id),
            FOREIGN KEY (service_id) REFERENCES ServiceType(service_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Tracking events (append-only history)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS TrackingEvent (
            event_id         INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id       INTEGER NOT NULL,
            location_id      INTEGER NOT NULL,
            timestamp        TEXT NOT NULL,
            status           TEXT NOT NULL CHECK (status IN (
                                 'processing', 'arrived', 'departed', 'loaded',
                                 'out-for-delivery', 'delivered')),
            notes            TEXT,
            FOREIGN KEY (package_id) REFERENCES Package(package_id),
            FOREIGN KEY (location_id) REFERENCES Location(location_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Statement ↔ package join, payments
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS StatementPackage (
            statement_id     INTEGER NOT NULL,
            package_id       INTEGER NOT NULL,
            PRIMARY KEY (statement_id, package_id),
            FOREIGN KEY (statement_id) REFERENCES BillingStatement(statement_id),
            FOREIGN KEY (package_id) REFERENCES Package(package_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS Payment (
            payment_id       INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id      INTEGER NOT NULL,
            statement_id     INTEGER,
            package_id       INTEGER,
            date_paid        TEXT NOT NULL,
            amount           REAL NOT NULL CHECK (amount > 0),
            method           TEXT NOT NULL
                             CHECK (method IN ('credit_card', 'account', 'prepaid')),
            FOREIGN KEY (customer_id) REFERENCES Customer(customer_id),
            FOREIGN KEY (statement_id) REFERENCES BillingStatement(statement_id),
            FOREIGN KEY (package_id) REFERENCES Package(package_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tracking_package_time
         ON TrackingEvent(package_id, timestamp)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_package_customer ON Package(customer_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_statement_customer ON BillingStatement(customer_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payment_customer ON Payment(customer_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SAMPLE DATA
// ============================================================================

pub const SAMPLE_ADMIN_EMAIL: &str = "admin@shipping.com";
pub const SAMPLE_STAFF_EMAIL: &str = "staff@shipping.com";
pub const SAMPLE_CUSTOMER_EMAIL: &str = "customer@example.com";
pub const SAMPLE_PASSWORD: &str = "password123";

/// Insert the sample users, services and locations. Safe to run repeatedly.
pub fn seed_sample_data(conn: &Connection) -> AppResult<()> {
    let now = format_timestamp(Utc::now());

    for (email, role) in [
        (SAMPLE_ADMIN_EMAIL, "admin"),
        (SAMPLE_STAFF_EMAIL, "staff"),
        (SAMPLE_CUSTOMER_EMAIL, "customer"),
    ] {
        let salt = crate::accounts::new_salt();
        let hash = crate::accounts::hash_password(SAMPLE_PASSWORD, &salt);
        conn.execute(
            "INSERT OR IGNORE INTO User (email, password_hash, password_salt, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![email, hash, salt, role, now],
        )?;
    }

    conn.execute(
        "INSERT OR IGNORE INTO Staff (user_id, employee_number, hire_date, department)
         SELECT user_id, 'EMP00001', ?1, 'Operations' FROM User WHERE email = ?2",
        params![&now[..10], SAMPLE_STAFF_EMAIL],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO Customer (user_id, name, email, phone, address_line1, city, state, zip)
         SELECT user_id, 'Sample Customer', email, '555-0100', '1 Main St', 'Storrs', 'CT', '06269'
         FROM User WHERE email = ?1",
        params![SAMPLE_CUSTOMER_EMAIL],
    )?;

    let services = [
        ("Overnight Letter", 0.5, 24.99, "overnight"),
        ("Overnight Box", 20.0, 49.99, "overnight"),
        ("2-Day Box", 50.0, 19.99, "2-day"),
        ("Ground Shipping", 150.0, 9.99, "ground"),
    ];
    for (name, max_weight, price, speed) in services {
        conn.execute(
            "INSERT OR IGNORE INTO ServiceType (name, max_weight_lb, base_price, delivery_speed)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, max_weight, price, speed],
        )?;
    }

    let locations = [
        ("warehouse", "Hartford Hub", "Hartford", "CT"),
        ("warehouse", "Boston Distribution Center", "Boston", "MA"),
        ("truck", "Truck 17", "Hartford", "CT"),
        ("plane", "Flight 2201", "Windsor Locks", "CT"),
    ];
    for (kind, name, city, state) in locations {
        conn.execute(
            "INSERT OR IGNORE INTO Location (type, name, city, state) VALUES (?1, ?2, ?3, ?4)",
            params![kind, name, city, state],
        )?;
    }

    Ok(())
}

/// Row count of a table, used by the CLI and tests
pub fn count_rows(conn: &Connection, table: &str) -> AppResult<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_all_tables_exist() {
        let conn = test_db();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for table in [
            "BillingStatement",
            "Customer",
            "Location",
            "Package",
            "Payment",
            "ServiceType",
            "Staff",
            "StatementPackage",
            "TrackingEvent",
            "User",
        ] {
            assert!(tables.iter().any(|t| t == table), "Table {} is missing", table);
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_db();
        setup_database(&conn).unwrap();
        seed_sample_data(&conn).unwrap();
        seed_sample_data(&conn).unwrap();

        assert_eq!(count_rows(&conn, "User").unwrap(), 3);
        assert_eq!(count_rows(&conn, "ServiceType").unwrap(), 4);
        assert_eq!(count_rows(&conn, "Location").unwrap(), 4);
        assert_eq!(count_rows(&conn, "Customer").unwrap(), 1);
        assert_eq!(count_rows(&conn, "Staff").unwrap(), 1);
    }

    #[test]
    fn test_check_constraints() {
        let conn = test_db();

        let bad_role = conn.execute(
            "INSERT INTO User (email, password_hash, password_salt, role, created_at)
             VALUES ('x@test.com', 'h', 's', 'superuser', '2025-01-01 00:00:00')",
            [],
        );
        assert!(bad_role.is_err(), "invalid role must be rejected");

        let bad_email = conn.execute(
            "INSERT INTO User (email, password_hash, password_salt, role, created_at)
             VALUES ('notanemail', 'h', 's', 'customer', '2025-01-01 00:00:00')",
            [],
        );
        assert!(bad_email.is_err(), "email without @ must be rejected");

        let bad_speed = conn.execute(
            "INSERT INTO ServiceType (name, max_weight_lb, base_price, delivery_speed)
             VALUES ('Teleport', 10.0, 15.99, 'instant')",
            [],
        );
        assert!(bad_speed.is_err(), "invalid delivery speed must be rejected");
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = test_db();
        let result = conn.execute(
            "INSERT INTO Package (
                customer_id, sender_name, sender_addr1, sender_city, sender_state, sender_zip,
                recipient_name, recipient_addr1, recipient_city, recipient_state, recipient_zip,
                service_id, weight_lb, payment_type, date_shipped
            ) VALUES (99999, 'S', '1 St', 'C', 'ST', '1', 'R', '2 Ave', 'C', 'ST', '2',
                      1, 5.0, 'credit_card', '2025-01-01 00:00:00')",
            [],
        );
        assert!(result.is_err(), "package with unknown customer must be rejected");
    }

    #[test]
    fn test_timestamp_format_sorts_chronologically() {
        let a = parse_timestamp("2025-01-01 09:00:00").unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (fa, fb) = (format_timestamp(a), format_timestamp(b));

        assert_eq!(fa, "2025-01-01 09:00:00.000000");
        assert!(fa < fb);
        assert_eq!(parse_timestamp(&fb), Some(b));
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("rollback.db"));
        db.init().unwrap();
        assert!(db.path().exists());

        let result: AppResult<()> = db.write(|tx| {
            tx.execute(
                "INSERT INTO Location (type, name) VALUES ('warehouse', 'Doomed')",
                [],
            )?;
            Err(AppError::validation("abort"))
        });
        assert!(result.is_err());

        let count = db.read(|conn| count_rows(conn, "Location")).unwrap();
        assert_eq!(count, 0, "aborted write must leave no rows behind");

        db.write(|tx| {
            tx.execute(
                "INSERT INTO Location (type, name) VALUES ('warehouse', 'Kept')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(db.read(|conn| count_rows(conn, "Location")).unwrap(), 1);
    }
}
