// User accounts and staff records

use super::parse_text_column;
use crate::error::{is_unique_violation, AppError, AppResult};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ROLE
// ============================================================================

/// Account role. Ordered by privilege: customer < staff < admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// True when this role grants at least the privileges of `required`
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }

    pub fn is_staff_or_admin(&self) -> bool {
        self.satisfies(Role::Staff)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::validation(format!("Unknown role '{}'", other))),
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

// ============================================================================
// USER
// ============================================================================

/// Public view of a user row (never carries the password digest)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    #[serde(rename = "id")]
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub created_at: String,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            user_id: row.get("user_id")?,
            email: row.get("email")?,
            role: row.get("role")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// User row together with its stored password digest
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user: User,
    pub password_hash: String,
    pub password_salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffRecord {
    pub employee_number: String,
    pub hire_date: String,
    pub department: String,
}

/// Insert a user. A duplicate email becomes a validation error.
pub fn insert_user(
    conn: &Connection,
    email: &str,
    password_hash: &str,
    password_salt: &str,
    role: Role,
    created_at: &str,
) -> AppResult<i64> {
    let result = conn.execute(
        "INSERT INTO User (email, password_hash, password_salt, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![email, password_hash, password_salt, role, created_at],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::validation("Email already registered"))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn find_credentials(conn: &Connection, email: &str) -> AppResult<Option<StoredCredentials>> {
    let creds = conn
        .query_row(
            "SELECT user_id, email, role, created_at, password_hash, password_salt
             FROM User WHERE email = ?1",
            [email],
            |row| {
                Ok(StoredCredentials {
                    user: User::from_row(row)?,
                    password_hash: row.get("password_hash")?,
                    password_salt: row.get("password_salt")?,
                })
            },
        )
        .optional()?;
    Ok(creds)
}

pub fn get_user(conn: &Connection, user_id: i64) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT user_id, email, role, created_at FROM User WHERE user_id = ?1",
            [user_id],
            User::from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_role(conn: &Connection, user_id: i64) -> AppResult<Option<Role>> {
    let role = conn
        .query_row("SELECT role FROM User WHERE user_id = ?1", [user_id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(role)
}

/// All staff and admin users, admins first
pub fn list_staff_users(conn: &Connection) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, email, role, created_at
         FROM User
         WHERE role IN ('staff', 'admin')
         ORDER BY role, email",
    )?;

    let users = stmt
        .query_map([], User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(users)
}

pub fn insert_staff_record(conn: &Connection, user_id: i64, record: &StaffRecord) -> AppResult<()> {
    let result = conn.execute(
        "INSERT INTO Staff (user_id, employee_number, hire_date, department)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, record.employee_number, record.hire_date, record.department],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(AppError::validation(format!(
            "Employee number {} already exists",
            record.employee_number
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn get_staff_record(conn: &Connection, user_id: i64) -> AppResult<Option<StaffRecord>> {
    let record = conn
        .query_row(
            "SELECT employee_number, hire_date, department FROM Staff WHERE user_id = ?1",
            [user_id],
            |row| {
                Ok(StaffRecord {
                    employee_number: row.get(0)?,
                    hire_date: row.get(1)?,
                    department: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Delete a user and its staff record. Returns the number of user rows removed.
pub fn delete_user(conn: &Connection, user_id: i64) -> AppResult<usize> {
    conn.execute("DELETE FROM Staff WHERE user_id = ?1", [user_id])?;
    let removed = conn.execute("DELETE FROM User WHERE user_id = ?1", [user_id])?;
    Ok(removed)
}

/// Change the role of a staff/admin user. Customers are never touched.
pub fn update_staff_role(conn: &Connection, user_id: i64, role: Role) -> AppResult<usize> {
    let updated = conn.execute(
        "UPDATE User SET role = ?1 WHERE user_id = ?2 AND role IN ('staff', 'admin')",
        params![role, user_id],
    )?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin.satisfies(Role::Staff));
        assert!(Role::Staff.satisfies(Role::Staff));
        assert!(!Role::Customer.satisfies(Role::Staff));
        assert!(!Role::Staff.satisfies(Role::Admin));
        assert!(Role::Customer.satisfies(Role::Customer));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" staff ".parse::<Role>().unwrap(), Role::Staff);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_insert_and_find_user() {
        let conn = test_db();
        let id = insert_user(&conn, "a@test.com", "hash", "salt", Role::Customer, "2025-01-01 00:00:00")
            .unwrap();

        let creds = find_credentials(&conn, "a@test.com").unwrap().unwrap();
        assert_eq!(creds.user.user_id, id);
        assert_eq!(creds.user.role, Role::Customer);
        assert_eq!(creds.password_hash, "hash");

        assert_eq!(get_role(&conn, id).unwrap(), Some(Role::Customer));
        assert_eq!(get_role(&conn, id + 100).unwrap(), None);
    }

    #[test]
    fn test_duplicate_email_is_validation_error() {
        let conn = test_db();
        insert_user(&conn, "dup@test.com", "h", "s", Role::Customer, "2025-01-01 00:00:00").unwrap();
        let err = insert_user(&conn, "dup@test.com", "h", "s", Role::Customer, "2025-01-01 00:00:00")
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "Email already registered");
    }

    #[test]
    fn test_update_staff_role_skips_customers() {
        let conn = test_db();
        let customer = insert_user(&conn, "c@test.com", "h", "s", Role::Customer, "t").unwrap();
        let staff = insert_user(&conn, "s@test.com", "h", "s", Role::Staff, "t").unwrap();

        assert_eq!(update_staff_role(&conn, customer, Role::Admin).unwrap(), 0);
        assert_eq!(update_staff_role(&conn, staff, Role::Admin).unwrap(), 1);
        assert_eq!(get_role(&conn, staff).unwrap(), Some(Role::Admin));

        let listed = list_staff_users(&conn).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].email, "s@test.com");
    }

    #[test]
    fn test_delete_user_removes_staff_record() {
        let conn = test_db();
        let staff = insert_user(&conn, "s@test.com", "h", "s", Role::Staff, "t").unwrap();
        insert_staff_record(
            &conn,
            staff,
            &StaffRecord {
                employee_number: "EMP1".into(),
                hire_date: "2025-01-01".into(),
                department: "Ops".into(),
            },
        )
        .unwrap();

        assert_eq!(delete_user(&conn, staff).unwrap(), 1);
        assert!(get_user(&conn, staff).unwrap().is_none());
        assert!(get_staff_record(&conn, staff).unwrap().is_none());
    }
}
