// Entity Models - one module per table family
//
// Each module holds the row types, the enums stored as TEXT columns, and the
// parameterized queries for that table. Domain rules that span several tables
// live in tracking, billing, shipping, accounts and admin.

pub mod customer;
pub mod location;
pub mod package;
pub mod service_type;
pub mod user;

pub use customer::{Customer, CustomerProfile, CustomerSummary};
pub use location::{Location, LocationType, NewLocation};
pub use package::{Address, NewPackage, Package, PaymentType};
pub use service_type::{DeliverySpeed, ServiceType};
pub use user::{Role, StaffRecord, User};

use rusqlite::types::{FromSqlError, FromSqlResult, ValueRef};
use std::str::FromStr;

/// Decode a TEXT column into one of the enums above
pub(crate) fn parse_text_column<T: FromStr>(value: ValueRef<'_>) -> FromSqlResult<T> {
    let text = value.as_str()?;
    text.parse()
        .map_err(|_| FromSqlError::Other(format!("unexpected column value '{}'", text).into()))
}
