// shiptrack - Package Shipping Tracker
// Exposes all modules for use in the CLI, the API server, and tests

pub mod db;
pub mod error;
pub mod entities;
pub mod accounts;       // Registration, login, password digests
pub mod auth;           // Signed tokens + role-gated principals
pub mod tracking;       // Status derivation + delivery transition
pub mod shipping;       // Service catalog, profiles, new shipments
pub mod billing;        // Contracts, monthly statements, payments
pub mod admin;          // Staff dashboard + user management
pub mod config;
pub mod logging;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use db::{
    Database, setup_database, seed_sample_data,
    format_timestamp, parse_timestamp,
};
pub use error::{AppError, AppResult};
pub use entities::{
    Customer, CustomerProfile, CustomerSummary,
    Location, LocationType, NewLocation,
    Address, NewPackage, Package, PaymentType,
    DeliverySpeed, ServiceType,
    Role, StaffRecord, User,
};
pub use auth::{Principal, TokenSigner};
pub use tracking::{
    CurrentStatus, DerivedStatus, StatusUpdate, TrackingEntry, TrackingReport, TrackingStatus,
    PENDING_STATUS, UNKNOWN_STATUS,
};
pub use billing::{
    ContractChange, PaymentMethod, PaymentRequest, Statement, StatementDetail, StatementStatus,
};
pub use shipping::ShipmentReceipt;
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
