// Shipping: service catalog, customer profiles, new shipments

use crate::db::format_timestamp;
use crate::entities::customer::{self, Customer, CustomerProfile};
use crate::entities::location;
use crate::entities::package::{self, NewPackage, PaymentType};
use crate::entities::service_type::{self, ServiceType};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::tracking::{self, StatusUpdate, TrackingStatus};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

/// Note on the first event of every shipment
pub const INTAKE_NOTE: &str = "Package received and being processed";

pub fn list_services(conn: &Connection) -> AppResult<Vec<ServiceType>> {
    service_type::list_services(conn)
}

/// Answer to "do I have a profile yet?"
#[derive(Debug, Clone, Serialize)]
pub struct ProfileLookup {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
}

pub fn get_profile(conn: &Connection, user_id: i64) -> AppResult<ProfileLookup> {
    let customer = customer::find_by_user(conn, user_id)?;
    Ok(ProfileLookup {
        exists: customer.is_some(),
        customer,
    })
}

/// Create or update the caller's profile; contract fields are untouched
pub fn save_profile(conn: &Connection, user_id: i64, profile: &CustomerProfile) -> AppResult<Customer> {
    let email = user::get_user(conn, user_id)?.map(|u| u.email);
    let customer_id = customer::upsert_profile(conn, user_id, email.as_deref(), profile)?;

    customer::get_customer(conn, customer_id)?
        .ok_or_else(|| AppError::Internal(format!("customer {} vanished after upsert", customer_id)))
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentReceipt {
    pub tracking_number: i64,
    pub estimated_cost: f64,
    /// Id of the initial processing event, when a warehouse exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_event_id: Option<i64>,
}

/// Create a package for the caller and log its intake event.
///
/// Run inside a transaction: the package and its first event commit together.
pub fn create_shipment(
    conn: &Connection,
    user_id: i64,
    shipment: &NewPackage,
    now: DateTime<Utc>,
) -> AppResult<ShipmentReceipt> {
    let sender = customer::find_by_user(conn, user_id)?.ok_or_else(|| {
        AppError::validation("Customer profile not found. Please complete your profile.")
    })?;

    let missing: Vec<String> = shipment
        .sender
        .missing_fields("sender")
        .into_iter()
        .chain(shipment.recipient.missing_fields("recipient"))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let service = service_type::get_service(conn, shipment.service_id)?
        .ok_or_else(|| AppError::validation("Invalid service type"))?;

    if !service.accepts_weight(shipment.weight_lb) {
        return Err(AppError::validation(format!(
            "Package weight must be greater than 0 and at most {} lb for this service",
            service.max_weight_lb
        )));
    }

    if shipment.payment_type == PaymentType::Account && !sender.has_contract {
        return Err(AppError::validation(
            "Account billing requires a contract. Please use credit card.",
        ));
    }

    let tracking_number = package::insert_package(conn, sender.customer_id, shipment, &format_timestamp(now))?;

    let initial_event_id = match location::intake_warehouse(conn)? {
        Some(location_id) => {
            let update = StatusUpdate {
                location_id,
                status: TrackingStatus::Processing,
                notes: Some(INTAKE_NOTE.to_string()),
                signature: None,
            };
            Some(tracking::append_event(conn, tracking_number, &update, now)?.event_id)
        }
        None => {
            tracing::warn!(tracking_number, "no warehouse configured; shipment has no intake event");
            None
        }
    };

    tracing::info!(
        tracking_number,
        customer_id = sender.customer_id,
        service = %service.name,
        "shipment created"
    );

    Ok(ShipmentReceipt {
        tracking_number,
        estimated_cost: service.base_price,
        initial_event_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{seed_sample_data, setup_database, SAMPLE_CUSTOMER_EMAIL};
    use crate::entities::package::fixtures::new_package;
    use crate::tracking::DerivedStatus;

    /// Seeded database; returns the sample customer's user id
    fn seeded() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed_sample_data(&conn).unwrap();
        let user_id = user::find_credentials(&conn, SAMPLE_CUSTOMER_EMAIL)
            .unwrap()
            .unwrap()
            .user
            .user_id;
        (conn, user_id)
    }

    fn service_id(conn: &Connection, name: &str) -> i64 {
        conn.query_row("SELECT service_id FROM ServiceType WHERE name = ?1", [name], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_shipment_logs_processing_event() {
        let (conn, user_id) = seeded();
        let two_day = service_id(&conn, "2-Day Box");

        let receipt = create_shipment(&conn, user_id, &new_package(two_day, 5.5, PaymentType::CreditCard), Utc::now())
            .unwrap();
        assert_eq!(receipt.estimated_cost, 19.99);
        assert!(receipt.initial_event_id.is_some());

        let history = tracking::history(&conn, receipt.tracking_number).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TrackingStatus::Processing);
        assert_eq!(history[0].location_name, "Hartford Hub");
        assert_eq!(
            tracking::current_status(&conn, receipt.tracking_number).unwrap().status,
            DerivedStatus::Recorded(TrackingStatus::Processing)
        );
    }

    #[test]
    fn test_weight_limits() {
        let (conn, user_id) = seeded();
        let letter = service_id(&conn, "Overnight Letter");

        for weight in [0.0, -1.0, 0.6] {
            let err = create_shipment(&conn, user_id, &new_package(letter, weight, PaymentType::Prepaid), Utc::now())
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "weight {} accepted", weight);
        }
        assert!(create_shipment(&conn, user_id, &new_package(letter, 0.5, PaymentType::Prepaid), Utc::now()).is_ok());
    }

    #[test]
    fn test_account_payment_needs_contract() {
        let (conn, user_id) = seeded();
        let ground = service_id(&conn, "Ground Shipping");

        let err = create_shipment(&conn, user_id, &new_package(ground, 10.0, PaymentType::Account), Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("requires a contract"));

        conn.execute("UPDATE Customer SET has_contract = 1 WHERE user_id = ?1", [user_id])
            .unwrap();
        assert!(create_shipment(&conn, user_id, &new_package(ground, 10.0, PaymentType::Account), Utc::now()).is_ok());
    }

    #[test]
    fn test_shipment_rejections() {
        let (conn, user_id) = seeded();

        let err = create_shipment(&conn, user_id, &new_package(999, 1.0, PaymentType::Prepaid), Utc::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid service type");

        let admin = user::find_credentials(&conn, crate::db::SAMPLE_ADMIN_EMAIL)
            .unwrap()
            .unwrap()
            .user
            .user_id;
        let err = create_shipment(&conn, admin, &new_package(1, 0.2, PaymentType::Prepaid), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "no profile");

        let mut blank = new_package(1, 0.2, PaymentType::Prepaid);
        blank.recipient.city.clear();
        let err = create_shipment(&conn, user_id, &blank, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("recipient_city"));
    }

    #[test]
    fn test_profile_lookup_and_save() {
        let (conn, _) = seeded();
        let fresh = crate::accounts::create_user(
            &conn,
            "fresh@test.com",
            "password123",
            user::Role::Customer,
            Utc::now(),
        )
        .unwrap();

        let lookup = get_profile(&conn, fresh.user_id).unwrap();
        assert!(!lookup.exists);
        let json = serde_json::to_value(&lookup).unwrap();
        assert_eq!(json, serde_json::json!({"exists": false}));

        let saved = save_profile(
            &conn,
            fresh.user_id,
            &CustomerProfile {
                name: "Fresh Customer".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(saved.email.as_deref(), Some("fresh@test.com"));
        assert!(get_profile(&conn, fresh.user_id).unwrap().exists);
    }
}
