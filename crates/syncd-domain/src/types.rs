use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ExternalId, InternalId};

/// Lifecycle state of a tracked delivery. Mirrors the cloud's own status
/// codes rather than inventing parallel vocabulary (see the status-code
/// mapping table in the external interfaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Added,
    InProgress,
    Missing,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    /// Terminal statuses are retained for audit/cooldown purposes but are
    /// excluded from active-tracking queries (`active_ids`, reconciler diff).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::Failed
                | DeliveryStatus::Cancelled
                | DeliveryStatus::Missing
        )
    }

    /// Maps a cloud status code to its local equivalent. Unknown codes
    /// default to `Added` rather than erroring — a status table is not ground
    /// for rejecting an otherwise-valid snapshot row.
    pub fn from_cloud_code(code: &str) -> Self {
        match code {
            "PENDING" => DeliveryStatus::Added,
            "ROUTED" => DeliveryStatus::InProgress,
            "COMPLETED" => DeliveryStatus::Delivered,
            "CANCELLED" => DeliveryStatus::Cancelled,
            "FAILED" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Added,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Sending => "SENDING",
            DeliveryStatus::Added => "ADDED",
            DeliveryStatus::InProgress => "IN_PROGRESS",
            DeliveryStatus::Missing => "MISSING",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// The canonical unit the whole core operates on: a normalized order ready
/// to be pushed to the cloud, or already bound to one there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub internal_id: InternalId,
    pub external_id: Option<ExternalId>,
    pub customer_name: String,
    pub customer_contact: Option<String>,
    pub address: String,
    pub address2: Option<String>,
    pub neighbourhood: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl Order {
    /// Builds an order from raw ingress fields, applying id canonicalization
    /// and trimming the two required string fields. Returns an error if
    /// either required field is empty after trimming.
    pub fn new(
        raw_internal_id: impl AsRef<str>,
        customer_name: impl Into<String>,
        address: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, crate::error::DomainError> {
        let customer_name = customer_name.into().trim().to_string();
        let address = address.into().trim().to_string();
        if customer_name.is_empty() {
            return Err(crate::error::DomainError::InvalidOrder(
                "customer_name must not be empty".into(),
            ));
        }
        if address.is_empty() {
            return Err(crate::error::DomainError::InvalidOrder(
                "address must not be empty".into(),
            ));
        }
        Ok(Order {
            internal_id: InternalId::canonicalize(raw_internal_id),
            external_id: None,
            customer_name,
            customer_contact: None,
            address,
            address2: None,
            neighbourhood: None,
            reference: None,
            created_at,
            status: DeliveryStatus::Pending,
        })
    }
}

/// Persisted row for a tracked order: the unit the Tracking Store durably
/// owns. `updated_at` is refreshed on every mutation by the store, never by
/// callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub internal_id: InternalId,
    pub external_id: Option<ExternalId>,
    pub status: DeliveryStatus,
    pub deliveryman_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackingRecord {
    /// A freshly reserved record: PENDING, unbound.
    pub fn reserved(internal_id: InternalId, now: DateTime<Utc>) -> Self {
        TrackingRecord {
            internal_id,
            external_id: None,
            status: DeliveryStatus::Pending,
            deliveryman_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.external_id.is_some()
    }
}

/// Persistent cross-walk between a remote deliveryman id and a local driver
/// id. Both sides are opaque strings; the pairing has no other meaning to
/// the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverMapping {
    pub remote_id: String,
    pub local_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(DeliveryStatus::Cancelled.is_terminal());
        assert!(DeliveryStatus::Missing.is_terminal());
        assert!(!DeliveryStatus::Added.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::InProgress.is_terminal());
        assert!(!DeliveryStatus::Sending.is_terminal());
    }

    #[test]
    fn cloud_status_mapping() {
        assert_eq!(DeliveryStatus::from_cloud_code("PENDING"), DeliveryStatus::Added);
        assert_eq!(DeliveryStatus::from_cloud_code("ROUTED"), DeliveryStatus::InProgress);
        assert_eq!(DeliveryStatus::from_cloud_code("COMPLETED"), DeliveryStatus::Delivered);
        assert_eq!(DeliveryStatus::from_cloud_code("CANCELLED"), DeliveryStatus::Cancelled);
        assert_eq!(DeliveryStatus::from_cloud_code("FAILED"), DeliveryStatus::Failed);
        assert_eq!(DeliveryStatus::from_cloud_code("SOMETHING_NEW"), DeliveryStatus::Added);
    }

    #[test]
    fn order_rejects_blank_required_fields() {
        let now = Utc::now();
        assert!(Order::new("1", "  ", "addr", now).is_err());
        assert!(Order::new("1", "name", "   ", now).is_err());
        assert!(Order::new("1", "name", "addr", now).is_ok());
    }

    #[test]
    fn order_canonicalizes_internal_id() {
        let now = Utc::now();
        let o = Order::new("10.0", "name", "addr", now).unwrap();
        assert_eq!(o.internal_id.as_str(), "10");
    }
}
