use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A single row of `get_full_global_snapshot()` (§4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotDelivery {
    pub id: String,
    pub route_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<DeliveryMetadata>,
    pub status: String,
    pub deliveryman_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryMetadata {
    pub customer_name: String,
    pub address: String,
    pub integration_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Snapshot {
    pub deliveries: Vec<SnapshotDelivery>,
}

/// A normalized location, as returned by `add_delivery` once the cloud side
/// geocodes the raw address.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResponse {
    pub external_id: syncd_domain::ExternalId,
    pub location: Option<GeoLocation>,
}

/// The reconciliation query's matching rules (§4.4.2), applied over a
/// snapshot already fetched by the caller. Pulled out as a pure function so
/// it can be tested without a server.
pub fn find_best_match<'a>(
    candidates: &'a [SnapshotDelivery],
    customer_name: &str,
    address: &str,
    window: chrono::Duration,
    now: DateTime<Utc>,
) -> Option<&'a SnapshotDelivery> {
    candidates
        .iter()
        .filter(|c| {
            let Some(meta) = &c.metadata else { return false };
            if !meta.customer_name.eq_ignore_ascii_case(customer_name) {
                return false;
            }
            if (now - c.created_at).abs() > window {
                return false;
            }
            address_matches(&meta.address, address)
        })
        .max_by_key(|c| c.created_at)
}

/// Exact match (trimmed, lowercased) passes; otherwise a substring test in
/// either direction. Only the search string's length is guarded — a search
/// shorter than 5 characters is never accepted as a substring match (too
/// likely to false-positive) — the stored/candidate address is checked at
/// whatever length it happens to be, since it isn't the operator-supplied
/// value and false-positive risk there comes from the search term, not it.
fn address_matches(candidate_address: &str, search: &str) -> bool {
    let a = candidate_address.trim().to_lowercase();
    let b = search.trim().to_lowercase();
    if a == b {
        return true;
    }
    b.len() >= 5 && (a.contains(&b) || b.contains(&a))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, address: &str, created_at: DateTime<Utc>) -> SnapshotDelivery {
        SnapshotDelivery {
            id: "ext-1".into(),
            route_id: None,
            created_at,
            metadata: Some(DeliveryMetadata {
                customer_name: name.into(),
                address: address.into(),
                integration_name: None,
            }),
            status: "PENDING".into(),
            deliveryman_id: None,
        }
    }

    #[test]
    fn exact_address_match_passes() {
        assert!(address_matches("123 Main St", "123 Main St"));
        assert!(address_matches("  123 Main St  ", "123 main st"));
    }

    #[test]
    fn substring_match_requires_minimum_length() {
        assert!(address_matches("123 Main Street Apt 4", "Main Street"));
        assert!(!address_matches("123 Main Street Apt 4", "St"));
    }

    #[test]
    fn short_stored_address_matches_a_long_enough_search() {
        // Only the search string's length is gated — a short stored/candidate
        // address is still a valid match target for a search long enough to
        // trust.
        assert!(address_matches("5th", "deliver to the 5th"));
    }

    #[test]
    fn no_match_returns_false() {
        assert!(!address_matches("123 Main Street", "456 Oak Avenue"));
    }

    #[test]
    fn find_best_match_picks_most_recent_of_multiple_candidates() {
        let now = Utc::now();
        let older = candidate("Alice", "123 Main St", now - chrono::Duration::seconds(100));
        let newer = candidate("Alice", "123 Main St", now - chrono::Duration::seconds(10));
        let candidates = vec![older, newer.clone()];
        let found = find_best_match(&candidates, "alice", "123 main st", chrono::Duration::seconds(300), now);
        assert_eq!(found.unwrap().created_at, newer.created_at);
    }

    #[test]
    fn find_best_match_rejects_outside_window() {
        let now = Utc::now();
        let stale = candidate("Alice", "123 Main St", now - chrono::Duration::seconds(500));
        let candidates = vec![stale];
        let found = find_best_match(&candidates, "alice", "123 main st", chrono::Duration::seconds(300), now);
        assert!(found.is_none());
    }

    #[test]
    fn find_best_match_rejects_missing_metadata() {
        let now = Utc::now();
        let c = SnapshotDelivery {
            id: "x".into(),
            route_id: None,
            created_at: now,
            metadata: None,
            status: "PENDING".into(),
            deliveryman_id: None,
        };
        let found = find_best_match(&[c], "alice", "123 main st", chrono::Duration::seconds(300), now);
        assert!(found.is_none());
    }
}
