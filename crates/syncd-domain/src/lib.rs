pub mod clock;
pub mod error;
pub mod ids;
pub mod types;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::DomainError;
pub use ids::{canonicalize, ExternalId, InternalId};
pub use types::{DeliveryStatus, DriverMapping, Order, TrackingRecord};
