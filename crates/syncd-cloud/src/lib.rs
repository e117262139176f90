pub mod client;
pub mod cooldown;
pub mod error;
pub mod push;
pub mod snapshot;

pub use client::{CloudClient, UnauthorizedHook};
pub use cooldown::CooldownMap;
pub use error::CloudError;
pub use push::{ChannelState, CloudEvent, PushChannel, PushChannelConfig};
pub use snapshot::{DeliveryResponse, GeoLocation, Snapshot, SnapshotDelivery};
