pub mod connector;
pub mod cursor;
pub mod error;
pub mod events;
pub mod file_watch;
pub mod firebird;

pub use connector::Connector;
pub use error::ConnectorError;
pub use events::ConnectorEvent;
pub use file_watch::FileWatchConnector;
pub use firebird::FirebirdConnector;
