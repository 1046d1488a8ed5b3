//! Transport abstraction: wire events and the connection capability trait

pub mod connection;
pub mod events;

pub use connection::{ClientConnection, Connection, RecordingConnection};
pub use events::{ClientEvent, ServerEvent};
