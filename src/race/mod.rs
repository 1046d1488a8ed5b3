//! Race rooms: passage corpus and the per-room state machine

pub mod corpus;
pub mod instance;

pub use corpus::random_passage;
pub use instance::{Player, RoomInstance};
