//! Core data types.

mod entity;
mod ids;
mod status;

pub use entity::Entity;
pub use ids::{CorrelationId, EntityId, OwnerId};
pub use status::Status;
