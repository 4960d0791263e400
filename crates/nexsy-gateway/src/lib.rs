//! Real-time side of Nexsy: who is connected, and getting messages and
//! receipts to them.

pub mod blocking;
pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod hub;
pub mod presence;
pub mod registry;

pub use dispatcher::{Audience, Delivery, Dispatcher};
pub use engine::DeliveryEngine;
pub use error::DeliveryError;
pub use hub::Hub;
pub use registry::{ConnectionId, PresenceRegistry};
