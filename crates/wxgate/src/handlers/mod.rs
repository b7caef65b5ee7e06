//! HTTP request handlers.

pub mod account;
pub mod chat_room;
mod gate;
mod health;
pub mod messages;
pub mod upload;

pub use gate::{require_active, require_login};
pub use health::{livez, ping, readyz, status};
