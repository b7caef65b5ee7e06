//! Async client for a running wxgate.
//!
//! [`Client`] wraps every route of the HTTP API with typed calls and
//! unwraps the response envelope. [`Client::upload_file`] splits a file
//! into chunks the way the upload route expects. [`Client::subscribe`]
//! keeps long-polling `sync-message` and hands messages over a channel.

mod client;
mod error;
mod subscription;

pub use client::{Client, DEFAULT_CHUNK_SIZE};
pub use error::ClientError;
pub use subscription::{Subscription, SubscriptionConfig};
pub use wxgate_protocol as protocol;
