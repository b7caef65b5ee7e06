//! wxgate - HTTP gateway in front of a remote chat automation endpoint.

pub mod buffer;
pub mod config;
pub mod context;
pub mod fanout;
pub mod gateway;
pub mod handlers;
pub mod listener;
pub mod remote;
pub mod response;
pub mod server;
pub mod session;
pub mod sync;
pub mod upload;
