//! Client for the remote chat automation endpoint.
//!
//! [`RemoteEndpoint`] is the seam between the HTTP handlers / session loop and
//! the actual endpoint; [`HttpRemote`] is the production implementation and
//! tests substitute scripted fakes.

mod client;
mod error;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use url::Url;
use wxgate_protocol::{Account, ChatRoomInfo, Contact, Profile};

pub use client::{FileStaging, HttpRemote};
pub use error::RemoteError;

/// Where the remote endpoint should push new messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackTarget {
    /// Raw TCP, one connection per message.
    Tcp { host: String, port: u16 },
    /// HTTP POST, one request per message.
    Http { url: Url, timeout: Duration },
}

/// Operations offered by the remote endpoint.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// `true` if the account is logged in.
    async fn check_login(&self) -> Result<bool, RemoteError>;

    async fn user_info(&self) -> Result<Account, RemoteError>;

    async fn contact_list(&self) -> Result<Vec<Contact>, RemoteError>;

    async fn send_text(&self, to: &str, content: &str) -> Result<(), RemoteError>;

    /// Stage `image` in the shared directory and send it.
    async fn send_image(&self, to: &str, image: &[u8]) -> Result<(), RemoteError>;

    /// Stage `file` in the shared directory and send it.
    async fn send_file(&self, to: &str, file: &[u8]) -> Result<(), RemoteError>;

    async fn chat_room_detail(&self, chat_room_id: &str) -> Result<ChatRoomInfo, RemoteError>;

    async fn chat_room_member_ids(&self, chat_room_id: &str) -> Result<Vec<String>, RemoteError>;

    async fn contact_profile(&self, wxid: &str) -> Result<Profile, RemoteError>;

    async fn send_at_text(
        &self,
        chat_room_id: &str,
        at_list: &[String],
        content: &str,
    ) -> Result<(), RemoteError>;

    async fn add_chat_room_members(
        &self,
        chat_room_id: &str,
        member_ids: &[String],
    ) -> Result<(), RemoteError>;

    async fn invite_chat_room_members(
        &self,
        chat_room_id: &str,
        member_ids: &[String],
    ) -> Result<(), RemoteError>;

    async fn forward_message(&self, wxid: &str, msg_id: &str) -> Result<(), RemoteError>;

    async fn hook_sync_msg(&self, target: &CallbackTarget) -> Result<(), RemoteError>;

    async fn unhook_sync_msg(&self) -> Result<(), RemoteError>;
}
