//! Typed calls for every gateway route.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Response;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;
use wxgate_protocol::{
    Account, ChatRoomInfo, ChatRoomMembersRequest, ChatRoomRequest, Contact, Envelope,
    ForwardMsgRequest, GatewayStatus, Message, Profile, SendAtTextRequest, SendFileRequest,
    SendImageRequest, SendTextRequest, codes, paths,
};

use crate::error::ClientError;
use crate::subscription::{Subscription, SubscriptionConfig};

/// Chunk size used by [`Client::upload_file`] unless overridden.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Client for one gateway.
///
/// Cheap to clone. The wrapped `reqwest::Client` must allow requests longer
/// than the gateway's `sync-message` wait.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    chunk_size: usize,
}

impl Client {
    /// `base_url` is the gateway root, e.g. `http://127.0.0.1:19089`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url)
    }

    #[must_use]
    pub fn with_http_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Must not exceed the gateway's `upload.max_chunk_bytes`.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &'static str) -> Result<Option<T>, ClientError> {
        let response = self.http.get(self.url(path)).send().await?;
        read_envelope(path, response).await
    }

    async fn post<B, T>(&self, path: &'static str, body: &B) -> Result<Option<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        read_envelope(path, response).await
    }

    async fn post_unit<B: Serialize + ?Sized>(&self, path: &'static str, body: &B) -> Result<(), ClientError> {
        self.post::<B, Value>(path, body).await.map(|_| ())
    }

    // ------------------------------------------------------------------------
    // Health and account
    // ------------------------------------------------------------------------

    /// `GET /ping`. Answers even after the gateway stopped serving.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let response = self.http.get(self.url(paths::PING)).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(ClientError::Status {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    pub async fn status(&self) -> Result<GatewayStatus, ClientError> {
        required(paths::STATUS, self.get(paths::STATUS).await?)
    }

    pub async fn check_login(&self) -> Result<bool, ClientError> {
        required(paths::CHECK_LOGIN, self.get(paths::CHECK_LOGIN).await?)
    }

    pub async fn user_info(&self) -> Result<Account, ClientError> {
        required(paths::USER_INFO, self.get(paths::USER_INFO).await?)
    }

    pub async fn contact_list(&self) -> Result<Vec<Contact>, ClientError> {
        Ok(self.get(paths::CONTACT_LIST).await?.unwrap_or_default())
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    /// One long-poll. Empty when no message arrived within the gateway's wait.
    pub async fn sync_message(&self) -> Result<Vec<Message>, ClientError> {
        Ok(self.get(paths::SYNC_MESSAGE).await?.unwrap_or_default())
    }

    /// Keep long-polling in the background. See [`Subscription`].
    pub fn subscribe(&self, config: SubscriptionConfig) -> Subscription {
        Subscription::spawn(self.clone(), config)
    }

    pub async fn send_text(&self, to: &str, content: &str) -> Result<(), ClientError> {
        let body = SendTextRequest {
            to: to.to_string(),
            content: content.to_string(),
        };
        self.post_unit(paths::SEND_TEXT, &body).await
    }

    pub async fn send_image(&self, to: &str, image: &[u8]) -> Result<(), ClientError> {
        let body = SendImageRequest {
            to: to.to_string(),
            image: BASE64.encode(image),
        };
        self.post_unit(paths::SEND_IMAGE, &body).await
    }

    pub async fn send_file(&self, to: &str, file: &[u8]) -> Result<(), ClientError> {
        let body = SendFileRequest {
            to: to.to_string(),
            file: BASE64.encode(file),
        };
        self.post_unit(paths::SEND_FILE, &body).await
    }

    pub async fn forward_msg(&self, wxid: &str, msg_id: &str) -> Result<(), ClientError> {
        let body = ForwardMsgRequest {
            wxid: wxid.to_string(),
            msg_id: msg_id.to_string(),
        };
        self.post_unit(paths::FORWARD_MSG, &body).await
    }

    /// Upload `content` chunk by chunk and return the merged file's name in
    /// the gateway's shared directory.
    ///
    /// The whole content is hashed up front; the gateway verifies the digest
    /// after the last chunk. An empty `filename` is replaced by a random one.
    pub async fn upload_file(&self, filename: &str, content: &[u8]) -> Result<String, ClientError> {
        let filename = if filename.is_empty() {
            ulid::Ulid::new().to_string().to_lowercase()
        } else {
            filename.to_string()
        };
        let file_hash = format!("{:x}", Sha256::digest(content));

        let parts: Vec<&[u8]> = if content.is_empty() {
            vec![content]
        } else {
            content.chunks(self.chunk_size).collect()
        };
        let chunks = parts.len();

        let mut merged = String::new();
        for (index, part) in parts.into_iter().enumerate() {
            let form = Form::new()
                .text("filename", filename.clone())
                .text("fileHash", file_hash.clone())
                .text("chunks", chunks.to_string())
                .text("chunk", index.to_string())
                .part("file", Part::bytes(part.to_vec()).file_name(filename.clone()));
            let response = self
                .http
                .post(self.url(paths::UPLOAD))
                .multipart(form)
                .send()
                .await?;
            merged = read_envelope::<String>(paths::UPLOAD, response)
                .await?
                .unwrap_or_default();
            debug!(%filename, chunk = index, chunks, "Uploaded chunk");
        }

        if merged.is_empty() {
            return Err(ClientError::MissingData(paths::UPLOAD));
        }
        Ok(merged)
    }

    // ------------------------------------------------------------------------
    // Chat rooms
    // ------------------------------------------------------------------------

    pub async fn chat_room_detail(&self, chat_room_id: &str) -> Result<ChatRoomInfo, ClientError> {
        let body = ChatRoomRequest {
            chat_room_id: chat_room_id.to_string(),
        };
        required(
            paths::CHAT_ROOM_DETAIL,
            self.post(paths::CHAT_ROOM_DETAIL, &body).await?,
        )
    }

    /// Profiles of every member, in the room's member order.
    pub async fn member_from_chat_room(&self, chat_room_id: &str) -> Result<Vec<Profile>, ClientError> {
        let body = ChatRoomRequest {
            chat_room_id: chat_room_id.to_string(),
        };
        Ok(self
            .post(paths::MEMBER_FROM_CHAT_ROOM, &body)
            .await?
            .unwrap_or_default())
    }

    pub async fn send_at_text(
        &self,
        group_id: &str,
        at_list: &[String],
        content: &str,
    ) -> Result<(), ClientError> {
        let body = SendAtTextRequest {
            group_id: group_id.to_string(),
            at_list: at_list.to_vec(),
            content: content.to_string(),
        };
        self.post_unit(paths::SEND_AT_TEXT, &body).await
    }

    pub async fn add_member_into_chat_room(
        &self,
        chat_room_id: &str,
        member_ids: &[String],
    ) -> Result<(), ClientError> {
        let body = ChatRoomMembersRequest {
            chat_room_id: chat_room_id.to_string(),
            member_ids: member_ids.to_vec(),
        };
        self.post_unit(paths::ADD_MEMBER_INTO_CHAT_ROOM, &body).await
    }

    pub async fn invite_member_into_chat_room(
        &self,
        chat_room_id: &str,
        member_ids: &[String],
    ) -> Result<(), ClientError> {
        let body = ChatRoomMembersRequest {
            chat_room_id: chat_room_id.to_string(),
            member_ids: member_ids.to_vec(),
        };
        self.post_unit(paths::INVITE_MEMBER_INTO_CHAT_ROOM, &body)
            .await
    }
}

/// Decode the envelope and map its code to a result.
async fn read_envelope<T: DeserializeOwned>(
    path: &'static str,
    response: Response,
) -> Result<Option<T>, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(source) if status.is_success() => return Err(ClientError::Decode { path, source }),
        Err(_) => {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
    };

    debug!(path, code = envelope.code, "Gateway call finished");
    match envelope.code {
        codes::OK => Ok(envelope.data),
        codes::AUTH => Err(ClientError::Unauthorized(envelope.msg)),
        code => Err(ClientError::Api {
            path,
            code,
            msg: envelope.msg,
        }),
    }
}

fn required<T>(path: &'static str, data: Option<T>) -> Result<T, ClientError> {
    data.ok_or(ClientError::MissingData(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = Client::new("http://127.0.0.1:19089/");
        assert_eq!(client.base_url(), "http://127.0.0.1:19089");
        assert_eq!(client.url(paths::PING), "http://127.0.0.1:19089/ping");
    }

    #[test]
    fn chunk_size_is_at_least_one() {
        let client = Client::new("http://localhost").with_chunk_size(0);
        assert_eq!(client.chunk_size, 1);
    }

    #[test]
    fn missing_payload_names_the_route() {
        let err = required::<bool>(paths::CHECK_LOGIN, None).unwrap_err();
        assert_eq!(err.to_string(), "/api/check-login returned no data");
    }
}
