//! HTTP implementation of [`RemoteEndpoint`].

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use wxgate_protocol::{Account, ChatRoomInfo, Contact, Profile};

use super::error::{RemoteError, check_response_error};
use super::types::{
    Accept, RemoteAccount, RemoteChatRoom, RemoteChatRoomMembers, RemoteContact, RemoteProfile,
    decode_reply,
};
use super::{CallbackTarget, RemoteEndpoint};

/// Directory shared with the remote endpoint, seen from both sides.
#[derive(Debug, Clone)]
pub struct FileStaging {
    /// Local path of the shared directory.
    pub dir: PathBuf,
    /// The same directory as the remote endpoint names it, e.g. `C:\data\`.
    pub remote_prefix: String,
}

impl FileStaging {
    /// Write `bytes` under a fresh name and return the remote's path to it.
    async fn stage(&self, bytes: &[u8]) -> Result<String, RemoteError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = ulid::Ulid::new().to_string().to_lowercase();
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        Ok(format!("{}{}", self.remote_prefix, name))
    }
}

pub struct HttpRemote {
    client: Client,
    base_url: String,
    staging: FileStaging,
}

impl HttpRemote {
    /// `client` should carry the per-call timeout.
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>, staging: FileStaging) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            staging,
        }
    }

    /// POST to `/api/<op>` and decode the reply, checking its code.
    async fn call<T: DeserializeOwned>(
        &self,
        op: &'static str,
        body: Option<Value>,
        accept: Accept,
    ) -> Result<Option<T>, RemoteError> {
        let url = format!("{}/api/{}", self.base_url, op);
        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = check_response_error(request.send().await?).await?;
        let bytes = response.bytes().await?;
        let reply = decode_reply::<T>(op, &bytes)?;
        debug!(op, code = reply.code, "Remote call finished");
        reply.into_result(op, accept)
    }

    /// Like [`Self::call`] for operations whose payload is irrelevant.
    async fn call_unit(&self, op: &'static str, body: Option<Value>, accept: Accept) -> Result<(), RemoteError> {
        self.call::<Value>(op, body, accept).await.map(|_| ())
    }

    /// Like [`Self::call`] for operations that must return a payload.
    async fn call_data<T: DeserializeOwned>(
        &self,
        op: &'static str,
        body: Option<Value>,
        accept: Accept,
    ) -> Result<T, RemoteError> {
        self.call(op, body, accept)
            .await?
            .ok_or_else(|| RemoteError::Rejected {
                op,
                code: 0,
                msg: "empty reply".to_string(),
            })
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemote {
    async fn check_login(&self) -> Result<bool, RemoteError> {
        match self.call_unit("checkLogin", None, Accept::One).await {
            Ok(()) => Ok(true),
            Err(RemoteError::Rejected { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn user_info(&self) -> Result<Account, RemoteError> {
        let account: RemoteAccount = self.call_data("userInfo", None, Accept::One).await?;
        Ok(account.into())
    }

    async fn contact_list(&self) -> Result<Vec<Contact>, RemoteError> {
        let contacts: Option<Vec<RemoteContact>> =
            self.call("getContactList", None, Accept::Any).await?;
        Ok(contacts
            .unwrap_or_default()
            .into_iter()
            .map(Contact::from)
            .collect())
    }

    async fn send_text(&self, to: &str, content: &str) -> Result<(), RemoteError> {
        let body = json!({ "wxid": to, "msg": content });
        self.call_unit("sendTextMsg", Some(body), Accept::NonZero).await
    }

    async fn send_image(&self, to: &str, image: &[u8]) -> Result<(), RemoteError> {
        let image_path = self.staging.stage(image).await?;
        let body = json!({ "wxid": to, "imagePath": image_path });
        self.call_unit("sendImage", Some(body), Accept::Any).await
    }

    async fn send_file(&self, to: &str, file: &[u8]) -> Result<(), RemoteError> {
        let file_path = self.staging.stage(file).await?;
        let body = json!({ "wxid": to, "filePath": file_path });
        self.call_unit("sendFileMsg", Some(body), Accept::NonZero).await
    }

    async fn chat_room_detail(&self, chat_room_id: &str) -> Result<ChatRoomInfo, RemoteError> {
        let body = json!({ "chatRoomId": chat_room_id });
        let room: RemoteChatRoom = self
            .call_data("getChatRoomDetailInfo", Some(body), Accept::One)
            .await?;
        Ok(room.into())
    }

    async fn chat_room_member_ids(&self, chat_room_id: &str) -> Result<Vec<String>, RemoteError> {
        let body = json!({ "chatRoomId": chat_room_id });
        let members: RemoteChatRoomMembers = self
            .call_data("getMemberFromChatRoom", Some(body), Accept::One)
            .await?;
        Ok(members.member_ids())
    }

    async fn contact_profile(&self, wxid: &str) -> Result<Profile, RemoteError> {
        let body = json!({ "wxid": wxid });
        let profile: Option<RemoteProfile> = self
            .call("getContactProfile", Some(body), Accept::NonNegative)
            .await?;
        Ok(profile.unwrap_or_default().into())
    }

    async fn send_at_text(
        &self,
        chat_room_id: &str,
        at_list: &[String],
        content: &str,
    ) -> Result<(), RemoteError> {
        let body = json!({
            "wxids": at_list.join(","),
            "chatRoomId": chat_room_id,
            "msg": content,
        });
        self.call_unit("sendAtText", Some(body), Accept::NonNegative).await
    }

    async fn add_chat_room_members(
        &self,
        chat_room_id: &str,
        member_ids: &[String],
    ) -> Result<(), RemoteError> {
        let body = json!({ "chatRoomId": chat_room_id, "memberIds": member_ids.join(",") });
        self.call_unit("addMemberToChatRoom", Some(body), Accept::One).await
    }

    async fn invite_chat_room_members(
        &self,
        chat_room_id: &str,
        member_ids: &[String],
    ) -> Result<(), RemoteError> {
        let body = json!({ "chatRoomId": chat_room_id, "memberIds": member_ids.join(",") });
        self.call_unit("inviteMemberToChatRoom", Some(body), Accept::One).await
    }

    async fn forward_message(&self, wxid: &str, msg_id: &str) -> Result<(), RemoteError> {
        let body = json!({ "wxid": wxid, "msgid": msg_id });
        self.call_unit("forwardMessage", Some(body), Accept::One).await
    }

    async fn hook_sync_msg(&self, target: &CallbackTarget) -> Result<(), RemoteError> {
        let body = hook_body(target);
        self.call_unit("hookSyncMsg", Some(body), Accept::Zero).await
    }

    async fn unhook_sync_msg(&self) -> Result<(), RemoteError> {
        self.call_unit("unhookSyncMsg", None, Accept::Zero).await
    }
}

/// All fields are always present; the remote expects strings for port and timeout.
fn hook_body(target: &CallbackTarget) -> Value {
    match target {
        CallbackTarget::Tcp { host, port } => json!({
            "port": port.to_string(),
            "ip": host,
            "url": "",
            "timeout": "",
            "enableHttp": 0,
        }),
        CallbackTarget::Http { url, timeout } => json!({
            "port": url.port_or_known_default().map(|p| p.to_string()).unwrap_or_default(),
            "ip": url.host_str().unwrap_or_default(),
            "url": url.as_str(),
            "timeout": timeout.as_secs().to_string(),
            "enableHttp": 1,
        }),
    }
}
