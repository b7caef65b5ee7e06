//! Wire types for the wxgate HTTP API.
//!
//! Every endpoint answers with an [`Envelope`]: `{"code": 0, "msg": "", "data": ...}`.
//! A `code` of [`codes::OK`] means success; [`codes::AUTH`] is returned together
//! with HTTP 401 when the remote account is not (or no longer) logged in.
//!
//! The request and payload types in this crate are shared between the gateway
//! and its clients so both sides agree on field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Routes
// ============================================================================

/// Stable route paths served by the gateway.
pub mod paths {
    pub const PING: &str = "/ping";
    pub const STATUS: &str = "/api/status";
    pub const CHECK_LOGIN: &str = "/api/check-login";
    pub const USER_INFO: &str = "/api/userinfo";
    pub const CONTACT_LIST: &str = "/api/contact-list";
    pub const SYNC_MESSAGE: &str = "/api/sync-message";
    pub const SEND_TEXT: &str = "/api/send-text";
    pub const SEND_IMAGE: &str = "/api/send-image";
    pub const SEND_FILE: &str = "/api/send-file";
    pub const UPLOAD: &str = "/api/upload";
    pub const CHAT_ROOM_DETAIL: &str = "/api/chat-room-detail";
    pub const MEMBER_FROM_CHAT_ROOM: &str = "/api/member-from-chat-room";
    pub const SEND_AT_TEXT: &str = "/api/send-at-text";
    pub const ADD_MEMBER_INTO_CHAT_ROOM: &str = "/api/add-member-into-chatroom";
    pub const INVITE_MEMBER_INTO_CHAT_ROOM: &str = "/api/invite-member-into-chatroom";
    pub const FORWARD_MSG: &str = "/api/forward-msg";
}

// ============================================================================
// Envelope
// ============================================================================

/// Result codes carried in [`Envelope::code`].
pub mod codes {
    /// Request succeeded.
    pub const OK: i32 = 0;
    /// Request failed; `msg` holds a human-readable reason.
    pub const ERROR: i32 = 1;
    /// The remote account is not logged in, or the gateway has stopped serving.
    pub const AUTH: i32 = 2;
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: codes::OK,
            msg: String::new(),
            data: Some(data),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == codes::OK
    }
}

impl Envelope<()> {
    /// Successful envelope without a payload.
    pub fn empty() -> Self {
        Self {
            code: codes::OK,
            msg: String::new(),
            data: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            code: codes::ERROR,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            code: codes::AUTH,
            msg: msg.into(),
            data: None,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Well-known values of [`Message::msg_type`].
pub mod message_types {
    pub const TEXT: i32 = 1;
    pub const IMAGE: i32 = 3;
    pub const VOICE: i32 = 34;
    pub const VIDEO: i32 = 43;
    pub const EMOTICON: i32 = 47;
}

/// A chat message pushed by the remote endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub content: String,
    /// Unix timestamp (seconds) assigned by the messaging client.
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub display_full_content: String,
    #[serde(default)]
    pub from_user: String,
    #[serde(default)]
    pub msg_id: i64,
    #[serde(default)]
    pub msg_sequence: i64,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub to_user: String,
    #[serde(default, rename = "type")]
    pub msg_type: i32,
    /// Inline image payload, base64 encoded. Only present for image messages.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base64_img: String,
}

impl Message {
    pub fn is_text(&self) -> bool {
        self.msg_type == message_types::TEXT
    }

    pub fn is_image(&self) -> bool {
        self.msg_type == message_types::IMAGE
    }

    pub fn is_voice(&self) -> bool {
        self.msg_type == message_types::VOICE
    }

    pub fn is_video(&self) -> bool {
        self.msg_type == message_types::VIDEO
    }

    pub fn is_emoticon(&self) -> bool {
        self.msg_type == message_types::EMOTICON
    }
}

// ============================================================================
// Account & contacts
// ============================================================================

/// The logged-in account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Account {
    pub account: String,
    pub city: String,
    pub country: String,
    pub current_data_path: String,
    pub data_save_path: String,
    pub head_image: String,
    pub mobile: String,
    pub name: String,
    pub province: String,
    pub signature: String,
    pub wxid: String,
}

/// Built-in service accounts that are never real contacts.
const INTERNAL_IDS: &[&str] = &[
    "filehelper",
    "newsapp",
    "fmessage",
    "weibo",
    "qqmail",
    "tmessage",
    "qmessage",
    "qqsync",
    "floatbottle",
    "lbsapp",
    "shakeapp",
    "medianote",
    "qqfriend",
    "readerapp",
    "blogapp",
    "facebookapp",
    "masssendapp",
    "meishiapp",
    "feedsapp",
    "voip",
    "blogappweixin",
    "weixin",
    "brandsessionholder",
    "weixinreminder",
    "officialaccounts",
    "wxitil",
    "userexperience_alarm",
    "notification_messages",
    "exmail_tool",
];

/// An entry of the contact list (friends, groups and service accounts).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Contact {
    pub reserved1: i32,
    pub reserved2: i32,
    #[serde(rename = "type")]
    pub contact_type: i32,
    pub verify_flag: i32,
    pub custom_account: String,
    pub encrypt_name: String,
    pub nickname: String,
    pub pinyin: String,
    pub pinyin_all: String,
    pub remark: String,
    pub remark_pinyin: String,
    pub label_ids: String,
    pub wxid: String,
}

impl Contact {
    pub fn is_group(&self) -> bool {
        self.wxid.contains("@chatroom")
    }

    pub fn is_internal(&self) -> bool {
        INTERNAL_IDS.contains(&self.wxid.as_str())
    }

    pub fn is_friend(&self) -> bool {
        self.contact_type == 3 && self.verify_flag == 0 && !self.is_group() && !self.is_internal()
    }
}

/// Profile of a single member, as resolved for group member listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub account: String,
    pub head_image: String,
    pub nickname: String,
    pub v3: String,
    pub wxid: String,
}

/// Group (chat room) detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatRoomInfo {
    pub chat_room_id: String,
    pub notice: String,
    pub admin: String,
    pub xml: String,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTextRequest {
    pub to: String,
    pub content: String,
}

/// `image` is the base64 encoded image file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendImageRequest {
    pub to: String,
    pub image: String,
}

/// `file` is the base64 encoded file content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendFileRequest {
    pub to: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomRequest {
    pub chat_room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAtTextRequest {
    pub group_id: String,
    #[serde(default)]
    pub at_list: Vec<String>,
    pub content: String,
}

/// Body of both the add-member and invite-member endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomMembersRequest {
    pub chat_room_id: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardMsgRequest {
    pub wxid: String,
    pub msg_id: String,
}

// ============================================================================
// Status
// ============================================================================

/// Snapshot of the gateway's session, served by [`paths::STATUS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub logged_in: bool,
    /// False once the gateway has stopped serving (logout, listener failure, shutdown).
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_out_at: Option<DateTime<Utc>>,
}
