//! Reply shapes of the remote endpoint and their mapping to gateway types.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use wxgate_protocol::{Account, ChatRoomInfo, Contact, Profile};

use super::error::RemoteError;

/// Separator the remote uses between member ids of a chat room.
pub const MEMBER_SEPARATOR: &str = "^G";

/// Generic `{code, msg, data}` reply.
#[derive(Debug, Deserialize)]
pub struct Reply<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

/// Which result codes count as success for an operation.
///
/// The remote is not consistent: some calls use `1` for success, others `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    One,
    NonZero,
    Zero,
    NonNegative,
    Any,
}

impl Accept {
    pub fn accepts(self, code: i64) -> bool {
        match self {
            Accept::One => code == 1,
            Accept::NonZero => code != 0,
            Accept::Zero => code == 0,
            Accept::NonNegative => code >= 0,
            Accept::Any => true,
        }
    }
}

impl<T> Reply<T> {
    /// Check `code` against `accept` and hand back the payload.
    pub fn into_result(self, op: &'static str, accept: Accept) -> Result<Option<T>, RemoteError> {
        if accept.accepts(self.code) {
            Ok(self.data)
        } else {
            Err(RemoteError::Rejected {
                op,
                code: self.code,
                msg: self.msg,
            })
        }
    }
}

/// Decode a reply body. A missing or `null` `data` decodes as `None`.
pub fn decode_reply<T: DeserializeOwned>(op: &'static str, body: &[u8]) -> Result<Reply<T>, RemoteError> {
    serde_json::from_slice(body).map_err(|source| RemoteError::Decode { op, source })
}

// ============================================================================
// Remote payloads
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteAccount {
    pub account: String,
    pub city: String,
    pub country: String,
    pub current_data_path: String,
    pub data_save_path: String,
    pub db_key: String,
    pub head_image: String,
    pub mobile: String,
    pub name: String,
    pub province: String,
    pub signature: String,
    pub wxid: String,
    pub private_key: String,
    pub public_key: String,
}

impl From<RemoteAccount> for Account {
    // Key material never leaves the gateway.
    fn from(remote: RemoteAccount) -> Self {
        Account {
            account: remote.account,
            city: remote.city,
            country: remote.country,
            current_data_path: remote.current_data_path,
            data_save_path: remote.data_save_path,
            head_image: remote.head_image,
            mobile: remote.mobile,
            name: remote.name,
            province: remote.province,
            signature: remote.signature,
            wxid: remote.wxid,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteContact {
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

impl From<RemoteContact> for Contact {
    fn from(remote: RemoteContact) -> Self {
        Contact {
            reserved1: remote.reserved1,
            reserved2: remote.reserved2,
            contact_type: remote.contact_type,
            verify_flag: remote.verify_flag,
            custom_account: remote.custom_account,
            encrypt_name: remote.encrypt_name,
            nickname: remote.nickname,
            pinyin: remote.pinyin,
            pinyin_all: remote.pinyin_all,
            remark: remote.remark,
            remark_pinyin: remote.remark_pinyin,
            label_ids: remote.label_ids,
            wxid: remote.wxid,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteProfile {
    pub account: String,
    pub head_image: String,
    pub nickname: String,
    pub v3: String,
    pub wxid: String,
}

impl From<RemoteProfile> for Profile {
    fn from(remote: RemoteProfile) -> Self {
        Profile {
            account: remote.account,
            head_image: remote.head_image,
            nickname: remote.nickname,
            v3: remote.v3,
            wxid: remote.wxid,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteChatRoom {
    pub chat_room_id: String,
    pub notice: String,
    pub admin: String,
    pub xml: String,
}

impl From<RemoteChatRoom> for ChatRoomInfo {
    fn from(remote: RemoteChatRoom) -> Self {
        ChatRoomInfo {
            chat_room_id: remote.chat_room_id,
            notice: remote.notice,
            admin: remote.admin,
            xml: remote.xml,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteChatRoomMembers {
    pub chat_room_id: String,
    pub admin: String,
    pub admin_nickname: String,
    pub member_nickname: String,
    /// Member ids joined by [`MEMBER_SEPARATOR`].
    pub members: String,
}

impl RemoteChatRoomMembers {
    pub fn member_ids(&self) -> Vec<String> {
        self.members
            .split(MEMBER_SEPARATOR)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_rules() {
        assert!(Accept::One.accepts(1));
        assert!(!Accept::One.accepts(0));
        assert!(Accept::NonZero.accepts(-3));
        assert!(!Accept::NonZero.accepts(0));
        assert!(Accept::Zero.accepts(0));
        assert!(Accept::NonNegative.accepts(0));
        assert!(!Accept::NonNegative.accepts(-1));
        assert!(Accept::Any.accepts(-100));
    }

    #[test]
    fn rejected_reply_keeps_message() {
        let reply: Reply<serde_json::Value> =
            decode_reply("userInfo", br#"{"code":0,"msg":"not login"}"#).unwrap();
        let err = reply.into_result("userInfo", Accept::One).unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { code: 0, .. }));
    }

    #[test]
    fn account_mapping_drops_keys() {
        let reply: Reply<RemoteAccount> = decode_reply(
            "userInfo",
            br#"{"code":1,"data":{"wxid":"wxid_me","name":"Me","dbKey":"secret","privateKey":"k"}}"#,
        )
        .unwrap();
        let account: Account = reply
            .into_result("userInfo", Accept::One)
            .unwrap()
            .unwrap()
            .into();
        assert_eq!(account.wxid, "wxid_me");
        assert_eq!(account.name, "Me");
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn member_ids_split_on_separator() {
        let members = RemoteChatRoomMembers {
            members: "wxid_a^Gwxid_b^G^Gwxid_c".to_string(),
            ..Default::default()
        };
        assert_eq!(members.member_ids(), vec!["wxid_a", "wxid_b", "wxid_c"]);
    }

    #[derive(Debug, Deserialize)]
    struct NoDefault {
        id: u32,
    }

    #[test]
    fn payload_without_default_decodes() {
        let reply: Reply<NoDefault> = decode_reply("op", br#"{"code":1,"data":{"id":7}}"#).unwrap();
        assert_eq!(reply.data.unwrap().id, 7);

        let reply: Reply<NoDefault> = decode_reply("op", br#"{"code":1}"#).unwrap();
        assert!(reply.data.is_none());
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = decode_reply::<serde_json::Value>("checkLogin", b"<html>").unwrap_err();
        assert!(matches!(err, RemoteError::Decode { op: "checkLogin", .. }));
    }
}
