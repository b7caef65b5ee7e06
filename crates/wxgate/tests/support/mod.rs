//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use wxgate::buffer::MemoryBuffer;
use wxgate::config::Config;
use wxgate::gateway::Gateway;
use wxgate::remote::{CallbackTarget, RemoteEndpoint, RemoteError};
use wxgate_protocol::{Account, ChatRoomInfo, Contact, Profile};

/// Scripted remote endpoint that records every call.
#[derive(Default)]
pub struct FakeRemote {
    pub logged_in: AtomicBool,
    pub members: Mutex<Vec<String>>,
    /// Member ids whose profile lookup fails.
    pub failing: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
    pub profile_calls: AtomicUsize,
    pub hooks: Mutex<Vec<CallbackTarget>>,
    pub unhooks: AtomicUsize,
    pub sent_files: Mutex<Vec<Vec<u8>>>,
}

impl FakeRemote {
    pub fn logged_in() -> Arc<Self> {
        let remote = Self::default();
        remote.logged_in.store(true, Ordering::SeqCst);
        Arc::new(remote)
    }

    pub fn set_logged_in(&self, value: bool) {
        self.logged_in.store(value, Ordering::SeqCst);
    }

    pub fn set_members(&self, members: &[&str]) {
        *self.members.lock().unwrap() = members.iter().map(|m| m.to_string()).collect();
    }

    pub fn fail_profile(&self, wxid: &str) {
        self.failing.lock().unwrap().insert(wxid.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn rejected(op: &'static str, msg: &str) -> RemoteError {
    RemoteError::Rejected {
        op,
        code: 0,
        msg: msg.to_string(),
    }
}

#[async_trait]
impl RemoteEndpoint for FakeRemote {
    async fn check_login(&self) -> Result<bool, RemoteError> {
        Ok(self.logged_in.load(Ordering::SeqCst))
    }

    async fn user_info(&self) -> Result<Account, RemoteError> {
        Ok(Account {
            wxid: "wxid_self".to_string(),
            name: "Gateway".to_string(),
            ..Account::default()
        })
    }

    async fn contact_list(&self) -> Result<Vec<Contact>, RemoteError> {
        Ok(vec![Contact {
            wxid: "wxid_friend".to_string(),
            nickname: "Friend".to_string(),
            ..Contact::default()
        }])
    }

    async fn send_text(&self, to: &str, content: &str) -> Result<(), RemoteError> {
        self.record(format!("text:{to}:{content}"));
        Ok(())
    }

    async fn send_image(&self, to: &str, image: &[u8]) -> Result<(), RemoteError> {
        self.record(format!("image:{to}"));
        self.sent_files.lock().unwrap().push(image.to_vec());
        Ok(())
    }

    async fn send_file(&self, to: &str, file: &[u8]) -> Result<(), RemoteError> {
        self.record(format!("file:{to}"));
        self.sent_files.lock().unwrap().push(file.to_vec());
        Ok(())
    }

    async fn chat_room_detail(&self, chat_room_id: &str) -> Result<ChatRoomInfo, RemoteError> {
        Ok(ChatRoomInfo {
            chat_room_id: chat_room_id.to_string(),
            admin: "wxid_admin".to_string(),
            ..ChatRoomInfo::default()
        })
    }

    async fn chat_room_member_ids(&self, _chat_room_id: &str) -> Result<Vec<String>, RemoteError> {
        Ok(self.members.lock().unwrap().clone())
    }

    async fn contact_profile(&self, wxid: &str) -> Result<Profile, RemoteError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(wxid) {
            return Err(rejected("getContactProfile", "no such contact"));
        }
        // Keep a few lookups in flight together.
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(Profile {
            wxid: wxid.to_string(),
            nickname: format!("nick-{wxid}"),
            ..Profile::default()
        })
    }

    async fn send_at_text(
        &self,
        chat_room_id: &str,
        at_list: &[String],
        content: &str,
    ) -> Result<(), RemoteError> {
        self.record(format!("at:{chat_room_id}:{}:{content}", at_list.join(",")));
        Ok(())
    }

    async fn add_chat_room_members(
        &self,
        chat_room_id: &str,
        member_ids: &[String],
    ) -> Result<(), RemoteError> {
        self.record(format!("add:{chat_room_id}:{}", member_ids.join(",")));
        Ok(())
    }

    async fn invite_chat_room_members(
        &self,
        chat_room_id: &str,
        member_ids: &[String],
    ) -> Result<(), RemoteError> {
        self.record(format!("invite:{chat_room_id}:{}", member_ids.join(",")));
        Ok(())
    }

    async fn forward_message(&self, wxid: &str, msg_id: &str) -> Result<(), RemoteError> {
        self.record(format!("forward:{wxid}:{msg_id}"));
        Ok(())
    }

    async fn hook_sync_msg(&self, target: &CallbackTarget) -> Result<(), RemoteError> {
        self.hooks.lock().unwrap().push(target.clone());
        Ok(())
    }

    async fn unhook_sync_msg(&self) -> Result<(), RemoteError> {
        self.unhooks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Config suited to tests: fast polling, short long-polls, files under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.request_timeout_seconds = 5;
    config.server.max_body_bytes = 16 * 1024;
    config.callback.host = "127.0.0.1".to_string();
    config.callback.port = 0;
    config.session.poll_interval_ms = 10;
    config.session.check_timeout_ms = 500;
    config.buffer.sync_wait_seconds = 1;
    config.upload.temp_dir = dir.to_path_buf();
    config.upload.max_chunk_bytes = 1024;
    config.fanout.concurrency = Some(3);
    config
}

pub fn gateway(remote: Arc<FakeRemote>, dir: &Path) -> Gateway {
    Gateway::with_parts(test_config(dir), remote, Arc::new(MemoryBuffer::new(16)))
}

/// Start the login watcher and wait for the first successful check.
pub async fn wait_logged_in(gateway: &Gateway) {
    let session = &gateway.state().session;
    let _ = session.spawn_login_watcher(wxgate::session::WatchConfig {
        poll_interval: Duration::from_millis(10),
        check_timeout: Duration::from_millis(500),
        unreachable_budget: 0,
    });
    for _ in 0..200 {
        if session.is_logged_in() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never logged in");
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub const BOUNDARY: &str = "wxgate-test-boundary";

/// Multipart form for one upload chunk.
pub fn chunk_form(filename: &str, hash: &str, chunks: usize, chunk: usize, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in [
        ("filename", filename.to_string()),
        ("fileHash", hash.to_string()),
        ("chunks", chunks.to_string()),
        ("chunk", chunk.to_string()),
    ] {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}
