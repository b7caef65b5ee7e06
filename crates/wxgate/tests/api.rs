#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use wxgate::context::StopCause;
use wxgate_protocol::{Message, paths};

use support::{FakeRemote, chunk_form, gateway, get, post_json, send, wait_logged_in};

#[tokio::test]
async fn requests_before_login_get_401() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::logged_in();
    remote.set_logged_in(false);
    let gateway = gateway(remote, dir.path());
    let app = gateway.router();

    let (status, body) = send(&app, get(paths::USER_INFO)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);

    // check-login only sits behind the active gate.
    let (status, body) = send(&app, get(paths::CHECK_LOGIN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"], false);
}

#[tokio::test]
async fn account_routes_after_login() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(FakeRemote::logged_in(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let (_, body) = send(&app, get(paths::USER_INFO)).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["wxid"], "wxid_self");

    let (_, body) = send(&app, get(paths::CONTACT_LIST)).await;
    assert_eq!(body["data"][0]["wxid"], "wxid_friend");

    let (_, body) = send(&app, get(paths::STATUS)).await;
    assert_eq!(body["data"]["loggedIn"], true);
    assert_eq!(body["data"]["active"], true);
    assert!(body["data"]["loggedInAt"].is_string());
}

#[tokio::test]
async fn sync_message_returns_buffered_message_then_empty() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(FakeRemote::logged_in(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    gateway
        .state()
        .buffer
        .put(Message {
            msg_id: 42,
            msg_type: 1,
            content: "hello".to_string(),
            from_user: "wxid_a".to_string(),
            ..Message::default()
        })
        .await
        .unwrap();

    let (_, body) = send(&app, get(paths::SYNC_MESSAGE)).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["msgId"], 42);
    assert_eq!(body["data"][0]["content"], "hello");

    let (_, body) = send(&app, get(paths::SYNC_MESSAGE)).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn logout_stops_serving_with_cause() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::logged_in();
    let gateway = gateway(remote.clone(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    // A long-poll in flight unblocks with the stop cause.
    let pending = tokio::spawn({
        let app = app.clone();
        async move { send(&app, get(paths::SYNC_MESSAGE)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    remote.set_logged_in(false);

    let (status, body) = pending.await.unwrap();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "logout");

    assert_eq!(gateway.context().cause(), Some(StopCause::LoggedOut));
    let (status, body) = send(&app, get(paths::CHECK_LOGIN)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);
    assert_eq!(body["msg"], "logout");
}

#[tokio::test]
async fn send_routes_reach_remote() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::logged_in();
    let gateway = gateway(remote.clone(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let (_, body) = send(
        &app,
        post_json(paths::SEND_TEXT, json!({"to": "wxid_b", "content": "hi"})),
    )
    .await;
    assert_eq!(body["code"], 0);

    let image = BASE64.encode(b"\x89PNG fake");
    let (_, body) = send(
        &app,
        post_json(paths::SEND_IMAGE, json!({"to": "wxid_b", "image": image})),
    )
    .await;
    assert_eq!(body["code"], 0);

    let (_, body) = send(
        &app,
        post_json(
            paths::SEND_AT_TEXT,
            json!({"groupId": "room@chatroom", "atList": ["wxid_a", "wxid_b"], "content": "ping"}),
        ),
    )
    .await;
    assert_eq!(body["code"], 0);

    let (_, body) = send(
        &app,
        post_json(
            paths::ADD_MEMBER_INTO_CHAT_ROOM,
            json!({"chatRoomId": "room@chatroom", "memberIds": ["wxid_c"]}),
        ),
    )
    .await;
    assert_eq!(body["code"], 0);

    let (_, body) = send(
        &app,
        post_json(paths::FORWARD_MSG, json!({"wxid": "wxid_d", "msgId": "123"})),
    )
    .await;
    assert_eq!(body["code"], 0);

    assert_eq!(
        remote.calls(),
        vec![
            "text:wxid_b:hi".to_string(),
            "image:wxid_b".to_string(),
            "at:room@chatroom:wxid_a,wxid_b:ping".to_string(),
            "add:room@chatroom:wxid_c".to_string(),
            "forward:wxid_d:123".to_string(),
        ]
    );
    assert_eq!(remote.sent_files.lock().unwrap()[0], b"\x89PNG fake");
}

#[tokio::test]
async fn malformed_bodies_are_code_1() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::logged_in();
    let gateway = gateway(remote.clone(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let (status, body) = send(&app, post_json(paths::SEND_TEXT, json!({"content": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 1);

    let (_, body) = send(
        &app,
        post_json(paths::SEND_FILE, json!({"to": "wxid_b", "file": "not base64!"})),
    )
    .await;
    assert_eq!(body["code"], 1);

    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn send_bodies_are_not_capped_by_chunk_size() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::logged_in();
    let gateway = gateway(remote.clone(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    // Larger than upload.max_chunk_bytes, within server.max_body_bytes.
    let file = vec![7u8; 4 * 1024];
    let (_, body) = send(
        &app,
        post_json(paths::SEND_FILE, json!({"to": "wxid_b", "file": BASE64.encode(&file)})),
    )
    .await;
    assert_eq!(body["code"], 0);
    assert_eq!(remote.sent_files.lock().unwrap()[0], file);

    let too_big = "x".repeat(32 * 1024);
    let (_, body) = send(
        &app,
        post_json(paths::SEND_TEXT, json!({"to": "wxid_b", "content": too_big})),
    )
    .await;
    assert_eq!(body["code"], 1);
    assert_eq!(remote.calls(), vec!["file:wxid_b".to_string()]);
}

#[tokio::test]
async fn member_profiles_keep_member_order() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::logged_in();
    remote.set_members(&["wxid_1", "wxid_2", "wxid_3", "wxid_4"]);
    let gateway = gateway(remote, dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let (_, body) = send(
        &app,
        post_json(paths::MEMBER_FROM_CHAT_ROOM, json!({"chatRoomId": "room@chatroom"})),
    )
    .await;
    assert_eq!(body["code"], 0);
    let wxids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["wxid"].as_str().unwrap())
        .collect();
    assert_eq!(wxids, ["wxid_1", "wxid_2", "wxid_3", "wxid_4"]);
}

#[tokio::test]
async fn one_failed_profile_fails_the_listing() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::logged_in();
    let members: Vec<String> = (0..10).map(|i| format!("wxid_{i}")).collect();
    let member_refs: Vec<&str> = members.iter().map(String::as_str).collect();
    remote.set_members(&member_refs);
    remote.fail_profile("wxid_0");
    let gateway = gateway(remote.clone(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let (status, body) = send(
        &app,
        post_json(paths::MEMBER_FROM_CHAT_ROOM, json!({"chatRoomId": "room@chatroom"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 1);
    assert!(body["msg"].as_str().unwrap().contains("no such contact"));
    assert!(body["data"].is_null());
    assert!(remote.profile_calls.load(Ordering::SeqCst) < 10);
}

#[tokio::test]
async fn chunked_upload_out_of_order() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(FakeRemote::logged_in(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let content: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    let hash = format!("{:x}", Sha256::digest(&content));
    let parts: Vec<&[u8]> = content.chunks(1000).collect();
    assert_eq!(parts.len(), 3);

    for index in [2, 0] {
        let (_, body) = send(&app, chunk_form("report.pdf", &hash, 3, index, parts[index])).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"], "");
    }
    let (_, body) = send(&app, chunk_form("report.pdf", &hash, 3, 1, parts[1])).await;
    assert_eq!(body["code"], 0);

    let name = body["data"].as_str().unwrap();
    assert!(name.ends_with(".pdf"));
    let merged = std::fs::read(dir.path().join(name)).unwrap();
    assert_eq!(merged, content);
}

#[tokio::test]
async fn upload_with_wrong_hash_fails() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(FakeRemote::logged_in(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let hash = format!("{:x}", Sha256::digest(b"something else"));
    let (_, body) = send(&app, chunk_form("a.txt", &hash, 1, 0, b"actual bytes")).await;
    assert_eq!(body["code"], 1);
    assert_eq!(gateway.state().merger.pending(), 0);
}

#[tokio::test]
async fn upload_rejects_bad_chunk_fields() {
    let dir = TempDir::new().unwrap();
    let gateway = gateway(FakeRemote::logged_in(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let (_, body) = send(&app, chunk_form("a.txt", "abc", 2, 2, b"data")).await;
    assert_eq!(body["code"], 1);

    let oversized = vec![0u8; 2048];
    let (_, body) = send(&app, chunk_form("a.txt", "abc", 1, 0, &oversized)).await;
    assert_eq!(body["code"], 1);
    assert_eq!(gateway.state().merger.pending(), 0);
}

#[tokio::test]
async fn chat_room_detail_and_invite() {
    let dir = TempDir::new().unwrap();
    let remote = FakeRemote::logged_in();
    let gateway = gateway(remote.clone(), dir.path());
    wait_logged_in(&gateway).await;
    let app = gateway.router();

    let (_, body) = send(
        &app,
        post_json(paths::CHAT_ROOM_DETAIL, json!({"chatRoomId": "room@chatroom"})),
    )
    .await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["chatRoomId"], "room@chatroom");
    assert_eq!(body["data"]["admin"], "wxid_admin");

    let (_, body) = send(
        &app,
        post_json(
            paths::INVITE_MEMBER_INTO_CHAT_ROOM,
            json!({"chatRoomId": "room@chatroom", "memberIds": ["wxid_x", "wxid_y"]}),
        ),
    )
    .await;
    assert_eq!(body["code"], 0);
    assert_eq!(remote.calls(), vec!["invite:room@chatroom:wxid_x,wxid_y".to_string()]);

    let (_, body) = send(&app, post_json(paths::CHAT_ROOM_DETAIL, json!({"chatRoomId": " "}))).await;
    assert_eq!(body["code"], 1);
}
