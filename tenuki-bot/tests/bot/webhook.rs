//! Webhook routing: always 200 "OK", command fan-out, and the group
//! mention gate.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use crate::common::{text_of, TestContext};
use tenuki_bot::build_router;
use tenuki_bot::services::storage::BlobStore;

async fn post_webhook(ctx: &TestContext, body: serde_json::Value) -> (StatusCode, String) {
    let app = build_router(ctx.state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

fn text_event(source: serde_json::Value, text: &str) -> serde_json::Value {
    json!({
        "events": [{
            "type": "message",
            "replyToken": "rt",
            "source": source,
            "message": { "type": "text", "id": "m1", "text": text },
        }]
    })
}

#[tokio::test]
async fn help_command_replies_ok() {
    let ctx = TestContext::new();
    let (status, body) = post_webhook(
        &ctx,
        text_event(json!({ "type": "user", "userId": "U1" }), "help"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let sends = ctx.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].target, "U1");
    assert!(text_of(&sends[0].messages[0]).unwrap().contains("Commands"));
}

#[tokio::test]
async fn group_message_without_mention_is_ignored() {
    let ctx = TestContext::new();
    let (status, _) = post_webhook(
        &ctx,
        text_event(json!({ "type": "group", "groupId": "G1" }), "help"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ctx.sends().is_empty());
}

#[tokio::test]
async fn group_text_mention_is_stripped_and_dispatched() {
    let ctx = TestContext::new();
    post_webhook(
        &ctx,
        text_event(json!({ "type": "group", "groupId": "G1" }), "@GoBot help"),
    )
    .await;
    let sends = ctx.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].target, "G1");
}

#[tokio::test]
async fn group_mention_payload_is_honoured() {
    let ctx = TestContext::new();
    let body = json!({
        "events": [{
            "type": "message",
            "replyToken": "rt",
            "source": { "type": "room", "roomId": "R1" },
            "message": {
                "type": "text",
                "id": "m1",
                "text": "@bot help",
                "mention": { "mentionees": [
                    { "index": 0, "length": 4, "userId": "U_bot" }
                ]},
            },
        }]
    });
    post_webhook(&ctx, body).await;
    let sends = ctx.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].target, "R1");
}

#[tokio::test]
async fn malformed_body_still_returns_ok() {
    let ctx = TestContext::new();
    let (status, body) = post_webhook(&ctx, json!({ "events": "not-an-array" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert!(ctx.sends().is_empty());
}

#[tokio::test]
async fn file_upload_is_saved_and_acknowledged() {
    let ctx = TestContext::new();
    ctx.messenger
        .register_file("f1", b"(;FF[4]GM[1]SZ[19];B[pd])".to_vec());
    let body = json!({
        "events": [{
            "type": "message",
            "replyToken": "rt",
            "source": { "type": "user", "userId": "U1" },
            "message": { "type": "file", "id": "f1", "fileName": "mygame.sgf" },
        }]
    });
    post_webhook(&ctx, body).await;

    let sends = ctx.sends();
    assert_eq!(sends.len(), 1);
    assert!(text_of(&sends[0].messages[0]).unwrap().contains("Record saved"));
    let uploads = ctx.store.list("target/U1/reviews/").await.unwrap();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].ends_with(".sgf"));
    assert!(uploads[0].contains("mygame_"));
}
