//! With a global access token configured, `review` and `vs ai` require a
//! matching stored token; `auth <token>` unlocks them.

use crate::common::{record_with_moves, text_of, TestContext, CHAT};
use tenuki_bot::keys;
use tenuki_bot::services::storage::BlobStore;
use tenuki_bot::services::{play, review};

async fn seed_upload(ctx: &TestContext) {
    ctx.store
        .put(
            &keys::review_upload(CHAT, "mygame", 1_700_000_000),
            record_with_moves(30).encode().into_bytes(),
            "application/x-go-sgf",
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn review_requires_auth_then_proceeds() {
    let ctx = TestContext::with_auth_token("s3cret");
    seed_upload(&ctx).await;

    // Unauthenticated: prompted, nothing dispatched.
    review::handle_review_command(&ctx.state, CHAT, Some("t1"))
        .await
        .unwrap();
    assert!(text_of(&ctx.last_send().messages[0])
        .unwrap()
        .contains("authenticate"));
    assert!(ctx.engine.recorded_reviews().is_empty());

    // Wrong token does not unlock.
    play::handle_auth(&ctx.state, CHAT, Some("t2"), "wrong")
        .await
        .unwrap();
    review::handle_review_command(&ctx.state, CHAT, Some("t3"))
        .await
        .unwrap();
    assert!(text_of(&ctx.last_send().messages[0])
        .unwrap()
        .contains("authenticate"));
    assert!(ctx.engine.recorded_reviews().is_empty());

    // Correct token unlocks the next review.
    play::handle_auth(&ctx.state, CHAT, Some("t4"), "s3cret")
        .await
        .unwrap();
    review::handle_review_command(&ctx.state, CHAT, Some("t5"))
        .await
        .unwrap();

    let reviews = ctx.engine.recorded_reviews();
    assert_eq!(reviews.len(), 1);
    // Task id comes from the upload's trailing digits.
    assert_eq!(reviews[0].task_id, "1700000000");
    assert!(text_of(&ctx.last_send().messages[0])
        .unwrap()
        .contains("deep review"));
}

#[tokio::test]
async fn vs_ai_is_gated_too() {
    let ctx = TestContext::with_auth_token("s3cret");

    play::handle_vs_ai(&ctx.state, CHAT, Some("t1")).await.unwrap();
    assert!(text_of(&ctx.last_send().messages[0])
        .unwrap()
        .contains("authenticate"));
    assert!(!ctx.state.sessions.load(CHAT).await.unwrap().engine_opponent_mode);

    play::handle_auth(&ctx.state, CHAT, Some("t2"), "s3cret")
        .await
        .unwrap();
    play::handle_vs_ai(&ctx.state, CHAT, Some("t3")).await.unwrap();
    assert!(ctx.state.sessions.load(CHAT).await.unwrap().engine_opponent_mode);
}

#[tokio::test]
async fn open_when_no_token_configured() {
    let ctx = TestContext::new();
    seed_upload(&ctx).await;
    review::handle_review_command(&ctx.state, CHAT, Some("t1"))
        .await
        .unwrap();
    assert_eq!(ctx.engine.recorded_reviews().len(), 1);
}
