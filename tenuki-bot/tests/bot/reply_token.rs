//! The reply token must survive the async genmove hop: no reply is sent
//! when the user's move is accepted in engine-opponent mode, and the
//! engine's completion sends exactly one bundled message on that token.

use crate::common::{is_image, text_of, TestContext, CHAT};
use tenuki_bot::services::katago::GenmoveCallback;
use tenuki_bot::services::play;
use tenuki_bot::services::session::SessionPatch;

#[tokio::test]
async fn reply_token_survives_the_engine_hop() {
    let ctx = TestContext::new();
    ctx.state
        .sessions
        .update(
            CHAT,
            SessionPatch {
                engine_opponent_mode: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    play::handle_move(&ctx.state, CHAT, Some("reply-token-1"), "D4")
        .await
        .unwrap();

    // Nothing was sent synchronously; the token travels with the dispatch.
    assert!(ctx.sends().is_empty(), "no reply may be sent before the engine answers");
    let genmoves = ctx.engine.recorded_genmoves();
    assert_eq!(genmoves.len(), 1);
    let req = &genmoves[0];
    assert_eq!(req.reply_token.as_deref(), Some("reply-token-1"));
    assert_eq!(req.current_turn, 2);
    let user_image_url = req
        .user_board_image_url
        .clone()
        .expect("the user's board image travels with the dispatch");

    // Engine completion arrives twenty seconds later.
    play::complete_engine_move(
        &ctx.state,
        GenmoveCallback {
            status: "success".to_string(),
            target_id: CHAT.to_string(),
            r#move: Some("Q16".to_string()),
            current_turn: req.current_turn,
            reply_token: req.reply_token.clone(),
            user_board_image_url: Some(user_image_url.clone()),
            error: None,
        },
    )
    .await
    .unwrap();

    // Exactly one rich reply, on the original token.
    let sends = ctx.sends();
    assert_eq!(sends.len(), 1);
    let send = &sends[0];
    assert_eq!(send.reply_token.as_deref(), Some("reply-token-1"));
    assert_eq!(send.messages.len(), 4);
    assert!(is_image(&send.messages[0]));
    assert_eq!(text_of(&send.messages[1]), Some("engine played Q16"));
    assert!(is_image(&send.messages[2]));
    assert_eq!(text_of(&send.messages[3]), Some("your turn (white)"));

    // The engine's move is in the durable record.
    let session = ctx.state.sessions.load(CHAT).await.unwrap();
    assert_eq!(session.current_turn, 1);
    assert!(session.engine_opponent_mode);
}

#[tokio::test]
async fn genmove_failure_still_consumes_the_token() {
    let ctx = TestContext::new();
    ctx.state
        .sessions
        .update(
            CHAT,
            SessionPatch {
                engine_opponent_mode: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    play::handle_move(&ctx.state, CHAT, Some("reply-token-2"), "D4")
        .await
        .unwrap();
    let req = ctx.engine.recorded_genmoves()[0].clone();

    play::complete_engine_move(
        &ctx.state,
        GenmoveCallback {
            status: "failed".to_string(),
            target_id: CHAT.to_string(),
            r#move: None,
            current_turn: req.current_turn,
            reply_token: req.reply_token.clone(),
            user_board_image_url: req.user_board_image_url.clone(),
            error: Some("engine returned resign".to_string()),
        },
    )
    .await
    .unwrap();

    let sends = ctx.sends();
    assert_eq!(sends.len(), 1);
    let send = &sends[0];
    assert_eq!(send.reply_token.as_deref(), Some("reply-token-2"));
    // The user's board still arrives, followed by the error.
    assert!(is_image(&send.messages[0]));
    assert!(text_of(&send.messages[1]).unwrap().contains("resign"));
}
