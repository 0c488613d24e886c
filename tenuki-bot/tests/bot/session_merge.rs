//! Session updates are merge-preserve: switching games or recording a
//! move never clobbers the engine-opponent flag.

use crate::common::{record_with_moves, TestContext, CHAT};
use tenuki_bot::services::play;
use tenuki_bot::services::session::SessionPatch;

#[tokio::test]
async fn engine_mode_survives_load() {
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
    ctx.seed_record(CHAT, "game_X", &record_with_moves(6)).await;

    play::handle_load_game(&ctx.state, CHAT, Some("token"), "game_X")
        .await
        .unwrap();

    let session = ctx.state.sessions.load(CHAT).await.unwrap();
    assert_eq!(session.game_id.as_deref(), Some("game_X"));
    assert!(session.engine_opponent_mode);
    // Six moves played, black to move.
    assert_eq!(session.current_turn, 1);
}

#[tokio::test]
async fn engine_mode_survives_reset_and_moves() {
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

    play::handle_reset(&ctx.state, CHAT, Some("token")).await.unwrap();
    let session = ctx.state.sessions.load(CHAT).await.unwrap();
    assert!(session.engine_opponent_mode);
    assert_eq!(session.current_turn, 1);
    assert!(session.game_id.is_some());
}
