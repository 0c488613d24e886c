//! Load-with-truncation creates a new game from a prefix of an existing
//! record without touching the source game's history.

use crate::common::{is_image, record_with_moves, text_of, TestContext, CHAT};
use tenuki_bot::keys;
use tenuki_bot::services::play;
use tenuki_bot::services::storage::BlobStore;

#[tokio::test]
async fn load_first_n_moves_creates_new_game() {
    let ctx = TestContext::new();
    let source = record_with_moves(50);
    ctx.seed_record(CHAT, "game_A", &source).await;

    play::handle_load_game_moves(&ctx.state, CHAT, Some("token"), "game_A", 10)
        .await
        .unwrap();

    let session = ctx.state.sessions.load(CHAT).await.unwrap();
    let new_game_id = session.game_id.expect("session should point at a game");
    assert_ne!(new_game_id, "game_A");
    // The 10th move was white, so black plays next.
    assert_eq!(session.current_turn, 1);

    // The new record holds exactly the first ten moves; the source record
    // is untouched.
    let new_text = ctx
        .store
        .get_text(&keys::game_record(CHAT, &new_game_id))
        .await
        .unwrap();
    let truncated = go_engine::Record::decode(&new_text).unwrap();
    assert_eq!(truncated.move_count(), 10);
    assert_eq!(truncated.nodes[1..], source.truncate(10).nodes[1..]);

    let source_text = ctx
        .store
        .get_text(&keys::game_record(CHAT, "game_A"))
        .await
        .unwrap();
    assert_eq!(go_engine::Record::decode(&source_text).unwrap(), source);

    // The reply names the new game and shows the board.
    let send = ctx.last_send();
    let text = text_of(&send.messages[0]).unwrap();
    assert!(text.contains("first 10 moves"));
    assert!(text.contains(&new_game_id));
    assert!(is_image(&send.messages[1]));
}

#[tokio::test]
async fn load_beyond_length_is_rejected() {
    let ctx = TestContext::new();
    ctx.seed_record(CHAT, "game_A", &record_with_moves(5)).await;

    play::handle_load_game_moves(&ctx.state, CHAT, Some("token"), "game_A", 10)
        .await
        .unwrap();

    let text = text_of(&ctx.last_send().messages[0]).unwrap().to_string();
    assert!(text.contains("only has 5 moves"));
    // Session was not switched.
    assert!(ctx.state.sessions.load(CHAT).await.unwrap().game_id.is_none());
}

#[tokio::test]
async fn load_unknown_game_is_reported() {
    let ctx = TestContext::new();
    play::handle_load_game(&ctx.state, CHAT, Some("token"), "game_missing")
        .await
        .unwrap();
    let text = text_of(&ctx.last_send().messages[0]).unwrap().to_string();
    assert!(text.contains("No record found"));
}
