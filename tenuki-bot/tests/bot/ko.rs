//! End-to-end ko: a one-stone capture that leaves one liberty locks the
//! point for the immediate recapture; playing elsewhere unlocks it.

use crate::common::{is_image, text_of, TestContext, CHAT};
use tenuki_bot::services::play;

async fn play_move(ctx: &TestContext, coord: &str) {
    play::handle_move(&ctx.state, CHAT, Some("token"), coord)
        .await
        .unwrap();
}

#[tokio::test]
async fn ko_rejects_immediate_recapture_then_allows_it() {
    let ctx = TestContext::new();

    // Opening moves, then a corner exchange building the ko shape.
    for coord in [
        "D4", "C4", "D5", "C5", "E4", "D3", "C3", // opening from both sides
        "B18", "A18", "C19", "B19", "C17", "B17", "D18",
    ] {
        play_move(&ctx, coord).await;
    }
    // Every move so far was legal: each reply is a single board image.
    for send in ctx.sends() {
        assert_eq!(send.messages.len(), 1, "unexpected reply: {send:?}");
        assert!(is_image(&send.messages[0]));
    }

    // Black captures the single white stone at B18 and is left with one
    // liberty: the ko.
    play_move(&ctx, "C18").await;
    assert!(is_image(&ctx.last_send().messages[0]));

    // White's immediate recapture on the ko point is rejected.
    play_move(&ctx, "B18").await;
    let hint = ctx.last_send();
    let text = text_of(&hint.messages[0]).expect("expected a hint text");
    assert!(text.contains("Ko"), "unexpected hint: {text}");

    // White plays elsewhere; black answers; now the recapture succeeds.
    play_move(&ctx, "Q16").await;
    play_move(&ctx, "Q4").await;
    play_move(&ctx, "B18").await;
    let done = ctx.last_send();
    assert!(
        is_image(&done.messages[0]),
        "recapture should have produced a board image: {done:?}"
    );
}
