//! Undo, rejected input, and live evaluation.

use crate::common::{is_image, text_of, TestContext, CHAT};
use tenuki_bot::services::katago::Evaluation;
use tenuki_bot::services::play;

#[tokio::test]
async fn undo_at_root_is_a_hint() {
    let ctx = TestContext::new();
    play::handle_undo(&ctx.state, CHAT, Some("t")).await.unwrap();
    let text = text_of(&ctx.last_send().messages[0]).unwrap().to_string();
    assert!(text.contains("nothing to undo"));
}

#[tokio::test]
async fn undo_removes_the_last_move_and_rerenders() {
    let ctx = TestContext::new();
    play::handle_move(&ctx.state, CHAT, Some("t1"), "D4").await.unwrap();
    play::handle_move(&ctx.state, CHAT, Some("t2"), "Q16").await.unwrap();
    play::handle_undo(&ctx.state, CHAT, Some("t3")).await.unwrap();

    let send = ctx.last_send();
    let text = text_of(&send.messages[0]).unwrap();
    // Q16 (white) was undone, so white is to play again.
    assert!(text.contains("white"));
    assert!(is_image(&send.messages[1]));
    assert_eq!(ctx.state.sessions.load(CHAT).await.unwrap().current_turn, 2);

    // Occupied point is rejected without consuming state.
    play::handle_move(&ctx.state, CHAT, Some("t4"), "D4").await.unwrap();
    let hint = text_of(&ctx.last_send().messages[0]).unwrap().to_string();
    assert!(hint.contains("already a stone"));
}

#[tokio::test]
async fn evaluation_needs_a_game_in_progress() {
    let ctx = TestContext::new();
    play::handle_evaluation(&ctx.state, CHAT, Some("t")).await.unwrap();
    let text = text_of(&ctx.last_send().messages[0]).unwrap().to_string();
    assert!(text.contains("no game in progress"));
}

#[tokio::test]
async fn evaluation_reports_the_leader() {
    let ctx = TestContext::new();
    play::handle_move(&ctx.state, CHAT, Some("t1"), "D4").await.unwrap();
    *ctx.engine.evaluation.lock().unwrap() = Evaluation {
        score_lead: Some(3.4),
        ownership: Some(vec![0.0; 361]),
    };

    play::handle_evaluation(&ctx.state, CHAT, Some("t2")).await.unwrap();
    let send = ctx.last_send();
    let verdict = text_of(&send.messages[0]).unwrap();
    // 3.4 rounds to the nearest half point.
    assert_eq!(verdict, "Black is ahead by about 3.5 points.");
    assert!(text_of(&send.messages[1]).unwrap().contains("approximate"));
    assert!(is_image(&send.messages[2]));
}

#[tokio::test]
async fn evaluation_white_lead_and_even_positions() {
    let ctx = TestContext::new();
    play::handle_move(&ctx.state, CHAT, Some("t1"), "D4").await.unwrap();

    *ctx.engine.evaluation.lock().unwrap() = Evaluation {
        score_lead: Some(-7.2),
        ownership: None,
    };
    play::handle_evaluation(&ctx.state, CHAT, None).await.unwrap();
    assert_eq!(
        text_of(&ctx.last_send().messages[0]).unwrap(),
        "White is ahead by about 7.0 points."
    );

    *ctx.engine.evaluation.lock().unwrap() = Evaluation {
        score_lead: Some(0.01),
        ownership: None,
    };
    play::handle_evaluation(&ctx.state, CHAT, None).await.unwrap();
    assert!(text_of(&ctx.last_send().messages[0])
        .unwrap()
        .contains("roughly even"));
}
