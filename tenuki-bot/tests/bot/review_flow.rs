//! Review happy path: trigger, callback, commentary, media, ordered
//! delivery with carousels capped at ten bubbles.

use crate::common::{flex_contents, is_image, record_with_moves, text_of, TestContext, CHAT};
use tenuki_bot::keys;
use tenuki_bot::services::katago::stats::MoveStat;
use tenuki_bot::services::katago::ReviewCallback;
use tenuki_bot::services::review;
use tenuki_bot::services::storage::BlobStore;

fn stat(index: u32, score_loss: Option<f64>) -> MoveStat {
    let color = if index % 2 == 1 { "B" } else { "W" };
    // Spread plays over two sparse rows so rebuilt boards stay legal.
    let col = ((index - 1) % 19) as u8;
    let row = ((index - 1) / 19) as u8 * 2;
    let played = go_engine::coord::display((row, col));
    MoveStat {
        move_index: index,
        color: color.to_string(),
        played: Some(played),
        engine_best: Some("Q10".to_string()),
        pv: vec!["Q10".to_string(), "D10".to_string(), "K4".to_string()],
        winrate_before: Some(50.0 + index as f64 * 0.1),
        winrate_after: Some(50.0 - index as f64 * 0.1),
        score_loss,
    }
}

#[tokio::test]
async fn review_happy_path_delivers_in_order() {
    let ctx = TestContext::new();
    ctx.store
        .put(
            &keys::review_upload(CHAT, "uploaded", 1_700_000_123),
            record_with_moves(38).encode().into_bytes(),
            "application/x-go-sgf",
            None,
        )
        .await
        .unwrap();

    // Trigger: acknowledged on the reply token, engine dispatched.
    review::handle_review_command(&ctx.state, CHAT, Some("ack-token"))
        .await
        .unwrap();
    let reviews = ctx.engine.recorded_reviews();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].task_id, "1700000123");
    let ack = &ctx.sends()[0];
    assert_eq!(ack.reply_token.as_deref(), Some("ack-token"));
    assert!(text_of(&ack.messages[0]).unwrap().contains("10 minutes"));

    // 38 analyzed moves; 25 of them lose two or more points, so the key
    // list caps at the 20 worst.
    let stats: Vec<MoveStat> = (1..=38)
        .map(|i| {
            let loss = if i <= 25 { Some(2.0 + i as f64) } else { Some(0.5) };
            stat(i, loss)
        })
        .collect();

    review::process_review_callback(
        &ctx.state,
        ReviewCallback {
            task_id: "1700000123".to_string(),
            status: "success".to_string(),
            target_id: CHAT.to_string(),
            result_paths: None,
            move_stats: Some(stats),
            error: None,
        },
    )
    .await
    .unwrap();

    let sends = ctx.sends();
    // ack, progress, overview+chart bundle, two carousels.
    assert_eq!(sends.len(), 5);

    assert!(text_of(&sends[1].messages[0])
        .unwrap()
        .contains("38 moves analyzed"));

    let media = &sends[2];
    assert_eq!(media.messages.len(), 4);
    assert!(text_of(&media.messages[0]).unwrap().contains("overview"));
    assert!(is_image(&media.messages[1]));
    assert!(text_of(&media.messages[2]).unwrap().contains("Win-rate"));
    assert!(is_image(&media.messages[3]));

    // Two carousels of ten bubbles for the twenty worst moves (6..=25).
    let first = flex_contents(&sends[3].messages[0]).unwrap();
    let second = flex_contents(&sends[4].messages[0]).unwrap();
    assert_eq!(first["contents"].as_array().unwrap().len(), 10);
    assert_eq!(second["contents"].as_array().unwrap().len(), 10);

    let bubble = &first["contents"][0];
    let bubble_text = bubble.to_string();
    // The worst twenty start at move 6.
    assert!(bubble_text.contains("Move 6"));
    assert!(bubble_text.contains("Played:"));
    assert!(bubble_text.contains("Winrate:"));
    assert!(bubble_text.contains("Score loss: 8.0 points"));
    assert!(bubble_text.contains("Commentary for move 6."));
    assert!(bubble_text.contains("move_6.gif"));

    // Artifacts were persisted under the task id.
    for name in ["overview.png", "winrate.png", "move_6.gif", "move_25.gif"] {
        let path = keys::review_artifact(CHAT, "1700000123", name);
        assert!(
            ctx.store.exists(&path).await.unwrap(),
            "missing artifact {path}"
        );
    }
    assert!(ctx
        .store
        .exists(&keys::review_stats(CHAT, "1700000123"))
        .await
        .unwrap());
}

#[tokio::test]
async fn engine_failure_notifies_without_retry() {
    let ctx = TestContext::new();
    review::process_review_callback(
        &ctx.state,
        ReviewCallback {
            task_id: "7".to_string(),
            status: "failed".to_string(),
            target_id: CHAT.to_string(),
            result_paths: None,
            move_stats: None,
            error: Some("out of memory".to_string()),
        },
    )
    .await
    .unwrap();

    let sends = ctx.sends();
    assert_eq!(sends.len(), 1);
    let text = text_of(&sends[0].messages[0]).unwrap();
    assert!(text.contains("review failed"));
    assert!(text.contains("out of memory"));
}

#[tokio::test]
async fn stats_are_derived_from_stored_raw_output() {
    let ctx = TestContext::new();
    let raw = r#"{"turnNumber":0,"rootInfo":{"winrate":0.5,"scoreLead":0.0,"currentPlayer":"B"},"moveInfos":[{"move":"D4","scoreLead":1.0,"pv":["D4"]},{"move":"C3","scoreLead":-3.0,"pv":[]}],"nextMove":"C3","nextMoveColor":"B"}
{"turnNumber":1,"rootInfo":{"winrate":0.4,"scoreLead":-1.0,"currentPlayer":"W"},"moveInfos":[{"move":"Q16","scoreLead":0.5,"pv":["Q16"]}],"nextMove":"Q16","nextMoveColor":"W"}
"#;
    ctx.store
        .put(
            "target/U_test_user/reviews/raw_9.json",
            raw.as_bytes().to_vec(),
            "application/json",
            None,
        )
        .await
        .unwrap();

    review::process_review_callback(
        &ctx.state,
        ReviewCallback {
            task_id: "9".to_string(),
            status: "success".to_string(),
            target_id: CHAT.to_string(),
            result_paths: Some(tenuki_bot::services::katago::ResultPaths {
                json_gcs_path: Some(
                    "gs://test-bucket/target/U_test_user/reviews/raw_9.json".to_string(),
                ),
            }),
            move_stats: None,
            error: None,
        },
    )
    .await
    .unwrap();

    // Derived stats were persisted.
    let stored = ctx
        .store
        .get_text(&keys::review_stats(CHAT, "9"))
        .await
        .unwrap();
    let stats: Vec<MoveStat> = serde_json::from_str(&stored).unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].played.as_deref(), Some("C3"));
    // Move 1 lost 4 points (best 1.0 vs played -3.0) and becomes the one
    // key move in the carousel.
    assert_eq!(stats[0].score_loss, Some(4.0));
    let sends = ctx.sends();
    let carousel = flex_contents(&sends.last().unwrap().messages[0]).unwrap();
    assert_eq!(carousel["contents"].as_array().unwrap().len(), 1);
}
