//! One-shot GTP conversation with the engine for single-move generation.
//!
//! The whole command script is written at once (`boardsize`, `clear_board`,
//! one `play` per record move, `genmove`, `quit`) and the process output is
//! parsed afterwards. GTP responses start with `=` (success) or `?`
//! (error); some engine builds echo commands to stdout and some do not, so
//! the parser anchors on the echoed `genmove` when present and otherwise
//! falls back to the last non-empty `=` line before quit.

use std::process::Stdio;
use std::time::Duration;

use go_engine::{coord, Record, Stone};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{BotError, Result};

const GENMOVE_DEADLINE: Duration = Duration::from_secs(60);

/// The GTP script that replays `record` and asks for `side`'s move.
pub fn genmove_script(record: &Record, side: Stone) -> String {
    let mut script = String::from("boardsize 19\nclear_board\n");
    for m in record.moves() {
        let pos = match m.board_pos() {
            Some(pt) => coord::display(pt),
            None => "pass".to_string(),
        };
        script.push_str(&format!("play {} {}\n", m.stone.letter(), pos));
    }
    script.push_str(&format!("genmove {}\n", side.letter()));
    script.push_str("quit\n");
    script
}

/// Extract the genmove answer from raw GTP stdout.
pub fn parse_genmove_output(stdout: &str) -> Result<String> {
    let lines: Vec<&str> = stdout.lines().collect();

    let mut responses: Vec<(char, String, usize)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix('=') {
            responses.push(('=', rest.trim().to_string(), i));
        } else if let Some(rest) = trimmed.strip_prefix('?') {
            responses.push(('?', rest.trim().to_string(), i));
        }
    }

    // Command-anchored detection: the first response after the echoed
    // genmove command line.
    let last_genmove_line = lines.iter().enumerate().rev().find_map(|(i, line)| {
        let trimmed = line.trim();
        if trimmed.to_ascii_lowercase().contains("genmove")
            && !trimmed.starts_with('=')
            && !trimmed.starts_with('?')
        {
            Some(i)
        } else {
            None
        }
    });

    if let Some(anchor) = last_genmove_line {
        for (kind, text, line) in &responses {
            if *line > anchor {
                return match kind {
                    '=' => Ok(text.clone()),
                    _ => Err(BotError::Engine(text.clone())),
                };
            }
        }
    }

    // Fallback: genmove is the last command before quit, and quit answers
    // with an empty `=`, so the last non-empty `=` is the move.
    for (kind, text, _) in responses.iter().rev() {
        match kind {
            '=' if !text.is_empty() => return Ok(text.clone()),
            '?' => return Err(BotError::Engine(text.clone())),
            _ => {}
        }
    }

    Err(BotError::Engine(
        "no move found in engine output".to_string(),
    ))
}

/// Run the engine and return its move in display form ("Q16"). `pass` and
/// `resign` are surfaced as errors so callers can message the user.
pub async fn genmove(
    bin: &str,
    model: Option<&str>,
    config: Option<&str>,
    visits: u32,
    record: &Record,
    side: Stone,
) -> Result<String> {
    let mut cmd = Command::new(bin);
    cmd.arg("gtp");
    if let Some(model) = model {
        cmd.args(["-model", model]);
    }
    if let Some(config) = config {
        cmd.args(["-config", config]);
    }
    cmd.args(["-override-config", &format!("maxVisits={visits}")]);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| BotError::Engine(format!("failed to spawn engine: {e}")))?;

    let script = genmove_script(record, side);
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| BotError::Engine("failed to open engine stdin".to_string()))?;
    stdin
        .write_all(script.as_bytes())
        .await
        .map_err(|e| BotError::Engine(e.to_string()))?;
    drop(stdin);

    let output = tokio::time::timeout(GENMOVE_DEADLINE, child.wait_with_output())
        .await
        .map_err(|_| BotError::Engine("engine timed out".to_string()))?
        .map_err(|e| BotError::Engine(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BotError::Engine(format!(
            "engine exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mv = parse_genmove_output(&stdout)?;
    if mv.eq_ignore_ascii_case("pass") || mv.eq_ignore_ascii_case("resign") {
        return Err(BotError::Engine(format!("engine returned {mv}")));
    }
    Ok(mv.to_ascii_uppercase())
}
