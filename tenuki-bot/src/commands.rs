//! Command grammar and mention handling for the webhook router.

use std::sync::LazyLock;

use regex::Regex;

/// Board coordinate input: letter A-T skipping I, number 1-19.
static COORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-HJ-T](?:[1-9]|1[0-9])$").unwrap());

static LOAD_WITH_MOVES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:讀取|load)\s+(game_\d+)\s+(\d+)$").unwrap());

static LOAD_GAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:讀取|load)\s*(game_\d+)$").unwrap());

static AUTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:auth|認證)\s+(\S+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Auth { token: String },
    Review,
    Evaluation,
    Undo,
    /// Re-render the current record.
    Load,
    /// Switch the session to another record.
    LoadGame { game_id: String },
    /// First `count` moves of `game_id` under a fresh game id.
    LoadGameMoves { game_id: String, count: usize },
    Reset,
    VsStatus,
    VsAi,
    VsFree,
    /// A validated board coordinate, uppercased ("D4", "Q16").
    Move { coord: String },
}

/// Parse one chat message into a command. Unrecognized text is ignored so
/// ordinary group conversation never triggers the bot.
pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    let lower = text.to_lowercase();

    match lower.as_str() {
        "help" | "幫助" | "說明" => return Some(Command::Help),
        "review" | "覆盤" => return Some(Command::Review),
        "evaluation" | "形勢" | "形式" => return Some(Command::Evaluation),
        "undo" | "悔棋" => return Some(Command::Undo),
        "reset" | "重置" => return Some(Command::Reset),
        "vs" | "對弈" => return Some(Command::VsStatus),
        "vs ai" | "vsai" | "對弈 ai" | "對弈ai" => return Some(Command::VsAi),
        "vs free" | "vsfree" | "對弈 free" | "對弈free" => return Some(Command::VsFree),
        "load" | "讀取" => return Some(Command::Load),
        _ => {}
    }

    if let Some(caps) = AUTH_RE.captures(text) {
        return Some(Command::Auth {
            token: caps[1].to_string(),
        });
    }
    if let Some(caps) = LOAD_WITH_MOVES_RE.captures(text) {
        if let Ok(count) = caps[2].parse::<usize>() {
            if count > 0 {
                return Some(Command::LoadGameMoves {
                    game_id: caps[1].to_string(),
                    count,
                });
            }
        }
    }
    if let Some(caps) = LOAD_GAME_RE.captures(text) {
        return Some(Command::LoadGame {
            game_id: caps[1].to_string(),
        });
    }

    let upper = text.to_uppercase();
    if COORD_RE.is_match(&upper) {
        return Some(Command::Move { coord: upper });
    }

    None
}

/// Strip a leading `@DisplayName` textual mention (desktop clients), case
/// insensitively. Returns the remaining command text when it matched.
pub fn strip_text_mention(text: &str, display_name: &str) -> Option<String> {
    let pattern = format!(r"(?i)^@{}\s+(.+)$", regex::escape(display_name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(text.trim())
        .map(|caps| caps[1].trim().to_string())
}

/// Remove mention spans (char index + length) from the text, back to
/// front so earlier indices stay valid.
pub fn strip_mention_spans(text: &str, mut spans: Vec<(usize, usize)>) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    spans.sort_by(|a, b| b.0.cmp(&a.0));
    for (index, length) in spans {
        let end = (index + length).min(chars.len());
        if index < chars.len() {
            chars.drain(index..end);
        }
    }
    chars.into_iter().collect::<String>().trim().to_string()
}

pub const HELP_MESSAGE: &str = "\
Welcome to the Go bot!

Commands (help / 幫助 / 說明 shows this list):

Play:
- A coordinate such as D4 or Q16 places a stone and shows the board
- undo / 悔棋 takes back the last move
- load / 讀取 redraws the current game
- load game_<id> switches to that game
- load game_<id> N starts a new game from its first N moves
- reset / 重置 starts a fresh game (the old record is kept)
- evaluation / 形勢 shows the current territory estimate

Engine opponent:
- vs / 對弈 shows the current mode
- vs ai turns the engine opponent on: it answers each of your moves
- vs free turns it off for person-vs-person play

Review:
- Upload an SGF record, then send review / 覆盤
- Deep analysis takes several minutes; you will get an overview diagram,
  a win-rate chart, and animated commentary for the key moves

Auth:
- auth <token> / 認證 <token> unlocks review and vs ai when this bot is
  configured with an access token";
