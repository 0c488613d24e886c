//! The game record: the authoritative, append-only state of one game.
//!
//! A record is a flat vector of tagged nodes (root metadata, setup stones,
//! moves). Any in-memory board is derived from it by `replay`; handlers
//! append to the record and persist it before anything else.
//!
//! Move coordinates are stored in record form (row 0 at the bottom) and
//! converted to board form (row 0 at the top) at this module's boundary.

use std::sync::LazyLock;

use crate::coord;
use crate::error::GoError;
use crate::goban::Board;
use crate::sgf::{self, Property, SgfNode, SgfPoint};
use crate::stone::Stone;
use crate::{Point, SIZE};

#[derive(Debug, Clone, PartialEq)]
pub struct RootInfo {
    pub size: u8,
    pub komi: f64,
    pub rules: Option<String>,
    pub handicap: Option<u8>,
    /// PL override: when present it wins over turn alternation.
    pub player_to_play: Option<Stone>,
    pub black_name: Option<String>,
    pub white_name: Option<String>,
    pub date: Option<String>,
    pub result: Option<String>,
    /// Root properties the codec does not model, carried through verbatim.
    pub extra: Vec<(String, Vec<String>)>,
}

impl Default for RootInfo {
    fn default() -> Self {
        RootInfo {
            size: SIZE,
            komi: 7.5,
            rules: Some("chinese".to_string()),
            handicap: None,
            player_to_play: None,
            black_name: None,
            white_name: None,
            date: None,
            result: None,
            extra: Vec::new(),
        }
    }
}

static DEFAULT_ROOT: LazyLock<RootInfo> = LazyLock::new(RootInfo::default);

/// Setup stones placed outside the move sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetupStones {
    pub black: Vec<Point>,
    pub white: Vec<Point>,
    pub empty: Vec<Point>,
}

/// One committed move. `pos` is record form; `None` is a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveNode {
    pub stone: Stone,
    pub pos: Option<Point>,
}

impl MoveNode {
    /// The move's position in board form.
    pub fn board_pos(&self) -> Option<Point> {
        self.pos.map(coord::record_to_board)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Root(RootInfo),
    Setup(SetupStones),
    Move(MoveNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub nodes: Vec<Node>,
}

/// Things `replay` tolerated rather than rejected. Indices are 1-based ply
/// numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayWarning {
    ColorMismatch { index: u32, stated: Stone },
    SuicideAccepted { index: u32 },
    KoIgnored { index: u32 },
    MoveSkipped { index: u32, error: GoError },
}

/// Result of replaying a record onto an empty board.
#[derive(Debug, Clone)]
pub struct Replayed {
    pub board: Board,
    pub current_turn: Stone,
    /// Board-form position of the last non-pass move.
    pub last_move: Option<Point>,
    /// Board-form position and ply number of every played move, in order.
    pub move_numbers: Vec<(Point, u32)>,
    pub warnings: Vec<ReplayWarning>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// A fresh record for a new game: root metadata only.
    pub fn new() -> Self {
        Record {
            nodes: vec![Node::Root(RootInfo::default())],
        }
    }

    pub fn root(&self) -> &RootInfo {
        self.nodes
            .iter()
            .find_map(|n| match n {
                Node::Root(r) => Some(r),
                _ => None,
            })
            .unwrap_or(&DEFAULT_ROOT)
    }

    pub fn moves(&self) -> impl Iterator<Item = &MoveNode> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Move(m) => Some(m),
            _ => None,
        })
    }

    pub fn move_count(&self) -> usize {
        self.moves().count()
    }

    /// Append a played move. `point` is board form.
    pub fn append_move(&mut self, stone: Stone, point: Point) {
        self.nodes.push(Node::Move(MoveNode {
            stone,
            pos: Some(coord::board_to_record(point)),
        }));
    }

    pub fn append_pass(&mut self, stone: Stone) {
        self.nodes.push(Node::Move(MoveNode { stone, pos: None }));
    }

    /// Remove the last move node, if any. Root and setup nodes stay.
    pub fn pop_last_move(&mut self) -> Option<MoveNode> {
        match self.nodes.last() {
            Some(Node::Move(_)) => match self.nodes.pop() {
                Some(Node::Move(m)) => Some(m),
                _ => None,
            },
            _ => None,
        }
    }

    /// A new record with the same root metadata and setup stones but only
    /// the first `n` moves. Used by load-with-truncation, which files the
    /// result under a fresh game id so history is preserved.
    pub fn truncate(&self, n: usize) -> Record {
        let mut kept = 0usize;
        let nodes = self
            .nodes
            .iter()
            .filter(|node| match node {
                Node::Move(_) => {
                    kept += 1;
                    kept <= n
                }
                _ => true,
            })
            .cloned()
            .collect();
        Record { nodes }
    }

    // -- Replay --

    /// Rebuild the board by applying every node in record order. The
    /// record is the source of truth: a stated color that disagrees with
    /// the expected turn wins, and suicide or ko violations in historical
    /// moves are applied rather than rejected. All tolerated oddities are
    /// reported as warnings.
    pub fn replay(&self) -> Replayed {
        let mut board = Board::new();
        let mut expected = Stone::Black;
        let mut last_move = None;
        let mut move_numbers = Vec::new();
        let mut warnings = Vec::new();
        let mut index = 0u32;

        for node in &self.nodes {
            match node {
                Node::Root(root) => {
                    if let Some(pl) = root.player_to_play {
                        expected = pl;
                    }
                }
                Node::Setup(setup) => {
                    for &p in &setup.black {
                        board.set_stone(coord::record_to_board(p), Stone::Black);
                    }
                    for &p in &setup.white {
                        board.set_stone(coord::record_to_board(p), Stone::White);
                    }
                    for &p in &setup.empty {
                        board.clear_stone(coord::record_to_board(p));
                    }
                }
                Node::Move(m) => {
                    index += 1;
                    if m.stone != expected {
                        warnings.push(ReplayWarning::ColorMismatch {
                            index,
                            stated: m.stone,
                        });
                    }
                    match m.board_pos() {
                        None => {
                            board.pass();
                            last_move = None;
                        }
                        Some(point) => match board.place_tolerant(point, m.stone) {
                            Ok(outcome) => {
                                if outcome.suicide_accepted {
                                    warnings.push(ReplayWarning::SuicideAccepted { index });
                                }
                                if outcome.ko_ignored {
                                    warnings.push(ReplayWarning::KoIgnored { index });
                                }
                                move_numbers.push((point, index));
                                last_move = Some(point);
                            }
                            Err(error) => {
                                warnings.push(ReplayWarning::MoveSkipped { index, error });
                            }
                        },
                    }
                    expected = m.stone.opp();
                }
            }
        }

        let current_turn = self.root().player_to_play.unwrap_or(expected);
        Replayed {
            board,
            current_turn,
            last_move,
            move_numbers,
            warnings,
        }
    }

    // -- Codec --

    pub fn encode(&self) -> String {
        let mut sequence: Vec<SgfNode> = Vec::new();
        for node in &self.nodes {
            match node {
                Node::Root(root) => sequence.push(root_to_sgf(root)),
                Node::Setup(setup) => sequence.push(setup_to_sgf(setup)),
                Node::Move(m) => sequence.push(SgfNode {
                    properties: vec![match m.stone {
                        Stone::Black => Property::Black(m.pos.map(record_to_sgf_point)),
                        Stone::White => Property::White(m.pos.map(record_to_sgf_point)),
                    }],
                }),
            }
        }
        sgf::serialize(&sequence)
    }

    pub fn decode(text: &str) -> Result<Record, sgf::SgfError> {
        let sequence = sgf::parse(text)?;
        let mut nodes: Vec<Node> = Vec::new();
        let mut root = RootInfo {
            rules: None,
            komi: 0.0,
            ..RootInfo::default()
        };

        for (i, sgf_node) in sequence.iter().enumerate() {
            let mut setup = SetupStones::default();
            let mut mv: Option<MoveNode> = None;

            for prop in &sgf_node.properties {
                match prop {
                    Property::Black(p) => {
                        mv = Some(MoveNode {
                            stone: Stone::Black,
                            pos: (*p).map(sgf_to_record_point),
                        });
                    }
                    Property::White(p) => {
                        mv = Some(MoveNode {
                            stone: Stone::White,
                            pos: (*p).map(sgf_to_record_point),
                        });
                    }
                    Property::AddBlack(pts) => {
                        setup.black.extend(pts.iter().copied().map(sgf_to_record_point));
                    }
                    Property::AddWhite(pts) => {
                        setup.white.extend(pts.iter().copied().map(sgf_to_record_point));
                    }
                    Property::AddEmpty(pts) => {
                        setup.empty.extend(pts.iter().copied().map(sgf_to_record_point));
                    }
                    Property::PlayerToPlay(c) => root.player_to_play = Some(*c),
                    Property::BoardSize(n) => root.size = *n,
                    Property::Komi(k) => root.komi = *k,
                    Property::Rules(s) => root.rules = Some(s.clone()),
                    Property::Handicap(h) => root.handicap = Some(*h),
                    Property::BlackName(s) => root.black_name = Some(s.clone()),
                    Property::WhiteName(s) => root.white_name = Some(s.clone()),
                    Property::Date(s) => root.date = Some(s.clone()),
                    Property::Result(s) => root.result = Some(s.clone()),
                    Property::FileFormat(_) | Property::GameType(_) => {}
                    Property::Unknown(ident, values) if i == 0 => {
                        root.extra.push((ident.clone(), values.clone()));
                    }
                    // Annotations on move nodes are not modeled.
                    Property::Unknown(..) => {}
                }
            }

            if setup != SetupStones::default() {
                nodes.push(Node::Setup(setup));
            }
            if let Some(m) = mv {
                nodes.push(Node::Move(m));
            }
        }

        nodes.insert(0, Node::Root(root));
        Ok(Record { nodes })
    }
}

fn root_to_sgf(root: &RootInfo) -> SgfNode {
    let mut properties = vec![
        Property::FileFormat(4),
        Property::GameType(1),
        Property::BoardSize(root.size),
        Property::Komi(root.komi),
    ];
    if let Some(ref s) = root.rules {
        properties.push(Property::Rules(s.clone()));
    }
    if let Some(h) = root.handicap {
        properties.push(Property::Handicap(h));
    }
    if let Some(pl) = root.player_to_play {
        properties.push(Property::PlayerToPlay(pl));
    }
    if let Some(ref s) = root.black_name {
        properties.push(Property::BlackName(s.clone()));
    }
    if let Some(ref s) = root.white_name {
        properties.push(Property::WhiteName(s.clone()));
    }
    if let Some(ref s) = root.date {
        properties.push(Property::Date(s.clone()));
    }
    if let Some(ref s) = root.result {
        properties.push(Property::Result(s.clone()));
    }
    for (ident, values) in &root.extra {
        properties.push(Property::Unknown(ident.clone(), values.clone()));
    }
    SgfNode { properties }
}

fn setup_to_sgf(setup: &SetupStones) -> SgfNode {
    let mut properties = Vec::new();
    if !setup.black.is_empty() {
        properties.push(Property::AddBlack(
            setup.black.iter().copied().map(record_to_sgf_point).collect(),
        ));
    }
    if !setup.white.is_empty() {
        properties.push(Property::AddWhite(
            setup.white.iter().copied().map(record_to_sgf_point).collect(),
        ));
    }
    if !setup.empty.is_empty() {
        properties.push(Property::AddEmpty(
            setup.empty.iter().copied().map(record_to_sgf_point).collect(),
        ));
    }
    SgfNode { properties }
}

/// SGF point (col, row-from-top) -> record form (row-from-bottom, col).
fn sgf_to_record_point((col, row): SgfPoint) -> Point {
    (SIZE - 1 - row.min(SIZE - 1), col)
}

/// Record form (row-from-bottom, col) -> SGF point (col, row-from-top).
fn record_to_sgf_point((row, col): Point) -> SgfPoint {
    (col, SIZE - 1 - row)
}
