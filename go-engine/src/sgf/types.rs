use crate::Stone;

/// SGF-form coordinate: (col, row) with row 0 at the top, both 0-based.
pub type SgfPoint = (u8, u8);

/// One node of the main sequence, containing one or more properties.
#[derive(Debug, Clone, PartialEq)]
pub struct SgfNode {
    pub properties: Vec<Property>,
}

/// The parsed main sequence: root node first, then move/setup nodes.
pub type Sequence = Vec<SgfNode>;

/// The property subset the bot understands. Anything else survives as
/// `Unknown` so foreign root metadata round-trips.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    // Moves. None = pass.
    Black(Option<SgfPoint>),
    White(Option<SgfPoint>),

    // Setup.
    AddBlack(Vec<SgfPoint>),
    AddWhite(Vec<SgfPoint>),
    AddEmpty(Vec<SgfPoint>),
    PlayerToPlay(Stone),

    // Root.
    FileFormat(u8),
    GameType(u8),
    BoardSize(u8),
    Komi(f64),
    Rules(String),
    Handicap(u8),
    BlackName(String),
    WhiteName(String),
    Date(String),
    Result(String),

    Unknown(String, Vec<String>),
}
