pub mod coord;
pub mod error;
pub mod goban;
pub mod record;
pub mod sgf;
pub mod stone;

/// Board-form coordinate: (row, col) with row 0 at the top.
///
/// The record codec stores coordinates in record form (row 0 at the
/// bottom); `coord` holds the conversions between the two and the
/// display/GTP text form.
pub type Point = (u8, u8);

/// Board edge length. The bot plays even 19x19 games only.
pub const SIZE: u8 = 19;

pub use error::GoError;
pub use goban::{Board, PlayOutcome};
pub use record::{MoveNode, Node, Record, Replayed, ReplayWarning, RootInfo};
pub use stone::Stone;
