//! SGF codec restricted to what the bot records: a linear main sequence of
//! moves plus root metadata and setup stones. Variations in the input are
//! skipped (the main line wins); unknown root properties are carried
//! through opaquely.

mod error;
mod parser;
mod serialize;
pub mod types;

pub use error::SgfError;
pub use parser::parse;
pub use serialize::serialize;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple_game() {
        let input = "(;FF[4]GM[1]SZ[19]PB[Alice]PW[Bob]KM[6.5];B[pd];W[dd];B[pp];W[dp])";
        let seq = parse(input).unwrap();
        let output = serialize(&seq);
        let reparsed = parse(&output).unwrap();
        assert_eq!(seq, reparsed);
    }

    #[test]
    fn round_trip_with_setup() {
        let input = "(;FF[4]GM[1]SZ[19]AB[dd][df][fd]AW[ee][eg])";
        let seq = parse(input).unwrap();
        let output = serialize(&seq);
        let reparsed = parse(&output).unwrap();
        assert_eq!(seq, reparsed);
    }

    #[test]
    fn round_trip_pass_moves() {
        let input = "(;SZ[19];B[dd];W[];B[])";
        let seq = parse(input).unwrap();
        let output = serialize(&seq);
        let reparsed = parse(&output).unwrap();
        assert_eq!(seq, reparsed);
    }

    #[test]
    fn round_trip_unknown_root_properties() {
        let input = "(;FF[4]XX[foo][bar];B[pd])";
        let seq = parse(input).unwrap();
        let output = serialize(&seq);
        let reparsed = parse(&output).unwrap();
        assert_eq!(seq, reparsed);
    }

    #[test]
    fn variations_are_dropped_main_line_kept() {
        let input = "(;FF[4]GM[1]SZ[19];B[pd](;W[dd];B[pp])(;W[dp]))";
        let seq = parse(input).unwrap();
        // Main sequence: root + B[pd]; both variation subtrees skipped.
        assert_eq!(seq.len(), 2);
    }
}
