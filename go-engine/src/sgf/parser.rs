use crate::Stone;

use super::error::SgfError;
use super::types::*;

/// Parse an SGF document into its main sequence. Only the first game tree
/// is read; variation subtrees are skipped wholesale.
pub fn parse(input: &str) -> Result<Sequence, SgfError> {
    let mut p = Parser::new(input);
    p.skip_whitespace();
    if p.peek().is_none() {
        return Err(SgfError::Empty);
    }
    let nodes = p.main_sequence()?;
    if nodes.is_empty() {
        return Err(SgfError::Empty);
    }
    Ok(nodes)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, ch: u8) -> Result<(), SgfError> {
        self.skip_whitespace();
        match self.advance() {
            Some(b) if b == ch => Ok(()),
            Some(b) => Err(SgfError::UnexpectedChar {
                expected: expected_str(ch),
                found: b as char,
                pos: self.pos - 1,
            }),
            None => Err(SgfError::UnexpectedEof),
        }
    }

    // MainSequence = '(' Node+ Subtree* ')' with subtrees skipped anywhere
    // they appear between nodes.
    fn main_sequence(&mut self) -> Result<Sequence, SgfError> {
        self.expect(b'(')?;
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b';') => nodes.push(self.node()?),
                Some(b'(') => self.skip_subtree()?,
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    self.pos += 1;
                }
                None => break,
            }
        }
        Ok(nodes)
    }

    // Node = ';' Property*
    fn node(&mut self) -> Result<SgfNode, SgfError> {
        self.expect(b';')?;
        let mut properties = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b) if b.is_ascii_uppercase() => {
                    let (ident, values) = self.raw_property()?;
                    properties.push(convert_property(ident, values)?);
                }
                _ => break,
            }
        }
        Ok(SgfNode { properties })
    }

    fn raw_property(&mut self) -> Result<(String, Vec<String>), SgfError> {
        let mut ident = Vec::new();
        while let Some(b) = self.peek() {
            if b.is_ascii_uppercase() {
                ident.push(b);
                self.pos += 1;
            } else {
                break;
            }
        }
        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(b'[') {
                values.push(self.prop_value()?);
            } else {
                break;
            }
        }
        Ok((String::from_utf8_lossy(&ident).into_owned(), values))
    }

    fn prop_value(&mut self) -> Result<String, SgfError> {
        self.expect(b'[')?;
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err(SgfError::UnexpectedEof),
                Some(b'\\') => match self.advance() {
                    None => return Err(SgfError::UnexpectedEof),
                    // Soft line break: escaped newline disappears entirely.
                    Some(b'\n') => {
                        if self.peek() == Some(b'\r') {
                            self.pos += 1;
                        }
                    }
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.pos += 1;
                        }
                    }
                    Some(ch) => value.push(ch as char),
                },
                Some(b']') => break,
                Some(ch) => value.push(ch as char),
            }
        }
        Ok(value)
    }

    /// Skip a variation subtree, respecting bracketed values so a ')'
    /// inside a comment does not end it early.
    fn skip_subtree(&mut self) -> Result<(), SgfError> {
        self.expect(b'(')?;
        let mut depth = 1u32;
        let mut in_value = false;
        let mut escaped = false;
        while let Some(b) = self.advance() {
            if in_value {
                if escaped {
                    escaped = false;
                } else {
                    match b {
                        b'\\' => escaped = true,
                        b']' => in_value = false,
                        _ => {}
                    }
                }
                continue;
            }
            match b {
                b'[' => in_value = true,
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(SgfError::UnexpectedEof)
    }
}

fn expected_str(ch: u8) -> &'static str {
    match ch {
        b'(' => "'('",
        b')' => "')'",
        b';' => "';'",
        b'[' => "'['",
        _ => "character",
    }
}

fn convert_property(ident: String, values: Vec<String>) -> Result<Property, SgfError> {
    let prop = match ident.as_str() {
        "B" => Property::Black(parse_move_point(&values)?),
        "W" => Property::White(parse_move_point(&values)?),

        "AB" => Property::AddBlack(parse_point_list(&values)?),
        "AW" => Property::AddWhite(parse_point_list(&values)?),
        "AE" => Property::AddEmpty(parse_point_list(&values)?),
        "PL" => Property::PlayerToPlay(parse_color(&values, &ident)?),

        "FF" => Property::FileFormat(parse_u8(&values, &ident)?),
        "GM" => Property::GameType(parse_u8(&values, &ident)?),
        "SZ" => Property::BoardSize(parse_u8(&values, &ident)?),
        "KM" => Property::Komi(parse_f64(&values, &ident)?),
        "RU" => Property::Rules(one_value(&values)),
        "HA" => Property::Handicap(parse_u8(&values, &ident)?),
        "PB" => Property::BlackName(one_value(&values)),
        "PW" => Property::WhiteName(one_value(&values)),
        "DT" => Property::Date(one_value(&values)),
        "RE" => Property::Result(one_value(&values)),

        _ => Property::Unknown(ident, values),
    };
    Ok(prop)
}

fn one_value(values: &[String]) -> String {
    values.first().cloned().unwrap_or_default()
}

fn parse_u8(values: &[String], ident: &str) -> Result<u8, SgfError> {
    let s = values.first().map(|s| s.as_str()).unwrap_or("");
    s.trim()
        .parse::<u8>()
        .map_err(|_| SgfError::InvalidPropertyValue {
            property: ident.to_string(),
            value: s.to_string(),
        })
}

fn parse_f64(values: &[String], ident: &str) -> Result<f64, SgfError> {
    let s = values.first().map(|s| s.as_str()).unwrap_or("");
    s.trim()
        .parse::<f64>()
        .map_err(|_| SgfError::InvalidPropertyValue {
            property: ident.to_string(),
            value: s.to_string(),
        })
}

fn parse_color(values: &[String], ident: &str) -> Result<Stone, SgfError> {
    let s = values.first().map(|s| s.as_str()).unwrap_or("");
    match s.trim() {
        "B" => Ok(Stone::Black),
        "W" => Ok(Stone::White),
        _ => Err(SgfError::InvalidPropertyValue {
            property: ident.to_string(),
            value: s.to_string(),
        }),
    }
}

/// SGF letter to 0-based index: a..z then A..Z.
fn letter_to_coord(ch: char) -> Result<u8, SgfError> {
    match ch {
        'a'..='z' => Ok(ch as u8 - b'a'),
        'A'..='Z' => Ok(ch as u8 - b'A' + 26),
        _ => Err(SgfError::InvalidCoordinate(ch.to_string())),
    }
}

fn parse_point(s: &str) -> Result<SgfPoint, SgfError> {
    let mut chars = s.chars();
    let col = chars
        .next()
        .ok_or_else(|| SgfError::InvalidCoordinate(s.to_string()))?;
    let row = chars
        .next()
        .ok_or_else(|| SgfError::InvalidCoordinate(s.to_string()))?;
    if chars.next().is_some() {
        return Err(SgfError::InvalidCoordinate(s.to_string()));
    }
    Ok((letter_to_coord(col)?, letter_to_coord(row)?))
}

/// Empty value is a pass; "tt" is the historical pass encoding on 19x19.
fn parse_move_point(values: &[String]) -> Result<Option<SgfPoint>, SgfError> {
    let s = values.first().map(|s| s.as_str()).unwrap_or("");
    if s.is_empty() || s == "tt" {
        return Ok(None);
    }
    parse_point(s).map(Some)
}

/// Point list with compressed-rectangle support ([aa:cc]).
fn parse_point_list(values: &[String]) -> Result<Vec<SgfPoint>, SgfError> {
    let mut points = Vec::new();
    for val in values {
        if val.is_empty() {
            continue;
        }
        if let Some((from, to)) = val.split_once(':') {
            let (c1, r1) = parse_point(from)?;
            let (c2, r2) = parse_point(to)?;
            for r in r1.min(r2)..=r1.max(r2) {
                for c in c1.min(c2)..=c1.max(c2) {
                    points.push((c, r));
                }
            }
        } else {
            points.push(parse_point(val)?);
        }
    }
    Ok(points)
}
