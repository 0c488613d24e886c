use crate::Stone;

use super::types::*;

/// Serialize a main sequence back to SGF text.
pub fn serialize(sequence: &Sequence) -> String {
    let mut buf = String::from("(");
    for node in sequence {
        buf.push(';');
        for prop in &node.properties {
            write_property(prop, &mut buf);
        }
    }
    buf.push(')');
    buf
}

fn write_property(prop: &Property, buf: &mut String) {
    match prop {
        Property::Black(p) => write_move("B", p, buf),
        Property::White(p) => write_move("W", p, buf),

        Property::AddBlack(pts) => write_point_list("AB", pts, buf),
        Property::AddWhite(pts) => write_point_list("AW", pts, buf),
        Property::AddEmpty(pts) => write_point_list("AE", pts, buf),
        Property::PlayerToPlay(c) => {
            buf.push_str("PL[");
            buf.push_str(match c {
                Stone::Black => "B",
                Stone::White => "W",
            });
            buf.push(']');
        }

        Property::FileFormat(n) => write_number("FF", *n, buf),
        Property::GameType(n) => write_number("GM", *n, buf),
        Property::BoardSize(n) => write_number("SZ", *n, buf),
        Property::Komi(n) => write_real("KM", *n, buf),
        Property::Rules(s) => write_text("RU", s, buf),
        Property::Handicap(n) => write_number("HA", *n, buf),
        Property::BlackName(s) => write_text("PB", s, buf),
        Property::WhiteName(s) => write_text("PW", s, buf),
        Property::Date(s) => write_text("DT", s, buf),
        Property::Result(s) => write_text("RE", s, buf),

        Property::Unknown(ident, values) => {
            buf.push_str(ident);
            for val in values {
                buf.push('[');
                push_escaped(buf, val);
                buf.push(']');
            }
        }
    }
}

fn coord_to_letter(c: u8) -> char {
    if c < 26 {
        (b'a' + c) as char
    } else {
        (b'A' + c - 26) as char
    }
}

fn push_point(buf: &mut String, point: SgfPoint) {
    buf.push(coord_to_letter(point.0));
    buf.push(coord_to_letter(point.1));
}

fn push_escaped(buf: &mut String, s: &str) {
    for ch in s.chars() {
        if ch == ']' || ch == '\\' {
            buf.push('\\');
        }
        buf.push(ch);
    }
}

fn write_number(ident: &str, n: impl std::fmt::Display, buf: &mut String) {
    buf.push_str(ident);
    buf.push('[');
    buf.push_str(&n.to_string());
    buf.push(']');
}

fn write_real(ident: &str, n: f64, buf: &mut String) {
    buf.push_str(ident);
    buf.push('[');
    // Integer komi prints without the trailing ".0".
    if n.fract() == 0.0 {
        buf.push_str(&(n as i64).to_string());
    } else {
        buf.push_str(&n.to_string());
    }
    buf.push(']');
}

fn write_text(ident: &str, s: &str, buf: &mut String) {
    buf.push_str(ident);
    buf.push('[');
    push_escaped(buf, s);
    buf.push(']');
}

fn write_move(ident: &str, point: &Option<SgfPoint>, buf: &mut String) {
    buf.push_str(ident);
    buf.push('[');
    if let Some(p) = point {
        push_point(buf, *p);
    }
    buf.push(']');
}

fn write_point_list(ident: &str, points: &[SgfPoint], buf: &mut String) {
    buf.push_str(ident);
    if points.is_empty() {
        buf.push_str("[]");
        return;
    }
    for p in points {
        buf.push('[');
        push_point(buf, *p);
        buf.push(']');
    }
}
