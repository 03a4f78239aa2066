//! Span codec: `"<start>,<end>"` offsets, with `"-1,-1"` meaning absent.
//!
//! Offsets are signed. Only the pair `-1,-1` decodes to `Absent`; any
//! other integer pair, negative or not, is a `Range`.

use std::fmt;
use std::str::FromStr;

use super::error::SpanError;

/// Textual form of [`Span::Absent`].
pub const SENTINEL: &str = "-1,-1";

/// A token range in the normalized review text, or the absent sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Span {
    Absent,
    Range { start: i64, end: i64 },
}

impl Span {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

pub fn decode(text: &str) -> Result<Span, SpanError> {
    if text == SENTINEL {
        return Ok(Span::Absent);
    }
    let malformed = || SpanError(text.to_string());
    let (start, end) = text.split_once(',').ok_or_else(malformed)?;
    let start = parse_offset(start).ok_or_else(malformed)?;
    let end = parse_offset(end).ok_or_else(malformed)?;
    if (start, end) == (-1, -1) {
        return Ok(Span::Absent);
    }
    Ok(Span::Range { start, end })
}

pub fn encode(span: &Span) -> String {
    span.to_string()
}

/// Decimal digits with an optional leading `-`. No `+`, no whitespace.
fn parse_offset(s: &str) -> Option<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str(SENTINEL),
            Self::Range { start, end } => write!(f, "{start},{end}"),
        }
    }
}

impl FromStr for Span {
    type Err = SpanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}
