//! Stamp position parsing
//!
//! A position expression is a comma-separated list of `x+y` tokens,
//! one per declared page range, e.g. "10+10,100+200".

use crate::error::StampError;

/// A stamp anchor in user units, measured from the top-left corner of
/// the page with y growing downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Parse a position expression into declaration-ordered entries.
///
/// No deduplication and no bounds checking against page geometry;
/// positions outside the page simply draw off-page.
pub fn parse_positions(input: &str) -> Result<Vec<Position>, StampError> {
    let mut positions = Vec::new();

    for token in input.trim().split(',') {
        let (x, y) = token.trim().split_once('+').ok_or_else(|| {
            StampError::MalformedInput(format!("position '{}' is not of the form x+y", token.trim()))
        })?;
        positions.push(Position {
            x: parse_coord(x)?,
            y: parse_coord(y)?,
        });
    }

    Ok(positions)
}

fn parse_coord(part: &str) -> Result<f64, StampError> {
    let part = part.trim();
    part.parse()
        .map_err(|_| StampError::MalformedInput(format!("wrong value for position: '{}'", part)))
}
