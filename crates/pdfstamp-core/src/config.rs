//! Run configuration
//!
//! All user-facing knobs are collected into a single immutable
//! [`StampConfig`] built once at startup and passed by reference into
//! the parsers and the assembly pipeline.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::StampError;
use crate::positions::Position;

/// Measurement unit for page geometry and stamp coordinates.
///
/// PDF content streams are always expressed in points; user input is
/// converted with a fixed factor (1 pt = 25.4/72 mm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    #[default]
    Mm,
    Pt,
}

impl Unit {
    /// Points per one user unit.
    pub fn points_per_unit(self) -> f64 {
        match self {
            Unit::Mm => 72.0 / 25.4,
            Unit::Pt => 1.0,
        }
    }

    /// User units per point.
    pub fn units_per_point(self) -> f64 {
        match self {
            Unit::Mm => 25.4 / 72.0,
            Unit::Pt => 1.0,
        }
    }
}

impl FromStr for Unit {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm" => Ok(Unit::Mm),
            "pt" | "point" | "points" => Ok(Unit::Pt),
            other => Err(StampError::MalformedInput(format!(
                "unknown unit '{}'",
                other
            ))),
        }
    }
}

/// PDF blend mode used while the stamp is composited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

impl BlendMode {
    /// Name as it appears in an ExtGState /BM entry.
    pub fn pdf_name(self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
        }
    }
}

impl FromStr for BlendMode {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(BlendMode::Normal),
            "multiply" => Ok(BlendMode::Multiply),
            "screen" => Ok(BlendMode::Screen),
            "overlay" => Ok(BlendMode::Overlay),
            "darken" => Ok(BlendMode::Darken),
            "lighten" => Ok(BlendMode::Lighten),
            other => Err(StampError::MalformedInput(format!(
                "unknown blend mode '{}'",
                other
            ))),
        }
    }
}

/// Immutable configuration for one stamping run.
#[derive(Debug, Clone)]
pub struct StampConfig {
    /// Document to be stamped.
    pub source: PathBuf,
    /// Stamp file: a PDF (page 1 is used) or a raster image.
    pub stamp: PathBuf,
    /// Output path.
    pub output: PathBuf,
    /// Unit for all coordinates and sizes.
    pub unit: Unit,
    /// Page selection expression, e.g. "1-3,8". Empty selects all pages.
    pub pages: String,
    /// Position list expression, e.g. "10+10,100+200". One entry per
    /// declared range. When absent, `fallback` covers every range.
    pub positions: Option<String>,
    /// Position used when no position expression was given.
    pub fallback: Position,
    /// Stamp width in user units.
    pub width: f64,
    /// Stamp height in user units; 0 derives it from the stamp's
    /// intrinsic aspect ratio.
    pub height: f64,
    /// Alpha applied while the stamp is drawn.
    pub alpha: f64,
    /// Blend mode applied while the stamp is drawn.
    pub blend: BlendMode,
}

impl StampConfig {
    pub fn new(source: impl Into<PathBuf>, stamp: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            stamp: stamp.into(),
            output: output.into(),
            unit: Unit::Mm,
            pages: String::new(),
            positions: None,
            fallback: Position { x: 0.0, y: 0.0 },
            width: 30.0,
            height: 0.0,
            alpha: 0.7,
            blend: BlendMode::Multiply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_parses() {
        assert_eq!("mm".parse::<Unit>().unwrap(), Unit::Mm);
        assert_eq!("Pt".parse::<Unit>().unwrap(), Unit::Pt);
        assert!("furlong".parse::<Unit>().is_err());
    }

    #[test]
    fn test_unit_scale() {
        assert!((Unit::Mm.points_per_unit() - 2.834_645).abs() < 1e-5);
        assert_eq!(Unit::Pt.points_per_unit(), 1.0);
    }

    #[test]
    fn test_blend_mode_parses() {
        assert_eq!("multiply".parse::<BlendMode>().unwrap(), BlendMode::Multiply);
        assert_eq!("Normal".parse::<BlendMode>().unwrap(), BlendMode::Normal);
        assert!("dissolve".parse::<BlendMode>().is_err());
    }

    #[test]
    fn test_defaults_match_flag_defaults() {
        let cfg = StampConfig::new("a.pdf", "s.pdf", "a.stamped.pdf");
        assert_eq!(cfg.width, 30.0);
        assert_eq!(cfg.alpha, 0.7);
        assert_eq!(cfg.blend, BlendMode::Multiply);
        assert_eq!(cfg.unit, Unit::Mm);
    }
}
