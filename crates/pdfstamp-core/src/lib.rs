//! PDF stamping
//!
//! Overlays a stamp (a page of another PDF, or a raster image) onto
//! selected pages of a target PDF using lopdf.
//!
//! The flow: parse the page-selection and position expressions once,
//! then walk the source document page by page, replicating each page
//! onto the output and compositing the stamp at the position resolved
//! for that page's range. Ranges may overlap and be declared in any
//! order; the tightest declared range end wins per page.

pub mod assemble;
pub mod builder;
pub mod config;
pub mod error;
pub mod positions;
pub mod ranges;
pub mod source;
pub mod stamp;

#[cfg(test)]
pub(crate) mod testutil;

pub use assemble::{stamp_document, RunSummary};
pub use builder::{Drawable, OutputBuilder};
pub use config::{BlendMode, StampConfig, Unit};
pub use error::StampError;
pub use positions::{parse_positions, Position};
pub use ranges::PageSelection;
pub use source::{PageGeometry, SourceDocument};
pub use stamp::Stamp;
