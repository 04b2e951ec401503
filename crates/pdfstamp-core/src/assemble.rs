//! Page assembly pipeline
//!
//! Drives the per-page loop: fetch geometry, replicate the source
//! page onto a fresh output page, and composite the stamp on selected
//! pages at the position resolved from the declared ranges.
//!
//! The parsers run exactly once before the loop; everything the loop
//! reads is immutable from then on. Any failure inside the loop is
//! fatal to the whole run, with the page number attached.

use serde::Serialize;
use tracing::{debug, info};

use crate::builder::OutputBuilder;
use crate::config::{BlendMode, StampConfig};
use crate::error::StampError;
use crate::positions::parse_positions;
use crate::ranges::PageSelection;
use crate::source::SourceDocument;
use crate::stamp::Stamp;

const PAGE_BOX: &str = "MediaBox";

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pages_total: u32,
    pub pages_stamped: u32,
    pub output_bytes: u64,
}

/// Stamp the configured document and write the output file.
pub fn stamp_document(config: &StampConfig) -> Result<RunSummary, StampError> {
    // positions never depend on the document; reject bad input before
    // touching any file
    let explicit_positions = match &config.positions {
        Some(expr) => Some(parse_positions(expr)?),
        None => None,
    };

    let mut source = SourceDocument::open(&config.source)?;
    let page_count = source.page_count();
    info!(path = %source.path(), pages = page_count, "opened source document");

    let mut selection = PageSelection::parse(&config.pages, page_count)?;
    let positions = match explicit_positions {
        Some(positions) => {
            if positions.len() < selection.range_ends().len() {
                // extra trailing ranges lose their own position and
                // resolve against the remaining ends
                selection.truncate_ends(positions.len());
            }
            positions
        }
        // the single fallback position covers every declared range
        None => vec![config.fallback; selection.range_ends().len()],
    };

    // page 1 seeds the output default page size
    let default_geometry = source.page_geometry(1, PAGE_BOX, config.unit)?;
    let mut builder = OutputBuilder::new(config.unit, default_geometry);

    let stamp = Stamp::prepare(&mut builder, &config.stamp)?;

    let mut pages_stamped = 0;
    for page in 1..=page_count {
        let geometry = source.page_geometry(page, PAGE_BOX, config.unit)?;
        builder.add_page()?;
        if geometry != builder.default_geometry() {
            builder.set_page_size(geometry)?;
        }

        let content = builder.import_page(&mut source, page, PAGE_BOX)?;
        builder.place(&content, 0.0, 0.0, geometry.width, 0.0)?;

        if selection.contains(page) {
            let index = selection
                .resolve(page)
                .ok_or(StampError::UnresolvablePosition { page })?;
            let position = positions
                .get(index)
                .copied()
                .ok_or(StampError::UnresolvablePosition { page })?;

            builder.set_composition(config.alpha, config.blend)?;
            let placed = stamp.place(&mut builder, position, config.width, config.height);
            // the reset is unconditional so no later page inherits a
            // dirty blend state
            builder.set_composition(1.0, BlendMode::Normal)?;
            placed?;

            pages_stamped += 1;
            debug!(page, x = position.x, y = position.y, "stamped page");
        }
    }

    let output_bytes = builder.finalize(&config.output)?;
    info!(path = %config.output.display(), pages_stamped, output_bytes, "wrote stamped document");

    Ok(RunSummary {
        pages_total: page_count,
        pages_stamped,
        output_bytes,
    })
}
