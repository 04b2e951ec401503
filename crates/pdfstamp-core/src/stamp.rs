//! Stamp source adapter
//!
//! The stamp is either page 1 of another PDF or a raster image. Both
//! are registered with the output builder exactly once, before the
//! page loop, and placed through the same primitive afterwards.

use std::path::Path;

use tracing::debug;

use crate::builder::{Drawable, OutputBuilder};
use crate::error::StampError;
use crate::positions::Position;
use crate::source::SourceDocument;

const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

/// A prepared stamp, ready to be placed any number of times.
#[derive(Debug)]
pub struct Stamp {
    drawable: Drawable,
}

impl Stamp {
    /// Inspect the stamp file's extension and register the matching
    /// drawable: page 1 for a PDF, the decoded bitmap for a raster
    /// image.
    pub fn prepare(builder: &mut OutputBuilder, path: impl AsRef<Path>) -> Result<Self, StampError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let drawable = if extension == "pdf" {
            let mut stamp_doc = SourceDocument::open(path)?;
            debug!(path = %path.display(), pages = stamp_doc.page_count(), "using PDF stamp");
            builder.import_page(&mut stamp_doc, 1, "MediaBox")?
        } else if RASTER_EXTENSIONS.contains(&extension.as_str()) {
            debug!(path = %path.display(), "using image stamp");
            builder.register_image(path)?
        } else {
            return Err(StampError::UnreadableDocument {
                path: path.display().to_string(),
                reason: format!("unsupported stamp file type '{}'", extension),
            });
        };

        Ok(Self { drawable })
    }

    /// Place the stamp on the builder's open page.
    ///
    /// `height == 0` derives the height from the stamp's intrinsic
    /// aspect ratio; the two variants differ only in where that ratio
    /// comes from (page box vs. pixel dimensions).
    pub fn place(
        &self,
        builder: &mut OutputBuilder,
        position: Position,
        width: f64,
        height: f64,
    ) -> Result<(), StampError> {
        builder.place(&self.drawable, position.x, position.y, width, height)
    }

    pub fn drawable(&self) -> &Drawable {
        &self.drawable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Unit;
    use crate::source::PageGeometry;
    use crate::testutil::{create_test_pdf, create_test_png};

    const LETTER: PageGeometry = PageGeometry {
        width: 612.0,
        height: 792.0,
    };

    #[test]
    fn test_prepare_pdf_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp.pdf");
        std::fs::write(&path, create_test_pdf(2)).unwrap();

        let mut builder = OutputBuilder::new(Unit::Pt, LETTER);
        let stamp = Stamp::prepare(&mut builder, &path).unwrap();
        // page 1 of a Letter PDF
        assert!((stamp.drawable().aspect() - 792.0 / 612.0).abs() < 1e-9);
    }

    #[test]
    fn test_prepare_image_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        std::fs::write(&path, create_test_png(8, 2)).unwrap();

        let mut builder = OutputBuilder::new(Unit::Pt, LETTER);
        let stamp = Stamp::prepare(&mut builder, &path).unwrap();
        assert_eq!(stamp.drawable().aspect(), 0.25);
    }

    #[test]
    fn test_prepare_unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamp.txt");
        std::fs::write(&path, b"hello").unwrap();

        let mut builder = OutputBuilder::new(Unit::Pt, LETTER);
        let err = Stamp::prepare(&mut builder, &path).unwrap_err();
        assert!(matches!(err, StampError::UnreadableDocument { .. }));
    }

    #[test]
    fn test_prepare_missing_file_fails() {
        let mut builder = OutputBuilder::new(Unit::Pt, LETTER);
        assert!(Stamp::prepare(&mut builder, "/nonexistent/logo.png").is_err());
    }
}
