//! Output document builder
//!
//! Write side of the document engine. Pages are assembled one at a
//! time: content operators accumulate on the open page and are
//! encoded into a content stream when the next page starts or the
//! document is finalized.
//!
//! Imported pages become Form XObjects, raster stamps become Image
//! XObjects; both are placed with a `q <matrix> cm /Xn Do Q` block.
//! User coordinates are top-left-origin in the configured unit and
//! converted here to PDF bottom-left points.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::config::{BlendMode, Unit};
use crate::error::StampError;
use crate::source::{PageGeometry, SourceDocument};

/// Opaque handle to reusable content registered with the builder.
///
/// Placing a drawable never re-imports or re-decodes it.
#[derive(Debug, Clone)]
pub struct Drawable {
    id: ObjectId,
    kind: DrawableKind,
}

#[derive(Debug, Clone)]
enum DrawableKind {
    /// Imported page; bbox is `[lx, ly, rx, ry]` in points.
    Form { bbox: [f64; 4] },
    /// Embedded raster image with its intrinsic pixel size.
    Image { width: u32, height: u32 },
}

impl Drawable {
    /// Height per unit of width (intrinsic aspect ratio).
    pub fn aspect(&self) -> f64 {
        match &self.kind {
            DrawableKind::Form { bbox } => {
                let w = bbox[2] - bbox[0];
                let h = bbox[3] - bbox[1];
                if w.abs() < f64::EPSILON {
                    1.0
                } else {
                    h / w
                }
            }
            DrawableKind::Image { width, height } => {
                if *width == 0 {
                    1.0
                } else {
                    f64::from(*height) / f64::from(*width)
                }
            }
        }
    }
}

struct PageInProgress {
    geometry: PageGeometry,
    ops: Vec<Operation>,
    xobjects: Dictionary,
    ext_gstates: Dictionary,
}

/// Builds the stamped output document.
pub struct OutputBuilder {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    current: Option<PageInProgress>,
    default_geometry: PageGeometry,
    unit: Unit,
    // one ExtGState object per distinct (alpha, blend) pair
    gs_cache: HashMap<(u64, BlendMode), (ObjectId, String)>,
    xobject_seq: usize,
}

impl OutputBuilder {
    /// Start an output document whose default page size is
    /// `default_geometry` (user units).
    pub fn new(unit: Unit, default_geometry: PageGeometry) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_ids: Vec::new(),
            current: None,
            default_geometry,
            unit,
            gs_cache: HashMap::new(),
            xobject_seq: 0,
        }
    }

    pub fn default_geometry(&self) -> PageGeometry {
        self.default_geometry
    }

    /// Close the open page, if any, and start a new one at the
    /// default size.
    pub fn add_page(&mut self) -> Result<(), StampError> {
        self.close_current()?;
        self.current = Some(PageInProgress {
            geometry: self.default_geometry,
            ops: Vec::new(),
            xobjects: Dictionary::new(),
            ext_gstates: Dictionary::new(),
        });
        Ok(())
    }

    /// Override the open page's box, for documents with mixed page
    /// sizes.
    pub fn set_page_size(&mut self, geometry: PageGeometry) -> Result<(), StampError> {
        let page = self.current.as_mut().ok_or_else(no_open_page)?;
        page.geometry = geometry;
        Ok(())
    }

    /// Import a source page as a reusable Form XObject.
    ///
    /// The page's content streams are lifted verbatim; its resources
    /// are deep-copied through the source's cache so repeated imports
    /// share fonts and images.
    pub fn import_page(
        &mut self,
        source: &mut SourceDocument,
        page: u32,
        box_name: &str,
    ) -> Result<Drawable, StampError> {
        let bbox = source.page_box(page, box_name)?;
        let content = source.page_content(page)?;

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Form".to_vec()));
        dict.set("FormType", Object::Integer(1));
        dict.set(
            "BBox",
            Object::Array(bbox.iter().map(|v| Object::Real(*v as f32)).collect()),
        );
        if let Some(resources) = source.page_resources(page)? {
            let copied = source.copy_object(&mut self.doc, &resources)?;
            dict.set("Resources", copied);
        }

        let id = self.doc.add_object(Stream::new(dict, content));
        Ok(Drawable {
            id,
            kind: DrawableKind::Form { bbox },
        })
    }

    /// Decode a raster image file and embed it as an Image XObject.
    pub fn register_image(&mut self, path: impl AsRef<Path>) -> Result<Drawable, StampError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| StampError::UnreadableDocument {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let img = image::load_from_memory(&bytes).map_err(|e| StampError::UnreadableDocument {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.embed_image(img)
    }

    /// Embed an already-decoded image from memory.
    pub fn register_image_bytes(&mut self, bytes: &[u8]) -> Result<Drawable, StampError> {
        let img = image::load_from_memory(bytes).map_err(|e| StampError::UnreadableDocument {
            path: "<memory>".into(),
            reason: e.to_string(),
        })?;
        self.embed_image(img)
    }

    fn embed_image(&mut self, img: image::DynamicImage) -> Result<Drawable, StampError> {
        let (width, height) = (img.width(), img.height());

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(i64::from(width)));
        dict.set("Height", Object::Integer(i64::from(height)));
        dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));

        let rgb = if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            let pixels = width as usize * height as usize;
            let mut rgb = Vec::with_capacity(pixels * 3);
            let mut alpha = Vec::with_capacity(pixels);
            for pixel in rgba.pixels() {
                rgb.extend_from_slice(&pixel.0[..3]);
                alpha.push(pixel.0[3]);
            }

            let mut smask = Dictionary::new();
            smask.set("Type", Object::Name(b"XObject".to_vec()));
            smask.set("Subtype", Object::Name(b"Image".to_vec()));
            smask.set("Width", Object::Integer(i64::from(width)));
            smask.set("Height", Object::Integer(i64::from(height)));
            smask.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
            smask.set("BitsPerComponent", Object::Integer(8));
            smask.set("Filter", Object::Name(b"FlateDecode".to_vec()));
            let smask_id = self.doc.add_object(Stream::new(smask, deflate(&alpha)?));
            dict.set("SMask", Object::Reference(smask_id));

            rgb
        } else {
            img.to_rgb8().into_raw()
        };

        let id = self.doc.add_object(Stream::new(dict, deflate(&rgb)?));
        Ok(Drawable {
            id,
            kind: DrawableKind::Image { width, height },
        })
    }

    /// Draw `drawable` on the open page at `(x, y)` (top-left anchor,
    /// user units) scaled to `width` wide; `height == 0` derives the
    /// height from the drawable's aspect ratio.
    pub fn place(
        &mut self,
        drawable: &Drawable,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), StampError> {
        let k = self.unit.points_per_unit();
        let height = if height == 0.0 {
            width * drawable.aspect()
        } else {
            height
        };

        self.xobject_seq += 1;
        let name = format!("X{}", self.xobject_seq);

        let page = self.current.as_mut().ok_or_else(no_open_page)?;
        page.xobjects
            .set(name.clone().into_bytes(), Object::Reference(drawable.id));

        // bottom-left of the placed box, in points
        let ty = (page.geometry.height - y - height) * k;
        let matrix = match &drawable.kind {
            DrawableKind::Form { bbox } => {
                let bw = bbox[2] - bbox[0];
                let bh = bbox[3] - bbox[1];
                let sx = if bw.abs() < f64::EPSILON { 1.0 } else { width * k / bw };
                let sy = if bh.abs() < f64::EPSILON { sx } else { height * k / bh };
                [sx, 0.0, 0.0, sy, x * k - bbox[0] * sx, ty - bbox[1] * sy]
            }
            // image space is the unit square
            DrawableKind::Image { .. } => [width * k, 0.0, 0.0, height * k, x * k, ty],
        };

        page.ops.push(Operation::new("q", vec![]));
        page.ops.push(Operation::new(
            "cm",
            matrix.iter().map(|v| Object::Real(*v as f32)).collect(),
        ));
        page.ops
            .push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        page.ops.push(Operation::new("Q", vec![]));
        Ok(())
    }

    /// Switch the open page's composition state via an ExtGState.
    ///
    /// Identical (alpha, blend) pairs share one ExtGState object
    /// across the whole document.
    pub fn set_composition(&mut self, alpha: f64, blend: BlendMode) -> Result<(), StampError> {
        let key = (alpha.to_bits(), blend);
        let (gs_id, gs_name) = match self.gs_cache.get(&key) {
            Some(entry) => entry.clone(),
            None => {
                let mut dict = Dictionary::new();
                dict.set("Type", Object::Name(b"ExtGState".to_vec()));
                dict.set("ca", Object::Real(alpha as f32));
                dict.set("CA", Object::Real(alpha as f32));
                dict.set("BM", Object::Name(blend.pdf_name().as_bytes().to_vec()));
                let id = self.doc.add_object(dict);
                let name = format!("GS{}", self.gs_cache.len() + 1);
                self.gs_cache.insert(key, (id, name.clone()));
                (id, name)
            }
        };

        let page = self.current.as_mut().ok_or_else(no_open_page)?;
        page.ext_gstates
            .set(gs_name.clone().into_bytes(), Object::Reference(gs_id));
        page.ops
            .push(Operation::new("gs", vec![Object::Name(gs_name.into_bytes())]));
        Ok(())
    }

    fn close_current(&mut self) -> Result<(), StampError> {
        let Some(page) = self.current.take() else {
            return Ok(());
        };

        let encoded = Content {
            operations: page.ops,
        }
        .encode()
        .map_err(|e| StampError::OperationError(format!("encode page content: {}", e)))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut resources = Dictionary::new();
        if !page.xobjects.is_empty() {
            resources.set("XObject", Object::Dictionary(page.xobjects));
        }
        if !page.ext_gstates.is_empty() {
            resources.set("ExtGState", Object::Dictionary(page.ext_gstates));
        }

        let page_dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            ("MediaBox", self.media_box(page.geometry)),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]);
        self.page_ids.push(self.doc.add_object(page_dict));
        Ok(())
    }

    fn media_box(&self, geometry: PageGeometry) -> Object {
        let k = self.unit.points_per_unit();
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real((geometry.width * k) as f32),
            Object::Real((geometry.height * k) as f32),
        ])
    }

    /// Assemble the page tree and serialize to memory.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, StampError> {
        self.close_current()?;
        if self.page_ids.is_empty() {
            return Err(StampError::OperationError(
                "output document has no pages".into(),
            ));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(self.page_ids.len() as i64)),
            (
                "Kids",
                Object::Array(
                    self.page_ids
                        .iter()
                        .map(|id| Object::Reference(*id))
                        .collect(),
                ),
            ),
            ("MediaBox", self.media_box(self.default_geometry)),
        ]);
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]);
        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        self.doc.prune_objects();
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| StampError::WriteFailure(e.to_string()))?;
        Ok(buffer)
    }

    /// Serialize and write the output file. Returns the byte count.
    pub fn finalize(self, path: impl AsRef<Path>) -> Result<u64, StampError> {
        let path = path.as_ref();
        let bytes = self.into_bytes()?;
        let len = bytes.len() as u64;
        std::fs::write(path, bytes)
            .map_err(|e| StampError::WriteFailure(format!("{}: {}", path.display(), e)))?;
        Ok(len)
    }
}

fn no_open_page() -> StampError {
    StampError::OperationError("no open page; call add_page first".into())
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, StampError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| StampError::OperationError(format!("compress image data: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| StampError::OperationError(format!("compress image data: {}", e)))
}
