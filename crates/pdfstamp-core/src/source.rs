//! Source document access
//!
//! Read side of the document engine: page count, page geometry, and
//! deep-copying of page content into an output document. Built on
//! lopdf; no content is ever re-rendered, pages are lifted wholesale
//! as Form XObjects.

use std::collections::HashMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::config::Unit;
use crate::error::StampError;

/// Width and height of one page, in user units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
}

/// A parsed source PDF.
///
/// Keeps a copy cache so resources shared between pages (fonts,
/// images) are imported into the output document only once.
#[derive(Debug)]
pub struct SourceDocument {
    doc: Document,
    path: String,
    page_ids: Vec<ObjectId>,
    copied: HashMap<ObjectId, ObjectId>,
}

impl SourceDocument {
    /// Open a PDF from the filesystem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StampError> {
        let path = path.as_ref();
        let doc = Document::load(path).map_err(|e| StampError::UnreadableDocument {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(doc, path.display().to_string()))
    }

    /// Load a PDF already in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StampError> {
        let doc = Document::load_mem(bytes).map_err(|e| StampError::UnreadableDocument {
            path: "<memory>".into(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(doc, "<memory>".into()))
    }

    fn new(doc: Document, path: String) -> Self {
        // get_pages is keyed by 1-indexed page number; BTreeMap
        // iteration gives document order
        let page_ids = doc.get_pages().values().copied().collect();
        Self {
            doc,
            path,
            page_ids,
            copied: HashMap::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    pub(crate) fn page_id(&self, page: u32) -> Result<ObjectId, StampError> {
        page.checked_sub(1)
            .and_then(|i| self.page_ids.get(i as usize))
            .copied()
            .ok_or_else(|| {
                StampError::OperationError(format!(
                    "page {} does not exist (document has {} pages)",
                    page,
                    self.page_ids.len()
                ))
            })
    }

    /// Geometry of `page` from the named page box, in user units.
    ///
    /// The box is looked up on the page itself, then along the
    /// /Parent chain (page tree attributes are inheritable). It must
    /// decode to exactly 4 numeric components.
    pub fn page_geometry(
        &self,
        page: u32,
        box_name: &str,
        unit: Unit,
    ) -> Result<PageGeometry, StampError> {
        let rect = self.page_box(page, box_name)?;
        let k = unit.units_per_point();
        Ok(PageGeometry {
            width: (rect[2] - rect[0]) * k,
            height: (rect[3] - rect[1]) * k,
        })
    }

    /// The named page box as `[lx, ly, rx, ry]` in points.
    pub(crate) fn page_box(&self, page: u32, box_name: &str) -> Result<[f64; 4], StampError> {
        let missing = || StampError::MissingPageBox {
            page,
            box_name: box_name.to_string(),
        };

        let page_id = self.page_id(page)?;
        let obj = self
            .find_inherited(page_id, box_name.as_bytes())
            .ok_or_else(missing)?;
        let arr = self.resolve(obj).as_array().map_err(|_| missing())?;
        if arr.len() != 4 {
            return Err(missing());
        }

        let mut rect = [0.0; 4];
        for (slot, obj) in rect.iter_mut().zip(arr) {
            *slot = self.number(obj).ok_or_else(missing)?;
        }
        Ok(rect)
    }

    /// Decompressed, concatenated content streams of `page`.
    pub(crate) fn page_content(&self, page: u32) -> Result<Vec<u8>, StampError> {
        let page_id = self.page_id(page)?;
        self.doc
            .get_page_content(page_id)
            .map_err(|e| StampError::OperationError(format!("page {} content: {}", page, e)))
    }

    /// The page's /Resources entry (direct or inherited), if any.
    pub(crate) fn page_resources(&self, page: u32) -> Result<Option<Object>, StampError> {
        let page_id = self.page_id(page)?;
        Ok(self.find_inherited(page_id, b"Resources").cloned())
    }

    /// Deep-copy `obj` from this document into `dest`, rewriting
    /// references and caching copied objects so shared resources are
    /// imported once.
    pub(crate) fn copy_object(
        &mut self,
        dest: &mut Document,
        obj: &Object,
    ) -> Result<Object, StampError> {
        match obj {
            Object::Reference(id) => {
                if let Some(&new_id) = self.copied.get(id) {
                    return Ok(Object::Reference(new_id));
                }
                // reserve the slot before recursing so reference
                // cycles terminate
                let new_id = dest.new_object_id();
                self.copied.insert(*id, new_id);

                let referenced = self
                    .doc
                    .get_object(*id)
                    .map_err(|e| StampError::OperationError(e.to_string()))?
                    .clone();
                let copied = self.copy_object(dest, &referenced)?;
                dest.objects.insert(new_id, copied);
                Ok(Object::Reference(new_id))
            }
            Object::Array(arr) => {
                let mut out = Vec::with_capacity(arr.len());
                for item in arr {
                    out.push(self.copy_object(dest, item)?);
                }
                Ok(Object::Array(out))
            }
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.copy_dict(dest, dict)?)),
            Object::Stream(stream) => {
                let mut copied = stream.clone();
                copied.dict = self.copy_dict(dest, &stream.dict)?;
                Ok(Object::Stream(copied))
            }
            other => Ok(other.clone()),
        }
    }

    fn copy_dict(&mut self, dest: &mut Document, dict: &Dictionary) -> Result<Dictionary, StampError> {
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            out.set(key.clone(), self.copy_object(dest, value)?);
        }
        Ok(out)
    }

    /// Look up `key` on the page dictionary, walking the /Parent
    /// chain when absent.
    fn find_inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut dict = self.doc.get_object(page_id).ok()?.as_dict().ok()?;
        loop {
            if let Ok(obj) = dict.get(key) {
                return Some(obj);
            }
            match dict.get(b"Parent") {
                Ok(Object::Reference(parent)) => {
                    dict = self.doc.get_object(*parent).ok()?.as_dict().ok()?;
                }
                _ => return None,
            }
        }
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            other => other,
        }
    }

    fn number(&self, obj: &Object) -> Option<f64> {
        match self.resolve(obj) {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(f64::from(*r)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{create_test_pdf, create_test_pdf_with_sizes};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_open_missing_file_fails() {
        let err = SourceDocument::open("/nonexistent/input.pdf").unwrap_err();
        assert!(matches!(err, StampError::UnreadableDocument { .. }));
    }

    #[test]
    fn test_from_bytes_garbage_fails() {
        let err = SourceDocument::from_bytes(b"not a pdf").unwrap_err();
        assert!(matches!(err, StampError::UnreadableDocument { .. }));
    }

    #[test]
    fn test_page_count() {
        let src = SourceDocument::from_bytes(&create_test_pdf(4)).unwrap();
        assert_eq!(src.page_count(), 4);
    }

    #[test]
    fn test_page_geometry_in_points() {
        let src = SourceDocument::from_bytes(&create_test_pdf(1)).unwrap();
        let geom = src.page_geometry(1, "MediaBox", Unit::Pt).unwrap();
        assert_eq!(geom, PageGeometry { width: 612.0, height: 792.0 });
    }

    #[test]
    fn test_page_geometry_in_mm() {
        let src = SourceDocument::from_bytes(&create_test_pdf(1)).unwrap();
        let geom = src.page_geometry(1, "MediaBox", Unit::Mm).unwrap();
        // 612 x 792 pt is US Letter, 215.9 x 279.4 mm
        assert!((geom.width - 215.9).abs() < 0.01);
        assert!((geom.height - 279.4).abs() < 0.01);
    }

    #[test]
    fn test_page_geometry_varies_per_page() {
        let bytes = create_test_pdf_with_sizes(&[(612.0, 792.0), (842.0, 595.0)]);
        let src = SourceDocument::from_bytes(&bytes).unwrap();
        let first = src.page_geometry(1, "MediaBox", Unit::Pt).unwrap();
        let second = src.page_geometry(2, "MediaBox", Unit::Pt).unwrap();
        assert_eq!(first, PageGeometry { width: 612.0, height: 792.0 });
        assert_eq!(second, PageGeometry { width: 842.0, height: 595.0 });
    }

    #[test]
    fn test_missing_box_fails() {
        let src = SourceDocument::from_bytes(&create_test_pdf(1)).unwrap();
        let err = src.page_geometry(1, "ArtBox", Unit::Mm).unwrap_err();
        assert!(matches!(
            err,
            StampError::MissingPageBox { page: 1, .. }
        ));
    }

    #[test]
    fn test_page_content_is_nonempty() {
        let src = SourceDocument::from_bytes(&create_test_pdf(2)).unwrap();
        let content = src.page_content(2).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("Tj"));
    }

    #[test]
    fn test_copy_object_caches_shared_references() {
        let mut src = SourceDocument::from_bytes(&create_test_pdf(1)).unwrap();
        let mut dest = Document::with_version("1.5");

        let resources = src.page_resources(1).unwrap().unwrap();
        let before = dest.objects.len();
        src.copy_object(&mut dest, &resources).unwrap();
        let after_once = dest.objects.len();
        src.copy_object(&mut dest, &resources).unwrap();
        let after_twice = dest.objects.len();

        assert!(after_once > before);
        assert_eq!(after_once, after_twice);
    }
}
