use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// One input PDF. Identity is fixed at creation; the page count is filled in
/// once by the probe.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    file_bytes: u64,
    page_count: OnceLock<u32>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self {
            path,
            file_bytes,
            page_count: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_bytes(&self) -> u64 {
        self.file_bytes
    }

    /// `None` until the document has been probed.
    pub fn page_count(&self) -> Option<u32> {
        self.page_count.get().copied()
    }

    pub(crate) fn record_page_count(&self, pages: u32) {
        let _ = self.page_count.set(pages);
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Document", 3)?;
        s.serialize_field("path", &self.path)?;
        s.serialize_field("file_bytes", &self.file_bytes)?;
        s.serialize_field("page_count", &self.page_count())?;
        s.end()
    }
}
