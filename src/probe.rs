use crate::{document::Document, error::DocumentError};
use lopdf::{Dictionary, Object, ObjectId, Stream, content::Content};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Nested form XObjects deeper than this are not searched.
const MAX_FORM_DEPTH: usize = 8;
const MAX_PARENT_HOPS: usize = 64;

/// Which pages of a document already carry an extractable text layer.
///
/// `pages_with_text` and `pages_without_text` are disjoint and together cover
/// `0..total_pages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLayerReport {
    pub has_text: bool,
    pub pages_with_text: BTreeSet<u32>,
    pub pages_without_text: BTreeSet<u32>,
    pub total_pages: u32,
}

impl TextLayerReport {
    /// Builds a report from one flag per page, in page order.
    pub fn from_page_flags(flags: &[bool]) -> Self {
        let mut pages_with_text = BTreeSet::new();
        let mut pages_without_text = BTreeSet::new();
        for (i, &has) in flags.iter().enumerate() {
            if has {
                pages_with_text.insert(i as u32);
            } else {
                pages_without_text.insert(i as u32);
            }
        }
        Self {
            has_text: !pages_with_text.is_empty(),
            pages_with_text,
            pages_without_text,
            total_pages: flags.len() as u32,
        }
    }

    pub fn is_fully_text(&self) -> bool {
        self.total_pages > 0 && self.pages_without_text.is_empty()
    }

    pub fn has_no_text(&self) -> bool {
        self.pages_with_text.is_empty()
    }

    pub fn is_mixed(&self) -> bool {
        !self.pages_with_text.is_empty() && !self.pages_without_text.is_empty()
    }
}

/// Probes a document on disk. Read-only; records the page count on `doc`.
pub fn probe_document(doc: &Document) -> Result<TextLayerReport, DocumentError> {
    let pdf = lopdf::Document::load(doc.path()).map_err(|e| {
        DocumentError::UnreadableDocument(format!("{}: {e}", doc.path().display()))
    })?;
    let report = probe_pdf(&pdf)?;
    doc.record_page_count(report.total_pages);
    Ok(report)
}

/// Probes an in-memory PDF.
pub fn probe_bytes(bytes: &[u8]) -> Result<TextLayerReport, DocumentError> {
    let pdf = lopdf::Document::load_mem(bytes)
        .map_err(|e| DocumentError::UnreadableDocument(e.to_string()))?;
    probe_pdf(&pdf)
}

/// Probes a PDF that is already loaded.
pub fn probe_pdf(pdf: &lopdf::Document) -> Result<TextLayerReport, DocumentError> {
    if pdf.trailer.get(b"Encrypt").is_ok() {
        return Err(DocumentError::UnreadableDocument(
            "encrypted without supplied credentials".into(),
        ));
    }

    let pages = pdf.get_pages();
    if pages.is_empty() {
        return Err(DocumentError::EmptyDocument);
    }

    let flags: Vec<bool> = pages
        .iter()
        .map(|(&number, &page_id)| {
            let has = page_has_text(pdf, page_id);
            debug!("page {} has_text={}", number, has);
            has
        })
        .collect();

    Ok(TextLayerReport::from_page_flags(&flags))
}

fn page_has_text(pdf: &lopdf::Document, page_id: ObjectId) -> bool {
    let content = match pdf.get_page_content(page_id) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("page {:?} has no readable content: {err}", page_id);
            return false;
        }
    };
    let resources = inherited_resources(pdf, page_id);
    let mut visited = HashSet::new();
    content_has_text(pdf, &content, resources, &mut visited, 0)
}

fn content_has_text<'a>(
    pdf: &'a lopdf::Document,
    bytes: &[u8],
    resources: Option<&'a Dictionary>,
    visited: &mut HashSet<ObjectId>,
    depth: usize,
) -> bool {
    let content = match Content::decode(bytes) {
        Ok(c) => c,
        Err(err) => {
            debug!("content stream did not decode: {err}");
            return false;
        }
    };

    for op in &content.operations {
        match op.operator.as_str() {
            // The string is the last operand for all three show operators.
            "Tj" | "'" | "\"" => {
                if op.operands.last().is_some_and(is_non_empty_string) {
                    return true;
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    if items.iter().any(is_non_empty_string) {
                        return true;
                    }
                }
            }
            "Do" if depth < MAX_FORM_DEPTH => {
                let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
                    continue;
                };
                let Some((id, stream)) = form_xobject(pdf, resources, name) else {
                    continue;
                };
                if !visited.insert(id) {
                    continue;
                }
                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|o| resolve(pdf, o))
                    .and_then(|o| o.as_dict().ok())
                    .or(resources);
                if content_has_text(pdf, &data, form_resources, visited, depth + 1) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn is_non_empty_string(obj: &Object) -> bool {
    matches!(obj, Object::String(bytes, _) if !bytes.is_empty())
}

fn resolve<'a>(pdf: &'a lopdf::Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => pdf.get_object(*id).ok(),
        other => Some(other),
    }
}

/// `Resources` on the page itself or the nearest ancestor in the page tree.
fn inherited_resources(pdf: &lopdf::Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = pdf.get_dictionary(page_id).ok();
    let mut hops = 0;
    while let Some(dict) = node {
        if let Ok(res) = dict.get(b"Resources") {
            return resolve(pdf, res).and_then(|o| o.as_dict().ok());
        }
        hops += 1;
        if hops > MAX_PARENT_HOPS {
            break;
        }
        node = dict
            .get(b"Parent")
            .ok()
            .and_then(|p| p.as_reference().ok())
            .and_then(|id| pdf.get_dictionary(id).ok());
    }
    None
}

fn form_xobject<'a>(
    pdf: &'a lopdf::Document,
    resources: Option<&'a Dictionary>,
    name: &[u8],
) -> Option<(ObjectId, &'a Stream)> {
    let xobjects = resources?
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve(pdf, o))
        .and_then(|o| o.as_dict().ok())?;
    let id = xobjects.get(name).ok()?.as_reference().ok()?;
    let stream = pdf.get_object(id).ok()?.as_stream().ok()?;
    let is_form = stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|s| s == b"Form");
    is_form.then_some((id, stream))
}
