#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use ocr_triage::engine::{ConvertIn, Engine, ToolDiag, ToolRun};
use ocr_triage::pipeline::CancelToken;
use ocr_triage::policy::ProcessingMode;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum PageKind {
    /// Visible text drawn with `Tj`.
    Text,
    /// Invisible OCR-style text drawn with `TJ` in render mode 3.
    HiddenText,
    /// Text inside a form XObject painted with `Do`.
    FormText,
    /// Only vector/raster painting, no text operators.
    Scan,
}

fn encode(ops: Vec<Operation>) -> Vec<u8> {
    Content { operations: ops }.encode().expect("encode content")
}

fn text_ops(text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

fn scan_ops() -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![500.into(), 0.into(), 0.into(), 700.into(), 40.into(), 60.into()],
        ),
        Operation::new("re", vec![0.into(), 0.into(), 1.into(), 1.into()]),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

fn page(
    doc: &mut Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    kind: PageKind,
) -> ObjectId {
    let font_res = || dictionary! { "F1" => font_id };
    let (ops, resources): (Vec<Operation>, Dictionary) = match kind {
        PageKind::Text => (text_ops("Hello archive"), dictionary! { "Font" => font_res() }),
        PageKind::HiddenText => (
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Tr", vec![3.into()]),
                Operation::new(
                    "TJ",
                    vec![Object::Array(vec![
                        Object::string_literal("Sc"),
                        (-20).into(),
                        Object::string_literal("anned"),
                    ])],
                ),
                Operation::new("ET", vec![]),
            ],
            dictionary! { "Font" => font_res() },
        ),
        PageKind::FormText => {
            let form = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                    "Resources" => dictionary! { "Font" => font_res() },
                },
                encode(text_ops("grafted text layer")),
            );
            let form_id = doc.add_object(form);
            (
                vec![
                    Operation::new("q", vec![]),
                    Operation::new("Do", vec!["Fm0".into()]),
                    Operation::new("Q", vec![]),
                ],
                dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
            )
        }
        PageKind::Scan => (scan_ops(), Dictionary::new()),
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, encode(ops)));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources,
    })
}

pub fn build_pdf(kinds: &[PageKind]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let kids: Vec<Object> = kinds
        .iter()
        .map(|&k| page(&mut doc, pages_id, font_id, k).into())
        .collect();
    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn write_pdf(dir: &Path, name: &str, kinds: &[PageKind]) -> PathBuf {
    let path = dir.join(name);
    build_pdf(kinds).save(&path).expect("save pdf");
    path
}

pub fn write_corrupt(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"this is not a PDF, just some bytes\n").expect("write");
    path
}

/// Stands in for the OCR tool: records calls and writes a placeholder output.
pub struct FakeEngine {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(PathBuf, ProcessingMode)>>,
    pub exit_code: i32,
    pub stderr: String,
    /// Inputs whose file name contains this sleep before answering.
    pub slow_marker: Option<(String, Duration)>,
    /// Inputs whose file name contains this cancel the token when they start.
    pub cancel_marker: Option<(String, CancelToken)>,
}

impl FakeEngine {
    pub fn ok() -> Self {
        Self::exiting(0, "")
    }

    pub fn exiting(code: i32, stderr: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            exit_code: code,
            stderr: stderr.to_string(),
            slow_marker: None,
            cancel_marker: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Engine for FakeEngine {
    fn doctor(&self) -> anyhow::Result<ToolDiag> {
        Ok(ToolDiag {
            exe: "fake".into(),
            version: Some("0".into()),
            ok: true,
            error: None,
        })
    }

    fn convert(&self, req: &ConvertIn) -> anyhow::Result<ToolRun> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((req.input_pdf.clone(), req.mode));
        let name = req.input_pdf.file_name().unwrap().to_string_lossy();
        if let Some((marker, token)) = &self.cancel_marker {
            if name.contains(marker.as_str()) {
                token.cancel();
            }
        }
        if let Some((marker, delay)) = &self.slow_marker {
            if name.contains(marker.as_str()) {
                std::thread::sleep(*delay);
            }
        }
        if self.exit_code == 0 {
            std::fs::write(&req.output_pdf, b"%PDF-1.5\n% fake ocr output\n")?;
        }
        Ok(ToolRun {
            exit_code: Some(self.exit_code),
            stderr: self.stderr.clone(),
            ..Default::default()
        })
    }
}
