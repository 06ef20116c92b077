mod common;

use common::{PageKind, build_pdf, write_corrupt, write_pdf};
use lopdf::dictionary;
use ocr_triage::{
    document::Document,
    error::{DocumentError, ErrorCategory},
    probe::probe_document,
};

#[test]
fn text_pages_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), "born_digital.pdf", &[PageKind::Text, PageKind::Text]);
    let doc = Document::new(&path);
    assert_eq!(doc.page_count(), None);

    let report = probe_document(&doc).expect("probe");
    assert!(report.has_text);
    assert!(report.is_fully_text());
    assert_eq!(report.total_pages, 2);
    assert_eq!(doc.page_count(), Some(2));
}

#[test]
fn scanned_pages_have_no_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), "scan.pdf", &[PageKind::Scan, PageKind::Scan, PageKind::Scan]);
    let report = probe_document(&Document::new(path)).expect("probe");
    assert!(!report.has_text);
    assert!(report.has_no_text());
    assert_eq!(report.pages_without_text.len(), 3);
}

#[test]
fn mixed_documents_report_per_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(
        dir.path(),
        "mixed.pdf",
        &[
            PageKind::Text,
            PageKind::Scan,
            PageKind::HiddenText,
            PageKind::Scan,
            PageKind::FormText,
        ],
    );
    let report = probe_document(&Document::new(path)).expect("probe");
    assert!(report.is_mixed());
    assert_eq!(report.pages_with_text.iter().copied().collect::<Vec<_>>(), vec![0, 2, 4]);
    assert_eq!(report.pages_without_text.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
    let all: Vec<u32> = report
        .pages_with_text
        .union(&report.pages_without_text)
        .copied()
        .collect();
    assert_eq!(all, (0..report.total_pages).collect::<Vec<_>>());
}

#[test]
fn text_inside_form_xobjects_counts() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), "grafted.pdf", &[PageKind::FormText]);
    let report = probe_document(&Document::new(path)).expect("probe");
    assert!(report.is_fully_text());
}

#[test]
fn corrupt_files_are_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_corrupt(dir.path(), "broken.pdf");
    let err = probe_document(&Document::new(path)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnreadableDocument);
}

#[test]
fn missing_files_are_unreadable() {
    let err = probe_document(&Document::new("/definitely/not/here.pdf")).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnreadableDocument);
}

#[test]
fn zero_page_documents_are_empty() {
    let mut pdf = build_pdf(&[]);
    let mut bytes = Vec::new();
    pdf.save_to(&mut bytes).expect("save");
    let err = ocr_triage::probe::probe_bytes(&bytes).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::EmptyDocument);
}

#[test]
fn encrypted_documents_are_unreadable() {
    let mut pdf = build_pdf(&[PageKind::Text]);
    pdf.trailer.set(
        "Encrypt",
        lopdf::dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
        },
    );
    let err = ocr_triage::probe::probe_pdf(&pdf).unwrap_err();
    assert_eq!(
        err,
        DocumentError::UnreadableDocument("encrypted without supplied credentials".into())
    );
}
