mod common;

use common::FakeEngine;
use ocr_triage::{
    config::Config,
    document::Document,
    engine::ToolRun,
    error::ErrorCategory,
    invoker::{EXIT_ALREADY_DONE_OCR, OutcomeStatus, classify, convert},
    policy::ProcessingMode,
};

fn run(code: Option<i32>, stderr: &str) -> ToolRun {
    ToolRun {
        exit_code: code,
        stderr: stderr.into(),
        ..Default::default()
    }
}

#[test]
fn classification_follows_exit_signal() {
    assert_eq!(classify(&run(Some(0), "")).status, OutcomeStatus::Success);

    let w = classify(&run(Some(EXIT_ALREADY_DONE_OCR), ""));
    assert_eq!(w.status, OutcomeStatus::Warning);
    assert_eq!(w.error, None);

    let w = classify(&run(Some(1), "PriorOcrFoundError: page already has text!"));
    assert_eq!(w.status, OutcomeStatus::Warning);

    let f = classify(&run(Some(2), "InputFileError: not a pdf"));
    assert_eq!(f.status, OutcomeStatus::Failure);
    assert_eq!(f.error, Some(ErrorCategory::ConversionFailure));
    assert!(f.message.contains("InputFileError"));

    let crash = classify(&run(None, ""));
    assert_eq!(crash.status, OutcomeStatus::Failure);
    assert!(crash.message.contains("signal"));
}

#[test]
fn timeouts_classify_as_timeout() {
    let c = classify(&ToolRun {
        timed_out: true,
        ..Default::default()
    });
    assert_eq!(c.status, OutcomeStatus::Failure);
    assert_eq!(c.error, Some(ErrorCategory::Timeout));
    assert_eq!(c.message, "timeout");
}

#[test]
fn missing_language_pack_gets_a_hint() {
    let f = classify(&run(Some(3), "OCR engine does not have language data for the following requested languages: language 'xyz' not found"));
    assert!(f.message.contains("hint: the selected language pack is not installed"));
}

#[test]
fn skip_never_invokes_the_tool() {
    let engine = FakeEngine::ok();
    let doc = Document::new("/scans/already_text.pdf");
    let out = convert(
        &Config::default(),
        &engine,
        &doc,
        ProcessingMode::Skip,
        std::path::Path::new("/scans/already_text_ocr.pdf"),
    );
    assert_eq!(out.status, OutcomeStatus::Success);
    assert_eq!(out.duration_ms, 0);
    assert_eq!(out.output_path.as_deref(), Some(doc.path()));
    assert_eq!(engine.calls(), 0);
}

#[test]
fn success_requires_an_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new(dir.path().join("in.pdf"));
    let output = dir.path().join("nested").join("in_ocr.pdf");

    let engine = FakeEngine::ok();
    let out = convert(&Config::default(), &engine, &doc, ProcessingMode::ForceOcrAll, &output);
    assert_eq!(out.status, OutcomeStatus::Success, "{}", out.message);
    assert_eq!(out.output_path.as_deref(), Some(output.as_path()));
    assert_eq!(engine.calls(), 1);
    assert_eq!(engine.seen.lock().unwrap()[0].1, ProcessingMode::ForceOcrAll);

    // Exit 0 without writing anything is not a success.
    struct SilentEngine;
    impl ocr_triage::engine::Engine for SilentEngine {
        fn doctor(&self) -> anyhow::Result<ocr_triage::engine::ToolDiag> {
            anyhow::bail!("unused")
        }
        fn convert(&self, _req: &ocr_triage::engine::ConvertIn) -> anyhow::Result<ToolRun> {
            Ok(ToolRun {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }
    let missing = dir.path().join("never_written.pdf");
    let out = convert(&Config::default(), &SilentEngine, &doc, ProcessingMode::OcrMissingOnly, &missing);
    assert_eq!(out.status, OutcomeStatus::Failure);
    assert_eq!(out.message, "no output file produced");
}

#[test]
fn prior_ocr_warning_falls_back_to_source() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new(dir.path().join("in.pdf"));
    let engine = FakeEngine::exiting(EXIT_ALREADY_DONE_OCR, "PriorOcrFoundError");
    let out = convert(
        &Config::default(),
        &engine,
        &doc,
        ProcessingMode::OcrMissingOnly,
        &dir.path().join("in_ocr.pdf"),
    );
    assert_eq!(out.status, OutcomeStatus::Warning);
    assert_eq!(out.output_path.as_deref(), Some(doc.path()));
}

#[test]
fn failure_keeps_files_it_did_not_create() {
    let dir = tempfile::tempdir().unwrap();
    let doc = Document::new(dir.path().join("in.pdf"));
    let output = dir.path().join("in_ocr.pdf");
    std::fs::write(&output, b"%PDF-1.5\n% from an earlier run\n").unwrap();

    let engine = FakeEngine::exiting(2, "InputFileError");
    let out = convert(&Config::default(), &engine, &doc, ProcessingMode::ForceOcrAll, &output);
    assert_eq!(out.status, OutcomeStatus::Failure);
    assert!(output.exists());
}
