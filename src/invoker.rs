use crate::{
    config::Config,
    document::Document,
    engine::{ConvertIn, Engine, ToolRun},
    error::{DocumentError, ErrorCategory},
    policy::ProcessingMode,
    util::ensure_dir,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

/// Exit code ocrmypdf uses when it refuses to OCR a page that already has text.
pub const EXIT_ALREADY_DONE_OCR: i32 = 6;

/// Keep report messages readable when a tool dumps a traceback.
const MAX_STDERR_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Warning,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub status: OutcomeStatus,
    pub output_path: Option<PathBuf>,
    pub message: String,
    pub duration_ms: u64,
    /// Set for every `Failure`.
    pub error: Option<ErrorCategory>,
}

impl ConversionOutcome {
    /// A failure recorded without launching anything.
    pub fn from_error(err: &DocumentError) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            output_path: None,
            message: err.to_string(),
            duration_ms: 0,
            error: Some(err.category()),
        }
    }

    fn failure(category: ErrorCategory, message: String, duration_ms: u64) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            output_path: None,
            message,
            duration_ms,
            error: Some(category),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: OutcomeStatus,
    pub error: Option<ErrorCategory>,
    pub message: String,
}

/// Maps a raw tool run to an outcome. Independent of the filesystem.
pub fn classify(run: &ToolRun) -> Classification {
    if run.timed_out {
        return Classification {
            status: OutcomeStatus::Failure,
            error: Some(ErrorCategory::Timeout),
            message: "timeout".into(),
        };
    }

    match run.exit_code {
        Some(0) => Classification {
            status: OutcomeStatus::Success,
            error: None,
            message: "converted".into(),
        },
        Some(code) if code == EXIT_ALREADY_DONE_OCR || mentions_prior_ocr(&run.stderr) => {
            Classification {
                status: OutcomeStatus::Warning,
                error: None,
                message: format!(
                    "tool skipped the document because it already has text (exit {code})"
                ),
            }
        }
        Some(code) => Classification {
            status: OutcomeStatus::Failure,
            error: Some(ErrorCategory::ConversionFailure),
            message: failure_message(&format!("tool exited with code {code}"), &run.stderr),
        },
        None => Classification {
            status: OutcomeStatus::Failure,
            error: Some(ErrorCategory::ConversionFailure),
            message: failure_message("tool terminated by signal", &run.stderr),
        },
    }
}

fn mentions_prior_ocr(stderr: &str) -> bool {
    stderr.contains("PriorOcrFoundError") || stderr.contains("page already has text")
}

/// Remediation for failures the tool reports in recognisable ways.
pub fn remediation_hint(stderr: &str) -> Option<&'static str> {
    let lower = stderr.to_ascii_lowercase();
    if mentions_prior_ocr(stderr) {
        Some("the PDF already has a text layer; rerun with intent force or skip-text")
    } else if stderr.contains("TesseractNotFoundError")
        || (lower.contains("tesseract") && lower.contains("not found"))
    {
        Some("Tesseract OCR is not installed or not on PATH")
    } else if lower.contains("language") && lower.contains("not found") {
        Some("the selected language pack is not installed; install the matching tesseract language data")
    } else {
        None
    }
}

fn failure_message(head: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let tail = &lines[lines.len().saturating_sub(MAX_STDERR_LINES)..];
    let mut msg = head.to_string();
    if !tail.is_empty() {
        msg.push_str(": ");
        msg.push_str(&tail.join("\n"));
    }
    if let Some(hint) = remediation_hint(stderr) {
        msg.push_str("\nhint: ");
        msg.push_str(hint);
    }
    msg
}

/// `<dir>/<stem><suffix>.pdf`, where `dir` is `out_dir` or the source's own directory.
pub fn default_output_path(source: &Path, out_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| source.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{stem}{suffix}.pdf"))
}

/// Runs one conversion. `Skip` returns immediately without touching the tool.
pub fn convert(
    cfg: &Config,
    engine: &dyn Engine,
    doc: &Document,
    mode: ProcessingMode,
    output: &Path,
) -> ConversionOutcome {
    if !mode.invokes_tool() {
        return ConversionOutcome {
            status: OutcomeStatus::Success,
            output_path: Some(doc.path().to_path_buf()),
            message: "skipped: text layer already present".into(),
            duration_ms: 0,
            error: None,
        };
    }

    let started = Instant::now();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(err) = ensure_dir(parent) {
            return ConversionOutcome::failure(
                ErrorCategory::ConversionFailure,
                format!("{err:#}"),
                elapsed_ms(started),
            );
        }
    }

    // A file already at the output path is not ours to clean up on failure.
    let preexisting = output.exists();
    let req = ConvertIn {
        input_pdf: doc.path().to_path_buf(),
        output_pdf: output.to_path_buf(),
        mode,
        timeout: cfg.timeout(),
    };
    let run = match engine.convert(&req) {
        Ok(run) => run,
        Err(err) => {
            return ConversionOutcome::failure(
                ErrorCategory::ConversionFailure,
                format!("{err:#}"),
                elapsed_ms(started),
            );
        }
    };

    let classified = classify(&run);
    let duration_ms = elapsed_ms(started);
    let mut outcome = match classified.status {
        OutcomeStatus::Success if !is_non_empty_file(output) => ConversionOutcome::failure(
            ErrorCategory::ConversionFailure,
            "no output file produced".into(),
            duration_ms,
        ),
        OutcomeStatus::Success => ConversionOutcome {
            status: OutcomeStatus::Success,
            output_path: Some(output.to_path_buf()),
            message: classified.message,
            duration_ms,
            error: None,
        },
        OutcomeStatus::Warning => {
            warn!("{}: {}", doc.path().display(), classified.message);
            // The source already carries text, so it stands in when the tool wrote nothing.
            let artifact = if is_non_empty_file(output) {
                output.to_path_buf()
            } else {
                doc.path().to_path_buf()
            };
            ConversionOutcome {
                status: OutcomeStatus::Warning,
                output_path: Some(artifact),
                message: classified.message,
                duration_ms,
                error: None,
            }
        }
        OutcomeStatus::Failure => ConversionOutcome {
            status: OutcomeStatus::Failure,
            output_path: None,
            message: classified.message,
            duration_ms,
            error: classified.error,
        },
    };

    if outcome.status == OutcomeStatus::Failure && !preexisting && output != doc.path() {
        let _ = std::fs::remove_file(output);
    }
    for note in run.notes {
        outcome.message.push_str("; ");
        outcome.message.push_str(&note);
    }
    outcome
}

fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_lands_next_to_source_by_default() {
        let p = default_output_path(Path::new("/scans/letter.pdf"), None, "_ocr");
        assert_eq!(p, Path::new("/scans/letter_ocr.pdf"));
    }

    #[test]
    fn output_honours_out_dir() {
        let p = default_output_path(
            Path::new("/scans/letter.pdf"),
            Some(Path::new("/archive")),
            "_ocr",
        );
        assert_eq!(p, Path::new("/archive/letter_ocr.pdf"));
    }

    #[test]
    fn failure_message_keeps_stderr_tail_and_hint() {
        let stderr = "x\n".repeat(40) + "TesseractNotFoundError: tesseract is not installed";
        let msg = failure_message("tool exited with code 3", &stderr);
        assert!(msg.starts_with("tool exited with code 3: "));
        assert!(msg.contains("hint: Tesseract OCR is not installed"));
        assert!(msg.lines().count() <= MAX_STDERR_LINES + 1);
    }
}
