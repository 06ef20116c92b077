use crate::{error::DocumentError, probe::TextLayerReport};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the user asked for, before looking at the document.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RequestedIntent {
    #[default]
    #[value(name = "auto")]
    AutoRecommend,
    #[value(name = "force")]
    ForceOcr,
    #[value(name = "redo")]
    RedoOcr,
    #[value(name = "skip-text")]
    SkipIfTextPresent,
}

impl fmt::Display for RequestedIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestedIntent::AutoRecommend => "AutoRecommend",
            RequestedIntent::ForceOcr => "ForceOcr",
            RequestedIntent::RedoOcr => "RedoOcr",
            RequestedIntent::SkipIfTextPresent => "SkipIfTextPresent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingMode {
    Skip,
    OcrMissingOnly,
    ForceOcrAll,
    RedoOcr,
}

impl ProcessingMode {
    /// Whether this mode launches the external tool at all.
    pub fn invokes_tool(&self) -> bool {
        !matches!(self, ProcessingMode::Skip)
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingMode::Skip => "Skip",
            ProcessingMode::OcrMissingOnly => "OcrMissingOnly",
            ProcessingMode::ForceOcrAll => "ForceOcrAll",
            ProcessingMode::RedoOcr => "RedoOcr",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionReason {
    AllPagesHaveText,
    MixedTextLayer,
    NoTextLayer,
    ForcedByRequest,
    TextPresentSkipped,
    RedoRequested,
    NothingToRedo,
}

impl DecisionReason {
    /// User-facing guidance for the presentation layer.
    pub fn message(&self) -> &'static str {
        match self {
            DecisionReason::AllPagesHaveText => {
                "this document already has a text layer on every page; recommended mode: Skip"
            }
            DecisionReason::MixedTextLayer => {
                "some pages already have a text layer; only pages without text will be OCRed"
            }
            DecisionReason::NoTextLayer => {
                "no text layer detected; every page will be OCRed"
            }
            DecisionReason::ForcedByRequest => {
                "OCR forced on every page as requested"
            }
            DecisionReason::TextPresentSkipped => {
                "text layer present on every page; skipped as requested"
            }
            DecisionReason::RedoRequested => {
                "existing text layer will be replaced by a fresh OCR pass"
            }
            DecisionReason::NothingToRedo => {
                "redo OCR needs an existing text layer, but this document has none; use force or auto instead"
            }
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeDecision {
    pub mode: ProcessingMode,
    pub reason: DecisionReason,
    pub warnings: Vec<String>,
}

impl ModeDecision {
    fn new(mode: ProcessingMode, reason: DecisionReason) -> Self {
        Self {
            mode,
            reason,
            warnings: Vec::new(),
        }
    }
}

/// Resolves a concrete mode for one document. Pure: the same inputs always
/// produce the same decision.
pub fn select_mode(
    report: &TextLayerReport,
    intent: RequestedIntent,
) -> Result<ModeDecision, DocumentError> {
    match intent {
        RequestedIntent::RedoOcr if !report.has_text => Err(DocumentError::InvalidModeForDocument {
            intent: intent.to_string(),
            reason: DecisionReason::NothingToRedo.message().to_string(),
        }),
        RequestedIntent::RedoOcr => Ok(ModeDecision::new(
            ProcessingMode::RedoOcr,
            DecisionReason::RedoRequested,
        )),
        RequestedIntent::AutoRecommend => Ok(recommend(report)),
        RequestedIntent::ForceOcr => {
            let mut decision =
                ModeDecision::new(ProcessingMode::ForceOcrAll, DecisionReason::ForcedByRequest);
            if report.has_text {
                decision.warnings.push(format!(
                    "existing text layer on {} of {} page(s) will be discarded",
                    report.pages_with_text.len(),
                    report.total_pages
                ));
            }
            Ok(decision)
        }
        RequestedIntent::SkipIfTextPresent => {
            if report.is_fully_text() {
                Ok(ModeDecision::new(
                    ProcessingMode::Skip,
                    DecisionReason::TextPresentSkipped,
                ))
            } else {
                Ok(ModeDecision::new(
                    ProcessingMode::OcrMissingOnly,
                    if report.has_no_text() {
                        DecisionReason::NoTextLayer
                    } else {
                        DecisionReason::MixedTextLayer
                    },
                ))
            }
        }
    }
}

fn recommend(report: &TextLayerReport) -> ModeDecision {
    if report.pages_without_text.is_empty() {
        ModeDecision::new(ProcessingMode::Skip, DecisionReason::AllPagesHaveText)
    } else if report.pages_with_text.is_empty() {
        ModeDecision::new(ProcessingMode::ForceOcrAll, DecisionReason::NoTextLayer)
    } else {
        ModeDecision::new(ProcessingMode::OcrMissingOnly, DecisionReason::MixedTextLayer)
    }
}
