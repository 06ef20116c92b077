use crate::policy::ProcessingMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDiag {
    pub exe: String,
    pub version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConvertIn {
    pub input_pdf: PathBuf,
    pub output_pdf: PathBuf,
    pub mode: ProcessingMode,
    pub timeout: Duration,
}

/// Raw result of one tool run, before classification.
#[derive(Debug, Clone, Default)]
pub struct ToolRun {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    /// Adjustments made to the requested options, e.g. flags dropped for the mode.
    pub notes: Vec<String>,
}
