pub mod ocrmypdf;
pub mod types;

use anyhow::Result;

pub use types::{ConvertIn, ToolDiag, ToolRun};

/// The external OCR/archival tool. `convert` only fails when the tool could
/// not be run at all; exit codes and timeouts are reported in [`ToolRun`].
pub trait Engine: Send + Sync {
    fn doctor(&self) -> Result<ToolDiag>;
    fn convert(&self, req: &ConvertIn) -> Result<ToolRun>;
}
