use crate::{
    document::Document,
    error::{DocumentError, ErrorCategory},
    invoker::{ConversionOutcome, OutcomeStatus},
    policy::{ModeDecision, RequestedIntent},
    probe::TextLayerReport,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    /// Position of the document in the submitted batch.
    pub index: usize,
    pub document: Document,
    pub probe: Option<TextLayerReport>,
    pub decision: Option<ModeDecision>,
    pub outcome: ConversionOutcome,
}

impl BatchEntry {
    pub fn failed(
        index: usize,
        document: Document,
        probe: Option<TextLayerReport>,
        err: &DocumentError,
    ) -> Self {
        Self {
            index,
            document,
            probe,
            decision: None,
            outcome: ConversionOutcome::from_error(err),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Includes documents resolved to `Skip`.
    pub succeeded: usize,
    pub warned: usize,
    /// Cancelled before launch.
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let mut s = BatchSummary::default();
        for e in entries {
            match (e.outcome.status, e.outcome.error) {
                (OutcomeStatus::Success, _) => s.succeeded += 1,
                (OutcomeStatus::Warning, _) => s.warned += 1,
                (OutcomeStatus::Failure, Some(ErrorCategory::Cancelled)) => s.skipped += 1,
                (OutcomeStatus::Failure, _) => s.failed += 1,
            }
        }
        s
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.warned + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub intent: RequestedIntent,
    pub started: String,
    pub finished: String,
    /// In input order.
    pub entries: Vec<BatchEntry>,
    pub summary: BatchSummary,
}

/// Collects entries into the slot matching their input index, once each.
pub struct ReportBuilder {
    slots: Vec<Option<BatchEntry>>,
}

impl ReportBuilder {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Returns false if the slot is out of range or already filled.
    pub fn fill(&mut self, entry: BatchEntry) -> bool {
        match self.slots.get_mut(entry.index) {
            Some(slot @ None) => {
                *slot = Some(entry);
                true
            }
            _ => false,
        }
    }

    /// Any slot still empty is filled by `missing(index)`.
    pub fn finish(
        self,
        missing: impl Fn(usize) -> BatchEntry,
    ) -> (Vec<BatchEntry>, BatchSummary) {
        let entries: Vec<BatchEntry> = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.unwrap_or_else(|| missing(i)))
            .collect();
        let summary = BatchSummary::from_entries(&entries);
        (entries, summary)
    }
}
