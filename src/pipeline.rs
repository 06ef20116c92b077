use crate::{
    config::Config,
    document::Document,
    engine::Engine,
    error::{ConfigError, DocumentError},
    invoker::{self, OutcomeStatus},
    policy::{self, RequestedIntent},
    probe,
    report::{BatchEntry, BatchReport, ReportBuilder},
    util::{now_rfc3339, sha256_hex},
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, info_span, warn};

/// Shared flag for aborting the rest of a batch. Documents already running
/// finish (or hit their timeout); the rest are recorded as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Pipeline<E: Engine> {
    cfg: Config,
    engine: E,
}

impl<E: Engine> Pipeline<E> {
    /// Fails only on configuration problems, before any document is touched.
    pub fn new(cfg: &Config, engine: E) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg: cfg.clone(),
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn run_batch(&self, documents: Vec<Document>, intent: RequestedIntent) -> BatchReport {
        self.run_batch_with_cancel(documents, intent, &CancelToken::new())
    }

    /// Processes every document, in parallel up to `ocr.max_workers`. The
    /// report lists entries in input order whatever order they finish in.
    pub fn run_batch_with_cancel(
        &self,
        documents: Vec<Document>,
        intent: RequestedIntent,
        cancel: &CancelToken,
    ) -> BatchReport {
        let started = now_rfc3339();
        let batch_id = self.batch_id(&documents, intent);
        let total = documents.len();
        let workers = self.cfg.ocr.max_workers.min(total).max(1);
        info!(
            "batch {} documents={} workers={} intent={}",
            batch_id, total, workers, intent
        );

        let outputs = output_paths(&self.cfg, &documents);
        // Fallback identity for any slot that never receives a result.
        let sources: Vec<PathBuf> = documents.iter().map(|d| d.path().to_path_buf()).collect();

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, Document, PathBuf)>();
        for (index, (doc, out)) in documents.into_iter().zip(outputs).enumerate() {
            let _ = job_tx.send((index, doc, out));
        }
        drop(job_tx);

        let (res_tx, res_rx) = crossbeam_channel::unbounded::<BatchEntry>();
        let mut builder = ReportBuilder::new(total);

        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let res_tx = res_tx.clone();
                s.spawn(move || {
                    for (index, doc, out) in job_rx.iter() {
                        let entry = if cancel.is_cancelled() {
                            debug!("document {} cancelled before start", index);
                            BatchEntry::failed(index, doc, None, &DocumentError::Cancelled)
                        } else {
                            self.process(index, doc, &out, intent)
                        };
                        if self.cfg.global.stop_on_failure
                            && entry.outcome.status == OutcomeStatus::Failure
                            && !cancel.is_cancelled()
                        {
                            warn!("stop_on_failure: cancelling remaining documents");
                            cancel.cancel();
                        }
                        if res_tx.send(entry).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(res_tx);

            for entry in res_rx.iter() {
                let index = entry.index;
                if !builder.fill(entry) {
                    warn!("duplicate result for document {} ignored", index);
                }
            }
        });

        let (entries, summary) = builder.finish(|i| {
            BatchEntry::failed(
                i,
                Document::new(sources[i].clone()),
                None,
                &DocumentError::ConversionFailure("document was not processed".into()),
            )
        });

        info!(
            "batch {} done succeeded={} warned={} skipped={} failed={}",
            batch_id, summary.succeeded, summary.warned, summary.skipped, summary.failed
        );

        BatchReport {
            batch_id,
            intent,
            started,
            finished: now_rfc3339(),
            entries,
            summary,
        }
    }

    /// Probe, select, convert. Every error stays inside the returned entry.
    fn process(
        &self,
        index: usize,
        doc: Document,
        output: &Path,
        intent: RequestedIntent,
    ) -> BatchEntry {
        let span = info_span!("document", index, path = %doc.path().display());
        let _enter = span.enter();

        let report = match probe::probe_document(&doc) {
            Ok(r) => r,
            Err(err) => {
                warn!("probe failed: {err}");
                return BatchEntry::failed(index, doc, None, &err);
            }
        };
        info!(
            "probe pages={} with_text={} without_text={}",
            report.total_pages,
            report.pages_with_text.len(),
            report.pages_without_text.len()
        );

        let decision = match policy::select_mode(&report, intent) {
            Ok(d) => d,
            Err(err) => {
                warn!("{err}");
                return BatchEntry::failed(index, doc, Some(report), &err);
            }
        };
        info!("mode={} reason={:?}", decision.mode, decision.reason);
        for w in &decision.warnings {
            warn!("{w}");
        }

        let outcome = invoker::convert(&self.cfg, &self.engine, &doc, decision.mode, output);
        info!(
            "outcome status={:?} duration_ms={}",
            outcome.status, outcome.duration_ms
        );

        BatchEntry {
            index,
            document: doc,
            probe: Some(report),
            decision: Some(decision),
            outcome,
        }
    }

    fn batch_id(&self, documents: &[Document], intent: RequestedIntent) -> String {
        let mut key = self.cfg.normalized_for_hash();
        key.push_str(&intent.to_string());
        for d in documents {
            key.push('\n');
            key.push_str(&d.path().display().to_string());
        }
        sha256_hex(key.as_bytes())
    }
}

/// Validates `cfg`, then runs the batch.
pub fn run_batch<E: Engine>(
    cfg: &Config,
    engine: E,
    documents: Vec<Document>,
    intent: RequestedIntent,
) -> Result<BatchReport, ConfigError> {
    Ok(Pipeline::new(cfg, engine)?.run_batch(documents, intent))
}

/// One output path per document. An output never lands on any input of the
/// batch; later documents that would collide with an earlier output or an
/// input get `-2`, `-3`, ... appended.
pub fn output_paths(cfg: &Config, documents: &[Document]) -> Vec<PathBuf> {
    let out_dir = (!cfg.output.out_dir.is_empty()).then(|| Path::new(&cfg.output.out_dir));
    let mut taken: HashSet<PathBuf> = documents.iter().map(|d| d.path().to_path_buf()).collect();
    documents
        .iter()
        .map(|d| {
            let base = invoker::default_output_path(d.path(), out_dir, &cfg.output.suffix);
            let mut candidate = base.clone();
            let mut n = 2;
            while !taken.insert(candidate.clone()) {
                let stem = base
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                candidate = base.with_file_name(format!("{stem}-{n}.pdf"));
                n += 1;
            }
            candidate
        })
        .collect()
}
