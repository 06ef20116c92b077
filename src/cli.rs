use crate::{
    config::{Config, Preset},
    document::Document,
    engine::{Engine, ocrmypdf::OcrmypdfEngine},
    pipeline::Pipeline,
    policy::{self, RequestedIntent},
    probe,
    report::BatchReport,
    util::{collect_inputs, ensure_dir},
};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ocr-triage")]
#[command(about = "Text-layer aware batch OCR for archival PDFs (probe + mode policy + ocrmypdf)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./ocr-triage.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the OCR tool can be run.
    Doctor {},
    /// Report text layers and the mode each input would get, without converting.
    Probe {
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        #[arg(long, value_enum)]
        intent: Option<RequestedIntent>,
    },
    /// Convert a batch of PDFs.
    Run(RunArgs),
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    /// PDF files or directories of PDFs.
    #[arg(long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub intent: Option<RequestedIntent>,
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,
    /// OCR language, repeatable and ordered (e.g. --lang eng --lang chi_sim).
    #[arg(long = "lang")]
    pub languages: Vec<String>,
    /// Documents converted in parallel (`ocr.max_workers`). Threads inside
    /// each ocrmypdf run are `tool.jobs` in the config file.
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    #[arg(long)]
    pub stop_on_failure: bool,
    /// Where to write the report JSON (default: <out_dir>/report.json).
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let mut cfg = match &cfg_path {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };

    if let Command::Run(run_args) = &args.cmd {
        apply_overrides(&mut cfg, run_args);
    }

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
    if let Some(p) = &cfg_path {
        info!("config {}", p.display());
    }

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Probe { input, intent } => probe_inputs(&cfg, input, *intent),
        Command::Run(run_args) => run(&cfg, run_args),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("ocr-triage.toml");
    default.exists().then_some(default)
}

/// Preset first, then explicit flags on top.
pub fn apply_overrides(cfg: &mut Config, args: &RunArgs) {
    if let Some(preset) = args.preset {
        cfg.apply_preset(preset);
    }
    if let Some(intent) = args.intent {
        cfg.global.default_intent = intent;
    }
    if !args.languages.is_empty() {
        cfg.ocr.languages = args.languages.clone();
    }
    if let Some(workers) = args.workers {
        cfg.ocr.max_workers = workers;
    }
    if let Some(secs) = args.timeout_secs {
        cfg.ocr.timeout_seconds = secs;
    }
    if args.stop_on_failure {
        cfg.global.stop_on_failure = true;
    }
    if let Some(dir) = &args.out_dir {
        cfg.output.out_dir = dir.display().to_string();
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    let dir = if cfg.output.out_dir.is_empty() {
        PathBuf::from(".")
    } else {
        PathBuf::from(&cfg.output.out_dir)
    };
    Some(dir.join("ocr-triage.log"))
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = OcrmypdfEngine::new(cfg);
    let diag = engine.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok {
        bail!("{} is not usable", diag.exe);
    }
    Ok(())
}

fn probe_inputs(cfg: &Config, inputs: &[PathBuf], intent: Option<RequestedIntent>) -> Result<()> {
    let intent = intent.unwrap_or(cfg.global.default_intent);
    let mut rows = Vec::new();
    for path in collect_inputs(inputs)? {
        let doc = Document::new(&path);
        let row = match probe::probe_document(&doc) {
            Ok(report) => match policy::select_mode(&report, intent) {
                Ok(decision) => serde_json::json!({
                    "input": path,
                    "probe": report,
                    "decision": decision,
                    "guidance": decision.reason.message(),
                }),
                Err(err) => serde_json::json!({
                    "input": path,
                    "probe": report,
                    "error": err.category(),
                    "message": err.to_string(),
                }),
            },
            Err(err) => serde_json::json!({
                "input": path,
                "error": err.category(),
                "message": err.to_string(),
            }),
        };
        rows.push(row);
    }
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn run(cfg: &Config, args: &RunArgs) -> Result<()> {
    // Fatal configuration problems surface here, before any document is read.
    cfg.validate()?;

    let inputs = collect_inputs(&args.input)?;
    if inputs.is_empty() {
        bail!("no input PDFs found");
    }
    if !cfg.output.out_dir.is_empty() {
        ensure_dir(Path::new(&cfg.output.out_dir))?;
    }

    let engine = OcrmypdfEngine::new(cfg);
    let pipeline = Pipeline::new(cfg, engine)?;
    let documents: Vec<Document> = inputs.into_iter().map(Document::new).collect();
    let report = pipeline.run_batch(documents, cfg.global.default_intent);

    if let Some(path) = report_path(cfg, args) {
        write_report(&report, &path)?;
        info!("report {}", path.display());
    }

    if cfg.global.print_summary {
        let rows: Vec<serde_json::Value> = report
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "input": e.document.path(),
                    "mode": e.decision.as_ref().map(|d| d.mode),
                    "status": e.outcome.status,
                    "output": e.outcome.output_path,
                    "message": e.outcome.message,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "batch_id": report.batch_id,
                "summary": report.summary,
                "documents": rows,
            }))?
        );
    }

    if report.summary.failed > 0 || report.summary.skipped > 0 {
        warn!(
            "{} failed, {} cancelled",
            report.summary.failed, report.summary.skipped
        );
        bail!(
            "{} of {} document(s) did not complete",
            report.summary.failed + report.summary.skipped,
            report.summary.total()
        );
    }
    Ok(())
}

fn report_path(cfg: &Config, args: &RunArgs) -> Option<PathBuf> {
    if let Some(p) = &args.report {
        return Some(p.clone());
    }
    if !cfg.output.write_report_json || cfg.output.out_dir.is_empty() {
        return None;
    }
    Some(Path::new(&cfg.output.out_dir).join(&cfg.output.report_filename))
}

fn write_report(report: &BatchReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("writing report: {}", path.display()))
}
