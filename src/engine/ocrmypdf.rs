use super::{Engine, types::*};
use crate::{config::Config, policy::ProcessingMode};
use anyhow::{Context, Result, anyhow, bail};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DOCTOR_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs `ocrmypdf` (or a compatible command line) as a child process.
pub struct OcrmypdfEngine {
    cfg: Config,
    exe: PathBuf,
}

impl OcrmypdfEngine {
    pub fn new(cfg: &Config) -> Self {
        Self {
            cfg: cfg.clone(),
            exe: expand_tilde(cfg.tool.exe.trim()),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.cfg.tool.pre_args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.cfg.tool.env {
            cmd.env(k, v);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout also takes down tesseract/ghostscript children.
            cmd.process_group(0);
        }
        cmd
    }
}

impl Engine for OcrmypdfEngine {
    fn doctor(&self) -> Result<ToolDiag> {
        let mut cmd = self.command();
        cmd.arg("--version");
        let exe = self.exe.display().to_string();
        let diag = match run_with_timeout(cmd, DOCTOR_TIMEOUT) {
            Ok(out) if out.timed_out => ToolDiag {
                exe,
                version: None,
                ok: false,
                error: Some("timeout".into()),
            },
            Ok(out) if out.status.is_some_and(|s| s.success()) => ToolDiag {
                exe,
                version: Some(String::from_utf8_lossy(&out.stdout).trim().to_string()),
                ok: true,
                error: None,
            },
            Ok(out) => ToolDiag {
                exe,
                version: None,
                ok: false,
                error: Some(String::from_utf8_lossy(&out.stderr).trim().to_string()),
            },
            Err(err) => ToolDiag {
                exe,
                version: None,
                ok: false,
                error: Some(format!("{err:#}")),
            },
        };
        Ok(diag)
    }

    fn convert(&self, req: &ConvertIn) -> Result<ToolRun> {
        let (args, notes) = build_args(&self.cfg, req)?;
        for note in &notes {
            warn!("{note}");
        }

        let mut cmd = self.command();
        cmd.args(&args);
        debug!(
            "tool run {} {:?} timeout={:?}",
            self.exe.display(),
            args,
            req.timeout
        );

        let started = Instant::now();
        let out = run_with_timeout(cmd, req.timeout)
            .with_context(|| format!("running {}", self.exe.display()))?;
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if !stderr.trim().is_empty() {
            debug!("tool stderr {}: {}", req.input_pdf.display(), stderr.trim());
        }

        Ok(ToolRun {
            exit_code: out.status.and_then(|s| s.code()),
            stderr,
            timed_out: out.timed_out,
            elapsed_ms: started.elapsed().as_millis() as u64,
            notes,
        })
    }
}

pub fn mode_flag(mode: ProcessingMode) -> Option<&'static str> {
    match mode {
        ProcessingMode::Skip => None,
        ProcessingMode::OcrMissingOnly => Some("--skip-text"),
        ProcessingMode::ForceOcrAll => Some("--force-ocr"),
        ProcessingMode::RedoOcr => Some("--redo-ocr"),
    }
}

/// Tool arguments for one conversion, plus notes about options that were
/// dropped because the mode does not accept them.
pub fn build_args(cfg: &Config, req: &ConvertIn) -> Result<(Vec<String>, Vec<String>)> {
    let flag = mode_flag(req.mode)
        .ok_or_else(|| anyhow!("mode {} does not invoke the tool", req.mode))?;
    if cfg.ocr.languages.is_empty() {
        bail!("no OCR languages configured");
    }

    let tool = &cfg.tool;
    let redo = req.mode == ProcessingMode::RedoOcr;
    let mut notes = Vec::new();
    let mut args = vec![flag.to_string()];

    args.push("-l".into());
    args.push(cfg.ocr.languages.join("+"));

    if !tool.pages.trim().is_empty() {
        args.push("--pages".into());
        args.push(tool.pages.trim().to_string());
    }
    if tool.rotate_pages {
        args.push("--rotate-pages".into());
    }
    if tool.deskew {
        if redo {
            notes.push("--deskew is not supported with --redo-ocr; dropped".to_string());
        } else {
            args.push("--deskew".into());
        }
    }
    if tool.clean {
        args.push("--clean".into());
    }
    if tool.clean_final {
        if redo {
            notes.push("--clean-final is not supported with --redo-ocr; dropped".to_string());
        } else {
            args.push("--clean-final".into());
        }
    }

    args.push("--output-type".into());
    args.push(tool.output_type.clone());

    if tool.optimize > 0 {
        args.push("--optimize".into());
        args.push(tool.optimize.to_string());
        args.push("--jpeg-quality".into());
        args.push(tool.jpeg_quality.to_string());
        args.push("--png-quality".into());
        args.push(tool.png_quality.to_string());
    }

    for (flag, value) in [
        ("--title", &cfg.metadata.title),
        ("--author", &cfg.metadata.author),
        ("--subject", &cfg.metadata.subject),
        ("--keywords", &cfg.metadata.keywords),
    ] {
        if !value.is_empty() {
            args.push(flag.into());
            args.push(value.clone());
        }
    }

    if tool.jobs > 1 {
        args.push("--jobs".into());
        args.push(tool.jobs.to_string());
    }

    args.push(req.input_pdf.display().to_string());
    args.push(req.output_pdf.display().to_string());
    Ok((args, notes))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

struct RunOutput {
    status: Option<ExitStatus>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    timed_out: bool,
}

/// Owns a spawned child until it has been reaped. Dropping an unreaped guard
/// kills the whole process group and waits, so early returns cannot leak a
/// running process.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn kill_tree(&mut self) {
        self.kill_group();
        let _ = self.child.kill();
    }

    /// Kills whatever is left in the child's process group. Safe to call
    /// after the child itself has been reaped: the group id stays reserved
    /// while any member is alive.
    fn kill_group(&self) {
        #[cfg(unix)]
        {
            let pgid = self.child.id() as libc::pid_t;
            // SAFETY: plain syscall on a process group we created; no memory is shared.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }

    fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().with_context(|| "wait for tool")?;
        self.reaped = true;
        Ok(status)
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        let status = self.child.try_wait().with_context(|| "try_wait")?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill_tree();
            let _ = self.child.wait();
        }
    }
}

fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<RunOutput> {
    let child = cmd.spawn().with_context(|| "spawning tool")?;
    let mut guard = ChildGuard {
        child,
        reaped: false,
    };

    // Drain pipes while waiting so a chatty tool can't block on a full buffer.
    let stdout_thread = drain(guard.child.stdout.take());
    let stderr_thread = drain(guard.child.stderr.take());

    let start = Instant::now();
    let (status, timed_out) = loop {
        if let Some(status) = guard.try_wait()? {
            // Leftover children would hold the pipes open and outlive the run.
            guard.kill_group();
            break (Some(status), false);
        }
        if start.elapsed() > timeout {
            warn!("tool process timed out after {:?}", timeout);
            guard.kill_tree();
            guard.wait()?;
            break (None, true);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_reader(stdout_thread)?;
    let stderr = join_reader(stderr_thread)?;
    Ok(RunOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> JoinHandle<Result<Vec<u8>>> {
    std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            r.read_to_end(&mut buf).with_context(|| "read tool output")?;
        }
        Ok(buf)
    })
}

fn join_reader(handle: JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}
