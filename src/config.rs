use crate::{error::ConfigError, policy::RequestedIntent};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

pub const OUTPUT_TYPES: &[&str] = &["pdfa", "pdf", "pdfa-1", "pdfa-2", "pdfa-3"];
pub const MAX_WORKERS: usize = 256;

static LANGUAGE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{3}(_[a-z]+)?$").expect("language code pattern should compile")
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub ocr: Ocr,
    #[serde(default)]
    pub tool: Tool,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.ocr.timeout_seconds)
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.ocr.max_workers == 0 || self.ocr.max_workers > MAX_WORKERS {
            problems.push(format!(
                "ocr.max_workers must be within 1-{MAX_WORKERS} (got {})",
                self.ocr.max_workers
            ));
        }
        if self.ocr.timeout_seconds == 0 {
            problems.push("ocr.timeout_seconds must be greater than zero".to_string());
        }
        if self.ocr.languages.is_empty() {
            problems.push("ocr.languages must name at least one language".to_string());
        }
        for lang in &self.ocr.languages {
            if !valid_language(lang) {
                problems.push(format!("invalid language code: {lang:?}"));
            }
        }

        if self.tool.exe.trim().is_empty() {
            problems.push("tool.exe must not be empty".to_string());
        }
        if !OUTPUT_TYPES.contains(&self.tool.output_type.as_str()) {
            problems.push(format!(
                "tool.output_type must be one of {:?} (got {:?})",
                OUTPUT_TYPES, self.tool.output_type
            ));
        }
        if self.tool.optimize > 3 {
            problems.push(format!(
                "tool.optimize must be within 0-3 (got {})",
                self.tool.optimize
            ));
        }
        for (name, q) in [
            ("tool.jpeg_quality", self.tool.jpeg_quality),
            ("tool.png_quality", self.tool.png_quality),
        ] {
            if !(1..=100).contains(&q) {
                problems.push(format!("{name} must be within 1-100 (got {q})"));
            }
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if self.tool.jobs == 0 || self.tool.jobs > cpus {
            problems.push(format!(
                "tool.jobs must be within 1-{cpus} (got {})",
                self.tool.jobs
            ));
        }

        if self.output.suffix.is_empty() {
            problems.push("output.suffix must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }

    pub fn apply_preset(&mut self, preset: Preset) {
        let chi = || vec!["chi_sim".to_string()];
        self.tool.output_type = "pdfa".into();
        match preset {
            Preset::DocumentScan => {
                self.ocr.languages = chi();
                self.tool.deskew = true;
                self.tool.clean = true;
                self.tool.optimize = 2;
            }
            Preset::BookScan => {
                self.ocr.languages = chi();
                self.tool.deskew = true;
                self.tool.clean = true;
                self.tool.rotate_pages = true;
                self.tool.optimize = 3;
            }
            Preset::English => {
                self.ocr.languages = vec!["eng".into()];
                self.tool.optimize = 1;
            }
            Preset::MixedLanguage => {
                self.ocr.languages = vec!["eng".into(), "chi_sim".into()];
                self.tool.optimize = 2;
            }
            Preset::ForceOcr => {
                self.global.default_intent = RequestedIntent::ForceOcr;
                self.ocr.languages = chi();
                self.tool.optimize = 2;
            }
            Preset::SkipText => {
                self.global.default_intent = RequestedIntent::SkipIfTextPresent;
                self.ocr.languages = chi();
                self.tool.optimize = 2;
            }
        }
    }
}

/// Tesseract-style codes such as `eng` or `chi_sim`. Anything else could be
/// read by the tool as a flag.
pub fn valid_language(lang: &str) -> bool {
    LANGUAGE_CODE.is_match(lang)
}

/// Named bundles of settings for common scanning jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    DocumentScan,
    BookScan,
    English,
    MixedLanguage,
    ForceOcr,
    SkipText,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub default_intent: RequestedIntent,
    pub stop_on_failure: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            default_intent: RequestedIntent::AutoRecommend,
            stop_on_failure: false,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ocr {
    pub languages: Vec<String>,
    pub timeout_seconds: u64,
    pub max_workers: usize,
}
impl Default for Ocr {
    fn default() -> Self {
        Self {
            languages: vec!["eng".into()],
            timeout_seconds: 600,
            max_workers: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tool {
    pub exe: String,
    pub pre_args: Vec<String>,
    pub output_type: String,
    pub optimize: u8,
    pub jpeg_quality: u8,
    pub png_quality: u8,
    pub rotate_pages: bool,
    pub deskew: bool,
    pub clean: bool,
    pub clean_final: bool,
    pub pages: String,
    pub jobs: usize,
    pub env: BTreeMap<String, String>,
}
impl Default for Tool {
    fn default() -> Self {
        Self {
            exe: "ocrmypdf".into(),
            pre_args: Vec::new(),
            output_type: "pdfa".into(),
            optimize: 1,
            jpeg_quality: 75,
            png_quality: 75,
            rotate_pages: false,
            deskew: false,
            clean: false,
            clean_final: false,
            pages: "".into(),
            jobs: 1,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub out_dir: String,
    pub suffix: String,
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            out_dir: "".into(),
            suffix: "_ocr".into(),
            write_report_json: true,
            report_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
