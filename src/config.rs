//! Optional config file loading and the resolved run options.
//!
//! Search order: ./wenkubind.toml, then $XDG_CONFIG_HOME/wenkubind/config.toml (or
//! ~/.config/wenkubind/config.toml). CLI flags override config keys; config keys override
//! built-in defaults.

use crate::assemble::AssembleOptions;
use crate::convert::{ConvertOptions, OutputFormat};
use crate::scraper::ContentOptions;
use serde::Deserialize;
use std::path::PathBuf;

/// Default output directory when neither -o nor `output_dir` is set.
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Output directory. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 5).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4, 8]).
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Embed illustrations as base64 (default true).
    pub fetch_images: Option<bool>,
    /// Strip indentation from each paragraph (default false).
    pub trim_leading_whitespace: Option<bool>,
    /// Blank line between paragraphs instead of hard breaks (default false).
    pub paragraph_split: Option<bool>,
    /// One file per volume (default true).
    pub separate_volumes: Option<bool>,
    /// Prefix per-volume filenames with the series title (default true).
    pub series_name_in_filename: Option<bool>,
    /// markdown, epub, or mobi.
    pub format: Option<String>,
    /// Cover image for e-book output.
    pub cover: Option<PathBuf>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub pandoc_path: Option<PathBuf>,
    pub kindlegen_path: Option<PathBuf>,
}

/// Search order: (1) ./wenkubind.toml, (2) $XDG_CONFIG_HOME/wenkubind/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("wenkubind.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("wenkubind").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// Every setting a run needs, resolved once and passed down explicitly.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub fetch_images: bool,
    pub trim_leading_whitespace: bool,
    pub paragraph_split: bool,
    pub separate_volumes: bool,
    pub series_name_in_filename: bool,
    pub format: OutputFormat,
    pub cover: Option<PathBuf>,
    pub proxy: Option<(String, u16)>,
    pub output_dir: PathBuf,
    pub pandoc: PathBuf,
    pub kindlegen: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fetch_images: true,
            trim_leading_whitespace: false,
            paragraph_split: false,
            separate_volumes: true,
            series_name_in_filename: true,
            format: OutputFormat::Markdown,
            cover: None,
            proxy: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            pandoc: PathBuf::from("pandoc"),
            kindlegen: PathBuf::from("kindlegen"),
        }
    }
}

impl RunOptions {
    pub fn content(&self) -> ContentOptions {
        ContentOptions {
            fetch_images: self.fetch_images,
            trim_leading_whitespace: self.trim_leading_whitespace,
            paragraph_split: self.paragraph_split,
        }
    }

    /// Markdown that is the final product gets a series-level heading; e-book input does not.
    pub fn assemble(&self) -> AssembleOptions {
        AssembleOptions {
            separate_volumes: self.separate_volumes,
            series_name_in_filename: self.series_name_in_filename,
            series_heading: self.format == OutputFormat::Markdown,
        }
    }

    pub fn convert(&self) -> ConvertOptions {
        ConvertOptions {
            out_dir: self.output_dir.clone(),
            pandoc: self.pandoc.clone(),
            kindlegen: self.kindlegen.clone(),
            cover: self.cover.clone(),
        }
    }
}
