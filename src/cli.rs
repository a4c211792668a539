//! CLI parsing and orchestration. Parses args, runs ToC -> chapters -> Markdown -> e-book.
//! Maps errors to exit codes.

use crate::assemble::{assemble, write_documents, AssembleError};
use crate::config::{self, Config, RunOptions};
use crate::convert::{convert, ConvertError, OutputFormat};
use crate::scraper::{fetch_toc, fetch_volumes, ScrapeOptions, ScraperError};
use crate::PoliteClient;
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DELAY_SECS: u64 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_COUNT: u32 = 5;
const DEFAULT_BACKOFF_SECS: [u64; 4] = [1, 2, 4, 8];

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Assemble(#[from] AssembleError),

    #[error("{0}")]
    Convert(#[from] ConvertError),

    #[error("Failed to write table of contents: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Scraper(_) => 2,
            CliRunError::Assemble(_) | CliRunError::Convert(_) | CliRunError::Json(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "wenkubind")]
#[command(about = "Scrape a light novel table of contents and bind it into Markdown, EPUB, or MOBI")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, fetch_images, trim_leading_whitespace, paragraph_split, separate_volumes, series_name_in_filename, format, cover, proxy_host, proxy_port, pandoc_path, kindlegen_path) are read from ./wenkubind.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Table-of-contents URL (the index page listing volumes and chapters).
    pub url: String,

    /// Output directory. Default: ./output.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output format: markdown, epub (via pandoc), or mobi (via pandoc and kindlegen).
    #[arg(long, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    /// Do not download illustrations.
    #[arg(long)]
    pub no_images: bool,

    /// Strip indentation and surrounding whitespace from every paragraph.
    #[arg(long)]
    pub trim_indent: bool,

    /// Separate paragraphs with blank lines instead of hard line breaks.
    #[arg(long)]
    pub paragraph_split: bool,

    /// Write the whole series into one file instead of one file per volume.
    #[arg(long)]
    pub combined: bool,

    /// Do not prefix per-volume filenames with the series title.
    #[arg(long)]
    pub no_series_prefix: bool,

    /// Cover image for EPUB/MOBI output.
    #[arg(long)]
    pub cover: Option<PathBuf>,

    /// HTTP proxy host (requires --proxy-port).
    #[arg(long)]
    pub proxy_host: Option<String>,

    /// HTTP proxy port (requires --proxy-host).
    #[arg(long)]
    pub proxy_port: Option<u16>,

    /// pandoc executable (default: pandoc on PATH).
    #[arg(long)]
    pub pandoc: Option<PathBuf>,

    /// kindlegen executable (default: kindlegen on PATH).
    #[arg(long)]
    pub kindlegen: Option<PathBuf>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain and debug logs.
    #[arg(long)]
    pub verbose: bool,

    /// Fetch the table of contents only and print it as JSON without writing files.
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Default log filter when RUST_LOG is unset.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "markdown" | "md" => Ok(OutputFormat::Markdown),
        "epub" => Ok(OutputFormat::Epub),
        "mobi" | "kindle" => Ok(OutputFormat::Mobi),
        _ => Err(format!(
            "Invalid format value: '{}'. Use markdown, epub, or mobi.",
            s
        )),
    }
}

/// A flag that flips a default wins; otherwise the config key, otherwise the default.
fn flag_or(flag_set: bool, flag_value: bool, config: Option<bool>, default: bool) -> bool {
    if flag_set {
        flag_value
    } else {
        config.unwrap_or(default)
    }
}

/// Merge CLI flags, config file, and defaults into one options value.
pub fn resolve_options(args: &Args, config: Option<&Config>) -> Result<RunOptions, CliRunError> {
    let defaults = RunOptions::default();

    let format = match (args.format, config.and_then(|c| c.format.as_deref())) {
        (Some(f), _) => f,
        (None, Some(s)) => parse_format(s).map_err(CliRunError::InvalidInput)?,
        (None, None) => defaults.format,
    };

    let proxy_host = args
        .proxy_host
        .clone()
        .or_else(|| config.and_then(|c| c.proxy_host.clone()));
    let proxy_port = args.proxy_port.or_else(|| config.and_then(|c| c.proxy_port));
    let proxy = match (proxy_host, proxy_port) {
        (Some(host), Some(port)) => Some((host, port)),
        (None, None) => None,
        _ => {
            return Err(CliRunError::InvalidInput(
                "Proxy host and proxy port must be set together.".to_string(),
            ))
        }
    };

    let cover = args
        .cover
        .clone()
        .or_else(|| config.and_then(|c| c.cover.clone()));
    if let Some(ref path) = cover {
        if format == OutputFormat::Markdown {
            tracing::warn!(cover = %path.display(), "cover image is only used for e-book output");
        } else if !path.is_file() {
            return Err(CliRunError::InvalidInput(format!(
                "Cover image not found: {}",
                path.display()
            )));
        }
    }

    Ok(RunOptions {
        fetch_images: flag_or(
            args.no_images,
            false,
            config.and_then(|c| c.fetch_images),
            defaults.fetch_images,
        ),
        trim_leading_whitespace: flag_or(
            args.trim_indent,
            true,
            config.and_then(|c| c.trim_leading_whitespace),
            defaults.trim_leading_whitespace,
        ),
        paragraph_split: flag_or(
            args.paragraph_split,
            true,
            config.and_then(|c| c.paragraph_split),
            defaults.paragraph_split,
        ),
        separate_volumes: flag_or(
            args.combined,
            false,
            config.and_then(|c| c.separate_volumes),
            defaults.separate_volumes,
        ),
        series_name_in_filename: flag_or(
            args.no_series_prefix,
            false,
            config.and_then(|c| c.series_name_in_filename),
            defaults.series_name_in_filename,
        ),
        format,
        cover,
        proxy,
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| config.and_then(|c| c.output_dir.clone()))
            .unwrap_or(defaults.output_dir),
        pandoc: args
            .pandoc
            .clone()
            .or_else(|| config.and_then(|c| c.pandoc_path.clone()))
            .unwrap_or(defaults.pandoc),
        kindlegen: args
            .kindlegen
            .clone()
            .or_else(|| config.and_then(|c| c.kindlegen_path.clone()))
            .unwrap_or(defaults.kindlegen),
    })
}

fn build_client(
    args: &Args,
    config: Option<&Config>,
    options: &RunOptions,
) -> Result<PoliteClient, CliRunError> {
    let delay_secs = args
        .delay
        .or_else(|| config.and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| config.and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let retry_count = config
        .and_then(|c| c.retry_count)
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1);
    let retry_backoff_secs = config
        .and_then(|c| c.retry_backoff_secs.clone())
        .unwrap_or_else(|| DEFAULT_BACKOFF_SECS.to_vec());
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()));

    let mut builder = PoliteClient::builder()
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs)
        .retry_count(retry_count)
        .retry_backoff_secs(retry_backoff_secs);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    if let Some((host, port)) = &options.proxy {
        builder = builder.proxy(host.clone(), *port);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn progress_bar(total: u64) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(total);
    if let Ok(style) = indicatif::ProgressStyle::default_bar()
        .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
    {
        bar.set_style(
            style
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let toc_url = args.url.trim();
    reqwest::Url::parse(toc_url).map_err(|e| {
        CliRunError::InvalidInput(format!(
            "Expected a table-of-contents URL, e.g. https://www.wenku8.net/novel/2/2231/index.htm. Invalid: {}: {}",
            toc_url, e
        ))
    })?;

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let options = resolve_options(args, config.as_ref())?;
    let mut client = build_client(args, config.as_ref(), &options)?;

    let toc = fetch_toc(&mut client, toc_url)?;

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&toc)?);
        eprintln!(
            "Volumes: {}, chapters: {}",
            toc.volumes.len(),
            toc.chapter_count()
        );
        return Ok(());
    }

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| progress_bar(total as u64));
        pb.set_position(n as u64);
        pb.set_message(format!("Fetching chapter {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(u32, u32)> = if args.quiet { None } else { Some(&progress_cb) };

    let scrape_opts = ScrapeOptions {
        content: options.content(),
        progress,
    };
    let texts = fetch_volumes(&mut client, &toc.volumes, &scrape_opts);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    let texts = texts?;

    let documents = assemble(&texts, &toc.metadata, &options.assemble())?;
    let markdown = write_documents(&documents, &options.output_dir)?;
    let outputs = convert(
        options.format,
        &markdown,
        &toc.metadata.author,
        &options.convert(),
    )?;

    if !args.quiet {
        for name in &outputs {
            eprintln!("Wrote {}", options.output_dir.join(name).display());
        }
    }
    Ok(())
}
