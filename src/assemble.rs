//! Document assembly: renders extracted volumes into Markdown documents and writes them.
//!
//! Heading levels depend on two settings. `separate_volumes` picks one document per volume or
//! one for the whole series. `series_heading` reserves the top level for the series title when
//! the Markdown is the final product; e-book conversion takes the title from metadata instead.

use crate::model::{OutputDocument, SeriesMetadata, VolumeText};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Characters that are removed from generated filenames.
pub const FORBIDDEN_FILENAME_CHARS: &str = r#"/\:*?"<>|"#;

/// Deepest heading level Markdown supports.
pub const MAX_HEADING_LEVEL: u8 = 6;

const MARKDOWN_EXT: &str = ".md";

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("Markdown has no level {level} heading (valid levels are 1 to 6).")]
    InvalidHeadingLevel { level: u8 },

    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleOptions {
    /// One document per volume instead of one for the series.
    pub separate_volumes: bool,
    /// Prefix per-volume filenames with the series title.
    pub series_name_in_filename: bool,
    /// Reserve heading level 1 for the series (or, per volume, the volume title).
    pub series_heading: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            separate_volumes: true,
            series_name_in_filename: true,
            series_heading: true,
        }
    }
}

/// Markdown heading prefix (`"## "` for level 2). Levels outside 1..=6 are rejected.
pub fn heading(level: u8) -> Result<String, AssembleError> {
    if level == 0 || level > MAX_HEADING_LEVEL {
        return Err(AssembleError::InvalidHeadingLevel { level });
    }
    Ok(format!("{} ", "#".repeat(level as usize)))
}

/// Remove every forbidden filename character; everything else is kept as-is.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN_FILENAME_CHARS.contains(*c))
        .collect()
}

/// Render all volumes into documents, in volume order.
pub fn assemble(
    volumes: &[VolumeText],
    series: &SeriesMetadata,
    options: &AssembleOptions,
) -> Result<Vec<OutputDocument>, AssembleError> {
    let base: u8 = if options.series_heading { 1 } else { 0 };
    if options.separate_volumes {
        volumes
            .iter()
            .map(|volume| {
                let filename = if options.series_name_in_filename {
                    format!("{} {}", series.title, volume.title)
                } else {
                    volume.title.clone()
                };
                let mut content = String::new();
                if options.series_heading {
                    push_heading(&mut content, base, &volume.title)?;
                }
                render_chapters(&mut content, volume, base + 1)?;
                Ok(OutputDocument {
                    filename: sanitize_filename(&filename) + MARKDOWN_EXT,
                    content,
                })
            })
            .collect()
    } else {
        let mut content = String::new();
        if options.series_heading {
            push_heading(&mut content, base, &series.title)?;
        }
        for volume in volumes {
            content.push('\n');
            push_heading(&mut content, base + 1, &volume.title)?;
            render_chapters(&mut content, volume, base + 2)?;
        }
        Ok(vec![OutputDocument {
            filename: sanitize_filename(&series.title) + MARKDOWN_EXT,
            content,
        }])
    }
}

fn push_heading(out: &mut String, level: u8, title: &str) -> Result<(), AssembleError> {
    out.push_str(&heading(level)?);
    out.push_str(title);
    out.push('\n');
    Ok(())
}

fn render_chapters(out: &mut String, volume: &VolumeText, level: u8) -> Result<(), AssembleError> {
    for chapter in &volume.chapters {
        out.push('\n');
        push_heading(out, level, &chapter.title)?;
        out.push_str(&chapter.body);
        out.push('\n');
    }
    Ok(())
}

/// Write documents into `out_dir`, replacing any file of the same name. Returns the filenames.
///
/// Documents sharing a filename are appended to the first one written in this run.
pub fn write_documents(
    documents: &[OutputDocument],
    out_dir: &Path,
) -> Result<Vec<String>, AssembleError> {
    fs::create_dir_all(out_dir).map_err(|e| AssembleError::Io {
        path: out_dir.to_path_buf(),
        source: e,
    })?;
    let mut written: Vec<String> = Vec::with_capacity(documents.len());
    for doc in documents {
        let path = out_dir.join(&doc.filename);
        let io_err = |e: std::io::Error| AssembleError::Io {
            path: path.clone(),
            source: e,
        };
        if !written.contains(&doc.filename) {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed previous output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(e)),
            }
            written.push(doc.filename.clone());
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        f.write_all(doc.content.as_bytes()).map_err(io_err)?;
        tracing::info!(path = %path.display(), "wrote markdown");
    }
    Ok(written)
}
