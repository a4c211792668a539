//! Fetching and extraction: page source trait, shared client, ToC parser, and chapter content.

mod charset;
mod client;
mod error;

pub mod content;
pub mod toc;

pub use charset::decode_page;
pub use client::{PoliteClient, PoliteClientBuilder};
pub use content::{ContentNode, ContentOptions};
pub use error::ScraperError;

use crate::model::{SeriesToc, VolumeInfo, VolumeText};
use scraper::{Html, Selector};

/// Parse a CSS selector or return an error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::Selector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// Where pages and pictures come from. [PoliteClient] is the network implementation.
pub trait PageSource {
    /// Raw response body for `url`.
    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, ScraperError>;

    /// Fetch `url`, detect its charset, and parse it as HTML.
    fn fetch_page(&mut self, url: &str) -> Result<Html, ScraperError> {
        let bytes = self.fetch_bytes(url)?;
        let text = decode_page(&bytes).ok_or_else(|| ScraperError::Decode {
            url: url.to_string(),
        })?;
        Ok(Html::parse_document(&text))
    }
}

/// Options for a scrape run: content shaping plus an optional progress callback.
pub struct ScrapeOptions<'a> {
    pub content: ContentOptions,
    /// Called before each chapter with (chapters started, total chapters).
    pub progress: Option<&'a dyn Fn(u32, u32)>,
}

/// Fetch and parse the table of contents.
pub fn fetch_toc(source: &mut dyn PageSource, toc_url: &str) -> Result<SeriesToc, ScraperError> {
    let toc_url = toc_url.trim();
    let doc = source.fetch_page(toc_url)?;
    let toc = toc::parse_toc(&doc, toc_url)?;
    tracing::info!(
        series = %toc.metadata.title,
        author = %toc.metadata.author,
        volumes = toc.volumes.len(),
        chapters = toc.chapter_count(),
        "parsed table of contents"
    );
    Ok(toc)
}

/// Extract every chapter of every volume, strictly in order. The first error aborts.
pub fn fetch_volumes(
    source: &mut dyn PageSource,
    volumes: &[VolumeInfo],
    options: &ScrapeOptions<'_>,
) -> Result<Vec<VolumeText>, ScraperError> {
    let total: u32 = volumes.iter().map(|v| v.chapters.len() as u32).sum();
    let mut done = 0u32;
    let mut texts = Vec::with_capacity(volumes.len());
    for volume in volumes {
        // A progress bar owns stderr while it is drawn; keep per-volume lines out of its way.
        if options.progress.is_some() {
            tracing::debug!(volume = %volume.title, chapters = volume.chapters.len(), "fetching volume");
        } else {
            tracing::info!(volume = %volume.title, chapters = volume.chapters.len(), "fetching volume");
        }
        let mut chapters = Vec::with_capacity(volume.chapters.len());
        for chapter in &volume.chapters {
            done += 1;
            if let Some(p) = options.progress {
                p(done, total);
            }
            tracing::debug!(chapter = %chapter.title, url = %chapter.url, "fetching chapter");
            chapters.push(content::extract_chapter(source, chapter, &options.content)?);
        }
        texts.push(VolumeText {
            title: volume.title.clone(),
            chapters,
        });
    }
    Ok(texts)
}
