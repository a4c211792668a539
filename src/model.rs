//! Data model for one scraped series: table of contents, extracted text, and assembled output.
//!
//! The ToC parser produces [SeriesToc]; the content extractor turns each [VolumeInfo] into a
//! [VolumeText]; the assembler renders those into [OutputDocument]s. Order in every sequence
//! is reading order and is never changed after construction.

use serde::{Deserialize, Serialize};

/// One fetchable chapter as listed in the table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub title: String,
    /// Absolute URL, resolved against the ToC page.
    pub url: String,
}

/// One volume heading and its chapters in ToC order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub title: String,
    pub chapters: Vec<ChapterRef>,
}

impl VolumeInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            chapters: Vec::new(),
        }
    }
}

/// Extracted chapter. `body` is normalized Markdown-ready prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterText {
    pub title: String,
    pub body: String,
}

/// Extracted volume; mirrors [VolumeInfo] one chapter for one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeText {
    pub title: String,
    pub chapters: Vec<ChapterText>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub title: String,
    pub author: String,
}

/// Everything read from the table-of-contents page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesToc {
    #[serde(flatten)]
    pub metadata: SeriesMetadata,
    pub volumes: Vec<VolumeInfo>,
}

impl SeriesToc {
    pub fn chapter_count(&self) -> usize {
        self.volumes.iter().map(|v| v.chapters.len()).sum()
    }
}

/// One rendered Markdown file. `filename` has no directory component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDocument {
    pub filename: String,
    pub content: String,
}
