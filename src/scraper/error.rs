//! Shared error type for fetching and parsing. Every variant is fatal for the run.

use thiserror::Error;

/// Scraper error for HTTP, charset decoding, page structure, and embedded images.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Giving up on {url} after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    // Decoding
    #[error("Could not decode page at {url} with any supported character set.")]
    Decode { url: String },

    // Structure
    #[error("Table of contents has no {field} (selector or structure may have changed).")]
    MissingMetadata { field: &'static str },

    #[error("Missing {what} at {url} (selector or structure may have changed).")]
    MissingMarkup { what: &'static str, url: String },

    #[error("Chapter '{title}' is listed before any volume heading.")]
    ChapterBeforeVolume { title: String },

    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    // Resources
    #[error("Cannot guess type for picture '{url}'.")]
    PictureTypeUnknown { url: String },
}
