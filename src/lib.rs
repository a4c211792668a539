//! wenkubind: scrape a light novel table of contents and bind it into Markdown, EPUB, or MOBI.

pub mod assemble;
pub mod cli;
pub mod config;
pub mod convert;
pub mod logging;
pub mod model;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use assemble::{assemble, write_documents, AssembleError, AssembleOptions};
pub use convert::{convert, ConvertError, ConvertOptions, OutputFormat};
pub use scraper::{
    fetch_toc, fetch_volumes, ContentOptions, PageSource, PoliteClient, PoliteClientBuilder,
    ScrapeOptions, ScraperError,
};
