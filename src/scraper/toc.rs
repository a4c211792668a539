//! Table-of-contents parser. Reads series title, author, and the volume/chapter listing.
//!
//! The listing is the first `<table>` on the page. Each row is either a volume header (a cell
//! spanning the whole row) or a row of chapter links belonging to the last header seen.

use crate::model::{ChapterRef, SeriesMetadata, SeriesToc, VolumeInfo};
use crate::scraper::{parse_selector, ScraperError};
use reqwest::Url;
use scraper::{ElementRef, Html};

/// Label in front of the author name in `div#info`.
const AUTHOR_LABEL: &str = "作者：";

/// Parse a fetched ToC page. Chapter hrefs are resolved against `toc_url`.
pub fn parse_toc(doc: &Html, toc_url: &str) -> Result<SeriesToc, ScraperError> {
    let base = Url::parse(toc_url).map_err(|e| ScraperError::InvalidUrl {
        input: toc_url.to_string(),
        reason: e.to_string(),
    })?;
    let volumes = parse_volumes(doc, &base)?;
    let metadata = parse_metadata(doc)?;
    Ok(SeriesToc { metadata, volumes })
}

fn parse_volumes(doc: &Html, base: &Url) -> Result<Vec<VolumeInfo>, ScraperError> {
    let table_sel = parse_selector("table")?;
    let row_sel = parse_selector("tr")?;
    let header_sel = parse_selector(r#"td[colspan="4"]"#)?;
    let link_sel = parse_selector("td a")?;

    let table = doc
        .select(&table_sel)
        .next()
        .ok_or_else(|| ScraperError::MissingMarkup {
            what: "chapter table",
            url: base.to_string(),
        })?;

    let mut volumes: Vec<VolumeInfo> = Vec::new();
    for row in table.select(&row_sel) {
        if let Some(header) = row.select(&header_sel).next() {
            volumes.push(VolumeInfo::new(element_text(header).trim()));
            continue;
        }
        for link in row.select(&link_sel) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let title = element_text(link).trim().to_string();
            let url = base
                .join(href.trim())
                .map_err(|e| ScraperError::InvalidUrl {
                    input: href.to_string(),
                    reason: e.to_string(),
                })?
                .to_string();
            let volume = volumes
                .last_mut()
                .ok_or_else(|| ScraperError::ChapterBeforeVolume {
                    title: title.clone(),
                })?;
            volume.chapters.push(ChapterRef { title, url });
        }
    }
    Ok(volumes)
}

fn parse_metadata(doc: &Html) -> Result<SeriesMetadata, ScraperError> {
    let info_sel = parse_selector("div#info")?;
    let title_sel = parse_selector("div#title")?;
    let author = doc
        .select(&info_sel)
        .next()
        .map(element_text)
        .ok_or(ScraperError::MissingMetadata { field: "author" })?;
    let title = doc
        .select(&title_sel)
        .next()
        .map(element_text)
        .ok_or(ScraperError::MissingMetadata { field: "title" })?;
    Ok(SeriesMetadata {
        title: title.trim().to_string(),
        author: strip_author_label(&author),
    })
}

fn strip_author_label(raw: &str) -> String {
    let s = raw.trim();
    s.strip_prefix(AUTHOR_LABEL).unwrap_or(s).trim().to_string()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}
