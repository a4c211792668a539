//! Chapter content extraction.
//!
//! Two steps: [classify_nodes] turns the children of `div#content` into [ContentNode]s, and
//! [build_body] folds those into one normalized body. Only the first step knows the markup.

use crate::model::{ChapterRef, ChapterText};
use crate::scraper::{parse_selector, PageSource, ScraperError};
use base64::{engine::general_purpose, Engine as _};
use reqwest::Url;
use scraper::{ElementRef, Html, Node};

/// Markdown hard line break: two trailing spaces and a newline.
pub const HARD_BREAK: &str = "  \n";
/// Separator emitted per break in paragraph-split mode.
pub const PARAGRAPH_BREAK: &str = "\n\n";

const CONTENT_SELECTOR: &str = "div#content";

/// Options that shape the extracted body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentOptions {
    /// Fetch illustrations and inline them as base64 data URIs.
    pub fetch_images: bool,
    /// Trim all surrounding whitespace (including indentation) from each text run.
    pub trim_leading_whitespace: bool,
    /// Emit a blank line per source break instead of a coalesced hard break.
    pub paragraph_split: bool,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            fetch_images: true,
            trim_leading_whitespace: false,
            paragraph_split: false,
        }
    }
}

/// One child of the content container, by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    Text(String),
    LineBreak,
    /// Illustration; `href` is as written in the page (may be relative).
    Image { href: String },
    /// Attribution lists, comments, and anything else that is not prose.
    Ignorable,
}

/// Classify the direct children of a content container in document order.
pub fn classify_nodes(container: ElementRef<'_>) -> Vec<ContentNode> {
    container
        .children()
        .map(|child| match child.value() {
            Node::Text(text) => ContentNode::Text(String::from(&**text)),
            Node::Element(_) => match ElementRef::wrap(child) {
                Some(el) => classify_element(el),
                None => ContentNode::Ignorable,
            },
            _ => ContentNode::Ignorable,
        })
        .collect()
}

fn classify_element(el: ElementRef<'_>) -> ContentNode {
    let value = el.value();
    match value.name() {
        "ul" => ContentNode::Ignorable,
        "br" => ContentNode::LineBreak,
        "div" if value.classes().any(|c| c == "divimage") => image_href(el)
            .map(|href| ContentNode::Image { href })
            .unwrap_or(ContentNode::Ignorable),
        _ => ContentNode::Text(el.text().collect()),
    }
}

/// Link target of an illustration block, falling back to the image source.
fn image_href(el: ElementRef<'_>) -> Option<String> {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .find_map(|d| match d.value().name() {
            "a" => d.value().attr("href"),
            "img" => d.value().attr("src"),
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fold classified nodes into a chapter body.
///
/// `fetch_image` receives the raw href and returns the Markdown line to append; it is only
/// called when image fetching is enabled.
pub fn build_body<F>(
    nodes: &[ContentNode],
    options: &ContentOptions,
    mut fetch_image: F,
) -> Result<String, ScraperError>
where
    F: FnMut(&str) -> Result<String, ScraperError>,
{
    let mut body = String::new();
    for node in nodes {
        match node {
            ContentNode::Ignorable => {}
            ContentNode::Image { href } => {
                if options.fetch_images {
                    body.push_str(&fetch_image(href)?);
                }
            }
            ContentNode::LineBreak => {
                if options.paragraph_split {
                    body.push_str(PARAGRAPH_BREAK);
                } else if !body.ends_with(HARD_BREAK) {
                    body.push_str(HARD_BREAK);
                }
            }
            ContentNode::Text(raw) => {
                // Source CR/LF are layout noise; only <br> breaks lines.
                let text = raw.trim_matches(&['\r', '\n'][..]);
                let text = if options.trim_leading_whitespace {
                    text.trim()
                } else {
                    text
                };
                body.push_str(text);
            }
        }
    }
    Ok(finalize_body(&body).to_string())
}

/// Strip trailing whitespace and any leading CR/LF (left by a break that opens the chapter).
pub fn finalize_body(body: &str) -> &str {
    body.trim_end().trim_start_matches(&['\r', '\n'][..])
}

/// Media type of an image from its URL path extension.
pub fn picture_media_type(url: &str) -> Option<&'static str> {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let (_, ext) = path.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "jpe" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

/// Markdown image line with the picture embedded as a data URI.
pub fn embed_picture(media_type: &str, data: &[u8]) -> String {
    format!(
        "![](data:{};base64,{})\n",
        media_type,
        general_purpose::STANDARD.encode(data)
    )
}

/// Fetch one chapter page and extract its body.
pub fn extract_chapter(
    source: &mut dyn PageSource,
    chapter: &ChapterRef,
    options: &ContentOptions,
) -> Result<ChapterText, ScraperError> {
    let doc = source.fetch_page(&chapter.url)?;
    let nodes = content_nodes(&doc, &chapter.url)?;
    let base = Url::parse(&chapter.url).map_err(|e| ScraperError::InvalidUrl {
        input: chapter.url.clone(),
        reason: e.to_string(),
    })?;
    let body = build_body(&nodes, options, |href| {
        let url = base
            .join(href)
            .map_err(|e| ScraperError::InvalidUrl {
                input: href.to_string(),
                reason: e.to_string(),
            })?
            .to_string();
        let media_type =
            picture_media_type(&url).ok_or_else(|| ScraperError::PictureTypeUnknown {
                url: url.clone(),
            })?;
        let data = source.fetch_bytes(&url)?;
        tracing::debug!(url = %url, media_type, len = data.len(), "embedded picture");
        Ok(embed_picture(media_type, &data))
    })?;
    Ok(ChapterText {
        title: chapter.title.clone(),
        body,
    })
}

fn content_nodes(doc: &Html, url: &str) -> Result<Vec<ContentNode>, ScraperError> {
    let sel = parse_selector(CONTENT_SELECTOR)?;
    let container = doc
        .select(&sel)
        .next()
        .ok_or_else(|| ScraperError::MissingMarkup {
            what: "chapter content container",
            url: url.to_string(),
        })?;
    Ok(classify_nodes(container))
}
