use std::collections::HashMap;
use std::fs;

use wenkubind::model::SeriesToc;
use wenkubind::{
    assemble, fetch_toc, fetch_volumes, write_documents, AssembleOptions, ContentOptions,
    PageSource, ScrapeOptions, ScraperError,
};

const TOC_URL: &str = "https://www.example.net/novel/1/1/index.htm";

const TOC_PAGE: &str = r#"<html><body>
<div id="title">轻小说</div>
<div id="info">作者：作者名</div>
<table class="css">
<tr><td class="vcss" colspan="4">第一卷</td></tr>
<tr><td class="ccss"><a href="1.htm">序章</a></td><td class="ccss"><a href="2.htm">第一章</a></td></tr>
<tr><td class="vcss" colspan="4">第二卷</td></tr>
<tr><td class="ccss"><a href="3.htm">终章</a></td></tr>
</table>
</body></html>"#;

#[derive(Default)]
struct Site {
    pages: HashMap<String, Vec<u8>>,
}

impl Site {
    fn with(mut self, path: &str, body: impl Into<Vec<u8>>) -> Self {
        let url = format!("https://www.example.net/novel/1/1/{}", path);
        self.pages.insert(url, body.into());
        self
    }
}

impl PageSource for Site {
    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, ScraperError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScraperError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

fn chapter_page(body: &str) -> String {
    format!(
        r#"<html><body><ul id="contentdp"><li>ad</li></ul><div id="content">{}</div></body></html>"#,
        body
    )
}

fn site() -> Site {
    Site::default()
        .with("index.htm", TOC_PAGE)
        .with("1.htm", chapter_page("First line<br>\r\n<br>\r\nSecond line"))
        .with("2.htm", chapter_page("Only line\r\n"))
        .with("3.htm", chapter_page("Closing<br>\r\n<br>\r\n"))
}

fn scrape(source: &mut Site) -> Result<(SeriesToc, Vec<wenkubind::model::VolumeText>), ScraperError> {
    let toc = fetch_toc(source, TOC_URL)?;
    let opts = ScrapeOptions {
        content: ContentOptions::default(),
        progress: None,
    };
    let texts = fetch_volumes(source, &toc.volumes, &opts)?;
    Ok((toc, texts))
}

#[test]
fn separate_volumes_written_per_volume() -> Result<(), Box<dyn std::error::Error>> {
    let mut source = site();
    let (toc, texts) = scrape(&mut source)?;
    assert_eq!(toc.metadata.title, "轻小说");
    assert_eq!(toc.metadata.author, "作者名");
    assert_eq!(toc.chapter_count(), 3);

    let docs = assemble(&texts, &toc.metadata, &AssembleOptions::default())?;
    let dir = tempfile::tempdir()?;
    let written = write_documents(&docs, dir.path())?;
    assert_eq!(written, vec!["轻小说 第一卷.md", "轻小说 第二卷.md"]);

    let first = fs::read_to_string(dir.path().join("轻小说 第一卷.md"))?;
    assert_eq!(
        first,
        "# 第一卷\n\n## 序章\nFirst line  \nSecond line\n\n## 第一章\nOnly line\n"
    );
    let second = fs::read_to_string(dir.path().join("轻小说 第二卷.md"))?;
    assert_eq!(second, "# 第二卷\n\n## 终章\nClosing\n");
    Ok(())
}

#[test]
fn combined_output_for_ebook_has_no_series_heading() -> Result<(), Box<dyn std::error::Error>> {
    let mut source = site();
    let (toc, texts) = scrape(&mut source)?;
    let options = AssembleOptions {
        separate_volumes: false,
        series_name_in_filename: true,
        series_heading: false,
    };
    let docs = assemble(&texts, &toc.metadata, &options)?;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].filename, "轻小说.md");
    assert_eq!(
        docs[0].content,
        "\n# 第一卷\n\n## 序章\nFirst line  \nSecond line\n\n## 第一章\nOnly line\n\n# 第二卷\n\n## 终章\nClosing\n"
    );
    Ok(())
}

#[test]
fn gbk_encoded_pages_are_decoded() -> Result<(), ScraperError> {
    let (toc_bytes, _, unmappable) = encoding_rs::GBK.encode(TOC_PAGE);
    assert!(!unmappable);
    let mut source = site().with("index.htm", toc_bytes.into_owned());
    let toc = fetch_toc(&mut source, TOC_URL)?;
    assert_eq!(toc.metadata.author, "作者名");
    assert_eq!(toc.volumes[1].title, "第二卷");
    Ok(())
}

#[test]
fn missing_chapter_page_aborts_run() {
    let mut source = site();
    source
        .pages
        .remove("https://www.example.net/novel/1/1/2.htm");
    match scrape(&mut source) {
        Err(ScraperError::HttpStatus { status, url }) => {
            assert_eq!(status, 404);
            assert!(url.ends_with("2.htm"));
        }
        other => panic!("expected HttpStatus, got {:?}", other.map(|_| ())),
    }
}
