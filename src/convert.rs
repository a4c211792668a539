//! E-book conversion through external tools: pandoc for EPUB, kindlegen for MOBI.
//!
//! Each stage consumes the files of the previous one and deletes them once every conversion in
//! the stage has succeeded.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Fixed language tag in the embedded metadata.
pub const METADATA_LANGUAGE: &str = "zh-CN";
/// Fixed rights line in the embedded metadata.
pub const METADATA_RIGHTS: &str = "Compiled with wenkubind for personal reading only.";

const METADATA_FILE: &str = ".wenkubind-metadata.xml";

/// Final product of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Epub,
    Mobi,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Epub => "epub",
            OutputFormat::Mobi => "mobi",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Could not run {program}: {source}. Is it installed and on PATH?")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed on {file} ({status}): {stderr}")]
    ToolFailed {
        program: String,
        file: String,
        status: String,
        stderr: String,
    },

    #[error("Conversion I/O error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Tool locations and shared inputs for conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub out_dir: PathBuf,
    pub pandoc: PathBuf,
    pub kindlegen: PathBuf,
    pub cover: Option<PathBuf>,
}

/// Convert written Markdown files to `format`. Returns the final filenames (relative to out_dir).
pub fn convert(
    format: OutputFormat,
    markdown_files: &[String],
    author: &str,
    options: &ConvertOptions,
) -> Result<Vec<String>, ConvertError> {
    if format == OutputFormat::Markdown {
        return Ok(markdown_files.to_vec());
    }
    let epubs = markdown_to_epub(markdown_files, author, options)?;
    remove_files(&options.out_dir, markdown_files)?;
    if format == OutputFormat::Epub {
        return Ok(epubs);
    }
    let mobis = epub_to_mobi(&epubs, options)?;
    remove_files(&options.out_dir, &epubs)?;
    Ok(mobis)
}

/// Dublin Core fragment passed to pandoc via `--epub-metadata`.
pub fn metadata_xml(title: &str, author: &str) -> String {
    format!(
        "<dc:title>{}</dc:title>\n<dc:creator>{}</dc:creator>\n<dc:rights>{}</dc:rights>\n<dc:language>{}</dc:language>",
        xml_escape(title),
        xml_escape(author),
        xml_escape(METADATA_RIGHTS),
        METADATA_LANGUAGE
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Run pandoc once per Markdown file. The book title in the metadata is the file stem.
pub fn markdown_to_epub(
    markdown_files: &[String],
    author: &str,
    options: &ConvertOptions,
) -> Result<Vec<String>, ConvertError> {
    let metadata_path = options.out_dir.join(METADATA_FILE);
    let result = markdown_files
        .iter()
        .map(|md| {
            let stem = file_stem(md);
            let epub = format!("{}.{}", stem, OutputFormat::Epub.extension());
            fs::write(&metadata_path, metadata_xml(stem, author)).map_err(|e| {
                ConvertError::Io {
                    path: metadata_path.clone(),
                    source: e,
                }
            })?;
            let args = pandoc_args(
                &options.out_dir.join(md),
                &options.out_dir.join(&epub),
                &metadata_path,
                options.cover.as_deref(),
            );
            run_tool(&options.pandoc, &args, md)?;
            tracing::info!(file = %epub, "converted to epub");
            Ok(epub)
        })
        .collect::<Result<Vec<_>, ConvertError>>();
    if let Err(e) = fs::remove_file(&metadata_path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %metadata_path.display(), error = %e, "could not remove metadata file");
        }
    }
    result
}

/// Run kindlegen once per EPUB; it writes `X.mobi` next to `X.epub`.
pub fn epub_to_mobi(
    epub_files: &[String],
    options: &ConvertOptions,
) -> Result<Vec<String>, ConvertError> {
    epub_files
        .iter()
        .map(|epub| {
            let args = vec![options.out_dir.join(epub).into_os_string()];
            run_tool(&options.kindlegen, &args, epub)?;
            let mobi = format!("{}.{}", file_stem(epub), OutputFormat::Mobi.extension());
            tracing::info!(file = %mobi, "converted to mobi");
            Ok(mobi)
        })
        .collect()
}

fn pandoc_args(input: &Path, output: &Path, metadata: &Path, cover: Option<&Path>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-s".into(),
        input.as_os_str().to_owned(),
        "-t".into(),
        "epub".into(),
        "-o".into(),
        output.as_os_str().to_owned(),
        "--epub-metadata".into(),
        metadata.as_os_str().to_owned(),
    ];
    if let Some(cover) = cover {
        args.push("--epub-cover-image".into());
        args.push(cover.as_os_str().to_owned());
    }
    args.push("--toc".into());
    args
}

fn run_tool(program: &Path, args: &[OsString], file: &str) -> Result<(), ConvertError> {
    tracing::debug!(program = %program.display(), ?args, "running converter");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ConvertError::Spawn {
            program: program.display().to_string(),
            source: e,
        })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let msg = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(ConvertError::ToolFailed {
        program: program.display().to_string(),
        file: file.to_string(),
        status: output.status.to_string(),
        stderr: msg.trim().to_string(),
    })
}

/// Delete `files` from `dir`. Files that are already gone are ignored.
pub fn remove_files(dir: &Path, files: &[String]) -> Result<(), ConvertError> {
    for f in files {
        let path = dir.join(f);
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed intermediate"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ConvertError::Io { path, source: e }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &Path) -> ConvertOptions {
        ConvertOptions {
            out_dir: dir.to_path_buf(),
            pandoc: PathBuf::from("pandoc"),
            kindlegen: PathBuf::from("kindlegen"),
            cover: None,
        }
    }

    #[test]
    fn metadata_xml_has_fixed_language_and_rights() {
        let xml = metadata_xml("Series Vol <1>", "A & B");
        assert!(xml.contains("<dc:title>Series Vol &lt;1&gt;</dc:title>"));
        assert!(xml.contains("<dc:creator>A &amp; B</dc:creator>"));
        assert!(xml.contains("<dc:language>zh-CN</dc:language>"));
        assert!(xml.contains("<dc:rights>"));
    }

    #[test]
    fn pandoc_args_with_and_without_cover() {
        let plain = pandoc_args(
            Path::new("out/A.md"),
            Path::new("out/A.epub"),
            Path::new("out/meta.xml"),
            None,
        );
        let plain: Vec<String> = plain
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            plain,
            vec![
                "-s",
                "out/A.md",
                "-t",
                "epub",
                "-o",
                "out/A.epub",
                "--epub-metadata",
                "out/meta.xml",
                "--toc"
            ]
        );
        let with_cover = pandoc_args(
            Path::new("A.md"),
            Path::new("A.epub"),
            Path::new("m.xml"),
            Some(Path::new("cover.jpg")),
        );
        let n = with_cover.len();
        assert_eq!(with_cover[n - 3], OsString::from("--epub-cover-image"));
        assert_eq!(with_cover[n - 2], OsString::from("cover.jpg"));
        assert_eq!(with_cover[n - 1], OsString::from("--toc"));
    }

    #[test]
    fn markdown_format_is_a_no_op() -> Result<(), ConvertError> {
        let dir = std::env::temp_dir();
        let files = vec!["X.md".to_string()];
        assert_eq!(
            convert(OutputFormat::Markdown, &files, "a", &options(&dir))?,
            files
        );
        Ok(())
    }

    #[test]
    fn missing_tool_is_spawn_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("A.md"), "# A\n")?;
        let mut opts = options(dir.path());
        opts.pandoc = PathBuf::from("/nonexistent/wenkubind-test/pandoc");
        match convert(OutputFormat::Epub, &["A.md".to_string()], "a", &opts) {
            Err(ConvertError::Spawn { program, .. }) => {
                assert!(program.ends_with("pandoc"));
                // Inputs stay when the stage fails; the metadata file does not.
                assert!(dir.path().join("A.md").exists());
                assert!(!dir.path().join(METADATA_FILE).exists());
                Ok(())
            }
            other => Err(format!("expected Spawn, got {:?}", other).into()),
        }
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_tool_failed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let mut opts = options(dir.path());
        opts.kindlegen = PathBuf::from("false");
        match epub_to_mobi(&["A.epub".to_string()], &opts) {
            Err(ConvertError::ToolFailed { program, file, .. }) => {
                assert_eq!(program, "false");
                assert_eq!(file, "A.epub");
                Ok(())
            }
            other => Err(format!("expected ToolFailed, got {:?}", other).into()),
        }
    }

    #[cfg(unix)]
    #[test]
    fn successful_stage_removes_inputs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("A.md"), "# A\n")?;
        let mut opts = options(dir.path());
        opts.pandoc = PathBuf::from("true");
        let out = convert(OutputFormat::Epub, &["A.md".to_string()], "a", &opts)?;
        assert_eq!(out, vec!["A.epub".to_string()]);
        assert!(!dir.path().join("A.md").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn mobi_run_removes_markdown_and_epub() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        for f in ["A.md", "A.epub", "B.md", "B.epub"] {
            std::fs::write(dir.path().join(f), "x")?;
        }
        let mut opts = options(dir.path());
        opts.pandoc = PathBuf::from("true");
        opts.kindlegen = PathBuf::from("true");
        let files = vec!["A.md".to_string(), "B.md".to_string()];
        let out = convert(OutputFormat::Mobi, &files, "a", &opts)?;
        assert_eq!(out, vec!["A.mobi".to_string(), "B.mobi".to_string()]);
        for f in ["A.md", "A.epub", "B.md", "B.epub"] {
            assert!(!dir.path().join(f).exists(), "{} left behind", f);
        }
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failed_conversion_stops_remaining_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let log = dir.path().join("calls.log");
        // kindlegen is replaced by `sh`, so each EPUB runs as a script that records the call.
        for name in ["A", "B"] {
            std::fs::write(dir.path().join(format!("{}.md", name)), "x")?;
            std::fs::write(
                dir.path().join(format!("{}.epub", name)),
                format!("echo {} >> '{}'\nexit 1\n", name, log.display()),
            )?;
        }
        let mut opts = options(dir.path());
        opts.pandoc = PathBuf::from("true");
        opts.kindlegen = PathBuf::from("sh");
        let files = vec!["A.md".to_string(), "B.md".to_string()];
        match convert(OutputFormat::Mobi, &files, "a", &opts) {
            Err(ConvertError::ToolFailed { file, .. }) => assert_eq!(file, "A.epub"),
            other => return Err(format!("expected ToolFailed, got {:?}", other).into()),
        }
        assert_eq!(std::fs::read_to_string(&log)?, "A\n");
        assert!(dir.path().join("A.epub").exists());
        assert!(dir.path().join("B.epub").exists());
        Ok(())
    }

    #[test]
    fn remove_files_ignores_missing()-> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("here.md"), "x")?;
        remove_files(dir.path(), &["here.md".to_string(), "gone.md".to_string()])?;
        assert!(!dir.path().join("here.md").exists());
        Ok(())
    }

    #[test]
    fn extension_per_format() {
        assert_eq!(OutputFormat::Markdown.extension(), "md");
        assert_eq!(OutputFormat::Epub.extension(), "epub");
        assert_eq!(OutputFormat::Mobi.extension(), "mobi");
    }
}
