use crate::config::CrawlOptions;
use crate::result::{
    CrawlResult, FULL_RESULTS_HTML_LIMIT, Links, RESULT_JSON_LIMIT, truncate_str, truncate_strings,
};
use base64::Engine;
use crate::report::write_line;
use crossterm::style::Stylize;
use futures::future;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{info, warn};
use url::Url;

pub const RESULT_FILE: &str = "result.json";
pub const MARKDOWN_FILE: &str = "content.md";
pub const HTML_FILE: &str = "content.html";
pub const SCREENSHOT_FILE: &str = "screenshot.png";
pub const LINKS_FILE: &str = "links.csv";
pub const FULL_RESULTS_FILE: &str = "full_results.json";

const LINKS_HEADER: [&str; 4] = ["type", "href", "text", "domain"];

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O Error: {0}")]
    IO(#[from] std::io::Error),
    #[error("JSON conversion error: {0}")]
    JsonConversionError(#[from] serde_json::Error),
    #[error("Base64Error when decoding screenshot: {0}")]
    Base64Error(#[from] base64::DecodeError),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Time format error: {0}")]
    TimeFormatError(#[from] time::error::Format),
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// First label of the URL host, without a leading `www.`.
pub fn domain_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .map(|host| {
            let host = host.strip_prefix("www.").unwrap_or(host.as_str());
            host.split('.').next().unwrap_or_default().to_string()
        })
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| "crawl".to_string())
}

/// `<domain>_<YYYYMMDD_HHMMSS>` for the given moment.
pub fn output_dir_name(url: &str, at: OffsetDateTime) -> Result<String> {
    let stamp = at.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    Ok(format!("{}_{}", domain_label(url), stamp))
}

/// Creates a fresh run directory under `base`. An existing directory of the
/// same name is never reused; a numeric suffix is added instead.
pub fn create_output_directory(base: &Path, url: &str, at: OffsetDateTime) -> Result<PathBuf> {
    std::fs::create_dir_all(base)?;
    let name = output_dir_name(url, at)?;

    let mut attempt = 0u32;
    loop {
        let candidate = match attempt {
            0 => base.join(&name),
            n => base.join(format!("{name}_{n}")),
        };
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Which artifacts were written and which failed.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<(&'static str, String)>,
}

impl SaveReport {
    fn record<W: Write>(
        &mut self,
        out: &mut W,
        artifact: &'static str,
        outcome: Result<Option<PathBuf>>,
    ) {
        match outcome {
            Ok(Some(path)) => {
                info!("Saved {} to {}", artifact, path.display());
                let line = format!("✓ {artifact} saved to: {}", path.display());
                write_line(out, line.green());
                self.written.push(path);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to save {}: {}", artifact, e);
                write_line(out, format!("✗ Error saving {artifact}: {e}").red());
                self.failures.push((artifact, e.to_string()));
            }
        }
    }
}

#[derive(Serialize)]
struct FullResults<'a> {
    url: &'a str,
    success: bool,
    status_code: Option<u16>,
    timestamp: &'a str,
    html: Option<String>,
    cleaned_html: Option<String>,
    markdown: Option<&'a str>,
    links: Option<&'a Links>,
    media: Option<&'a Map<String, Value>>,
    metadata: Option<&'a Map<String, Value>>,
    screenshot: Option<String>,
    error: Option<&'a str>,
}

impl<'a> FullResults<'a> {
    fn new(result: &'a CrawlResult) -> Self {
        Self {
            url: &result.url,
            success: result.success,
            status_code: result.status_code,
            timestamp: &result.timestamp,
            html: result
                .html
                .as_deref()
                .map(|html| truncate_str(html, FULL_RESULTS_HTML_LIMIT)),
            cleaned_html: result
                .cleaned_html
                .as_deref()
                .map(|html| truncate_str(html, FULL_RESULTS_HTML_LIMIT)),
            markdown: result.markdown.as_deref(),
            links: result.links.as_ref(),
            media: result.media.as_ref(),
            metadata: result.metadata.as_ref(),
            screenshot: result
                .screenshot
                .as_ref()
                .map(|data| {
                    format!("<base64 PNG, {} characters, see {SCREENSHOT_FILE}>", data.len())
                }),
            error: result.error.as_deref(),
        }
    }
}

async fn write_result_json(result: &CrawlResult, dir: &Path) -> Result<Option<PathBuf>> {
    let path = dir.join(RESULT_FILE);
    let value = truncate_strings(&result.to_value(), RESULT_JSON_LIMIT);
    let json = serde_json::to_string_pretty(&value)?;
    tokio::fs::write(&path, json).await?;
    Ok(Some(path))
}

async fn write_text(text: Option<&str>, path: PathBuf) -> Result<Option<PathBuf>> {
    let Some(text) = text else {
        return Ok(None);
    };
    tokio::fs::write(&path, text).await?;
    Ok(Some(path))
}

async fn write_screenshot(screenshot: Option<&str>, dir: &Path) -> Result<Option<PathBuf>> {
    let Some(data) = screenshot else {
        return Ok(None);
    };
    let bytes = base64::engine::general_purpose::STANDARD.decode(data.trim())?;
    let path = dir.join(SCREENSHOT_FILE);
    tokio::fs::write(&path, bytes).await?;
    Ok(Some(path))
}

fn links_csv(links: Option<&Links>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(LINKS_HEADER)?;
    if let Some(links) = links {
        for (kind, link) in links.tagged() {
            writer.write_record([
                kind,
                link.href.as_str(),
                link.text.as_str(),
                link.domain.as_str(),
            ])?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| PersistError::IO(e.into_error()))
}

async fn write_links(links: Option<&Links>, dir: &Path) -> Result<Option<PathBuf>> {
    let path = dir.join(LINKS_FILE);
    let bytes = links_csv(links)?;
    tokio::fs::write(&path, bytes).await?;
    Ok(Some(path))
}

async fn write_full_results(result: &CrawlResult, dir: &Path) -> Result<Option<PathBuf>> {
    let path = dir.join(FULL_RESULTS_FILE);
    let json = serde_json::to_string_pretty(&FullResults::new(result))?;
    tokio::fs::write(&path, json).await?;
    Ok(Some(path))
}

async fn skipped() -> Result<Option<PathBuf>> {
    Ok(None)
}

/// Writes every artifact the options ask for. Each write is attempted on
/// its own; failures are reported to `out`, never raised.
pub async fn save_results<W: Write>(
    result: &CrawlResult,
    dir: &Path,
    options: &CrawlOptions,
    out: &mut W,
) -> SaveReport {
    let mut report = SaveReport::default();

    report.record(out, "results", write_result_json(result, dir).await);

    if !result.success {
        return report;
    }

    let markdown = async {
        if options.write_files {
            write_text(result.markdown.as_deref(), dir.join(MARKDOWN_FILE)).await
        } else {
            skipped().await
        }
    };
    let html = async {
        if options.write_files {
            write_text(result.html.as_deref(), dir.join(HTML_FILE)).await
        } else {
            skipped().await
        }
    };
    let screenshot = async {
        if options.screenshot {
            write_screenshot(result.screenshot.as_deref(), dir).await
        } else {
            skipped().await
        }
    };
    let links = async {
        if options.extract_links {
            write_links(result.links.as_ref(), dir).await
        } else {
            skipped().await
        }
    };
    let full = async {
        if options.all_data {
            write_full_results(result, dir).await
        } else {
            skipped().await
        }
    };

    let (markdown, html, screenshot, links, full) =
        future::join5(markdown, html, screenshot, links, full).await;

    report.record(out, "markdown", markdown);
    report.record(out, "html", html);
    report.record(out, "screenshot", screenshot);
    report.record(out, "links", links);
    report.record(out, "full results", full);

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Link;
    use serde_json::json;
    use std::io;
    use time::macros::datetime;

    fn sample_result() -> CrawlResult {
        CrawlResult::from_raw(
            json!({
                "success": true,
                "url": "https://www.example.com/docs",
                "status_code": 200,
                "html": "<h1>Hello</h1>",
                "markdown": {"text": "# Hello"},
                "screenshot": "iVBORw0KGgo=",
                "links": {
                    "internal": [{"href": "/a", "text": "A", "domain": "example.com"}],
                    "external": [{"href": "http://x.com", "text": "X", "domain": "x.com"}],
                },
            }),
            "https://www.example.com/docs",
        )
    }

    fn all_flags() -> CrawlOptions {
        let mut options = CrawlOptions::new("https://www.example.com/docs");
        options.write_files = true;
        options.screenshot = true;
        options.extract_links = true;
        options.all_data = true;
        options
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn directory_name_uses_first_host_label() {
        let at = datetime!(2024-03-05 07:08:09 UTC);
        assert_eq!(
            output_dir_name("https://www.example.com/a/b?c=d", at).unwrap(),
            "example_20240305_070809"
        );
        assert_eq!(
            output_dir_name("http://docs.rust-lang.org:8080/", at).unwrap(),
            "docs_20240305_070809"
        );
        assert_eq!(output_dir_name("not a url", at).unwrap(), "crawl_20240305_070809");
        assert_eq!(
            output_dir_name("https://www.example.com", at).unwrap(),
            output_dir_name("https://www.example.com", at).unwrap()
        );
    }

    #[test]
    fn directories_are_never_reused() {
        let base = tempfile::tempdir().unwrap();
        let at = datetime!(2024-03-05 07:08:09 UTC);
        let later = datetime!(2024-03-05 07:08:10 UTC);

        let first = create_output_directory(base.path(), "https://example.com", at).unwrap();
        std::fs::write(first.join(RESULT_FILE), "{}").unwrap();
        let same_second = create_output_directory(base.path(), "https://example.com", at).unwrap();
        let next_second =
            create_output_directory(base.path(), "https://example.com", later).unwrap();

        assert_ne!(first, same_second);
        assert!(same_second.ends_with("example_20240305_070809_1"));
        assert!(next_second.ends_with("example_20240305_070810"));
        assert_eq!(std::fs::read_to_string(first.join(RESULT_FILE)).unwrap(), "{}");
    }

    #[tokio::test]
    async fn failed_result_writes_only_the_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut result = sample_result();
        result.success = false;
        result.error = Some("boom".to_string());

        let report = save_results(&result, dir.path(), &all_flags(), &mut io::sink()).await;

        assert_eq!(names(dir.path()), vec![RESULT_FILE]);
        assert_eq!(report.written.len(), 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn links_csv_has_header_and_one_row_per_link() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = CrawlOptions::new("https://example.com");
        options.extract_links = true;

        save_results(&sample_result(), dir.path(), &options, &mut io::sink()).await;

        let mut reader = csv::Reader::from_path(dir.path().join(LINKS_FILE)).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, vec!["type", "href", "text", "domain"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "internal");
        assert_eq!(&rows[0][1], "/a");
        assert_eq!(&rows[1][0], "external");
        assert_eq!(&rows[1][2], "X");

        let raw = std::fs::read_to_string(dir.path().join(LINKS_FILE)).unwrap();
        assert_eq!(raw.lines().count(), 3);
    }

    #[tokio::test]
    async fn bad_screenshot_does_not_stop_other_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut result = sample_result();
        result.screenshot = Some("!!! not base64 !!!".to_string());

        let report = save_results(&result, dir.path(), &all_flags(), &mut io::sink()).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "screenshot");
        assert_eq!(
            names(dir.path()),
            vec![HTML_FILE, MARKDOWN_FILE, FULL_RESULTS_FILE, LINKS_FILE, RESULT_FILE]
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join(MARKDOWN_FILE)).unwrap(),
            "# Hello"
        );
    }

    #[tokio::test]
    async fn everything_is_written_with_all_flags() {
        let dir = tempfile::tempdir().unwrap();
        let mut out: Vec<u8> = Vec::new();
        let report = save_results(&sample_result(), dir.path(), &all_flags(), &mut out).await;

        assert!(report.failures.is_empty());
        assert_eq!(report.written.len(), 6);
        let console = String::from_utf8(out).unwrap();
        assert_eq!(console.matches("saved to: ").count(), 6);
        let png = std::fs::read(dir.path().join(SCREENSHOT_FILE)).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let full = std::fs::read_to_string(dir.path().join(FULL_RESULTS_FILE)).unwrap();
        let full: Value = serde_json::from_str(&full).unwrap();
        assert!(full["screenshot"].as_str().unwrap().starts_with("<base64 PNG"));
        assert_eq!(full["status_code"], 200);
    }

    #[tokio::test]
    async fn closed_console_does_not_stop_writes() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let report = save_results(&sample_result(), dir.path(), &all_flags(), &mut Closed).await;

        assert!(report.failures.is_empty());
        assert_eq!(names(dir.path()).len(), 6);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(HTML_FILE)).unwrap(),
            "<h1>Hello</h1>"
        );
    }

    #[tokio::test]
    async fn result_json_truncates_long_strings() {
        let dir = tempfile::tempdir().unwrap();
        let mut result = sample_result();
        result.html = Some("a".repeat(RESULT_JSON_LIMIT + 10));

        let options = CrawlOptions::new("https://example.com");
        save_results(&result, dir.path(), &options, &mut io::sink()).await;

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(RESULT_FILE)).unwrap())
                .unwrap();
        let html = saved["html"].as_str().unwrap();
        assert!(html.ends_with("... (truncated)"));
        assert_eq!(html.len(), RESULT_JSON_LIMIT + "... (truncated)".len());
        assert_eq!(saved["markdown"], "# Hello");
    }

    #[test]
    fn csv_escapes_commas_and_quotes() {
        let links = Links {
            internal: vec![Link {
                href: "/a,b".into(),
                text: "say \"hi\"".into(),
                domain: "example.com".into(),
            }],
            external: vec![],
        };
        let csv = String::from_utf8(links_csv(Some(&links)).unwrap()).unwrap();
        assert_eq!(
            csv,
            "type,href,text,domain\ninternal,\"/a,b\",\"say \"\"hi\"\"\",example.com\n"
        );
    }
}
