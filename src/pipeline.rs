use crate::config::{BrowserEngine, CrawlOptions};
use crate::report::write_line;
use crate::setup::BrowserRuntime;
use crate::{crawler, persist, report, setup};
use crossterm::style::Stylize;
use std::future::Future;
use std::io::Write;
use time::OffsetDateTime;

/// One full invocation: environment check, output directory, crawl, report
/// and persistence. `ensure` is the environment check, normally
/// [`setup::ensure_browser`].
///
/// Returns whether the crawl succeeded. Nothing is created or fetched when
/// the environment check fails.
pub async fn run<W, F, Fut>(
    options: &CrawlOptions,
    out: &mut W,
    ensure: F,
) -> anyhow::Result<bool>
where
    W: Write,
    F: FnOnce(BrowserEngine) -> Fut,
    Fut: Future<Output = setup::Result<BrowserRuntime>>,
{
    let runtime = match ensure(options.browser).await {
        Ok(runtime) => runtime,
        Err(e) => {
            write_line(out, format!("✗ {e}").red());
            write_line(out, "✗ Cannot proceed without a working browser".red());
            return Ok(false);
        }
    };

    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let output_dir = persist::create_output_directory(&options.output_dir, &options.url, now)?;
    write_line(
        out,
        format_args!("Output directory: {}", output_dir.display().to_string().blue()),
    );

    write_line(out, format!("Crawling {}...", options.url).cyan());
    let result = crawler::perform_crawl(options, &runtime).await;

    report::display_results(out, &result, options);
    persist::save_results(&result, &output_dir, options, out).await;

    Ok(result.success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::RESULT_FILE;
    use crate::setup::SetupError;
    use serde_json::Value;

    #[tokio::test]
    async fn environment_failure_stops_before_any_work() {
        let base = tempfile::tempdir().unwrap();
        let mut options = CrawlOptions::new("https://example.com");
        options.output_dir = base.path().join("outputs");

        let mut out: Vec<u8> = Vec::new();
        let succeeded = run(&options, &mut out, |engine| async move {
            Err::<BrowserRuntime, _>(SetupError::UnsupportedEngine(engine))
        })
        .await
        .unwrap();
        let console = String::from_utf8(out).unwrap();

        assert!(!succeeded);
        assert!(!options.output_dir.exists());
        assert!(console.contains("Cannot proceed without a working browser"));
        assert!(!console.contains("Crawling"));
    }

    #[tokio::test]
    async fn failed_crawl_is_reported_and_saved() {
        let base = tempfile::tempdir().unwrap();
        let mut options = CrawlOptions::new("not a url");
        options.output_dir = base.path().to_path_buf();
        options.write_files = true;

        let mut out: Vec<u8> = Vec::new();
        let succeeded = run(&options, &mut out, |_| async {
            Ok::<_, SetupError>(BrowserRuntime { executable: None })
        })
        .await
        .unwrap();
        let console = String::from_utf8(out).unwrap();

        assert!(!succeeded);
        assert!(console.contains("Crawling not a url..."));
        assert!(console.contains("Error: UrlError"));

        let dirs: Vec<_> = std::fs::read_dir(base.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].file_name().unwrap().to_string_lossy().starts_with("crawl_"));

        let files: Vec<_> = std::fs::read_dir(&dirs[0]).unwrap().collect();
        assert_eq!(files.len(), 1);
        let saved = std::fs::read_to_string(dirs[0].join(RESULT_FILE)).unwrap();
        let saved: Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(saved["success"], false);
    }
}
