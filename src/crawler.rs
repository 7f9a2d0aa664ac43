use crate::browser::{Browser, BrowserConfig, BrowserError, RunConfig};
use crate::config::CrawlOptions;
use crate::result::CrawlResult;
use crate::setup::BrowserRuntime;
use serde_json::Value;
use tracing::{error, info};
use url::Url;

fn run_session(
    url: &str,
    browser: &BrowserConfig,
    run: &RunConfig,
) -> Result<Value, BrowserError> {
    let session = Browser::launch(browser)?;
    session.run(url, run)
}

/// Wording shown to the user for a crawl error.
pub fn describe_error(error: &BrowserError) -> String {
    let message = error.to_string();
    let missing_executable = matches!(error, BrowserError::ChromeError(_))
        && (message.contains("Could not auto detect a chrome executable")
            || message.contains("No such file or directory"));

    if missing_executable {
        format!("missing dependency: Chrome/Chromium could not be started ({message})")
    } else {
        message
    }
}

/// Runs one crawl and always returns a result; errors end up in
/// `CrawlResult::error` with `success` set to false.
pub async fn perform_crawl(options: &CrawlOptions, runtime: &BrowserRuntime) -> CrawlResult {
    let url = options.url.clone();
    if let Err(e) = Url::parse(&url) {
        let e = BrowserError::from(e);
        error!("Crawl failed: {}", e);
        return CrawlResult::failed(&url, describe_error(&e));
    }

    let browser = BrowserConfig::from_options(options, runtime);
    let run = RunConfig::from_options(options);

    info!("Starting crawl of {}", url);

    let task_url = url.clone();
    let outcome =
        tokio::task::spawn_blocking(move || run_session(&task_url, &browser, &run)).await;

    match outcome {
        Ok(Ok(raw)) => CrawlResult::from_raw(raw, &url),
        Ok(Err(e)) => {
            error!("Crawl failed: {}", e);
            CrawlResult::failed(&url, describe_error(&e))
        }
        Err(e) => {
            error!("Crawl task failed: {}", e);
            CrawlResult::failed(&url, format!("Task failed: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn launch_failures_read_as_missing_dependency() {
        let error = BrowserError::ChromeError(anyhow::anyhow!(
            "Could not auto detect a chrome executable"
        ));
        assert!(describe_error(&error).starts_with("missing dependency"));

        let other = BrowserError::ChromeError(anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED"));
        assert_eq!(describe_error(&other), "ChromeError: net::ERR_NAME_NOT_RESOLVED");
    }

    #[tokio::test]
    async fn invalid_url_fails_before_launching() {
        let options = CrawlOptions::new("not a url");
        // Launching this would fail with a missing-dependency error instead.
        let runtime = BrowserRuntime {
            executable: Some(PathBuf::from("/nonexistent/chrome")),
        };
        let result = perform_crawl(&options, &runtime).await;

        assert!(!result.success);
        assert_eq!(result.url, "not a url");
        let error = result.error.unwrap();
        assert!(error.starts_with("UrlError"), "{error}");
        assert!(!error.contains("missing dependency"));
    }
}
