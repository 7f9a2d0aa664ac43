use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_OUTPUT_DIR: &str = "crawl_outputs";
pub const DEFAULT_SCREENSHOT_WAIT_SECS: f64 = 2.0;
pub const MAX_SCREENSHOT_WAIT_SECS: f64 = 300.0;

/// Parses a screenshot wait given in seconds: finite and within
/// `0..=MAX_SCREENSHOT_WAIT_SECS`.
pub fn parse_wait_seconds(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("`{value}` is not a number of seconds: {e}"))?;
    if seconds.is_finite() && (0.0..=MAX_SCREENSHOT_WAIT_SECS).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(format!("expected seconds between 0 and {MAX_SCREENSHOT_WAIT_SECS}, got `{value}`"))
    }
}

/// Browser engine requested on the command line.
///
/// Only Chromium can be driven through the DevTools protocol; the other
/// engines are accepted so that the environment check can reject them with
/// a clear message instead of a parse error.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum BrowserEngine {
    Chromium,
    Firefox,
    Webkit,
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        };
        f.write_str(name)
    }
}

/// Everything one invocation needs, assembled once from the CLI.
#[derive(Clone, Debug)]
pub struct CrawlOptions {
    pub url: String,
    pub browser: BrowserEngine,
    pub headless: bool,
    pub screenshot: bool,
    pub screenshot_wait_for: f64,
    pub wait_for_images: bool,
    pub extract_links: bool,
    pub magic_mode: bool,
    pub output_dir: PathBuf,
    pub write_files: bool,
    pub all_data: bool,
    pub debug: bool,
}

impl CrawlOptions {
    /// Options with every flag off, for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            browser: BrowserEngine::Chromium,
            headless: true,
            screenshot: false,
            screenshot_wait_for: DEFAULT_SCREENSHOT_WAIT_SECS,
            wait_for_images: false,
            extract_links: false,
            magic_mode: false,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            write_files: false,
            all_data: false,
            debug: false,
        }
    }
}
