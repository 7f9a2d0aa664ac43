use crate::config::{CrawlOptions, MAX_SCREENSHOT_WAIT_SECS};
use crate::setup::BrowserRuntime;
use crate::webpage::{WebPage, WebPageError};
use headless_chrome::protocol::cdp::Network::GetResponseBodyReturnObject;
use headless_chrome::protocol::cdp::Network::events::ResponseReceivedEventParams;
use headless_chrome::{LaunchOptions, Tab};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::{ParseError, Url};

/// Desktop user agent presented in magic mode.
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36"
);

const STATUS_HANDLER: &str = "scrapecrawl-status";

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("ChromeError: {0}")]
    ChromeError(#[from] anyhow::Error),
    #[error("UrlError, can't parse given URL: {0}")]
    UrlError(#[from] ParseError),
    #[error("WebPageError: {0}")]
    WebPageError(#[from] WebPageError),
}
pub type Result<T> = std::result::Result<T, BrowserError>;

/// How the browser process is launched.
#[derive(Clone, Debug)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window_size: (u32, u32),
    pub verbose: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            window_size: (1280, 800),
            verbose: false,
        }
    }
}

impl BrowserConfig {
    pub fn from_options(options: &CrawlOptions, runtime: &BrowserRuntime) -> Self {
        Self {
            executable: runtime.executable.clone(),
            headless: options.headless,
            verbose: options.debug,
            ..Self::default()
        }
    }
}

/// What a single run does once the page is open.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    pub screenshot: bool,
    pub screenshot_wait_for: f64,
    pub wait_for_images: bool,
    pub extract_links: bool,
    pub magic_mode: bool,
}

impl RunConfig {
    /// The screenshot wait only applies when a screenshot is taken and is
    /// kept within `0..=MAX_SCREENSHOT_WAIT_SECS`.
    pub fn from_options(options: &CrawlOptions) -> Self {
        Self {
            screenshot: options.screenshot,
            screenshot_wait_for: if options.screenshot {
                options.screenshot_wait_for.max(0.0).min(MAX_SCREENSHOT_WAIT_SECS)
            } else {
                0.0
            },
            wait_for_images: options.wait_for_images,
            extract_links: options.extract_links,
            magic_mode: options.magic_mode,
        }
    }
}

/// One browser session. The Chrome process lives as long as this value.
pub struct Browser(headless_chrome::Browser);

impl Browser {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .path(config.executable.clone())
            .window_size(Some(config.window_size))
            .idle_browser_timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| anyhow::anyhow!("invalid launch options: {e}"))?;

        if config.verbose {
            debug!("Launching browser with {:?}", config);
        }

        Ok(Self(headless_chrome::Browser::new(options)?))
    }

    fn url_to_tab(&self, url: &str, run: &RunConfig) -> Result<(Arc<Tab>, Option<u16>)> {
        Url::parse(url)?;
        let tab = self.0.new_tab()?;

        if run.magic_mode {
            tab.enable_stealth_mode()?;
            tab.set_user_agent(USER_AGENT, None, None)?;
        }

        // The first response the tab receives is the document itself.
        let status = Arc::new(Mutex::new(None::<u16>));
        let sink = Arc::clone(&status);
        tab.register_response_handling(
            STATUS_HANDLER,
            Box::new(
                move |event: ResponseReceivedEventParams,
                      _fetch_body: &dyn Fn() -> anyhow::Result<GetResponseBodyReturnObject>| {
                    if let Ok(mut slot) = sink.lock() {
                        if slot.is_none() {
                            *slot = Some(event.response.status as u16);
                        }
                    }
                },
            ),
        )?;

        tab.navigate_to(url)?.wait_until_navigated()?;
        tab.deregister_response_handling(STATUS_HANDLER)?;

        let status_code = status.lock().ok().and_then(|slot| *slot);
        Ok((tab, status_code))
    }

    /// Opens `url`, extracts the page and returns the untyped result.
    pub fn run(&self, url: &str, run: &RunConfig) -> Result<Value> {
        info!("Crawling {}", url);
        let (tab, status_code) = self.url_to_tab(url, run)?;

        let webpage = WebPage::from_tab(&tab, run, status_code)?;
        let raw = webpage.into_raw()?;

        if let Err(e) = tab.close(true) {
            debug!("Tab did not close cleanly: {}", e);
        }

        Ok(raw)
    }
}
