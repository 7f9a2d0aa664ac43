use crate::browser::RunConfig;
use crate::links::extract_links;
use crate::media::Media;
use crate::result::{Links, now_timestamp};
use base64::Engine;
use headless_chrome::Tab;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Strips scripts, styles and embeds from a copy of the rendered DOM and
/// returns its body.
const CLEANED_HTML_SCRIPT: &str = r#"(() => {
    const root = document.documentElement.cloneNode(true);
    root.querySelectorAll('script, style, noscript, iframe, svg, link[rel="stylesheet"]')
        .forEach((node) => node.remove());
    const body = root.querySelector('body');
    return (body || root).outerHTML;
})()"#;

const WAIT_FOR_IMAGES_SCRIPT: &str = r#"Promise.all(
    Array.from(document.images)
        .filter((img) => !img.complete)
        .map((img) => new Promise((resolve) => { img.onload = img.onerror = resolve; }))
).then(() => document.images.length)"#;

const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

#[derive(Error, Debug)]
pub enum WebPageError {
    #[error("ChromeError: {0}")]
    ChromeError(#[from] anyhow::Error),
    #[error("MarkdownConversion error: {0}")]
    MarkdownConversionError(#[from] pandoc::PandocError),
    #[error("UrlError, can't parse page URL: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("JSON conversion error: {0}")]
    JsonConversionError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WebPageError>;

/// Markdown produced for the page, with a little information about it.
#[derive(Serialize, Debug, Clone)]
pub struct MarkdownGeneration {
    pub text: String,
    pub word_count: usize,
}

/// Everything read from one rendered tab.
#[derive(Serialize, Debug)]
pub struct WebPage {
    success: bool,
    url: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    html: String,
    cleaned_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    markdown: Option<MarkdownGeneration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    markdown_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    links: Option<Links>,
    media: Map<String, Value>,
    metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot: Option<String>,
    timestamp: String,
}

impl WebPage {
    pub fn from_tab(tab: &Tab, run: &RunConfig, status_code: Option<u16>) -> Result<Self> {
        if run.magic_mode {
            debug!("Scrolling to the bottom to trigger lazy content");
            tab.evaluate(SCROLL_TO_BOTTOM_SCRIPT, false)?;
        }

        if run.wait_for_images {
            let loaded = tab.evaluate(WAIT_FOR_IMAGES_SCRIPT, true)?;
            debug!("Images loaded: {:?}", loaded.value);
        }

        let title = tab.get_title()?;
        let url = tab.get_url();
        let html = tab.get_content()?;
        let cleaned_html = tab
            .evaluate(CLEANED_HTML_SCRIPT, false)?
            .value
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| html.clone());

        let base_url = Url::parse(&url)?;

        let (markdown, markdown_error) = match WebPage::html2md(cleaned_html.clone()) {
            Ok(text) => {
                let word_count = text.split_whitespace().count();
                (Some(MarkdownGeneration { text, word_count }), None)
            }
            Err(e) => {
                warn!("Markdown conversion failed: {}", e);
                (None, Some(describe_markdown_error(&e)))
            }
        };

        let links = run.extract_links.then(|| extract_links(&html, &base_url));
        let media = Media::from_html(&html, &base_url).to_map();
        let metadata = extract_metadata(&html);

        let screenshot = if run.screenshot {
            match Duration::try_from_secs_f64(run.screenshot_wait_for) {
                Ok(wait) if !wait.is_zero() => std::thread::sleep(wait),
                Ok(_) => {}
                Err(e) => warn!("Skipping screenshot wait: {}", e),
            }
            let png = tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?;
            Some(base64::engine::general_purpose::STANDARD.encode(png))
        } else {
            None
        };

        Ok(Self {
            success: true,
            url,
            title,
            status_code,
            html,
            cleaned_html,
            markdown,
            markdown_error,
            links,
            media,
            metadata,
            screenshot,
            timestamp: now_timestamp(),
        })
    }

    fn html2md(html: String) -> Result<String> {
        let mut pandoc = pandoc::Pandoc::new();

        pandoc
            .set_input(pandoc::InputKind::Pipe(html))
            .set_input_format(pandoc::InputFormat::Html, vec![])
            .set_output(pandoc::OutputKind::Pipe)
            .set_output_format(
                pandoc::OutputFormat::Other("gfm-raw_html".to_string()),
                vec![],
            );

        match pandoc.execute()? {
            pandoc::PandocOutput::ToBuffer(markdown) => Ok(markdown),
            _ => Err(WebPageError::MarkdownConversionError(
                pandoc::PandocError::PandocNotFound,
            )),
        }
    }

    /// The page as the untyped result handed to the normalizer.
    pub fn into_raw(self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn describe_markdown_error(error: &WebPageError) -> String {
    match error {
        WebPageError::MarkdownConversionError(pandoc::PandocError::PandocNotFound) => {
            "missing dependency: pandoc is required for markdown generation".to_string()
        }
        other => other.to_string(),
    }
}

/// Title, language, canonical link and every named `<meta>` of the page.
pub fn extract_metadata(html: &str) -> Map<String, Value> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").unwrap();
    let html_selector = Selector::parse("html[lang]").unwrap();
    let canonical_selector = Selector::parse(r#"link[rel="canonical"][href]"#).unwrap();
    let meta_selector = Selector::parse("meta[content]").unwrap();

    let mut metadata = Map::new();

    if let Some(title) = document.select(&title_selector).next() {
        let title = title.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            metadata.insert("title".to_string(), Value::String(title));
        }
    }

    if let Some(lang) = document
        .select(&html_selector)
        .next()
        .and_then(|el| el.value().attr("lang"))
    {
        metadata.insert("language".to_string(), Value::String(lang.to_string()));
    }

    if let Some(href) = document
        .select(&canonical_selector)
        .next()
        .and_then(|el| el.value().attr("href"))
    {
        metadata.insert("canonical".to_string(), Value::String(href.to_string()));
    }

    for meta in document.select(&meta_selector) {
        let element = meta.value();
        let Some(name) = element.attr("name").or_else(|| element.attr("property")) else {
            continue;
        };
        let content = element.attr("content").unwrap_or_default();
        metadata
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Value::String(content.to_string()));
    }

    metadata
}
