use clap::Parser;
use crossterm::style::Stylize;
use scrapecrawl::config::{BrowserEngine, CrawlOptions, DEFAULT_OUTPUT_DIR, parse_wait_seconds};
use scrapecrawl::report::write_line;
use scrapecrawl::{pipeline, setup};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Crawls a single webpage with a headless browser and saves its HTML,
/// Markdown, links and screenshot
#[derive(Parser, Debug)]
#[command(name = "scrapecrawl", version, about, long_about = None)]
struct Args {
    /// URL to crawl
    url: String,

    /// Write Markdown and HTML to individual files
    #[arg(short, long)]
    write: bool,

    /// Capture a page screenshot
    #[arg(long, overrides_with = "no_screenshot")]
    screenshot: bool,

    #[arg(long, hide = true, overrides_with = "screenshot")]
    no_screenshot: bool,

    /// Wait time before taking the screenshot (seconds, 0 to 300)
    #[arg(long, default_value_t = 2.0, value_parser = parse_wait_seconds)]
    screenshot_wait_for: f64,

    /// Base output directory for results
    #[arg(short, long, env = "SCRAPECRAWL_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Browser engine
    #[arg(short, long, value_enum, default_value_t = BrowserEngine::Chromium)]
    browser: BrowserEngine,

    /// Run the browser headless (default)
    #[arg(long, overrides_with = "no_headless")]
    headless: bool,

    /// Show the browser window
    #[arg(long, overrides_with = "headless")]
    no_headless: bool,

    /// Wait for images to load before extracting content
    #[arg(long)]
    wait_for_images: bool,

    /// Extract page links and save them as CSV
    #[arg(long)]
    links: bool,

    /// Stealth mode, desktop user agent and lazy-content scrolling
    #[arg(long)]
    magic: bool,

    /// Save a full JSON dump of the crawl
    #[arg(long)]
    alldata: bool,

    /// Verbose logging and a raw result dump
    #[arg(long)]
    debug: bool,
}

impl From<Args> for CrawlOptions {
    fn from(args: Args) -> Self {
        Self {
            url: args.url,
            browser: args.browser,
            headless: args.headless || !args.no_headless,
            screenshot: args.screenshot && !args.no_screenshot,
            screenshot_wait_for: args.screenshot_wait_for,
            wait_for_images: args.wait_for_images,
            extract_links: args.links,
            magic_mode: args.magic,
            output_dir: args.output_dir,
            write_files: args.write,
            all_data: args.alldata,
            debug: args.debug,
        }
    }
}

fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("scrapecrawl=debug,info")
        } else {
            EnvFilter::new("scrapecrawl=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let options = CrawlOptions::from(Args::parse());
    setup_logging(options.debug);

    let mut out = io::stdout();
    write_line(
        &mut out,
        format_args!("Starting crawl of {}", options.url.as_str().blue().bold()),
    );

    let outcome = tokio::select! {
        outcome = pipeline::run(&options, &mut out, setup::ensure_browser) => outcome,
        _ = tokio::signal::ctrl_c() => {
            let message = "Crawl interrupted by user".yellow();
            write_line(&mut io::stdout(), format_args!("\n{message}"));
            // The crawl future, installer included, is dropped by now; blocking
            // browser work would still hold up runtime shutdown.
            std::process::exit(1);
        }
    };

    match outcome {
        Ok(true) => {
            write_line(&mut out, format_args!("\n{}", "Crawl completed successfully!".green()));
            ExitCode::SUCCESS
        }
        Ok(false) => {
            let message = "Crawl failed. Check the error messages above.";
            write_line(&mut out, format_args!("\n{}", message.red()));
            ExitCode::FAILURE
        }
        Err(e) => {
            write_line(&mut out, format_args!("\n{}", format!("Unexpected error: {e}").red()));
            if options.debug {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["scrapecrawl", "https://example.com"]);
        let options = CrawlOptions::from(args);
        assert!(options.headless);
        assert!(!options.screenshot);
        assert_eq!(options.screenshot_wait_for, 2.0);
        assert_eq!(options.browser, BrowserEngine::Chromium);
    }

    #[test]
    fn flags_map_to_options() {
        let args = Args::parse_from([
            "scrapecrawl",
            "https://example.com",
            "-w",
            "--screenshot",
            "--screenshot-wait-for",
            "0.5",
            "-o",
            "/tmp/out",
            "-b",
            "webkit",
            "--no-headless",
            "--wait-for-images",
            "--links",
            "--magic",
            "--alldata",
            "--debug",
        ]);
        let options = CrawlOptions::from(args);

        assert!(options.write_files);
        assert!(options.screenshot);
        assert_eq!(options.screenshot_wait_for, 0.5);
        assert_eq!(options.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(options.browser, BrowserEngine::Webkit);
        assert!(!options.headless);
        assert!(options.wait_for_images);
        assert!(options.extract_links);
        assert!(options.magic_mode);
        assert!(options.all_data);
        assert!(options.debug);
    }

    #[test]
    fn last_toggle_wins() {
        let options = CrawlOptions::from(Args::parse_from([
            "scrapecrawl",
            "https://example.com",
            "--screenshot",
            "--no-screenshot",
        ]));
        assert!(!options.screenshot);
    }

    #[test]
    fn screenshot_wait_must_be_finite_and_non_negative() {
        for bad in ["-1", "inf", "1e20"] {
            let flag = format!("--screenshot-wait-for={bad}");
            let parsed =
                Args::try_parse_from(["scrapecrawl", "https://example.com", flag.as_str()]);
            assert!(parsed.is_err(), "{bad} accepted");
        }
        let args = Args::try_parse_from([
            "scrapecrawl",
            "https://example.com",
            "--screenshot-wait-for",
            "0",
        ])
        .unwrap();
        assert_eq!(args.screenshot_wait_for, 0.0);
    }
}
