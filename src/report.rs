use crate::config::CrawlOptions;
use crate::result::{CONSOLE_LIMIT, CrawlResult, truncate_str, truncate_strings};
use crossterm::queue;
use crossterm::style::{
    Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor, Stylize,
};
use serde_json::Value;
use std::fmt::Display;
use std::io::{self, Write};
use tracing::warn;

/// Nesting shown by the structure tree.
pub const TREE_DEPTH: usize = 2;
const PREVIEW_CHARS: usize = 50;
/// Markdown at least this long is only previewed.
const MARKDOWN_FULL_LIMIT: usize = 2_000;
const MARKDOWN_PREVIEW_CHARS: usize = 1_500;
const RULE: &str = "==================================================";

/// One-line description of a value's shape.
pub fn describe_shape(value: &Value) -> String {
    match value {
        Value::Object(map) => format!("mapping with {} keys", map.len()),
        Value::Array(items) => format!("sequence with {} items", items.len()),
        Value::String(text) => {
            let length = text.chars().count();
            let preview: String = text.chars().take(PREVIEW_CHARS).collect();
            let preview = preview.replace('\n', " ");
            if length > PREVIEW_CHARS {
                format!("string ({length} chars): {preview:?}...")
            } else {
                format!("string ({length} chars): {preview:?}")
            }
        }
        Value::Bool(flag) => format!("bool: {flag}"),
        Value::Number(number) => format!("number: {number}"),
        Value::Null => "null".to_string(),
    }
}

fn push_tree(lines: &mut Vec<String>, key: &str, value: &Value, depth: usize, max_depth: usize) {
    lines.push(format!("{}{}: {}", "  ".repeat(depth), key, describe_shape(value)));
    if depth + 1 >= max_depth {
        return;
    }
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                push_tree(lines, child_key, child, depth + 1, max_depth);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                push_tree(lines, &format!("[{index}]"), child, depth + 1, max_depth);
            }
        }
        _ => {}
    }
}

/// Indented shape of every entry of `value`, at most `max_depth` levels deep.
pub fn structure_lines(value: &Value, max_depth: usize) -> Vec<String> {
    let mut lines = Vec::new();
    if let Value::Object(map) = value {
        for (key, child) in map {
            push_tree(&mut lines, key, child, 0, max_depth);
        }
    }
    lines
}

/// Writes `markdown` with terminal styling for headings, lists, quotes and
/// code blocks.
pub fn render_markdown<W: Write>(out: &mut W, markdown: &str) -> io::Result<()> {
    let mut in_code = false;

    for line in markdown.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") {
            in_code = !in_code;
            continue;
        }

        if in_code {
            queue!(
                out,
                SetForegroundColor(Color::DarkGrey),
                Print(format!("    {line}")),
                ResetColor,
                Print("\n")
            )?;
            continue;
        }

        let heading_level = trimmed.chars().take_while(|c| *c == '#').count();
        if (1..=6).contains(&heading_level) && trimmed[heading_level..].starts_with(' ') {
            let text = trimmed[heading_level..].trim();
            let color = if heading_level == 1 { Color::Magenta } else { Color::Cyan };
            queue!(
                out,
                SetAttribute(Attribute::Bold),
                SetForegroundColor(color),
                Print(text),
                ResetColor,
                SetAttribute(Attribute::Reset),
                Print("\n")
            )?;
        } else if let Some(item) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("+ "))
        {
            let indent = &line[..line.len() - trimmed.len()];
            queue!(
                out,
                Print(indent),
                SetForegroundColor(Color::Yellow),
                Print("• "),
                ResetColor,
                Print(item),
                Print("\n")
            )?;
        } else if let Some(quote) = trimmed.strip_prefix('>') {
            queue!(
                out,
                SetForegroundColor(Color::DarkGrey),
                Print("│ "),
                SetAttribute(Attribute::Italic),
                Print(quote.trim_start()),
                SetAttribute(Attribute::Reset),
                ResetColor,
                Print("\n")
            )?;
        } else {
            queue!(out, Print(line), Print("\n"))?;
        }
    }

    out.flush()
}

/// Writes one console line. Output errors, such as a closed pipe, are
/// logged and never abort the run.
pub fn write_line<W: Write>(out: &mut W, line: impl Display) {
    if let Err(e) = writeln!(out, "{line}") {
        warn!("Console output failed: {}", e);
    }
}

fn write_markdown<W: Write>(out: &mut W, markdown: &str) -> io::Result<()> {
    let length = markdown.chars().count();
    let shown = if length >= MARKDOWN_FULL_LIMIT {
        let preview: String = markdown.chars().take(MARKDOWN_PREVIEW_CHARS).collect();
        format!("{preview}...")
    } else {
        markdown.to_string()
    };

    writeln!(out, "\n{RULE}")?;
    writeln!(out, "{}", "Markdown Preview:".cyan().bold())?;
    writeln!(out, "{RULE}")?;

    if let Err(e) = render_markdown(out, &shown) {
        warn!("Markdown rendering failed, printing plain text: {}", e);
        writeln!(out, "{shown}")?;
    }

    if length >= MARKDOWN_FULL_LIMIT {
        writeln!(
            out,
            "{}",
            format!("\nMarkdown content available ({length} chars), shown truncated").dim()
        )?;
    }
    Ok(())
}

fn write_status<W: Write>(out: &mut W, result: &CrawlResult) -> io::Result<()> {
    let status = if result.success {
        "✓ Success".green().bold()
    } else {
        "✗ Failed".red().bold()
    };
    let status_code = result
        .status_code
        .map_or_else(|| "N/A".to_string(), |code| code.to_string());

    writeln!(out, "{}", "── Crawl Status ──".bold())?;
    writeln!(out, "{status}")?;
    writeln!(out, "URL: {}", result.url)?;
    writeln!(out, "Status Code: {status_code}")?;
    writeln!(out, "Timestamp: {}", result.timestamp)
}

fn write_summary<W: Write>(out: &mut W, result: &CrawlResult) -> io::Result<()> {
    let mut rows: Vec<(&str, String)> = Vec::new();
    if let Some(html) = &result.html {
        rows.push(("HTML Length", format!("{} characters", html.chars().count())));
    }
    if let Some(markdown) = &result.markdown {
        rows.push(("Markdown Length", format!("{} characters", markdown.chars().count())));
    }
    if let Some(links) = &result.links {
        rows.push(("Links Found", links.len().to_string()));
    }
    if result.media.is_some() {
        rows.push(("Media Items", result.media_items().to_string()));
    }
    if result.screenshot.is_some() {
        rows.push(("Screenshot", "✓ Captured".to_string()));
    }
    if rows.is_empty() {
        return Ok(());
    }

    writeln!(out, "\n{}", "Crawl Results Summary".bold())?;
    for (metric, value) in rows {
        writeln!(out, "  {} {}", format!("{metric:<16}").cyan(), value)?;
    }
    Ok(())
}

fn write_links<W: Write>(out: &mut W, result: &CrawlResult) -> io::Result<()> {
    let Some(links) = &result.links else {
        return writeln!(out, "\n{}", "No links returned".yellow());
    };

    for (label, group) in [("Internal", &links.internal), ("External", &links.external)] {
        writeln!(out, "\n{}", format!("{label} links: {}", group.len()).bold())?;
        for link in group {
            writeln!(
                out,
                "  - {} | {} | {}",
                link.href,
                truncate_str(&link.text, 80),
                link.domain
            )?;
        }
    }
    Ok(())
}

fn write_report<W: Write>(
    out: &mut W,
    result: &CrawlResult,
    options: &CrawlOptions,
) -> io::Result<()> {
    write_status(out, result)?;

    if !result.success {
        if let Some(error) = &result.error {
            writeln!(out, "{}", format!("Error: {error}").red())?;
        }
        return Ok(());
    }

    let value = result.to_value();
    if let Value::Object(map) = &value {
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        writeln!(out, "\n{} {}", "Result keys:".bold(), keys.join(", "))?;
    }

    writeln!(out, "\n{}", "Result structure:".bold())?;
    for line in structure_lines(&value, TREE_DEPTH) {
        writeln!(out, "  {line}")?;
    }

    write_summary(out, result)?;

    match &result.markdown {
        Some(markdown) if !markdown.is_empty() => write_markdown(out, markdown)?,
        _ => writeln!(out, "\n{}", "No markdown content".dim())?,
    }

    if options.extract_links {
        write_links(out, result)?;
    }

    if options.debug {
        if let Some(metadata) = &result.metadata {
            let metadata = serde_json::to_string_pretty(metadata).unwrap_or_default();
            writeln!(
                out,
                "\n{}",
                format!("Metadata: {}", truncate_str(&metadata, 500)).dim()
            )?;
        }
        let dump = serde_json::to_string_pretty(&truncate_strings(&value, CONSOLE_LIMIT))
            .unwrap_or_default();
        writeln!(out, "\n{}\n{}", "Debug dump:".bold(), dump.dim())?;
    }
    Ok(())
}

/// Writes the console report for a finished crawl to `out`. A failing
/// writer cuts the report short with a warning; it never aborts the run.
pub fn display_results<W: Write>(out: &mut W, result: &CrawlResult, options: &CrawlOptions) {
    if let Err(e) = write_report(out, result, options).and_then(|()| out.flush()) {
        warn!("Console report incomplete: {}", e);
    }
}
