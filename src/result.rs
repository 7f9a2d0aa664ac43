use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Limit used for anything printed to the terminal.
pub const CONSOLE_LIMIT: usize = 1_000;
/// Limit applied to every string of `result.json`.
pub const RESULT_JSON_LIMIT: usize = 50_000;
/// Limit applied to html fields of `full_results.json`.
pub const FULL_RESULTS_HTML_LIMIT: usize = 10_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "base_domain")]
    pub domain: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Links {
    #[serde(default)]
    pub internal: Vec<Link>,
    #[serde(default)]
    pub external: Vec<Link>,
}

impl Links {
    pub fn len(&self) -> usize {
        self.internal.len() + self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every link tagged with its kind, internal ones first.
    pub fn tagged(&self) -> impl Iterator<Item = (&'static str, &Link)> {
        self.internal
            .iter()
            .map(|link| ("internal", link))
            .chain(self.external.iter().map(|link| ("external", link)))
    }
}

/// The normalized outcome of one crawl.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CrawlResult {
    pub success: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
    /// Fields of the raw result this type has no slot for.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const KNOWN_FIELDS: [&str; 12] = [
    "success",
    "url",
    "status_code",
    "html",
    "cleaned_html",
    "markdown",
    "links",
    "media",
    "metadata",
    "screenshot",
    "error",
    "timestamp",
];

pub fn now_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

impl CrawlResult {
    /// A failed result carrying only the error message.
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: url.into(),
            status_code: None,
            html: None,
            cleaned_html: None,
            markdown: None,
            links: None,
            media: None,
            metadata: None,
            screenshot: None,
            error: Some(error.into()),
            timestamp: now_timestamp(),
            extra: Map::new(),
        }
    }

    /// Builds a result from whatever the crawl backend returned.
    ///
    /// Every field is read on its own: a missing or wrongly typed field
    /// leaves the slot empty instead of failing the whole conversion.
    pub fn from_raw(raw: Value, requested_url: &str) -> Self {
        let mut fields = match raw {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                let mut fields = Map::new();
                fields.insert("raw".to_string(), other);
                fields
            }
        };

        let success = fields
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let url = take_string(&fields, "url").unwrap_or_else(|| requested_url.to_string());
        let status_code = fields
            .get("status_code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());
        let markdown = fields.get("markdown").and_then(extract_markdown);
        let links = fields.get("links").and_then(parse_links);
        let media = take_object(&fields, "media");
        let metadata = take_object(&fields, "metadata");
        let timestamp = take_string(&fields, "timestamp").unwrap_or_else(now_timestamp);

        let result = Self {
            success,
            url,
            status_code,
            html: take_string(&fields, "html"),
            cleaned_html: take_string(&fields, "cleaned_html"),
            markdown,
            links,
            media,
            metadata,
            screenshot: take_string(&fields, "screenshot"),
            error: take_string(&fields, "error"),
            timestamp,
            extra: Map::new(),
        };

        for key in KNOWN_FIELDS {
            fields.remove(key);
        }

        Self {
            extra: fields,
            ..result
        }
    }

    /// The result as a plain JSON mapping, absent fields omitted.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub fn media_items(&self) -> usize {
        self.media
            .as_ref()
            .and_then(|media| media.get("images"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}

fn take_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn take_object(fields: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    fields.get(key).and_then(Value::as_object).cloned()
}

/// Reads the markdown payload, which is either plain text or a generation
/// result carrying its text under `text`.
pub fn extract_markdown(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(wrapper) => match wrapper.get("text") {
            Some(Value::String(text)) => Some(text.clone()),
            _ => serde_json::to_string(value).ok(),
        },
        other => serde_json::to_string(other).ok(),
    }
}

fn parse_links(value: &Value) -> Option<Links> {
    let groups = value.as_object()?;
    let group = |name: &str| -> Vec<Link> {
        groups
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    };

    Some(Links {
        internal: group("internal"),
        external: group("external"),
    })
}

/// Shortens `text` to `limit` characters plus [`TRUNCATION_SUFFIX`].
pub fn truncate_str(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_SUFFIX),
        None => text.to_string(),
    }
}

/// Recursively truncates every string found in `value`.
pub fn truncate_strings(value: &Value, limit: usize) -> Value {
    match value {
        Value::String(text) => Value::String(truncate_str(text, limit)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| truncate_strings(item, limit))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), truncate_strings(item, limit)))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}
