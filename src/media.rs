use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// File format guessed from the source, e.g. `png`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Media {
    pub images: Vec<MediaItem>,
    pub videos: Vec<MediaItem>,
    pub audios: Vec<MediaItem>,
}

impl MediaItem {
    fn from_source(src: &str, base_url: &Url, alt: Option<&str>) -> Option<Self> {
        let src = src.trim();
        if src.is_empty() {
            return None;
        }

        // data:image/png;base64,iVBORw0KGgo...
        if src.starts_with("data:") {
            let (meta, _) = src.split_once(',')?;
            let format = meta
                .split(';')
                .next()
                .and_then(|m| m.split('/').nth(1))
                .map(str::to_string);
            return Some(Self {
                src: src.to_string(),
                alt: alt.map(str::to_string),
                format,
            });
        }

        let resolved = base_url.join(src).ok()?;
        let format = resolved
            .path_segments()
            .and_then(|mut s| s.next_back())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        Some(Self {
            src: resolved.to_string(),
            alt: alt.map(str::to_string).filter(|a| !a.trim().is_empty()),
            format,
        })
    }
}

/// Picks the widest candidate of a `srcset` that looks like a raster image.
fn extract_last_image_url(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .map(|s| s.trim())
        .filter_map(|entry| entry.split_whitespace().next())
        .filter(|url| {
            url.ends_with(".jpg")
                || url.ends_with(".jpeg")
                || url.ends_with(".png")
                || url.ends_with(".webp")
        })
        .last()
}

fn image_source(element: &ElementRef) -> Option<String> {
    let value = element.value();
    value
        .attr("src")
        .or_else(|| value.attr("data-src"))
        .map(str::to_string)
        .or_else(|| {
            value
                .attr("data-srcset")
                .or_else(|| value.attr("srcset"))
                .and_then(extract_last_image_url)
                .map(str::to_string)
        })
}

fn media_sources(document: &Html, tag: &str, base_url: &Url) -> Vec<MediaItem> {
    let own = Selector::parse(&format!("{tag}[src]")).unwrap();
    let nested = Selector::parse(&format!("{tag} source[src]")).unwrap();

    document
        .select(&own)
        .chain(document.select(&nested))
        .filter_map(|element| element.value().attr("src"))
        .filter_map(|src| MediaItem::from_source(src, base_url, None))
        .collect()
}

impl Media {
    pub fn from_html(html: &str, base_url: &Url) -> Self {
        let document = Html::parse_document(html);
        let img_selector = Selector::parse("img").unwrap();

        let images = document
            .select(&img_selector)
            .filter_map(|element| {
                let src = image_source(&element)?;
                MediaItem::from_source(&src, base_url, element.value().attr("alt"))
            })
            .collect();

        Self {
            images,
            videos: media_sources(&document, "video", base_url),
            audios: media_sources(&document, "audio", base_url),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len() + self.videos.len() + self.audios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The media as the mapping carried by a crawl result.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
