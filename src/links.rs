use crate::result::{Link, Links};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Host without a leading `www.`, lowercased.
pub fn site_host(url: &Url) -> Option<String> {
    url.host_str().map(|host| {
        let host = host.to_ascii_lowercase();
        match host.strip_prefix("www.") {
            Some(stripped) => stripped.to_string(),
            None => host,
        }
    })
}

fn is_navigable(href: &str) -> bool {
    let href = href.trim();
    !(href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:"))
}

/// Collects every anchor of the document, resolved against `base_url` and
/// split by whether it stays on the same site.
pub fn extract_links(html: &str, base_url: &Url) -> Links {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("a[href]").unwrap();
    let own_host = site_host(base_url);

    let mut seen = HashSet::new();
    let mut links = Links::default();

    for anchor in document.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !is_navigable(href) {
            continue;
        }
        let Ok(mut resolved) = base_url.join(href.trim()) else {
            continue;
        };
        resolved.set_fragment(None);

        if !seen.insert(resolved.to_string()) {
            continue;
        }

        let text = anchor.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let host = site_host(&resolved);

        let link = Link {
            href: resolved.to_string(),
            text,
            domain: host.clone().unwrap_or_default(),
        };

        if host.is_some() && host == own_host {
            links.internal.push(link);
        } else {
            links.external.push(link);
        }
    }

    links
}
