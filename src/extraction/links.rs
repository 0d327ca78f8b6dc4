//! Link extraction
//!
//! Extracts all links from raw page HTML with context and classification.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Type of link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Same host as the page
    Internal,
    /// Different host
    External,
    /// Same-page fragment
    Anchor,
    /// `mailto:` link
    Email,
    /// `tel:` link
    Phone,
    /// `javascript:` pseudo-link
    JavaScript,
    /// Anything else
    Other,
}

/// An extracted link with context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLink {
    /// The href, resolved against the page URL where possible
    pub url: String,
    /// Visible link text
    pub text: String,
    /// Title attribute
    pub title: Option<String>,
    /// Classification
    pub link_type: LinkType,
    /// Rel attribute
    pub rel: Option<String>,
    /// Whether it opens in a new tab
    pub new_tab: bool,
    /// Position in document order
    pub position: usize,
}

/// Link extraction functionality
pub struct LinkExtractor;

impl LinkExtractor {
    /// Extract every `a[href]` from the document, resolving relative
    /// hrefs against `page_url`
    pub fn from_html(html: &str, page_url: Option<&str>) -> Vec<ExtractedLink> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").expect("static selector");
        let base = page_url.and_then(|u| Url::parse(u).ok());

        let mut links = Vec::new();
        for (position, el) in document.select(&selector).enumerate() {
            let href = el.value().attr("href").unwrap_or_default();
            if href.is_empty() {
                continue;
            }

            let link_type = classify(href, base.as_ref());
            let url = resolve(href, base.as_ref());
            let text = el.text().collect::<String>().trim().to_string();

            links.push(ExtractedLink {
                url,
                text,
                title: el.value().attr("title").map(str::to_string),
                link_type,
                rel: el.value().attr("rel").map(str::to_string),
                new_tab: el.value().attr("target") == Some("_blank"),
                position,
            });
        }

        debug!(count = links.len(), "links extracted");
        links
    }
}

fn classify(href: &str, base: Option<&Url>) -> LinkType {
    let lower = href.trim().to_lowercase();
    if lower.starts_with('#') {
        return LinkType::Anchor;
    }
    if lower.starts_with("mailto:") {
        return LinkType::Email;
    }
    if lower.starts_with("tel:") {
        return LinkType::Phone;
    }
    if lower.starts_with("javascript:") {
        return LinkType::JavaScript;
    }

    match (Url::parse(href), base) {
        (Ok(abs), Some(base)) => {
            if abs.host_str() == base.host_str() {
                LinkType::Internal
            } else {
                LinkType::External
            }
        }
        (Ok(_), None) => LinkType::External,
        // relative hrefs stay on the page's host
        (Err(_), Some(_)) => LinkType::Internal,
        (Err(_), None) => LinkType::Other,
    }
}

fn resolve(href: &str, base: Option<&Url>) -> String {
    if let Some(base) = base {
        if let Ok(joined) = base.join(href) {
            return joined.to_string();
        }
    }
    href.to_string()
}
