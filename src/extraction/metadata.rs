//! Page metadata extraction
//!
//! Title, description, canonical URL, Open Graph data and JSON-LD blocks,
//! parsed from raw document HTML.

use std::collections::HashMap;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extracted page metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Page title
    pub title: Option<String>,
    /// Meta description
    pub description: Option<String>,
    /// Canonical URL
    pub canonical: Option<String>,
    /// Document language
    pub language: Option<String>,
    /// Author
    pub author: Option<String>,
    /// Keywords
    pub keywords: Vec<String>,
    /// Open Graph metadata
    pub open_graph: OpenGraphData,
    /// Favicon URL
    pub favicon: Option<String>,
    /// All name/property meta tags
    pub meta_tags: HashMap<String, String>,
    /// JSON-LD structured data blocks
    pub json_ld: Vec<serde_json::Value>,
}

/// Open Graph metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenGraphData {
    /// og:title
    pub title: Option<String>,
    /// og:description
    pub description: Option<String>,
    /// og:image
    pub image: Option<String>,
    /// og:url
    pub url: Option<String>,
    /// og:type
    pub og_type: Option<String>,
    /// og:site_name
    pub site_name: Option<String>,
}

/// Metadata extraction functionality
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Parse all metadata from raw document HTML
    pub fn from_html(html: &str) -> PageMetadata {
        let document = Html::parse_document(html);
        let mut meta = PageMetadata::default();

        let title_sel = Selector::parse("title").expect("static selector");
        meta.title = document
            .select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let html_sel = Selector::parse("html").expect("static selector");
        meta.language = document
            .select(&html_sel)
            .next()
            .and_then(|el| el.value().attr("lang"))
            .map(str::to_string);

        let meta_sel = Selector::parse("meta").expect("static selector");
        for el in document.select(&meta_sel) {
            let key = el
                .value()
                .attr("name")
                .or_else(|| el.value().attr("property"));
            let (Some(key), Some(content)) = (key, el.value().attr("content")) else {
                continue;
            };
            meta.meta_tags.insert(key.to_string(), content.to_string());

            match key {
                "description" => meta.description = Some(content.to_string()),
                "author" => meta.author = Some(content.to_string()),
                "keywords" => {
                    meta.keywords = content
                        .split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect();
                }
                "og:title" => meta.open_graph.title = Some(content.to_string()),
                "og:description" => meta.open_graph.description = Some(content.to_string()),
                "og:image" => meta.open_graph.image = Some(content.to_string()),
                "og:url" => meta.open_graph.url = Some(content.to_string()),
                "og:type" => meta.open_graph.og_type = Some(content.to_string()),
                "og:site_name" => meta.open_graph.site_name = Some(content.to_string()),
                _ => {}
            }
        }

        let canonical_sel = Selector::parse("link[rel=\"canonical\"]").expect("static selector");
        meta.canonical = document
            .select(&canonical_sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string);

        let icon_sel =
            Selector::parse("link[rel=\"icon\"], link[rel=\"shortcut icon\"]").expect("static selector");
        meta.favicon = document
            .select(&icon_sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string);

        let json_ld_sel =
            Selector::parse("script[type=\"application/ld+json\"]").expect("static selector");
        for el in document.select(&json_ld_sel) {
            let raw = el.text().collect::<String>();
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
                meta.json_ld.push(value);
            }
        }

        debug!(
            title = meta.title.as_deref().unwrap_or(""),
            meta_tags = meta.meta_tags.len(),
            "metadata extracted"
        );
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HTML: &str = r#"
        <html lang="en">
        <head>
            <title> Example Page </title>
            <meta name="description" content="A test page">
            <meta name="author" content="Jo Bloggs">
            <meta name="keywords" content="testing, rust , browsers">
            <meta property="og:title" content="Example OG">
            <meta property="og:image" content="https://example.com/og.png">
            <link rel="canonical" href="https://example.com/page">
            <link rel="icon" href="/favicon.ico">
            <script type="application/ld+json">{"@type": "Article", "name": "x"}</script>
        </head>
        <body></body>
        </html>
    "#;

    #[test]
    fn test_core_fields() {
        let meta = MetadataExtractor::from_html(HTML);
        assert_eq!(meta.title.as_deref(), Some("Example Page"));
        assert_eq!(meta.description.as_deref(), Some("A test page"));
        assert_eq!(meta.author.as_deref(), Some("Jo Bloggs"));
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.keywords, vec!["testing", "rust", "browsers"]);
        assert_eq!(meta.canonical.as_deref(), Some("https://example.com/page"));
        assert_eq!(meta.favicon.as_deref(), Some("/favicon.ico"));
    }

    #[test]
    fn test_open_graph_and_json_ld() {
        let meta = MetadataExtractor::from_html(HTML);
        assert_eq!(meta.open_graph.title.as_deref(), Some("Example OG"));
        assert_eq!(
            meta.open_graph.image.as_deref(),
            Some("https://example.com/og.png")
        );
        assert_eq!(meta.json_ld.len(), 1);
        assert_eq!(meta.json_ld[0]["@type"], "Article");
    }

    #[test]
    fn test_empty_document() {
        let meta = MetadataExtractor::from_html("<html><body></body></html>");
        assert!(meta.title.is_none());
        assert!(meta.meta_tags.is_empty());
        assert!(meta.json_ld.is_empty());
    }
}
