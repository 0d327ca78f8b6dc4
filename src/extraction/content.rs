//! Main content extraction
//!
//! Extracts the readable content of a page from its raw HTML, converting
//! it to clean text or markdown.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extracted content from a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Plain text content
    pub text: String,
    /// Content as markdown
    pub markdown: String,
    /// HTML of the main content region
    pub html: String,
    /// Word count
    pub word_count: usize,
    /// Character count
    pub char_count: usize,
    /// Whether content came from an article/main region
    pub from_main: bool,
}

/// Selectors likely to hold the main content, tried in order
const MAIN_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    "[role=\"article\"]",
    ".article",
    ".post",
    ".entry-content",
    ".post-content",
    "#content",
    "#main-content",
    ".main-content",
    ".content",
];

/// Minimum text length before a region counts as "the" content
const MAIN_CONTENT_MIN_CHARS: usize = 200;

/// Content extraction functionality
pub struct ContentExtractor;

impl ContentExtractor {
    /// Extract the main content region from raw document HTML
    pub fn from_html(html: &str) -> ExtractedContent {
        let (region_html, from_main) = Self::find_main_region(html);
        let text = Self::html_to_text(&region_html);
        let markdown = Self::html_to_markdown(&region_html);

        let word_count = text.split_whitespace().count();
        let char_count = text.chars().count();
        debug!(word_count, char_count, from_main, "content extracted");

        ExtractedContent {
            text,
            markdown,
            html: region_html,
            word_count,
            char_count,
            from_main,
        }
    }

    /// Locate the main content region: a known content selector with
    /// enough text wins, otherwise the whole body
    fn find_main_region(html: &str) -> (String, bool) {
        let document = Html::parse_document(html);

        for raw in MAIN_SELECTORS {
            let selector = match Selector::parse(raw) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if let Some(el) = document.select(&selector).next() {
                let text_len: usize = el.text().map(str::len).sum();
                if text_len > MAIN_CONTENT_MIN_CHARS {
                    return (el.inner_html(), true);
                }
            }
        }

        let body = Selector::parse("body").expect("static selector");
        match document.select(&body).next() {
            Some(el) => (el.inner_html(), false),
            None => (html.to_string(), false),
        }
    }

    /// Convert HTML to plain text
    pub fn html_to_text(html: &str) -> String {
        let mut text = html.to_string();

        let script_re = regex::Regex::new(r"<script[^>]*>[\s\S]*?</script>").unwrap();
        text = script_re.replace_all(&text, "").to_string();
        let style_re = regex::Regex::new(r"<style[^>]*>[\s\S]*?</style>").unwrap();
        text = style_re.replace_all(&text, "").to_string();

        // Block elements break lines
        let block_re = regex::Regex::new(r"</(p|div|br|li|tr|h[1-6])>").unwrap();
        text = block_re.replace_all(&text, "\n").to_string();

        let tag_re = regex::Regex::new(r"<[^>]+>").unwrap();
        text = tag_re.replace_all(&text, "").to_string();

        text = decode_entities(&text);

        let ws_re = regex::Regex::new(r"[ \t]+").unwrap();
        text = ws_re.replace_all(&text, " ").to_string();
        let nl_re = regex::Regex::new(r"\n\s*\n+").unwrap();
        text = nl_re.replace_all(&text, "\n\n").to_string();

        text.trim().to_string()
    }

    /// Convert HTML to markdown
    pub fn html_to_markdown(html: &str) -> String {
        let mut md = html.to_string();

        let script_re = regex::Regex::new(r"<script[^>]*>[\s\S]*?</script>").unwrap();
        md = script_re.replace_all(&md, "").to_string();
        let style_re = regex::Regex::new(r"<style[^>]*>[\s\S]*?</style>").unwrap();
        md = style_re.replace_all(&md, "").to_string();

        for i in (1..=6).rev() {
            let h_re = regex::Regex::new(&format!(r"<h{i}[^>]*>(.*?)</h{i}>")).unwrap();
            let prefix = "#".repeat(i);
            md = h_re.replace_all(&md, format!("{prefix} $1\n\n")).to_string();
        }

        let p_re = regex::Regex::new(r"<p[^>]*>(.*?)</p>").unwrap();
        md = p_re.replace_all(&md, "$1\n\n").to_string();
        let br_re = regex::Regex::new(r"<br\s*/?>").unwrap();
        md = br_re.replace_all(&md, "\n").to_string();

        let b_re = regex::Regex::new(r"<(b|strong)[^>]*>(.*?)</(b|strong)>").unwrap();
        md = b_re.replace_all(&md, "**$2**").to_string();
        let i_re = regex::Regex::new(r"<(i|em)[^>]*>(.*?)</(i|em)>").unwrap();
        md = i_re.replace_all(&md, "*$2*").to_string();

        let a_re = regex::Regex::new(r#"<a[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
        md = a_re.replace_all(&md, "[$2]($1)").to_string();

        let code_re = regex::Regex::new(r"<code[^>]*>(.*?)</code>").unwrap();
        md = code_re.replace_all(&md, "`$1`").to_string();
        let pre_re = regex::Regex::new(r"<pre[^>]*>([\s\S]*?)</pre>").unwrap();
        md = pre_re.replace_all(&md, "```\n$1\n```").to_string();

        let li_re = regex::Regex::new(r"<li[^>]*>(.*?)</li>").unwrap();
        md = li_re.replace_all(&md, "- $1\n").to_string();

        let tag_re = regex::Regex::new(r"<[^>]+>").unwrap();
        md = tag_re.replace_all(&md, "").to_string();

        md = decode_entities(&md);

        let nl_re = regex::Regex::new(r"\n{3,}").unwrap();
        md = nl_re.replace_all(&md, "\n\n").to_string();

        md.trim().to_string()
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
