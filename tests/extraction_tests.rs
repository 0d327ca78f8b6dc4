//! Content extraction tests against fixed HTML documents

use ghostdrive::extraction::{ContentExtractor, LinkExtractor, LinkType, MetadataExtractor};
use pretty_assertions::assert_eq;

const PAGE_URL: &str = "https://blog.example.com/posts/rust-browsers";

fn sample_page() -> String {
    let body = "Automating browsers from Rust is mostly plumbing. ".repeat(12);
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Driving Browsers from Rust</title>
    <meta name="description" content="Notes on browser automation">
    <meta name="keywords" content="rust, automation">
    <meta property="og:title" content="Driving Browsers">
    <meta property="og:site_name" content="Example Blog">
    <link rel="canonical" href="{PAGE_URL}">
    <script type="application/ld+json">{{"@type": "BlogPosting"}}</script>
    <style>.hidden {{ display: none; }}</style>
</head>
<body>
    <nav>
        <a href="/">Home</a>
        <a href="/archive" title="All posts">Archive</a>
    </nav>
    <article>
        <h1>Driving Browsers from Rust</h1>
        <p>{body}</p>
        <p>Read the <a href="https://docs.example.org/cdp" target="_blank" rel="noopener">protocol docs</a>
           or <a href="mailto:author@example.com">email the author</a>.</p>
        <script>trackPageView();</script>
    </article>
    <footer><a href="#top">Back to top</a></footer>
</body>
</html>"##
    )
}

#[test]
fn test_main_content_extraction() {
    let content = ContentExtractor::from_html(&sample_page());
    assert!(content.from_main);
    assert!(content.text.contains("Automating browsers from Rust"));
    assert!(!content.text.contains("trackPageView"));
    assert!(!content.text.contains("Archive"));
    assert!(content.word_count > 50);
    assert_eq!(content.char_count, content.text.chars().count());
}

#[test]
fn test_markdown_conversion() {
    let content = ContentExtractor::from_html(&sample_page());
    assert!(content.markdown.contains("# Driving Browsers from Rust"));
    assert!(content
        .markdown
        .contains("[protocol docs](https://docs.example.org/cdp)"));
}

#[test]
fn test_link_inventory() {
    let links = LinkExtractor::from_html(&sample_page(), Some(PAGE_URL));
    assert_eq!(links.len(), 5);

    let archive = links.iter().find(|l| l.text == "Archive").unwrap();
    assert_eq!(archive.url, "https://blog.example.com/archive");
    assert_eq!(archive.link_type, LinkType::Internal);
    assert_eq!(archive.title.as_deref(), Some("All posts"));

    let docs = links.iter().find(|l| l.text == "protocol docs").unwrap();
    assert_eq!(docs.link_type, LinkType::External);
    assert!(docs.new_tab);

    let mail = links.iter().find(|l| l.text == "email the author").unwrap();
    assert_eq!(mail.link_type, LinkType::Email);

    let anchor = links.iter().find(|l| l.text == "Back to top").unwrap();
    assert_eq!(anchor.link_type, LinkType::Anchor);
}

#[test]
fn test_metadata_extraction() {
    let meta = MetadataExtractor::from_html(&sample_page());
    assert_eq!(meta.title.as_deref(), Some("Driving Browsers from Rust"));
    assert_eq!(meta.description.as_deref(), Some("Notes on browser automation"));
    assert_eq!(meta.language.as_deref(), Some("en"));
    assert_eq!(meta.keywords, vec!["rust", "automation"]);
    assert_eq!(meta.canonical.as_deref(), Some(PAGE_URL));
    assert_eq!(meta.open_graph.title.as_deref(), Some("Driving Browsers"));
    assert_eq!(meta.open_graph.site_name.as_deref(), Some("Example Blog"));
    assert_eq!(meta.json_ld.len(), 1);
    assert_eq!(meta.json_ld[0]["@type"], "BlogPosting");
}
