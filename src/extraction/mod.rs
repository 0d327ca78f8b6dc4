//! Content extraction module
//!
//! Pure-HTML extractors shared by every backend: the transports fetch the
//! raw document, extraction never touches a live page. That keeps the
//! three backends' `extract_content` behavior identical and the parsing
//! testable without a browser.

pub mod content;
pub mod links;
pub mod metadata;

pub use content::{ContentExtractor, ExtractedContent};
pub use links::{ExtractedLink, LinkExtractor, LinkType};
pub use metadata::{MetadataExtractor, OpenGraphData, PageMetadata};
