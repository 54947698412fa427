//! Feed ingestion: fetch syndication sources, normalize entries into
//! [`Article`](mindfulnews_shared::Article)s, and resolve a representative
//! image for each one.
//!
//! - [`feed`]: source fetching, entry parsing and recency windowing
//! - [`image`]: media / `og:image` / first-`<img>` fallback chain

pub mod feed;
pub mod image;

pub use feed::{FeedEntry, FeedIngestor, IngestReport, parse_feed, strip_declarations};
pub use image::{ImageResolver, extract_image};

/// User-Agent string for feed and page requests.
pub(crate) const USER_AGENT: &str = concat!("MindfulNews/", env!("CARGO_PKG_VERSION"));
