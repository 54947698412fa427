//! Output document rendering, validation and writing.
//!
//! The pipeline hands a finished [`FeedOutput`] to a [`FeedRenderer`]; the
//! resulting text is checked with [`validate_document`] before
//! [`write_document`] replaces the previous file on disk.

use std::path::Path;

use askama::Template;
use tracing::{debug, info};

use mindfulnews_shared::{ChannelConfig, FeedOutput, MindfulNewsError, Result};

// ---------------------------------------------------------------------------
// FeedRenderer
// ---------------------------------------------------------------------------

/// Turns an ordered set of stories into a complete output document.
pub trait FeedRenderer: Send + Sync {
    fn render(&self, output: &FeedOutput) -> Result<String>;
}

/// RSS 2.0 renderer with `media:content` images and CDATA bodies.
#[derive(Debug, Clone)]
pub struct RssRenderer {
    channel: ChannelConfig,
}

impl RssRenderer {
    pub fn new(channel: ChannelConfig) -> Self {
        Self { channel }
    }
}

#[derive(Template)]
#[template(path = "rss.xml", escape = "html")]
struct RssTemplate<'a> {
    channel: &'a ChannelConfig,
    build_date: String,
    items: Vec<ItemView<'a>>,
}

/// Per-story view. `title`, `category` and `body` arrive pre-escaped.
struct ItemView<'a> {
    title: &'a str,
    link: &'a str,
    guid: &'a str,
    published_at: &'a str,
    category: &'a str,
    positivity: &'a str,
    image: &'a str,
    body: String,
}

impl FeedRenderer for RssRenderer {
    fn render(&self, output: &FeedOutput) -> Result<String> {
        let items = output
            .stories
            .iter()
            .map(|story| ItemView {
                title: &story.title,
                link: &story.link,
                guid: &story.guid,
                published_at: &story.published_at,
                category: &story.category,
                positivity: story.positivity.as_deref().unwrap_or_default(),
                image: &story.image,
                body: cdata_safe(&story.body),
            })
            .collect();

        let template = RssTemplate {
            channel: &self.channel,
            build_date: output.build_date(),
            items,
        };

        let text = template
            .render()
            .map_err(|e| MindfulNewsError::Render(e.to_string()))?;
        debug!(bytes = text.len(), items = output.stories.len(), "feed rendered");
        Ok(text)
    }
}

/// A literal `]]>` would close the CDATA section early.
fn cdata_safe(body: &str) -> String {
    body.replace("]]>", "]]&gt;")
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Occurrence counts of the markers that make a document well-formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentCounts {
    pub declarations: usize,
    pub root_open: usize,
    pub root_close: usize,
}

impl DocumentCounts {
    pub fn scan(text: &str) -> Self {
        Self {
            declarations: text.matches("<?xml").count(),
            root_open: text.matches("<rss").count(),
            root_close: text.matches("</rss>").count(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.declarations == 1 && self.root_open == 1 && self.root_close == 1
    }
}

/// Require exactly one declaration and one `<rss>` ... `</rss>` pair.
pub fn validate_document(text: &str) -> Result<DocumentCounts> {
    let counts = DocumentCounts::scan(text);
    if counts.is_well_formed() {
        Ok(counts)
    } else {
        Err(MindfulNewsError::validation(format!(
            "expected exactly one of each marker, found {} <?xml, {} <rss, {} </rss>",
            counts.declarations, counts.root_open, counts.root_close
        )))
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Replace the document at `path`, removing any previous file first.
pub fn write_document(path: &Path, text: &str) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| MindfulNewsError::io(path, e))?;
        info!(path = %path.display(), "previous output removed");
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MindfulNewsError::io(parent, e))?;
    }
    std::fs::write(path, text).map_err(|e| MindfulNewsError::io(path, e))?;
    info!(path = %path.display(), bytes = text.len(), "output written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mindfulnews_shared::SynthesizedStory;

    fn story(title: &str, body: &str) -> SynthesizedStory {
        SynthesizedStory {
            title: title.into(),
            body: body.into(),
            category: "Environment &amp; Climate".into(),
            positivity: Some("Constructive".into()),
            link: "https://news.example.com/a?x=1&y=2".into(),
            image: "https://cdn.example.com/a.jpg".into(),
            published_at: "Sat, 21 Jun 2025 07:05:09 +0000".into(),
            guid: "abc123".into(),
        }
    }

    fn output(stories: Vec<SynthesizedStory>) -> FeedOutput {
        FeedOutput {
            stories,
            build_time: Utc.with_ymd_and_hms(2025, 6, 21, 12, 0, 0).unwrap(),
        }
    }

    fn renderer() -> RssRenderer {
        RssRenderer::new(ChannelConfig::default())
    }

    #[test]
    fn rendered_feed_is_well_formed() {
        let text = renderer()
            .render(&output(vec![
                story("Reefs &amp; rivers", "<p>One.</p>"),
                story("Quiet towns", "<p>Two.</p>"),
            ]))
            .unwrap();

        let counts = validate_document(&text).unwrap();
        assert_eq!(counts.declarations, 1);
        assert_eq!(text.matches("<item>").count(), 2);
        assert!(text.contains("<lastBuildDate>Sat, 21 Jun 2025 12:00:00 +0000</lastBuildDate>"));
    }

    #[test]
    fn pre_escaped_fields_are_not_double_escaped() {
        let text = renderer()
            .render(&output(vec![story("Reefs &amp; rivers", "<p>Calm</p>")]))
            .unwrap();
        assert!(text.contains("<title>Reefs &amp; rivers</title>"));
        assert!(text.contains("<category>Environment &amp; Climate</category>"));
        assert!(text.contains("<![CDATA[<p>Calm</p>]]>"));
        assert!(text.contains(r#"<category domain="positivity">Constructive</category>"#));
    }

    #[test]
    fn urls_are_escaped_by_the_template() {
        let text = renderer()
            .render(&output(vec![story("T", "<p>b</p>")]))
            .unwrap();
        assert!(text.contains("<link>https://news.example.com/a?x=1&amp;y=2</link>"));
    }

    #[test]
    fn cdata_terminator_in_body_is_neutralized() {
        let text = renderer()
            .render(&output(vec![story("T", "<p>a ]]> b</p>")]))
            .unwrap();
        assert!(text.contains("<![CDATA[<p>a ]]&gt; b</p>]]>"));
    }

    #[test]
    fn empty_feed_still_validates() {
        let text = renderer().render(&output(Vec::new())).unwrap();
        assert!(validate_document(&text).is_ok());
        assert!(!text.contains("<item>"));
    }

    #[test]
    fn validator_rejects_duplicate_blocks() {
        let doc = r#"<?xml version="1.0"?><rss></rss><?xml version="1.0"?><rss></rss>"#;
        let err = validate_document(doc).unwrap_err();
        assert!(err.to_string().contains("2 <?xml"));

        let missing_close = r#"<?xml version="1.0"?><rss version="2.0">"#;
        assert!(validate_document(missing_close).is_err());
    }

    #[test]
    fn write_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("feed.xml");

        write_document(&path, "first").unwrap();
        write_document(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
