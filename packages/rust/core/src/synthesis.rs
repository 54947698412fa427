//! Synthesizer: one rewritten story per cluster.
//!
//! The generator is asked for a story built from the member articles. Short
//! answers are re-requested with an expansion instruction appended, up to a
//! fixed number of attempts. The final text is split into marker fields and a
//! sanitized paragraph body.

use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use mindfulnews_ingest::strip_declarations;
use mindfulnews_llm::TextGenerator;
use mindfulnews_shared::{Article, ArticleId, MindfulNewsError, PipelineConfig, Result};

static FEED_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:rss|channel)\b[^>]*>").unwrap());

/// A declaration cut off before its closing `>`, up to the end of its line.
static DANGLING_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)<\?xml\b[^>\n]*$").unwrap());

static MARKER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s*#]*(title|category|positivity)[\s*]*:[\s*]*(.*?)[\s*]*$").unwrap()
});

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Remove `<rss>` and `<channel>` open/close tags echoed back by the generator.
pub fn strip_feed_wrappers(text: &str) -> String {
    FEED_WRAPPER.replace_all(text, "").trim().to_string()
}

/// Declarations (complete or truncated) and feed wrappers removed, whitespace
/// trimmed.
pub fn clean_response(text: &str) -> String {
    let text = strip_declarations(text);
    strip_feed_wrappers(&DANGLING_DECLARATION.replace_all(&text, ""))
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct MemberRecord<'a> {
    id: ArticleId,
    title: &'a str,
    link: &'a str,
    summary: &'a str,
    #[serde(rename = "pubDate")]
    pub_date: String,
    image: &'a str,
}

/// Instruction followed by the pretty-printed member articles.
pub fn synthesis_request(prompt: &str, members: &[&Article]) -> Result<String> {
    let records: Vec<MemberRecord<'_>> = members
        .iter()
        .map(|a| MemberRecord {
            id: a.id,
            title: &a.title,
            link: &a.link,
            summary: &a.summary,
            pub_date: a.published_at.to_rfc3339(),
            image: a.image.as_deref().unwrap_or_default(),
        })
        .collect();
    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| MindfulNewsError::parse(format!("failed to encode articles: {e}")))?;
    Ok(format!("{prompt}\n\n{json}"))
}

fn expansion_instruction(min_chars: usize) -> String {
    format!(
        "\n\nPlease expand the above synthesis to reach at least {min_chars} characters, \
         maintaining a calm and mindful tone."
    )
}

/// Request a synthesis, re-prompting while the cleaned answer is too short.
///
/// Issues at most `config.max_synthesis_attempts` requests and returns the
/// last cleaned answer, long enough or not.
#[instrument(skip_all, fields(theme = %theme, members = members.len()))]
pub async fn synthesize(
    generator: &dyn TextGenerator,
    prompt: &str,
    theme: &str,
    members: &[&Article],
    config: &PipelineConfig,
    max_tokens: u32,
) -> Result<String> {
    let max_attempts = config.max_synthesis_attempts.max(1);
    let mut request = synthesis_request(prompt, members)?;
    let mut attempt = 1;

    loop {
        let output = clean_response(&generator.complete(&request, max_tokens).await?);
        let chars = output.chars().count();
        debug!(attempt, chars, "synthesis received");

        if chars >= config.min_synthesis_chars {
            return Ok(output);
        }
        if attempt >= max_attempts {
            warn!(
                chars,
                min = config.min_synthesis_chars,
                attempts = attempt,
                "synthesis still below minimum length, keeping last attempt"
            );
            return Ok(output);
        }

        request.push_str(&expansion_instruction(config.min_synthesis_chars));
        attempt += 1;
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Fields extracted from a synthesis response.
///
/// Marker fields are `None` when the response did not carry them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisParts {
    pub title: Option<String>,
    pub category: Option<String>,
    pub positivity: Option<String>,
    /// Sanitized `<p>` markup.
    pub body: String,
}

/// Split leading `TITLE:` / `CATEGORY:` / `POSITIVITY:` lines off and
/// sanitize the rest into paragraphs.
pub fn parse_synthesis(text: &str) -> SynthesisParts {
    let mut parts = SynthesisParts::default();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.peek() {
        if line.trim().is_empty() {
            lines.next();
            continue;
        }
        let Some(caps) = MARKER_LINE.captures(line) else {
            break;
        };
        let value = caps[2].trim();
        let value = (!value.is_empty()).then(|| value.to_string());
        let slot = match caps[1].to_ascii_lowercase().as_str() {
            "title" => &mut parts.title,
            "category" => &mut parts.category,
            _ => &mut parts.positivity,
        };
        if slot.is_none() {
            *slot = value;
        }
        lines.next();
    }

    let rest: Vec<&str> = lines.collect();
    parts.body = sanitize_body(&rest.join("\n"));
    parts
}

/// Keep only `<p>` elements with a small inline allowlist inside them.
///
/// Text without any paragraph is split on blank lines and each block wrapped.
pub fn sanitize_body(raw: &str) -> String {
    let paragraphs = paragraphs_of(raw);
    if !paragraphs.is_empty() {
        return paragraphs.concat();
    }

    let wrapped: String = BLANK_LINES
        .split(raw.trim())
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| format!("<p>{block}</p>"))
        .collect();
    paragraphs_of(&wrapped).concat()
}

fn paragraphs_of(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let p_sel = Selector::parse("p").unwrap();

    fragment
        .select(&p_sel)
        .filter_map(|p| {
            let mut inner = String::new();
            render_inline(p, &mut inner);
            let inner = inner.trim();
            (!inner.is_empty()).then(|| format!("<p>{inner}</p>"))
        })
        .collect()
}

fn render_inline(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let text: &str = text;
                out.push_str(&html_escape::encode_text(text));
            }
            Node::Element(element) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                match element.name() {
                    "script" | "style" => {}
                    "br" => out.push_str("<br/>"),
                    tag @ ("em" | "strong" | "b" | "i") => {
                        out.push('<');
                        out.push_str(tag);
                        out.push('>');
                        render_inline(child_el, out);
                        out.push_str("</");
                        out.push_str(tag);
                        out.push('>');
                    }
                    "a" => match element.attr("href").map(str::trim).filter(|h| is_http(h)) {
                        Some(href) => {
                            out.push_str("<a href=\"");
                            out.push_str(&html_escape::encode_double_quoted_attribute(href));
                            out.push_str("\">");
                            render_inline(child_el, out);
                            out.push_str("</a>");
                        }
                        None => render_inline(child_el, out),
                    },
                    _ => render_inline(child_el, out),
                }
            }
            _ => {}
        }
    }
}

fn is_http(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use chrono::{TimeZone, Utc};
    use mindfulnews_shared::AppConfig;

    fn member(id: u32) -> Article {
        Article {
            id: ArticleId(id),
            title: format!("Story {id}"),
            link: format!("https://news.example.com/{id}"),
            summary: "<p>Details</p>".into(),
            published_at: Utc.with_ymd_and_hms(2025, 6, 21, 8, 0, 0).unwrap(),
            image: None,
            source_region: None,
        }
    }

    fn config(min: usize, attempts: u32) -> PipelineConfig {
        PipelineConfig {
            min_synthesis_chars: min,
            max_synthesis_attempts: attempts,
            ..PipelineConfig::from(&AppConfig::default())
        }
    }

    #[test]
    fn request_serializes_member_records() {
        let a = member(4);
        let request = synthesis_request("Write calmly.", &[&a]).unwrap();
        assert!(request.starts_with("Write calmly.\n\n["));
        assert!(request.contains(r#""pubDate": "2025-06-21T08:00:00+00:00""#));
        assert!(request.contains(r#""image": """#));
    }

    #[tokio::test]
    async fn short_answers_stop_at_max_attempts() {
        let generator = ScriptedGenerator::new(["ok", "still short"]);
        let a = member(1);
        let text = synthesize(&generator, "P", "Theme", &[&a], &config(500, 2), 100)
            .await
            .unwrap();

        assert_eq!(text, "still short");
        assert_eq!(generator.calls(), 2);
        let prompts = generator.prompts();
        assert!(prompts[1].starts_with(&prompts[0]));
        assert!(prompts[1].ends_with(
            "Please expand the above synthesis to reach at least 500 characters, \
             maintaining a calm and mindful tone."
        ));
    }

    #[tokio::test]
    async fn long_enough_answer_returns_immediately() {
        let long = "a".repeat(40);
        let generator = ScriptedGenerator::new([long.clone(), "unused".into()]);
        let a = member(1);
        let text = synthesize(&generator, "P", "Theme", &[&a], &config(40, 3), 100)
            .await
            .unwrap();
        assert_eq!(text, long);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn length_is_measured_after_cleaning() {
        // 20 chars of content wrapped in 40+ chars of artifacts.
        let wrapped = r#"<?xml version="1.0"?><rss version="2.0"><channel>abcdefghijklmnopqrst</channel></rss>"#;
        let generator = ScriptedGenerator::new([wrapped, "abcdefghijklmnopqrstuvwxy"]);
        let a = member(1);
        let text = synthesize(&generator, "P", "Theme", &[&a], &config(25, 3), 100)
            .await
            .unwrap();
        assert_eq!(text, "abcdefghijklmnopqrstuvwxy");
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let generator = ScriptedGenerator::failing();
        let a = member(1);
        let result = synthesize(&generator, "P", "Theme", &[&a], &config(10, 3), 100).await;
        assert!(result.is_err());
    }

    #[test]
    fn wrappers_and_declarations_are_stripped() {
        let text = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<RSS version=\"2.0\">\n<channel>\n<p>Body</p>\n</channel>\n</rss>";
        assert_eq!(clean_response(text), "<p>Body</p>");
    }

    #[test]
    fn truncated_declaration_is_stripped() {
        let text = "<p>Body</p>\n<?xml version=\"1.0\"";
        assert_eq!(clean_response(text), "<p>Body</p>");

        let text = "<?xml version=\"1.0\n<p>Body</p>";
        assert_eq!(clean_response(text), "<p>Body</p>");
    }

    #[test]
    fn markers_are_split_off_case_insensitively() {
        let text = "\nTITLE: Reefs Rebound\ncategory: Environment\n**Positivity:** Uplifting\n<p>Corals are back.</p>";
        let parts = parse_synthesis(text);
        assert_eq!(parts.title.as_deref(), Some("Reefs Rebound"));
        assert_eq!(parts.category.as_deref(), Some("Environment"));
        assert_eq!(parts.positivity.as_deref(), Some("Uplifting"));
        assert_eq!(parts.body, "<p>Corals are back.</p>");
    }

    #[test]
    fn missing_markers_leave_fields_empty() {
        let parts = parse_synthesis("<p>Only a body.</p>");
        assert_eq!(parts.title, None);
        assert_eq!(parts.category, None);
        assert_eq!(parts.body, "<p>Only a body.</p>");
    }

    #[test]
    fn body_keeps_only_paragraphs_and_allowed_inline_tags() {
        let raw = r#"<h1>Heading</h1>
<p>Calm <strong>progress</strong> and <a href="https://example.com/x?a=1&b=2" onclick="x()">a link</a>.</p>
<div><p>Nested <span class="x">span</span><img src="y.png"> text<br>line</p></div>
<p><a href="javascript:alert(1)">bad link</a> <script>alert(1)</script>kept</p>
<ul><li>dropped</li></ul>"#;
        let body = sanitize_body(raw);
        assert_eq!(
            body,
            "<p>Calm <strong>progress</strong> and <a href=\"https://example.com/x?a=1&amp;b=2\">a link</a>.</p>\
             <p>Nested span text<br/>line</p>\
             <p>bad link kept</p>"
        );
    }

    #[test]
    fn text_is_reescaped() {
        let body = sanitize_body("<p>5 &lt; 7 &amp; fish</p>");
        assert_eq!(body, "<p>5 &lt; 7 &amp; fish</p>");
    }

    #[test]
    fn plain_text_blocks_become_paragraphs() {
        let body = sanitize_body("First block\nstill first.\n\n  \nSecond & last.");
        assert_eq!(body, "<p>First block\nstill first.</p><p>Second &amp; last.</p>");
    }

    #[test]
    fn empty_paragraphs_are_dropped() {
        assert_eq!(sanitize_body("<p> </p><p>Kept</p>"), "<p>Kept</p>");
        assert_eq!(sanitize_body(""), "");
    }
}
