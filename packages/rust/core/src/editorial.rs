//! Optional editorial pass over finished stories.
//!
//! Each story is sent to the generator with the editorial instruction. The
//! reply must contain `Decision: Accept` or `Decision: Reject`; anything else,
//! including a failed call, rejects the story.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, instrument, warn};

use mindfulnews_llm::TextGenerator;
use mindfulnews_shared::SynthesizedStory;

static DECISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Decision:\s*(Accept|Reject)").unwrap());
static REASON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Reason:\s*(.+)").unwrap());

const NO_REASON: &str = "No reason provided";

/// Verdict parsed from an editorial reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorialDecision {
    Accept { reason: String },
    Reject { reason: String },
    /// No decision line was found.
    Undecided,
}

impl EditorialDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

pub fn parse_decision(reply: &str) -> EditorialDecision {
    let Some(decision) = DECISION.captures(reply) else {
        return EditorialDecision::Undecided;
    };
    let reason = REASON
        .captures(reply)
        .map(|c| c[1].trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| NO_REASON.to_string());

    if decision[1].eq_ignore_ascii_case("accept") {
        EditorialDecision::Accept { reason }
    } else {
        EditorialDecision::Reject { reason }
    }
}

/// Instruction followed by the story's fields in plain text.
pub fn editorial_request(prompt: &str, story: &SynthesizedStory) -> String {
    format!(
        "{prompt}\n\nHere is the article:\n\nTitle: {}\nCategory: {}\nPositivity: {}\nSummary:\n{}\n",
        html_escape::decode_html_entities(&story.title),
        html_escape::decode_html_entities(&story.category),
        story.positivity.as_deref().unwrap_or_default(),
        story.body,
    )
}

/// Stories that passed review, in their original order.
#[derive(Debug, Default)]
pub struct EditorialReport {
    pub accepted: Vec<SynthesizedStory>,
    pub rejected: usize,
}

/// Review every story sequentially.
#[instrument(skip_all, fields(stories = stories.len()))]
pub async fn review_stories(
    generator: &dyn TextGenerator,
    prompt: &str,
    stories: &[SynthesizedStory],
    max_tokens: u32,
) -> EditorialReport {
    let mut report = EditorialReport::default();

    for story in stories {
        let request = editorial_request(prompt, story);
        let decision = match generator.complete(&request, max_tokens).await {
            Ok(reply) => parse_decision(&reply),
            Err(e) => {
                warn!(guid = %story.guid, error = %e, "editorial call failed, rejecting");
                report.rejected += 1;
                continue;
            }
        };

        match decision {
            EditorialDecision::Accept { reason } => {
                info!(title = %story.title, %reason, "accepted");
                report.accepted.push(story.clone());
            }
            EditorialDecision::Reject { reason } => {
                info!(title = %story.title, %reason, "rejected");
                report.rejected += 1;
            }
            EditorialDecision::Undecided => {
                warn!(title = %story.title, "no decision found, rejecting");
                report.rejected += 1;
            }
        }
    }

    report
}
