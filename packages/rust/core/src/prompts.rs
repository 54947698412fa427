//! Instruction text sent to the text generator.
//!
//! Built-in prompts ship with the binary; each can be replaced by a file named
//! in the `[prompts]` config section. The first line of a prompt is its
//! version tag and is logged at startup.

use std::path::Path;

use mindfulnews_shared::{MindfulNewsError, PromptsConfig, Result};

pub const DEFAULT_CLUSTERING_PROMPT: &str = "\
mindfulnews clustering prompt v2
You are the editor of a calm, constructive news digest.
Below is a JSON array of news articles, each with a numeric \"id\" and a \"title\".
Group the articles into clusters that cover the same story or topic.
Give each cluster a short, neutral theme of two to five words.
Every article belongs to exactly one cluster. Singletons are allowed.

Reply with a JSON array only, no commentary, in this exact shape:
[
  {\"theme\": \"Ocean Conservation\", \"articles\": [3, 7, 12]}
]
The \"articles\" list contains article ids from the input.";

pub const DEFAULT_SYNTHESIS_PROMPT: &str = "\
mindfulnews synthesis prompt v2
You are writing for Mindful News, a publication that reports the world calmly.
Below is a JSON array of related articles. Write one original story that
synthesizes them: factual, balanced, free of sensationalism and fear-driven
language, and focused on context, progress and constructive angles.

Format your reply exactly like this:
TITLE: <a calm, informative headline>
CATEGORY: <one short topic label>
POSITIVITY: <Uplifting | Constructive | Neutral>
<p>First paragraph.</p>
<p>Further paragraphs.</p>

Use only <p> paragraphs in the body, with optional <em>, <strong> and <a> inline.
Do not include an XML declaration or any RSS or channel tags.";

pub const DEFAULT_EDITORIAL_PROMPT: &str = "\
mindfulnews editorial filter prompt v1
You are the final editorial reviewer for Mindful News.
Decide whether the article below fits a calm, constructive news digest.
Reject pieces that are sensational, graphic, fear-driven, or purely partisan.

Reply in exactly this format:
Decision: Accept or Reject
Reason: <one sentence>";

/// The three instruction texts used by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub clustering: String,
    pub synthesis: String,
    pub editorial: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            clustering: DEFAULT_CLUSTERING_PROMPT.to_string(),
            synthesis: DEFAULT_SYNTHESIS_PROMPT.to_string(),
            editorial: DEFAULT_EDITORIAL_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, reading any configured override files.
    pub fn load(config: &PromptsConfig) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            clustering: read_or(config.clustering.as_deref(), defaults.clustering)?,
            synthesis: read_or(config.synthesis.as_deref(), defaults.synthesis)?,
            editorial: read_or(config.editorial.as_deref(), defaults.editorial)?,
        })
    }

    /// `(name, version line)` for each prompt.
    pub fn versions(&self) -> [(&'static str, &str); 3] {
        [
            ("clustering", version_line(&self.clustering)),
            ("synthesis", version_line(&self.synthesis)),
            ("editorial", version_line(&self.editorial)),
        ]
    }
}

/// First non-blank line of a prompt, trimmed.
pub fn version_line(prompt: &str) -> &str {
    prompt
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown")
}

fn read_or(path: Option<&Path>, default: String) -> Result<String> {
    let Some(path) = path else {
        return Ok(default);
    };
    let text = std::fs::read_to_string(path).map_err(|e| MindfulNewsError::io(path, e))?;
    if text.trim().is_empty() {
        return Err(MindfulNewsError::config(format!(
            "prompt file is empty: {}",
            path.display()
        )));
    }
    Ok(text)
}
