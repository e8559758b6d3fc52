//! Web search tool backed by the DuckDuckGo Instant Answer API.
//!
//! The API needs no key. It returns an abstract for well-known entities plus
//! a list of related topics, which together make a compact text block the
//! model can cite.

use async_trait::async_trait;
use finchat_core::error::ToolError;
use finchat_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";
const MAX_TOPICS: usize = 5;

pub struct DuckDuckGoSearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearchTool {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Point the tool at a different Instant Answer compatible endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for DuckDuckGoSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo. Useful for current events, company news and \
         facts you are unsure about. Input is a search query."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a non-empty string".into()))?;

        debug!(query, "Running DuckDuckGo search");

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "duckduckgo_search".into(),
            reason,
        };

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(failed(format!("search API returned {status}")));
        }

        // The API answers with `application/x-javascript`, so decode by hand.
        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        let answer: InstantAnswer =
            serde_json::from_str(&body).map_err(|e| failed(format!("unexpected response: {e}")))?;

        Ok(ToolResult::ok(format_answer(query, &answer)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a single topic or a named group of topics.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Item {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn flatten_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<(&'a str, &'a str)>) {
    for topic in topics {
        match topic {
            RelatedTopic::Item { text, first_url } if !text.is_empty() => out.push((text, first_url)),
            RelatedTopic::Item { .. } => {}
            RelatedTopic::Group { topics } => flatten_topics(topics, out),
        }
    }
}

fn format_answer(query: &str, answer: &InstantAnswer) -> String {
    let mut sections = Vec::new();

    if !answer.answer.is_empty() {
        sections.push(answer.answer.clone());
    }

    if !answer.abstract_text.is_empty() {
        let mut block = String::new();
        if !answer.heading.is_empty() {
            block.push_str(&answer.heading);
            block.push_str(": ");
        }
        block.push_str(&answer.abstract_text);
        if !answer.abstract_url.is_empty() {
            block.push_str(&format!(" ({})", answer.abstract_url));
        }
        sections.push(block);
    }

    let mut topics = Vec::new();
    flatten_topics(&answer.related_topics, &mut topics);
    let related: Vec<String> = topics
        .into_iter()
        .take(MAX_TOPICS)
        .map(|(text, url)| if url.is_empty() { format!("- {text}") } else { format!("- {text} ({url})") })
        .collect();
    if !related.is_empty() {
        sections.push(format!("Related:\n{}", related.join("\n")));
    }

    if sections.is_empty() {
        format!("No results found for '{query}'.")
    } else {
        sections.join("\n\n")
    }
}
