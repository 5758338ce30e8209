//! Web search tool: search_web
//!
//! Queries the DuckDuckGo Instant Answer API (no API key needed). The
//! search collaborator is best-effort: unavailability degrades this one
//! tool to an error result, never the whole request.

use async_trait::async_trait;
use proxy_domain::{PermissionClass, ToolCall, ToolDefinition, ToolError, ToolParameter};
use serde::Deserialize;
use tracing::debug;

use super::registry::ToolHandler;

pub const SEARCH_WEB: &str = "search_web";

const DDG_API_URL: &str = "https://api.duckduckgo.com/";

const MAX_RELATED_TOPICS: usize = 5;

pub fn search_web_definition() -> ToolDefinition {
    ToolDefinition::new(
        SEARCH_WEB,
        "Search the web and return ranked result summaries",
        PermissionClass::Auto,
    )
    .with_parameter(ToolParameter::new("query", "The search query", true))
}

#[derive(Debug, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "Answer", default)]
    answer: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "FirstURL", default)]
    first_url: String,
}

pub struct SearchWebTool {
    client: reqwest::Client,
    endpoint: String,
}

impl SearchWebTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: DDG_API_URL.to_string(),
        }
    }

    /// Point at a different search endpoint (tests, self-hosted proxies).
    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchWebTool {
    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let query = call.require_string("query").map_err(ToolError::parameter)?;
        debug!(query, "search_web");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::execution_failed(format!("search service unavailable: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::execution_failed(format!(
                "search service returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let answer: InstantAnswer = response
            .json()
            .await
            .map_err(|e| ToolError::execution_failed(format!("invalid search response: {e}")))?;

        Ok(format_results(query, &answer))
    }
}

fn format_results(query: &str, answer: &InstantAnswer) -> String {
    let mut out = String::new();

    if !answer.answer.is_empty() {
        out.push_str(&format!("Answer: {}\n", answer.answer));
    }
    if !answer.abstract_text.is_empty() {
        out.push_str(&format!(
            "Summary: {} ({})\n",
            answer.abstract_text, answer.abstract_url
        ));
    }

    let topics: Vec<_> = answer
        .related_topics
        .iter()
        .filter(|t| !t.text.is_empty())
        .take(MAX_RELATED_TOPICS)
        .collect();
    if !topics.is_empty() {
        out.push_str("Related:\n");
        for topic in topics {
            out.push_str(&format!("- {} ({})\n", topic.text, topic.first_url));
        }
    }

    if out.is_empty() {
        format!("No results for '{query}'")
    } else {
        out
    }
}
