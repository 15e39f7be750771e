//! Web search via the DuckDuckGo Instant Answers API (no key required).

use anyhow::Result;
use async_trait::async_trait;

use crate::{arg_str, arg_u64, DangerClass, ParamSpec, ParamType, Tool, ToolOutcome, ToolSpec};

pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .user_agent("reagent/0.1")
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_search".to_string(),
            description: "Search the web and return a short summary with related results."
                .to_string(),
            params: vec![
                ParamSpec::required("query", "Search query string"),
                ParamSpec::optional("max_results", "Maximum related results (default: 5)")
                    .typed(ParamType::Integer),
            ],
            danger: DangerClass::Safe,
        }
    }

    async fn run(&self, args: &serde_json::Value) -> Result<ToolOutcome> {
        let query = arg_str(args, "query")
            .ok_or_else(|| anyhow::anyhow!("missing required param: query"))?;
        let max_results = arg_u64(args, "max_results").unwrap_or(5) as usize;

        let response = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await;

        let body: serde_json::Value = match response {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(body) => body,
                Err(err) => {
                    return Ok(ToolOutcome::error(format!("unreadable search response: {err}"))
                        .with_meta("query", query));
                }
            },
            Ok(response) => {
                return Ok(ToolOutcome::error(format!(
                    "search failed with status {}",
                    response.status()
                ))
                .with_meta("query", query));
            }
            Err(err) => {
                return Ok(ToolOutcome::error(format!("search request failed: {err}"))
                    .with_meta("query", query));
            }
        };

        let mut sections: Vec<String> = Vec::new();
        if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() {
                sections.push(abstract_text.to_string());
            }
        }

        let topics = body
            .get("RelatedTopics")
            .and_then(|v| v.as_array())
            .map(|topics| {
                topics
                    .iter()
                    .filter_map(|topic| {
                        let text = topic.get("Text")?.as_str()?;
                        let url = topic.get("FirstURL").and_then(|u| u.as_str()).unwrap_or("");
                        Some(if url.is_empty() {
                            format!("- {text}")
                        } else {
                            format!("- {text} ({url})")
                        })
                    })
                    .take(max_results)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if !topics.is_empty() {
            sections.push(format!("Related:\n{}", topics.join("\n")));
        }

        if sections.is_empty() {
            return Ok(ToolOutcome::success(format!("no results found for '{query}'"))
                .with_meta("query", query)
                .with_meta("results", 0));
        }

        Ok(ToolOutcome::success(sections.join("\n\n"))
            .with_meta("query", query)
            .with_meta("results", topics.len() as u64))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
