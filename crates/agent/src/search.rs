//! Brave Search web backend.
//!
//! Brave API: https://api-dashboard.search.brave.com/app/documentation/web-search

use crate::collaborators::WebSearchBackend;
use async_trait::async_trait;
use cityhub_core::{AppError, AppResult};
use scraper::Html;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BRAVE_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave caps `count` at 20.
const MAX_COUNT: usize = 20;

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

pub struct BraveSearch {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl BraveSearch {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Search(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl WebSearchBackend for BraveSearch {
    async fn search(&self, query: &str, count: usize) -> AppResult<Vec<String>> {
        let count = count.clamp(1, MAX_COUNT);
        tracing::debug!(count, "Sending search request to Brave");

        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", &count.to_string())])
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Failed to reach Brave Search: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Search(format!(
                "Brave Search returned {}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Search(format!("Failed to read Brave response: {}", e)))?;

        let snippets = parse_snippets(&body)?;
        tracing::debug!(results = snippets.len(), "Brave Search replied");
        Ok(snippets.into_iter().take(count).collect())
    }
}

/// Extract plain-text snippets from a Brave response body.
///
/// Descriptions carry inline markup (`<strong>`); a result with no
/// description falls back to its title.
fn parse_snippets(body: &str) -> AppResult<Vec<String>> {
    let parsed: BraveResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Search(format!("Failed to parse Brave response: {}", e)))?;

    Ok(parsed
        .web
        .map(|web| web.results)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|result| {
            let text = strip_markup(&result.description);
            let text = if text.is_empty() {
                strip_markup(&result.title)
            } else {
                text
            };
            (!text.is_empty()).then_some(text)
        })
        .collect())
}

fn strip_markup(fragment: &str) -> String {
    let text: String = Html::parse_fragment(fragment).root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
