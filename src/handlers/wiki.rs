// ABOUTME: !wiki command - full-text search against the NixOS wiki's MediaWiki API
// ABOUTME: Replies with a markdown list of page links

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nixbot_core::{Handler, HandlerContext};
use serde::Deserialize;

pub const PATTERN: &str = "^!wiki (?P<search>.+)";

const WIKI_URL: &str = "https://wiki.nixos.org";
const SEARCH_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub query: SearchQuery,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub pageid: u64,
}

pub struct WikiSearch {
    client: reqwest::Client,
    base_url: String,
}

impl WikiSearch {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nixbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: WIKI_URL.to_string(),
        })
    }

    async fn search(&self, term: &str) -> Result<SearchResponse> {
        let url = format!("{}/w/api.php", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srlimit", SEARCH_LIMIT),
                ("srprop", "sectiontitle|snippet"),
                ("format", "json"),
                ("srsearch", term),
            ])
            .send()
            .await
            .context("Wiki search request failed")?
            .error_for_status()?;

        response
            .json::<SearchResponse>()
            .await
            .context("Failed to parse wiki search response")
    }
}

/// Markdown list of links to the pages in `response`
pub fn format_results(response: &SearchResponse) -> String {
    if response.query.search.is_empty() {
        return "No wiki pages found".to_string();
    }
    response
        .query
        .search
        .iter()
        .map(|hit| format!("- [{}]({}/wiki/?curid={})", hit.title, WIKI_URL, hit.pageid))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Handler for WikiSearch {
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        let term = cx.vars.get_or_empty("search").trim();
        let response = self.search(term).await?;
        tracing::debug!(
            search = %term,
            hits = response.query.search.len(),
            "Wiki search finished"
        );
        cx.reply.send_markdown(&format_results(&response)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results_links_by_page_id() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"batchcomplete":"","query":{"search":[
                {"ns":0,"title":"Flakes","pageid":42,"snippet":"x"},
                {"ns":0,"title":"Nix","pageid":7,"snippet":"y"}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(
            format_results(&response),
            "- [Flakes](https://wiki.nixos.org/wiki/?curid=42)\n- [Nix](https://wiki.nixos.org/wiki/?curid=7)"
        );
    }

    #[test]
    fn test_format_results_empty() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(format_results(&response), "No wiki pages found");
    }
}
