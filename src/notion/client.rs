use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use super::dto::{Page, QueryDatabaseRequest, QueryDatabaseResponse};

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_API_VERSION: &str = "2022-06-28";

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to parse Notion response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unexpected response {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

#[async_trait]
pub trait NotionClient: Send + Sync {
    async fn get_page(&self, page_id: &str) -> Result<Page, NotionError>;

    async fn get_page_properties(
        &self,
        page_id: &str,
    ) -> Result<std::collections::HashMap<String, super::dto::Property>, NotionError> {
        Ok(self.get_page(page_id).await?.properties)
    }

    /// Returns the children of a block/page as raw JSON, handling pagination.
    /// When `recursive` is true, descends into every child that has
    /// `has_children = true` and flattens its descendants depth-first into
    /// the same list, so callers get the full subtree as one flat sequence.
    async fn get_block_children(&self, block_id: &str, recursive: bool) -> Result<Vec<serde_json::Value>, NotionError>;

    async fn query_database(
        &self,
        database_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<QueryDatabaseResponse, NotionError>;

    async fn query_all_pages(&self, database_id: &str) -> Result<Vec<Page>, NotionError> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let result = self.query_database(database_id, cursor.as_deref()).await?;
            pages.extend(result.results);
            if !result.has_more {
                break;
            }
            cursor = result.next_cursor;
        }
        Ok(pages)
    }
}

pub struct NotionHttpClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl NotionHttpClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, NOTION_API_BASE.to_string())
    }

    /// Builds a client against a custom base URL, for pointing at a mock server in tests.
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build notion http client");
        Self { client, api_key, base_url }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.api_key)).unwrap(),
        );
        headers.insert(
            "Notion-Version",
            reqwest::header::HeaderValue::from_static(NOTION_API_VERSION),
        );
        headers
    }
}

async fn unexpected(resp: reqwest::Response) -> NotionError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    NotionError::UnexpectedStatus { status, body }
}

#[async_trait]
impl NotionClient for NotionHttpClient {
    async fn get_page(&self, page_id: &str) -> Result<Page, NotionError> {
        let url = format!("{}/pages/{page_id}", self.base_url);
        let resp = self.client.get(&url).headers(self.headers()).send().await?;
        if !resp.status().is_success() {
            return Err(unexpected(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn get_block_children(&self, block_id: &str, recursive: bool) -> Result<Vec<serde_json::Value>, NotionError> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = format!("{}/blocks/{block_id}/children?page_size=100", self.base_url);
            if let Some(c) = &cursor {
                url.push_str(&format!("&start_cursor={c}"));
            }
            let resp = self.client.get(&url).headers(self.headers()).send().await?;
            if !resp.status().is_success() {
                return Err(unexpected(resp).await);
            }
            let data: serde_json::Value = resp.json().await?;
            let results = data
                .get("results")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            blocks.extend(results);

            if !data.get("has_more").and_then(|v| v.as_bool()).unwrap_or(false) {
                break;
            }
            cursor = data
                .get("next_cursor")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
        }

        if !recursive {
            return Ok(blocks);
        }

        let mut expanded = Vec::with_capacity(blocks.len());
        for block in blocks {
            let has_children = block.get("has_children").and_then(|v| v.as_bool()).unwrap_or(false);
            let child_id = block.get("id").and_then(|v| v.as_str()).map(str::to_string);
            expanded.push(block);

            if has_children {
                if let Some(child_id) = child_id {
                    let descendants = self.get_block_children(&child_id, true).await?;
                    expanded.extend(descendants);
                }
            }
        }

        Ok(expanded)
    }

    async fn query_database(
        &self,
        database_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<QueryDatabaseResponse, NotionError> {
        let url = format!("{}/databases/{database_id}/query", self.base_url);
        let body = QueryDatabaseRequest {
            filter: None,
            sorts: None,
            start_cursor: start_cursor.map(str::to_string),
            page_size: Some(100),
        };

        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(unexpected(resp).await);
        }

        Ok(resp.json().await?)
    }
}

/// A client that performs no network calls, for local/dev use without Notion credentials.
pub struct NoopNotionClient;

#[async_trait]
impl NotionClient for NoopNotionClient {
    async fn get_page(&self, page_id: &str) -> Result<Page, NotionError> {
        Ok(Page {
            id: page_id.to_string(),
            properties: std::collections::HashMap::new(),
            created_time: String::new(),
            last_edited_time: String::new(),
            archived: false,
        })
    }

    async fn get_block_children(&self, _block_id: &str, _recursive: bool) -> Result<Vec<serde_json::Value>, NotionError> {
        Ok(Vec::new())
    }

    async fn query_database(
        &self,
        _database_id: &str,
        _start_cursor: Option<&str>,
    ) -> Result<QueryDatabaseResponse, NotionError> {
        Ok(QueryDatabaseResponse {
            results: Vec::new(),
            has_more: false,
            next_cursor: None,
        })
    }
}
