use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;

const ZOTERO_API_BASE: &str = "https://api.zotero.org";
const COLLECTION_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum ZoteroError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("version conflict, current version: {current_version}")]
    Conflict { current_version: i64 },

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("unexpected response {status}: {body}")]
    UnexpectedStatus {
        status: StatusCode,
        body: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoteroItem {
    pub key: String,
    pub version: i64,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoteroCollectionSummary {
    pub key: String,
    pub name: String,
}

#[async_trait]
pub trait ZoteroClient: Send + Sync {
    async fn get_item(
        &self,
        library_type: &str,
        library_id: i64,
        item_key: &str,
    ) -> Result<ZoteroItem, ZoteroError>;

    async fn patch_item(
        &self,
        library_type: &str,
        library_id: i64,
        item_key: &str,
        data: &serde_json::Value,
        version: i64,
    ) -> Result<i64, ZoteroError>;

    async fn create_note(
        &self,
        library_type: &str,
        library_id: i64,
        parent_key: &str,
        note_html: &str,
        tags: &[String],
    ) -> Result<ZoteroItem, ZoteroError>;

    async fn get_child_notes(
        &self,
        library_type: &str,
        library_id: i64,
        item_key: &str,
    ) -> Result<Vec<ZoteroItem>, ZoteroError>;

    async fn get_collections(
        &self,
        library_type: &str,
        library_id: i64,
    ) -> Result<Vec<ZoteroCollectionSummary>, ZoteroError>;

    async fn delete_item(
        &self,
        library_type: &str,
        library_id: i64,
        item_key: &str,
        version: i64,
    ) -> Result<(), ZoteroError>;
}

pub struct ZoteroHttpClient {
    client: Client,
    api_key: String,
    base_url: String,
    cached_user_id: Mutex<Option<i64>>,
}

impl ZoteroHttpClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, ZOTERO_API_BASE.to_string())
    }

    /// Builds a client against a custom base URL, for pointing at a mock server in tests.
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build zotero http client");

        Self {
            client,
            api_key,
            base_url,
            cached_user_id: Mutex::new(None),
        }
    }

    /// Resolve the numeric user ID for the current API key, caching the result.
    async fn user_id(&self) -> Result<i64, ZoteroError> {
        let mut cached = self.cached_user_id.lock().await;
        if let Some(id) = *cached {
            return Ok(id);
        }

        let url = format!("{}/keys/{}", self.base_url, self.api_key);
        let resp = self.request(reqwest::Method::GET, &url, None).await?;
        let body: serde_json::Value = resp.json().await?;
        let id = body
            .get("userID")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ZoteroError::UnexpectedStatus {
                status: StatusCode::OK,
                body: "response missing userID".to_string(),
            })?;

        tracing::info!("resolved zotero user id: {id}");
        *cached = Some(id);
        Ok(id)
    }

    /// Replace library_id=0 (the "owner of the current API key" alias) with the real user ID.
    async fn resolve_library_id(&self, library_type: &str, library_id: i64) -> Result<i64, ZoteroError> {
        if library_type == "users" && library_id == 0 {
            self.user_id().await
        } else {
            Ok(library_id)
        }
    }

    fn auth_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Zotero-API-Key",
            reqwest::header::HeaderValue::from_str(&self.api_key).unwrap(),
        );
        headers
    }

    /// Issues a request, retrying once after the advertised delay on a 429.
    async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ZoteroError> {
        let send = |client: &Client| {
            let mut req = client.request(method.clone(), url).headers(self.auth_headers());
            if let Some(b) = body {
                req = req.json(b);
            }
            req
        };

        let resp = send(&self.client).send().await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5);
            tracing::warn!("zotero rate limited, retrying after {retry_after}s");
            tokio::time::sleep(std::time::Duration::from_secs(retry_after)).await;
            return Ok(send(&self.client).send().await?);
        }

        Ok(resp)
    }

    fn extract_version(resp: &reqwest::Response, fallback: i64) -> i64 {
        resp.headers()
            .get("Last-Modified-Version")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(fallback)
    }
}

#[async_trait]
impl ZoteroClient for ZoteroHttpClient {
    async fn get_item(
        &self,
        library_type: &str,
        library_id: i64,
        item_key: &str,
    ) -> Result<ZoteroItem, ZoteroError> {
        let library_id = self.resolve_library_id(library_type, library_id).await?;
        let url = format!("{}/{library_type}/{library_id}/items/{item_key}", self.base_url);
        let resp = self.request(reqwest::Method::GET, &url, None).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ZoteroError::NotFound(url));
        }
        if !resp.status().is_success() {
            return Err(unexpected(resp).await);
        }

        let version = Self::extract_version(&resp, 0);
        let body: serde_json::Value = resp.json().await?;
        let key = body
            .get("key")
            .and_then(|v| v.as_str())
            .unwrap_or(item_key)
            .to_string();
        let version = body
            .get("version")
            .and_then(|v| v.as_i64())
            .unwrap_or(version);
        let data = body.get("data").cloned().unwrap_or(serde_json::Value::Null);

        Ok(ZoteroItem { key, version, data })
    }

    async fn patch_item(
        &self,
        library_type: &str,
        library_id: i64,
        item_key: &str,
        data: &serde_json::Value,
        version: i64,
    ) -> Result<i64, ZoteroError> {
        let library_id = self.resolve_library_id(library_type, library_id).await?;
        let url = format!("{}/{library_type}/{library_id}/items/{item_key}", self.base_url);

        let mut headers = self.auth_headers();
        headers.insert(
            "If-Unmodified-Since-Version",
            reqwest::header::HeaderValue::from_str(&version.to_string()).unwrap(),
        );

        let resp = self
            .client
            .patch(&url)
            .headers(headers)
            .json(data)
            .send()
            .await?;

        if resp.status() == StatusCode::PRECONDITION_FAILED {
            let current_version = Self::extract_version(&resp, 0);
            return Err(ZoteroError::Conflict { current_version });
        }
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ZoteroError::NotFound(url));
        }
        if !resp.status().is_success() {
            return Err(unexpected(resp).await);
        }

        Ok(Self::extract_version(&resp, version))
    }

    async fn create_note(
        &self,
        library_type: &str,
        library_id: i64,
        parent_key: &str,
        note_html: &str,
        tags: &[String],
    ) -> Result<ZoteroItem, ZoteroError> {
        let library_id = self.resolve_library_id(library_type, library_id).await?;
        let url = format!("{}/{library_type}/{library_id}/items", self.base_url);

        let payload = json!([{
            "itemType": "note",
            "parentItem": parent_key,
            "note": note_html,
            "tags": tags.iter().map(|t| json!({ "tag": t })).collect::<Vec<_>>(),
        }]);

        let resp = self.request(reqwest::Method::POST, &url, Some(&payload)).await?;
        if !resp.status().is_success() {
            return Err(unexpected(resp).await);
        }

        let body: serde_json::Value = resp.json().await?;
        let created = body
            .get("successful")
            .and_then(|s| s.get("0"))
            .ok_or_else(|| ZoteroError::UnexpectedStatus {
                status: StatusCode::OK,
                body: "missing successful.0 in create response".to_string(),
            })?;

        Ok(ZoteroItem {
            key: created["key"].as_str().unwrap_or_default().to_string(),
            version: created["version"].as_i64().unwrap_or(0),
            data: created.get("data").cloned().unwrap_or(serde_json::Value::Null),
        })
    }

    async fn get_child_notes(
        &self,
        library_type: &str,
        library_id: i64,
        item_key: &str,
    ) -> Result<Vec<ZoteroItem>, ZoteroError> {
        let library_id = self.resolve_library_id(library_type, library_id).await?;
        let url = format!(
            "{}/{library_type}/{library_id}/items/{item_key}/children?itemType=note", self.base_url
        );
        let resp = self.request(reqwest::Method::GET, &url, None).await?;
        if !resp.status().is_success() {
            return Err(unexpected(resp).await);
        }

        let items: Vec<serde_json::Value> = resp.json().await?;
        Ok(items
            .into_iter()
            .map(|item| ZoteroItem {
                key: item["key"].as_str().unwrap_or_default().to_string(),
                version: item["version"].as_i64().unwrap_or(0),
                data: item.get("data").cloned().unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    async fn get_collections(
        &self,
        library_type: &str,
        library_id: i64,
    ) -> Result<Vec<ZoteroCollectionSummary>, ZoteroError> {
        let library_id = self.resolve_library_id(library_type, library_id).await?;
        let mut all = Vec::new();
        let mut start = 0i64;

        loop {
            let url = format!(
                "{}/{library_type}/{library_id}/collections?start={start}&limit={COLLECTION_PAGE_SIZE}", self.base_url
            );
            let resp = self.request(reqwest::Method::GET, &url, None).await?;
            if !resp.status().is_success() {
                return Err(unexpected(resp).await);
            }

            let items: Vec<serde_json::Value> = resp.json().await?;
            let count = items.len() as i64;
            for item in items {
                all.push(ZoteroCollectionSummary {
                    key: item["key"].as_str().unwrap_or_default().to_string(),
                    name: item["data"]["name"].as_str().unwrap_or_default().to_string(),
                });
            }

            if count < COLLECTION_PAGE_SIZE {
                break;
            }
            start += COLLECTION_PAGE_SIZE;
        }

        Ok(all)
    }

    async fn delete_item(
        &self,
        library_type: &str,
        library_id: i64,
        item_key: &str,
        version: i64,
    ) -> Result<(), ZoteroError> {
        let library_id = self.resolve_library_id(library_type, library_id).await?;
        let url = format!("{}/{library_type}/{library_id}/items/{item_key}", self.base_url);

        let mut headers = self.auth_headers();
        headers.insert(
            "If-Unmodified-Since-Version",
            reqwest::header::HeaderValue::from_str(&version.to_string()).unwrap(),
        );

        let resp = self.client.delete(&url).headers(headers).send().await?;

        if resp.status() == StatusCode::PRECONDITION_FAILED {
            let current_version = Self::extract_version(&resp, 0);
            return Err(ZoteroError::Conflict { current_version });
        }
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(unexpected(resp).await);
        }

        Ok(())
    }
}

async fn unexpected(resp: reqwest::Response) -> ZoteroError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    ZoteroError::UnexpectedStatus { status, body }
}

/// A client that performs no network calls, for local/dev use without Zotero credentials.
pub struct NoopZoteroClient;

#[async_trait]
impl ZoteroClient for NoopZoteroClient {
    async fn get_item(
        &self,
        _library_type: &str,
        _library_id: i64,
        item_key: &str,
    ) -> Result<ZoteroItem, ZoteroError> {
        Err(ZoteroError::NotFound(item_key.to_string()))
    }

    async fn patch_item(
        &self,
        _library_type: &str,
        _library_id: i64,
        _item_key: &str,
        _data: &serde_json::Value,
        version: i64,
    ) -> Result<i64, ZoteroError> {
        Ok(version)
    }

    async fn create_note(
        &self,
        _library_type: &str,
        _library_id: i64,
        parent_key: &str,
        note_html: &str,
        _tags: &[String],
    ) -> Result<ZoteroItem, ZoteroError> {
        Ok(ZoteroItem {
            key: format!("noop-note-{parent_key}"),
            version: 1,
            data: json!({ "note": note_html }),
        })
    }

    async fn get_child_notes(
        &self,
        _library_type: &str,
        _library_id: i64,
        _item_key: &str,
    ) -> Result<Vec<ZoteroItem>, ZoteroError> {
        Ok(Vec::new())
    }

    async fn get_collections(
        &self,
        _library_type: &str,
        _library_id: i64,
    ) -> Result<Vec<ZoteroCollectionSummary>, ZoteroError> {
        Ok(Vec::new())
    }

    async fn delete_item(
        &self,
        _library_type: &str,
        _library_id: i64,
        _item_key: &str,
        _version: i64,
    ) -> Result<(), ZoteroError> {
        Ok(())
    }
}
