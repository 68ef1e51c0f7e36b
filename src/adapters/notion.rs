//! Notion notes-store adapter.
//!
//! Upserts are idempotent by external key: the client queries the database
//! for an existing page carrying the key before deciding to create or
//! update, so a retried call after a transient failure never duplicates a
//! page.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::core::error::StageError;

use super::NotesStore;

const NOTION_API: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Property name holding the artifact identity key
const KEY_PROPERTY: &str = "External Key";

/// Notion API client
pub struct NotionClient {
    token: String,
    database_id: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<PageRef>,
}

#[derive(Debug, Deserialize)]
struct PageRef {
    id: String,
}

impl NotionClient {
    pub fn new(token: String, database_id: String) -> Self {
        Self {
            token,
            database_id,
            client: reqwest::Client::new(),
            base_url: NOTION_API.to_string(),
        }
    }

    /// Override the API base URL (for tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn classify(err: reqwest::Error) -> StageError {
        if err.is_connect() {
            StageError::ExternalUnavailable(format!("notion unreachable: {err}"))
        } else {
            StageError::Transient(format!("notion request failed: {err}"))
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> StageError {
        let message = format!("notion returned {}: {}", status, body.trim());
        match status.as_u16() {
            503 => StageError::ExternalUnavailable(message),
            429 | 500..=599 => StageError::Transient(message),
            _ => StageError::InputInvalid(message),
        }
    }

    /// Find an existing page by external key
    async fn find_page(&self, external_key: &str) -> Result<Option<String>, StageError> {
        let url = format!("{}/databases/{}/query", self.base_url, self.database_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({
                "filter": {
                    "property": KEY_PROPERTY,
                    "rich_text": { "equals": external_key }
                },
                "page_size": 1
            }))
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| StageError::Transient(format!("notion response parse: {e}")))?;

        Ok(parsed.results.into_iter().next().map(|p| p.id))
    }

    fn page_properties(&self, external_key: &str, title: &str) -> serde_json::Value {
        json!({
            "Name": {
                "title": [{ "text": { "content": title } }]
            },
            KEY_PROPERTY: {
                "rich_text": [{ "text": { "content": external_key } }]
            }
        })
    }

    fn content_children(content: &str) -> serde_json::Value {
        // Notion caps a rich_text element at 2000 chars; split into blocks
        let blocks: Vec<serde_json::Value> = content
            .as_bytes()
            .chunks(2000)
            .map(|chunk| {
                let text = String::from_utf8_lossy(chunk);
                json!({
                    "object": "block",
                    "type": "paragraph",
                    "paragraph": {
                        "rich_text": [{ "text": { "content": text } }]
                    }
                })
            })
            .collect();
        json!(blocks)
    }

    async fn create_page(
        &self,
        external_key: &str,
        title: &str,
        content: &str,
    ) -> Result<String, StageError> {
        let url = format!("{}/pages", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({
                "parent": { "database_id": self.database_id },
                "properties": self.page_properties(external_key, title),
                "children": Self::content_children(content),
            }))
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let page: PageRef = response
            .json()
            .await
            .map_err(|e| StageError::Transient(format!("notion response parse: {e}")))?;

        Ok(page.id)
    }

    async fn update_page(
        &self,
        page_id: &str,
        external_key: &str,
        title: &str,
    ) -> Result<String, StageError> {
        let url = format!("{}/pages/{}", self.base_url, page_id);

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({
                "properties": self.page_properties(external_key, title),
            }))
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        Ok(page_id.to_string())
    }
}

#[async_trait]
impl NotesStore for NotionClient {
    async fn upsert_page(
        &self,
        external_key: &str,
        title: &str,
        content: &str,
    ) -> Result<String, StageError> {
        // Check-then-create: safe to retry
        match self.find_page(external_key).await? {
            Some(page_id) => self.update_page(&page_id, external_key, title).await,
            None => self.create_page(external_key, title, content).await,
        }
    }
}
