use serde::Deserialize;

/// A single event from a Notion webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: String,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    pub fn page_id(&self) -> Option<&str> {
        self.data.get("page_id").and_then(|v| v.as_str())
    }
}

/// Top-level Notion webhook payload. Notion sends either a one-time
/// verification challenge (`verification_token`) or a batch of events.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub verification_token: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<WebhookEvent>>,
}
