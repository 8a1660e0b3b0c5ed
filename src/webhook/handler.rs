use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json},
    routing::post,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::db::repository;
use crate::error::AppError;
use crate::notion::property_parser::extract_syncable_properties;
use crate::state::AppState;
use crate::webhook::models::WebhookPayload;
use crate::zotero::uri::parse_zotero_uri;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-notion-signature";

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhook/notion", post(handle_webhook))
}

/// Verifies an HMAC-SHA256 signature over the raw request body. Accepts
/// either a bare hex digest or one prefixed with `sha256=`.
fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let expected_hex = signature_header.strip_prefix("sha256=").unwrap_or(signature_header);
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if let Some(secret) = &state.config.notion_webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::SignatureInvalid)?;
        if !verify_signature(secret, &body, signature) {
            return Err(AppError::SignatureInvalid);
        }
    } else {
        tracing::warn!("NOTION_WEBHOOK_SECRET not set, accepting webhook without verification");
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid webhook payload: {e}")))?;

    if let Some(token) = payload.verification_token {
        tracing::info!("responding to Notion webhook verification challenge");
        return Ok(Json(json!({ "challenge": token })));
    }

    for event in payload.events.unwrap_or_default() {
        let Some(page_id) = event.page_id().filter(|id| !id.is_empty()).map(str::to_string) else {
            tracing::warn!("webhook event {} has no page_id, skipping", event.id);
            continue;
        };

        let is_new = repository::record_event(&state.db, &event.id, &page_id).await?;
        if !is_new {
            tracing::debug!("duplicate webhook event {}, skipping", event.id);
            continue;
        }

        let state = state.clone();
        let event_type = event.event_type.clone();
        let event_id = event.id.clone();

        tokio::spawn(async move {
            let result = match event_type.as_str() {
                "page.properties_updated" => process_property_update(&state, &page_id).await,
                "page.content_updated" => process_content_update(&state, &page_id).await,
                other => {
                    tracing::debug!("unhandled webhook event type '{other}'");
                    Ok(())
                }
            };

            match result {
                Ok(()) => {
                    if let Err(e) = repository::mark_event_processed(&state.db, &event_id).await {
                        tracing::error!("failed to mark event {event_id} processed: {e}");
                    }
                }
                Err(e) => tracing::error!("failed to process webhook event {event_id}: {e}"),
            }
        });
    }

    Ok(Json(json!({ "status": "ok" })))
}

async fn process_property_update(state: &AppState, page_id: &str) -> Result<(), AppError> {
    state.sync_engine.sync_page_properties(page_id).await
}

async fn process_content_update(state: &AppState, page_id: &str) -> Result<(), AppError> {
    let properties = state.notion.get_page_properties(page_id).await?;
    let parsed = extract_syncable_properties(&properties);

    let relevant = parsed.get("Relevant?").and_then(|v| v.as_text());
    if !matches!(relevant, Some("Yes") | Some("Highly")) {
        tracing::debug!("page {page_id} has Relevant?={relevant:?}, skipping note sync");
        return Ok(());
    }

    let Some(zotero_uri) = parsed.get("zotero_uri").and_then(|v| v.as_text()) else {
        tracing::debug!("page {page_id} has no Zotero URI, skipping note sync");
        return Ok(());
    };

    let Some(ref_) = parse_zotero_uri(zotero_uri) else {
        tracing::warn!("cannot parse Zotero URI '{zotero_uri}' on page {page_id}");
        return Ok(());
    };

    state.note_sync_engine.sync_page_notes(page_id, &ref_).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_signature() {
        let mut mac = HmacSha256::new_from_slice(b"shhh").unwrap();
        mac.update(b"hello world");
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature("shhh", b"hello world", &sig));
        assert!(verify_signature("shhh", b"hello world", &format!("sha256={sig}")));
    }

    #[test]
    fn rejects_wrong_secret() {
        let mut mac = HmacSha256::new_from_slice(b"shhh").unwrap();
        mac.update(b"hello world");
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(!verify_signature("wrong", b"hello world", &sig));
    }

    #[test]
    fn rejects_tampered_body() {
        let mut mac = HmacSha256::new_from_slice(b"shhh").unwrap();
        mac.update(b"hello world");
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(!verify_signature("shhh", b"goodbye world", &sig));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(!verify_signature("shhh", b"hello world", "not-hex!!"));
    }
}
