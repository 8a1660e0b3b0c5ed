use std::env;

use crate::error::AppError;

/// All environment-driven configuration for the server and bootstrap binary.
#[derive(Clone, Debug)]
pub struct Config {
    pub notion_api_key: String,
    pub notion_database_id: String,
    pub notion_webhook_secret: Option<String>,
    pub zotero_api_key: String,
    pub zotero_group_id: Option<i64>,
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub delete_orphaned_notes: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let notion_api_key = require_var("NOTION_API_KEY")?;
        let notion_database_id = require_var("NOTION_DATABASE_ID")?;
        let notion_webhook_secret = env::var("NOTION_WEBHOOK_SECRET").ok();
        let zotero_api_key = require_var("ZOTERO_API_KEY")?;
        let zotero_group_id = env::var("ZOTERO_GROUP_ID")
            .ok()
            .and_then(|v| v.parse::<i64>().ok());

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://notero_sync.db".to_string());
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8000);
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let delete_orphaned_notes = env::var("DELETE_ORPHANED_NOTES")
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            notion_api_key,
            notion_database_id,
            notion_webhook_secret,
            zotero_api_key,
            zotero_group_id,
            database_url,
            host,
            port,
            log_level,
            delete_orphaned_notes,
        })
    }
}

fn require_var(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::BadRequest(format!("{name} is not set")))
}
