//! Append-only ledger of generated image assets

use anyhow::Result;
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::database::Database;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub merchant_id: String,
    pub task_id: String,
    pub draft_id: Option<String>,
    pub operation: String,
    pub original_url: String,
    pub edited_url: String,
    pub metadata: Value,
    pub created_at: String,
}

#[derive(Clone)]
pub struct AssetLedger {
    db: Database,
}

impl AssetLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record one image operation. Nothing is ever updated or deleted here.
    pub fn append(
        &self,
        merchant_id: &str,
        task_id: &str,
        draft_id: Option<&str>,
        operation: &str,
        original_url: &str,
        edited_url: &str,
        metadata: &Value,
    ) -> Result<()> {
        self.db.conn().execute(
            "INSERT INTO generated_assets (merchant_id, task_id, draft_id, operation,
                 original_url, edited_url, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                merchant_id,
                task_id,
                draft_id,
                operation,
                original_url,
                edited_url,
                metadata.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        tracing::debug!(merchant_id, task_id, operation, "Recorded generated asset");
        Ok(())
    }

    pub fn for_task(&self, merchant_id: &str, task_id: &str) -> Result<Vec<AssetRecord>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT merchant_id, task_id, draft_id, operation, original_url, edited_url,
                    metadata, created_at
             FROM generated_assets
             WHERE merchant_id = ?1 AND task_id = ?2
             ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map(params![merchant_id, task_id], |row| {
                let metadata: String = row.get(6)?;
                Ok(AssetRecord {
                    merchant_id: row.get(0)?,
                    task_id: row.get(1)?,
                    draft_id: row.get(2)?,
                    operation: row.get(3)?,
                    original_url: row.get(4)?,
                    edited_url: row.get(5)?,
                    metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
                    created_at: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
