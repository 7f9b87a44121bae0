//! Archived conversation snapshots written on chat reset

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::Database;
use crate::types::OwnershipScope;

/// One message of an archived chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone)]
pub struct ConversationArchive {
    db: Database,
}

impl ConversationArchive {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store a snapshot under a caller-chosen id.
    pub fn archive(
        &self,
        id: &str,
        scope: &OwnershipScope,
        messages: &[ArchivedMessage],
    ) -> Result<()> {
        self.db.conn().execute(
            "INSERT INTO conversation_archive (id, merchant_id, store_id, messages, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                scope.merchant_id,
                scope.store_id,
                serde_json::to_string(messages)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        tracing::info!(
            archive_id = %id,
            merchant_id = %scope.merchant_id,
            messages = messages.len(),
            "Archived conversation"
        );
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Option<Vec<ArchivedMessage>>> {
        let raw: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT messages FROM conversation_archive WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_roundtrip_on_disk() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("listwise.db")).unwrap();
        let archive = ConversationArchive::new(db);
        let scope = OwnershipScope {
            merchant_id: "m1".into(),
            store_id: "s1".into(),
        };
        let messages = vec![
            ArchivedMessage {
                role: "user".into(),
                content: "Make listings".into(),
            },
            ArchivedMessage {
                role: "assistant".into(),
                content: "Done".into(),
            },
        ];
        archive.archive("arch-1", &scope, &messages).unwrap();

        assert_eq!(archive.load("arch-1").unwrap().unwrap(), messages);
        assert!(archive.load("missing").unwrap().is_none());
    }
}
