//! Draft store
//!
//! Every write is scoped by (merchant, store) and only touches rows still in
//! `draft` status. Zero affected rows is how callers learn that an id is
//! foreign, missing, or already terminal; the store never says which.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde_json::Value;

use super::database::Database;
use crate::types::{Confidence, DraftField, DraftStatus, NewDraft, OwnershipScope, ProductDraft};

pub(crate) const DRAFT_COLUMNS: &str = "id, batch_id, store_id, merchant_id, group_index, \
     name_en, name_ar, description_en, description_ar, category_en, category_ar, tags, \
     suggested_price, image_urls, primary_image_url, confidence, status, metadata, \
     created_at, updated_at";

/// A typed value for one editable field.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftValue {
    Text(String),
    Tags(Vec<String>),
    Price(Option<f64>),
}

impl DraftValue {
    /// Coerce a JSON argument into the shape `field` stores.
    ///
    /// Tags accept an array or a comma-separated string; prices accept a
    /// non-negative number, a numeric string, or null.
    pub fn parse(field: DraftField, value: &Value) -> Result<Self, String> {
        match field {
            DraftField::Tags => {
                let tags: Vec<String> = match value {
                    Value::Array(items) => items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                    Value::String(s) => s
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect(),
                    _ => return Err("tags must be an array or a comma-separated string".into()),
                };
                Ok(DraftValue::Tags(tags))
            }
            DraftField::SuggestedPrice => {
                let price = match value {
                    Value::Null => None,
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => Some(
                        s.trim()
                            .parse::<f64>()
                            .map_err(|_| format!("'{}' is not a price", s))?,
                    ),
                    _ => return Err("suggested_price must be a number or null".into()),
                };
                match price {
                    Some(p) if !p.is_finite() || p < 0.0 => {
                        Err("suggested_price must be a non-negative number".into())
                    }
                    other => Ok(DraftValue::Price(other)),
                }
            }
            _ => match value {
                Value::String(s) if !s.trim().is_empty() => Ok(DraftValue::Text(s.trim().to_string())),
                Value::String(_) => Err(format!("{} cannot be empty", field.column())),
                _ => Err(format!("{} must be a string", field.column())),
            },
        }
    }
}

/// Optional filters for listing drafts.
#[derive(Debug, Clone, Default)]
pub struct DraftFilter {
    pub batch_id: Option<String>,
    pub status: Option<DraftStatus>,
}

/// SQLite-backed draft storage
#[derive(Clone)]
pub struct DraftStore {
    db: Database,
}

impl DraftStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Insert a new draft in `draft` status.
    pub fn create(&self, scope: &OwnershipScope, mut draft: NewDraft) -> Result<ProductDraft> {
        draft.normalize_primary();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let metadata = if draft.metadata.is_null() {
            Value::Object(Default::default())
        } else {
            draft.metadata.clone()
        };

        self.db.conn().execute(
            "INSERT INTO drafts (id, batch_id, store_id, merchant_id, group_index,
                 name_en, name_ar, description_en, description_ar, category_en, category_ar,
                 tags, suggested_price, image_urls, primary_image_url, confidence, status,
                 metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 'draft', ?17, ?18, ?18)",
            params![
                id,
                draft.batch_id,
                scope.store_id,
                scope.merchant_id,
                draft.group_index,
                draft.name_en,
                draft.name_ar,
                draft.description_en,
                draft.description_ar,
                draft.category_en,
                draft.category_ar,
                serde_json::to_string(&draft.tags)?,
                draft.suggested_price,
                serde_json::to_string(&draft.image_urls)?,
                draft.primary_image_url,
                draft.confidence.as_str(),
                metadata.to_string(),
                now,
            ],
        )?;

        tracing::info!(
            draft_id = %id,
            merchant_id = %scope.merchant_id,
            batch_id = ?draft.batch_id,
            confidence = %draft.confidence,
            "Created draft"
        );

        Ok(ProductDraft {
            id,
            batch_id: draft.batch_id,
            store_id: scope.store_id.clone(),
            merchant_id: scope.merchant_id.clone(),
            group_index: draft.group_index,
            name_en: draft.name_en,
            name_ar: draft.name_ar,
            description_en: draft.description_en,
            description_ar: draft.description_ar,
            category_en: draft.category_en,
            category_ar: draft.category_ar,
            tags: draft.tags,
            suggested_price: draft.suggested_price,
            image_urls: draft.image_urls,
            primary_image_url: draft.primary_image_url,
            confidence: draft.confidence,
            status: DraftStatus::Draft,
            metadata,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Fetch a draft inside the caller's scope, in any status.
    pub fn get(&self, id: &str, scope: &OwnershipScope) -> Result<Option<ProductDraft>> {
        let sql = format!(
            "SELECT {} FROM drafts WHERE id = ?1 AND merchant_id = ?2 AND store_id = ?3",
            DRAFT_COLUMNS
        );
        let draft = self
            .db
            .conn()
            .query_row(
                &sql,
                params![id, scope.merchant_id, scope.store_id],
                row_to_draft,
            )
            .optional()?;
        Ok(draft)
    }

    /// Fetch several drafts in scope; foreign and unknown ids are skipped.
    pub fn get_many(&self, ids: &[String], scope: &OwnershipScope) -> Result<Vec<ProductDraft>> {
        let mut drafts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(draft) = self.get(id, scope)? {
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }

    pub fn list(&self, scope: &OwnershipScope, filter: &DraftFilter) -> Result<Vec<ProductDraft>> {
        let mut sql = format!(
            "SELECT {} FROM drafts WHERE merchant_id = ? AND store_id = ?",
            DRAFT_COLUMNS
        );
        let mut args: Vec<String> = vec![scope.merchant_id.clone(), scope.store_id.clone()];
        if let Some(batch_id) = &filter.batch_id {
            sql.push_str(" AND batch_id = ?");
            args.push(batch_id.clone());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        sql.push_str(" ORDER BY created_at ASC, group_index ASC");

        let conn = self.db.conn();
        let mut stmt = conn.prepare(&sql)?;
        let drafts = stmt
            .query_map(params_from_iter(args.iter()), row_to_draft)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(drafts)
    }

    /// Update one field of an in-scope draft still in `draft` status.
    /// Returns whether a row changed.
    pub fn update_field(
        &self,
        id: &str,
        scope: &OwnershipScope,
        field: DraftField,
        value: &DraftValue,
    ) -> Result<bool> {
        let stored: rusqlite::types::Value = match value {
            DraftValue::Text(text) => text.clone().into(),
            DraftValue::Tags(tags) => serde_json::to_string(tags)?.into(),
            DraftValue::Price(Some(price)) => (*price).into(),
            DraftValue::Price(None) => rusqlite::types::Value::Null,
        };
        // Column names come from a closed enum, never from input
        let sql = format!(
            "UPDATE drafts SET {} = ?1, updated_at = ?2
             WHERE id = ?3 AND merchant_id = ?4 AND store_id = ?5 AND status = 'draft'",
            field.column()
        );
        let rows = self.db.conn().execute(
            &sql,
            params![stored, Utc::now().to_rfc3339(), id, scope.merchant_id, scope.store_id],
        )?;
        if rows > 0 {
            tracing::info!(draft_id = %id, field = field.column(), "Updated draft field");
        }
        Ok(rows > 0)
    }

    /// Set the primary image; the url must already be one of the draft's images.
    pub fn set_primary_image(&self, id: &str, scope: &OwnershipScope, url: &str) -> Result<bool> {
        let rows = self.db.conn().execute(
            "UPDATE drafts SET primary_image_url = ?1, updated_at = ?2
             WHERE id = ?3 AND merchant_id = ?4 AND store_id = ?5 AND status = 'draft'
               AND EXISTS (SELECT 1 FROM json_each(drafts.image_urls) WHERE value = ?1)",
            params![url, Utc::now().to_rfc3339(), id, scope.merchant_id, scope.store_id],
        )?;
        Ok(rows > 0)
    }

    /// Fill in a price only when none is set yet.
    pub fn set_price_if_missing(&self, id: &str, scope: &OwnershipScope, price: f64) -> Result<bool> {
        let rows = self.db.conn().execute(
            "UPDATE drafts SET suggested_price = ?1, updated_at = ?2
             WHERE id = ?3 AND merchant_id = ?4 AND store_id = ?5
               AND status = 'draft' AND suggested_price IS NULL",
            params![price, Utc::now().to_rfc3339(), id, scope.merchant_id, scope.store_id],
        )?;
        Ok(rows > 0)
    }

    /// Flip in-scope drafts to `discarded`. Returns the ids that changed.
    pub fn discard(&self, ids: &[String], scope: &OwnershipScope) -> Result<Vec<String>> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn();
        let mut discarded = Vec::new();
        for id in ids {
            let rows = conn.execute(
                "UPDATE drafts SET status = 'discarded', updated_at = ?1
                 WHERE id = ?2 AND merchant_id = ?3 AND store_id = ?4 AND status = 'draft'",
                params![now, id, scope.merchant_id, scope.store_id],
            )?;
            if rows > 0 {
                discarded.push(id.clone());
            }
        }
        tracing::info!(
            requested = ids.len(),
            discarded = discarded.len(),
            merchant_id = %scope.merchant_id,
            "Discarded drafts"
        );
        Ok(discarded)
    }
}

pub(crate) fn row_to_draft(row: &Row<'_>) -> rusqlite::Result<ProductDraft> {
    let tags: String = row.get(11)?;
    let image_urls: String = row.get(13)?;
    let confidence: String = row.get(15)?;
    let status: String = row.get(16)?;
    let metadata: String = row.get(17)?;
    Ok(ProductDraft {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        store_id: row.get(2)?,
        merchant_id: row.get(3)?,
        group_index: row.get(4)?,
        name_en: row.get(5)?,
        name_ar: row.get(6)?,
        description_en: row.get(7)?,
        description_ar: row.get(8)?,
        category_en: row.get(9)?,
        category_ar: row.get(10)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        suggested_price: row.get(12)?,
        image_urls: serde_json::from_str(&image_urls).unwrap_or_default(),
        primary_image_url: row.get(14)?,
        confidence: Confidence::parse_lenient(&confidence),
        status: status.parse().unwrap_or_default(),
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}
