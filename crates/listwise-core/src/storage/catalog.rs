//! Production catalog and the persistence gate's data path
//!
//! Catalog rows are insert-only. A row is created in the same transaction that
//! flips its draft to `persisted`, one transaction per draft.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::Database;
use super::drafts::{row_to_draft, DRAFT_COLUMNS};
use crate::types::{Confidence, OwnershipScope, ProductDraft, StoreProduct};

/// Outcome of one persistence call. Partial failure is still a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistReport {
    pub created_count: usize,
    pub failed_count: usize,
    pub created_product_ids: Vec<String>,
    pub failed_draft_ids: Vec<String>,
    /// Not in scope or no longer a draft; neither created nor failed.
    pub skipped_draft_ids: Vec<String>,
}

#[derive(Clone)]
pub struct CatalogStore {
    db: Database,
}

impl CatalogStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Move in-scope drafts into the catalog, each independently.
    pub fn persist_drafts(&self, ids: &[String], scope: &OwnershipScope) -> Result<PersistReport> {
        let mut report = PersistReport::default();
        let mut conn = self.db.conn();

        for id in ids {
            match persist_one(&mut conn, id, scope) {
                Ok(Some(product)) => {
                    report.created_count += 1;
                    report.created_product_ids.push(product.id);
                }
                Ok(None) => report.skipped_draft_ids.push(id.clone()),
                Err(e) => {
                    tracing::warn!(draft_id = %id, error = %e, "Failed to persist draft");
                    report.failed_count += 1;
                    report.failed_draft_ids.push(id.clone());
                }
            }
        }

        tracing::info!(
            merchant_id = %scope.merchant_id,
            store_id = %scope.store_id,
            created = report.created_count,
            failed = report.failed_count,
            skipped = report.skipped_draft_ids.len(),
            "Persisted drafts"
        );
        Ok(report)
    }

    pub fn list(&self, scope: &OwnershipScope) -> Result<Vec<StoreProduct>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, store_id, merchant_id, draft_id, slug, name_en, name_ar,
                    description_en, description_ar, category_en, category_ar, tags, price,
                    image_urls, primary_image_url, confidence, ai_generated, created_at
             FROM catalog_products
             WHERE merchant_id = ?1 AND store_id = ?2
             ORDER BY created_at ASC",
        )?;
        let products = stmt
            .query_map(params![scope.merchant_id, scope.store_id], |row| {
                let tags: String = row.get(11)?;
                let image_urls: String = row.get(13)?;
                let confidence: String = row.get(15)?;
                Ok(StoreProduct {
                    id: row.get(0)?,
                    store_id: row.get(1)?,
                    merchant_id: row.get(2)?,
                    draft_id: row.get(3)?,
                    slug: row.get(4)?,
                    name_en: row.get(5)?,
                    name_ar: row.get(6)?,
                    description_en: row.get(7)?,
                    description_ar: row.get(8)?,
                    category_en: row.get(9)?,
                    category_ar: row.get(10)?,
                    tags: serde_json::from_str(&tags).unwrap_or_default(),
                    price: row.get(12)?,
                    image_urls: serde_json::from_str(&image_urls).unwrap_or_default(),
                    primary_image_url: row.get(14)?,
                    confidence: Confidence::parse_lenient(&confidence),
                    ai_generated: row.get(16)?,
                    created_at: row.get(17)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(products)
    }

    /// Mean price of the merchant's priced products in a category.
    pub fn average_price(&self, merchant_id: &str, category_en: &str) -> Result<Option<f64>> {
        let avg: Option<f64> = self.db.conn().query_row(
            "SELECT AVG(price) FROM catalog_products
             WHERE merchant_id = ?1 AND category_en = ?2 COLLATE NOCASE AND price IS NOT NULL",
            params![merchant_id, category_en],
            |row| row.get(0),
        )?;
        Ok(avg)
    }
}

/// Returns `None` when the draft is not an in-scope live draft.
fn persist_one(
    conn: &mut Connection,
    id: &str,
    scope: &OwnershipScope,
) -> Result<Option<StoreProduct>> {
    let tx = conn.transaction()?;

    let sql = format!(
        "SELECT {} FROM drafts
         WHERE id = ?1 AND merchant_id = ?2 AND store_id = ?3 AND status = 'draft'",
        DRAFT_COLUMNS
    );
    let draft = tx
        .query_row(&sql, params![id, scope.merchant_id, scope.store_id], row_to_draft)
        .optional()?;
    let Some(draft) = draft else {
        return Ok(None);
    };

    let product = product_from_draft(&draft);
    tx.execute(
        "INSERT INTO catalog_products (id, store_id, merchant_id, draft_id, slug, name_en,
             name_ar, description_en, description_ar, category_en, category_ar, tags, price,
             image_urls, primary_image_url, confidence, ai_generated, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            product.id,
            product.store_id,
            product.merchant_id,
            product.draft_id,
            product.slug,
            product.name_en,
            product.name_ar,
            product.description_en,
            product.description_ar,
            product.category_en,
            product.category_ar,
            serde_json::to_string(&product.tags)?,
            product.price,
            serde_json::to_string(&product.image_urls)?,
            product.primary_image_url,
            product.confidence.as_str(),
            product.ai_generated,
            product.created_at,
        ],
    )?;
    let flipped = tx.execute(
        "UPDATE drafts SET status = 'persisted', updated_at = ?1
         WHERE id = ?2 AND status = 'draft'",
        params![product.created_at, id],
    )?;
    if flipped != 1 {
        anyhow::bail!("draft {} changed status during persistence", id);
    }
    tx.commit()?;
    Ok(Some(product))
}

fn product_from_draft(draft: &ProductDraft) -> StoreProduct {
    StoreProduct {
        id: uuid::Uuid::new_v4().to_string(),
        store_id: draft.store_id.clone(),
        merchant_id: draft.merchant_id.clone(),
        draft_id: draft.id.clone(),
        slug: unique_slug(&draft.name_en),
        name_en: draft.name_en.clone(),
        name_ar: draft.name_ar.clone(),
        description_en: draft.description_en.clone(),
        description_ar: draft.description_ar.clone(),
        category_en: draft.category_en.clone(),
        category_ar: draft.category_ar.clone(),
        tags: draft.tags.clone(),
        price: draft.suggested_price,
        image_urls: draft.image_urls.clone(),
        primary_image_url: draft.primary_image_url.clone(),
        confidence: draft.confidence,
        ai_generated: true,
        created_at: Utc::now().to_rfc3339(),
    }
}

/// Lowercase ASCII words of `name` joined by `-`, plus a random suffix.
pub fn unique_slug(name: &str) -> String {
    let base = slugify(name);
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &suffix[..8])
}

fn slugify(name: &str) -> String {
    let words: Vec<String> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect();
    if words.is_empty() {
        "product".to_string()
    } else {
        words.join("-")
    }
}
