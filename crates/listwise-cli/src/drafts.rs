//! `listwise drafts` - print a store's drafts

use anyhow::Result;

use listwise_core::storage::{Database, DraftFilter, DraftStore};
use listwise_core::types::OwnershipScope;
use listwise_core::Settings;

pub fn run(settings: &Settings, merchant: &str, store: &str, filter: DraftFilter, json: bool) -> Result<()> {
    let drafts = DraftStore::new(Database::new(&settings.database_path)?);
    let scope = OwnershipScope {
        merchant_id: merchant.to_string(),
        store_id: store.to_string(),
    };
    let list = drafts.list(&scope, &filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    if list.is_empty() {
        println!("No drafts for {}/{}", merchant, store);
        return Ok(());
    }
    for draft in &list {
        let price = draft
            .suggested_price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36}  {:<9}  {:<6}  {:>8}  {} / {}",
            draft.id,
            draft.status.as_str(),
            draft.confidence.as_str(),
            price,
            draft.name_en,
            draft.name_ar
        );
    }
    Ok(())
}
