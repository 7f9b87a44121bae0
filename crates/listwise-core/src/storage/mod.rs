//! Persistence layer
//!
//! SQLite-based storage for:
//! - Product drafts (the staging area every agent writes into)
//! - The production catalog, reachable only through the persistence gate
//! - The generated image asset ledger
//! - Archived conversations

mod assets;
mod catalog;
mod conversations;
mod database;
pub(crate) mod drafts;

pub use assets::{AssetLedger, AssetRecord};
pub use catalog::{unique_slug, CatalogStore, PersistReport};
pub use conversations::{ArchivedMessage, ConversationArchive};
pub use database::Database;
pub use drafts::{DraftFilter, DraftStore, DraftValue};

/// All stores over one shared database.
#[derive(Clone)]
pub struct Stores {
    pub drafts: DraftStore,
    pub catalog: CatalogStore,
    pub assets: AssetLedger,
    pub conversations: ConversationArchive,
}

impl Stores {
    pub fn new(db: Database) -> Self {
        Self {
            drafts: DraftStore::new(db.clone()),
            catalog: CatalogStore::new(db.clone()),
            assets: AssetLedger::new(db.clone()),
            conversations: ConversationArchive::new(db),
        }
    }
}
