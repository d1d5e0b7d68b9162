//! Storefront category catalog

use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::domain::aggregates::category::default_categories;
use crate::domain::aggregates::Category;
use crate::error::Result;
use crate::store::{collections, encode, Direction, DocumentStore, Query, StoreError};

pub struct CatalogService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self { Self { store, clock } }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        let docs = self.store.query(collections::CATEGORIES, &Query::new().order_by("order", Direction::Asc)).await?;
        let mut categories = Vec::with_capacity(docs.len());
        for doc in docs {
            match doc.decode_with_id(collections::CATEGORIES) {
                Ok(category) => categories.push(category),
                Err(e) => warn!(error = %e, "skipping unreadable category"),
            }
        }
        Ok(categories)
    }

    /// Writes the standard categories that are missing. Existing documents are
    /// left alone.
    pub async fn seed_defaults(&self) -> Result<usize> {
        let mut created = 0;
        for category in default_categories(self.clock.now()) {
            match self.store.create(collections::CATEGORIES, &category.id, encode(&category)?).await {
                Ok(()) => created += 1,
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        if created > 0 {
            info!(created, "seeded default categories");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn seeding_is_idempotent_and_listing_follows_display_order() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(collections::CATEGORIES, "cat_2", json!({
                "sku": "TLSWD00001", "name": "Walls", "slug": "walls", "order": 2,
                "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z",
            }))
            .await
            .unwrap();
        let catalog = CatalogService::new(store.clone(), Arc::new(ManualClock::default()));

        assert_eq!(catalog.seed_defaults().await.unwrap(), 6);
        assert_eq!(catalog.seed_defaults().await.unwrap(), 0);

        let cats = catalog.categories().await.unwrap();
        assert_eq!(cats.len(), 7);
        assert_eq!(cats[0].slug, "festivals");
        assert_eq!(cats[1].name, "Walls");
        assert_eq!(cats[6].slug, "gifting");
    }
}
