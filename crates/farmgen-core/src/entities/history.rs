use std::future::Future;

use uuid::Uuid;

use crate::entities::{
    dao::{HistoryEntry, HistoryKind},
    from_db_time, parse_uuid, to_db_time, SqliteStore,
};
use crate::error::StoreError;

pub trait HistoryStore: Send + Sync + 'static {
    fn append_history(&self, entry: &HistoryEntry) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Entries of one product, newest first.
    fn list_history(&self, product_id: Uuid) -> impl Future<Output = Result<Vec<HistoryEntry>, StoreError>> + Send;
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    product_id: String,
    kind: String,
    short_description: Option<String>,
    long_description: Option<String>,
    selected_image_url: Option<String>,
    actor: String,
    created_at: String,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let kind: HistoryKind = row
            .kind
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("history {} kind '{}'", row.id, row.kind)))?;
        Ok(HistoryEntry {
            id: parse_uuid(&row.id, "product_history.id")?,
            product_id: parse_uuid(&row.product_id, "product_history.product_id")?,
            timestamp: from_db_time(&row.created_at),
            kind,
            short_description: row.short_description,
            long_description: row.long_description,
            selected_image_url: row.selected_image_url,
            actor: row.actor,
        })
    }
}

impl HistoryStore for SqliteStore {
    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO product_history \
             (id, product_id, kind, short_description, long_description, selected_image_url, actor, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(entry.id.to_string())
        .bind(entry.product_id.to_string())
        .bind(entry.kind.as_ref())
        .bind(&entry.short_description)
        .bind(&entry.long_description)
        .bind(&entry.selected_image_url)
        .bind(&entry.actor)
        .bind(to_db_time(entry.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_history(&self, product_id: Uuid) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, product_id, kind, short_description, long_description, selected_image_url, \
             actor, created_at FROM product_history WHERE product_id = ?1 \
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(product_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::{FarmStore, NewProduct, ProductStore};

    #[tokio::test]
    async fn history_is_listed_newest_first() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let farm = store.create_farm("Farm A", "A1", None).await.unwrap();
        let product = store
            .insert_product(NewProduct {
                farm_id: farm.id,
                name: "Milk".into(),
                sku: "M1".into(),
                ingredients: None,
            })
            .await
            .unwrap();

        let mut first = HistoryEntry::new(product.id, HistoryKind::Description, "alice");
        first.short_description = Some("Fresh milk".into());
        store.append_history(&first).await.unwrap();
        let second = HistoryEntry::new(product.id, HistoryKind::Save, "bob");
        store.append_history(&second).await.unwrap();

        let entries = store.list_history(product.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, HistoryKind::Save);
        assert_eq!(entries[1].actor, "alice");
        assert_eq!(entries[1].short_description.as_deref(), Some("Fresh milk"));
    }

    #[tokio::test]
    async fn unknown_product_has_no_history() {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        assert!(store.list_history(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
