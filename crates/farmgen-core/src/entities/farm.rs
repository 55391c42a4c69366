use std::future::Future;

use chrono::Utc;
use uuid::Uuid;

use crate::entities::{dao::Farm, from_db_time, parse_uuid, to_db_time, SqliteStore};
use crate::error::StoreError;

pub trait FarmStore: Send + Sync + 'static {
    fn list_farms(&self) -> impl Future<Output = Result<Vec<Farm>, StoreError>> + Send;
    /// Fails with [`StoreError::DuplicateKey`] when `external_farm_id` is taken.
    fn create_farm(
        &self,
        name: &str,
        external_farm_id: &str,
        import_file_ref: Option<&str>,
    ) -> impl Future<Output = Result<Farm, StoreError>> + Send;
    /// Look a farm up by its UUID or by its external farm id.
    fn find_farm(&self, farm_ref: &str) -> impl Future<Output = Result<Option<Farm>, StoreError>> + Send;
    fn rename_farm(&self, id: Uuid, name: &str) -> impl Future<Output = Result<Farm, StoreError>> + Send;
    /// Delete a farm; its products and their history go with it.
    fn delete_farm(&self, id: Uuid) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(sqlx::FromRow)]
struct FarmRow {
    id: String,
    name: String,
    external_farm_id: String,
    import_file: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<FarmRow> for Farm {
    type Error = StoreError;

    fn try_from(row: FarmRow) -> Result<Self, Self::Error> {
        Ok(Farm {
            id: parse_uuid(&row.id, "farms.id")?,
            name: row.name,
            external_farm_id: row.external_farm_id,
            import_file_ref: row.import_file,
            created_at: from_db_time(&row.created_at),
            updated_at: from_db_time(&row.updated_at),
        })
    }
}

const FARM_COLUMNS: &str = "id, name, external_farm_id, import_file, created_at, updated_at";

impl FarmStore for SqliteStore {
    async fn list_farms(&self) -> Result<Vec<Farm>, StoreError> {
        let rows: Vec<FarmRow> = sqlx::query_as(&format!(
            "SELECT {FARM_COLUMNS} FROM farms ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Farm::try_from).collect()
    }

    async fn create_farm(
        &self,
        name: &str,
        external_farm_id: &str,
        import_file_ref: Option<&str>,
    ) -> Result<Farm, StoreError> {
        let now = Utc::now();
        let farm = Farm {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            external_farm_id: external_farm_id.to_owned(),
            import_file_ref: import_file_ref.map(str::to_owned),
            created_at: now,
            updated_at: now,
        };
        let stamp = to_db_time(now);
        sqlx::query(
            "INSERT INTO farms (id, name, external_farm_id, import_file, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(farm.id.to_string())
        .bind(&farm.name)
        .bind(&farm.external_farm_id)
        .bind(&farm.import_file_ref)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::DuplicateKey(_) => {
                StoreError::DuplicateKey(format!("farm id '{external_farm_id}' already exists"))
            }
            other => other,
        })?;
        Ok(farm)
    }

    async fn find_farm(&self, farm_ref: &str) -> Result<Option<Farm>, StoreError> {
        let row: Option<FarmRow> = sqlx::query_as(&format!(
            "SELECT {FARM_COLUMNS} FROM farms WHERE id = ?1 OR external_farm_id = ?1 \
             ORDER BY (id = ?1) DESC LIMIT 1"
        ))
        .bind(farm_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Farm::try_from).transpose()
    }

    async fn rename_farm(&self, id: Uuid, name: &str) -> Result<Farm, StoreError> {
        let result = sqlx::query("UPDATE farms SET name = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(name)
            .bind(to_db_time(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("farm {id}")));
        }
        self.find_farm(&id.to_string())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("farm {id}")))
    }

    async fn delete_farm(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM farms WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("farm {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_find_by_either_id() {
        let store = store().await;
        let farm = store.create_farm("Farm A", "A1", Some("a.csv")).await.unwrap();

        let by_external = store.find_farm("A1").await.unwrap().unwrap();
        let by_uuid = store.find_farm(&farm.id.to_string()).await.unwrap().unwrap();
        assert_eq!(by_external.id, farm.id);
        assert_eq!(by_uuid.id, farm.id);
        assert_eq!(by_uuid.import_file_ref.as_deref(), Some("a.csv"));
        assert!(store.find_farm("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_external_id_is_rejected() {
        let store = store().await;
        store.create_farm("Farm A", "A1", None).await.unwrap();
        let err = store.create_farm("Other", "A1", None).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
        assert_eq!(store.list_farms().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_changes_only_the_name() {
        let store = store().await;
        let farm = store.create_farm("Farm A", "A1", None).await.unwrap();
        let renamed = store.rename_farm(farm.id, "Farm B").await.unwrap();
        assert_eq!(renamed.name, "Farm B");
        assert_eq!(renamed.external_farm_id, "A1");
        assert!(matches!(
            store.rename_farm(Uuid::new_v4(), "x").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_missing_farm_is_not_found() {
        let store = store().await;
        assert!(matches!(
            store.delete_farm(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
