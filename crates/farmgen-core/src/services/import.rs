//! CSV import: one product per valid row.
//!
//! Expected header: `name,shop_sku,ingredients` (extra columns are ignored,
//! `ingredients` is optional).  Rows without a name or SKU are skipped with a
//! warning; rows whose SKU already exists are counted as duplicates, which
//! makes importing the same file twice a no-op.  Any other failure aborts the
//! import, leaving rows inserted so far in place.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{NewProduct, ProductStore};
use crate::error::{CatalogError, FileError, StoreError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    shop_sku: Option<String>,
    #[serde(default)]
    ingredients: Option<String>,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ImportReport {
    pub inserted: u64,
    /// Rows missing `name` or `shop_sku`.
    pub skipped: u64,
    /// Rows whose SKU already existed.
    pub duplicates: u64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Import CSV `data` into `farm_id`.
pub async fn import_csv<S: ProductStore>(
    store: &S,
    farm_id: Uuid,
    data: &[u8],
) -> Result<ImportReport, CatalogError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);
    let headers = reader.headers().map_err(FileError::from)?.clone();

    let mut report = ImportReport::default();
    for record in reader.records() {
        let record = record.map_err(FileError::from)?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: CsvRow = record.deserialize(Some(&headers)).map_err(FileError::from)?;

        let (Some(name), Some(sku)) = (non_empty(row.name), non_empty(row.shop_sku)) else {
            warn!(line, "skipping CSV row without name or shop_sku");
            report.skipped += 1;
            continue;
        };

        let product = NewProduct {
            farm_id,
            name,
            sku,
            ingredients: non_empty(row.ingredients),
        };
        match store.insert_product(product).await {
            Ok(_) => report.inserted += 1,
            Err(StoreError::DuplicateKey(reason)) => {
                warn!(line, %reason, "skipping CSV row with existing SKU");
                report.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        %farm_id,
        inserted = report.inserted,
        skipped = report.skipped,
        duplicates = report.duplicates,
        "CSV import finished"
    );
    Ok(report)
}

/// Import the CSV file at `path` into `farm_id`.
pub async fn import_csv_file<S: ProductStore>(
    store: &S,
    farm_id: Uuid,
    path: impl AsRef<Path>,
) -> Result<ImportReport, CatalogError> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FileError::NotFound(path.display().to_string()),
        _ => FileError::Io(e),
    })?;
    import_csv(store, farm_id, &data).await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::{FarmStore, SqliteStore};
    use tracing_test::traced_test;

    async fn farm() -> (SqliteStore, Uuid) {
        let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
        let farm = store.create_farm("Farm A", "A1", None).await.unwrap();
        (store, farm.id)
    }

    #[tokio::test]
    #[traced_test]
    async fn rows_without_sku_are_skipped() {
        let (store, farm_id) = farm().await;
        let csv = "name,shop_sku,ingredients\nGoat cheese,S1,goat milk\nNo sku,,\n";
        let report = import_csv(&store, farm_id, csv.as_bytes()).await.unwrap();

        assert_eq!(report, ImportReport { inserted: 1, skipped: 1, duplicates: 0 });
        let products = store.list_products(farm_id).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].ingredients.as_deref(), Some("goat milk"));
        assert!(logs_contain("skipping CSV row without name or shop_sku"));
    }

    #[tokio::test]
    async fn reimport_inserts_nothing() {
        let (store, farm_id) = farm().await;
        let csv = "name,shop_sku\nMilk,M1\nButter,B1\n";
        import_csv(&store, farm_id, csv.as_bytes()).await.unwrap();
        let second = import_csv(&store, farm_id, csv.as_bytes()).await.unwrap();

        assert_eq!(second, ImportReport { inserted: 0, skipped: 0, duplicates: 2 });
        assert_eq!(store.list_products(farm_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bom_and_missing_ingredients_column_are_tolerated() {
        let (store, farm_id) = farm().await;
        let csv = "\u{feff}name,shop_sku\n  Honey , H1 \n";
        let report = import_csv(&store, farm_id, csv.as_bytes()).await.unwrap();
        assert_eq!(report.inserted, 1);
        let product = &store.list_products(farm_id).await.unwrap()[0];
        assert_eq!(product.name, "Honey");
        assert_eq!(product.sku, "H1");
        assert_eq!(product.ingredients, None);
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let (store, farm_id) = farm().await;
        let err = import_csv_file(&store, farm_id, "/nonexistent/products.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::File(FileError::NotFound(_))));
    }

    #[tokio::test]
    async fn unknown_farm_aborts_import() {
        let (store, _) = farm().await;
        let err = import_csv(&store, Uuid::new_v4(), b"name,shop_sku\nMilk,M1\n")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)));
    }
}
