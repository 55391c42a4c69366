use std::future::Future;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::entities::{
    dao::{ImageAttempt, NewProduct, Product, ProductPatch, ProductStatus},
    from_db_time, parse_uuid, to_db_time, SqliteStore,
};
use crate::error::StoreError;

pub trait ProductStore: Send + Sync + 'static {
    /// Fails with [`StoreError::DuplicateKey`] when the SKU is already used.
    fn insert_product(&self, product: NewProduct) -> impl Future<Output = Result<Product, StoreError>> + Send;
    /// Products of one farm, newest first.
    fn list_products(&self, farm_id: Uuid) -> impl Future<Output = Result<Vec<Product>, StoreError>> + Send;
    fn get_product(&self, id: Uuid) -> impl Future<Output = Result<Option<Product>, StoreError>> + Send;
    /// Apply `patch` and stamp `updated_at`.
    ///
    /// An empty patch is rejected with [`StoreError::NoFieldsProvided`]; an
    /// unknown id with [`StoreError::NotFound`].
    fn update_product(
        &self,
        id: Uuid,
        patch: &ProductPatch,
    ) -> impl Future<Output = Result<Product, StoreError>> + Send;
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    farm_id: String,
    name: String,
    shop_sku: String,
    ingredients: Option<String>,
    short_description: Option<String>,
    long_description: Option<String>,
    selected_image_url: Option<String>,
    image_generation_attempts: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let image_attempts: Vec<ImageAttempt> = serde_json::from_str(&row.image_generation_attempts)
            .map_err(|e| StoreError::Corrupt(format!("product {} attempts: {e}", row.id)))?;
        let status: ProductStatus = row
            .status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("product {} status '{}'", row.id, row.status)))?;
        Ok(Product {
            id: parse_uuid(&row.id, "products.id")?,
            farm_id: parse_uuid(&row.farm_id, "products.farm_id")?,
            name: row.name,
            sku: row.shop_sku,
            ingredients: row.ingredients,
            short_description: row.short_description,
            long_description: row.long_description,
            selected_image_url: row.selected_image_url,
            image_attempts,
            status,
            created_at: from_db_time(&row.created_at),
            updated_at: from_db_time(&row.updated_at),
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, farm_id, name, shop_sku, ingredients, short_description, \
     long_description, selected_image_url, image_generation_attempts, status, created_at, updated_at";

fn encode_attempts(attempts: &[ImageAttempt]) -> Result<String, StoreError> {
    serde_json::to_string(attempts).map_err(|e| StoreError::Corrupt(format!("encode attempts: {e}")))
}

impl ProductStore for SqliteStore {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, StoreError> {
        let now = Utc::now();
        let stamp = to_db_time(now);
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO products (id, farm_id, name, shop_sku, ingredients, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(id.to_string())
        .bind(product.farm_id.to_string())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.ingredients)
        .bind(ProductStatus::Draft.as_ref())
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::DuplicateKey(_) => {
                StoreError::DuplicateKey(format!("SKU '{}' already exists", product.sku))
            }
            other => other,
        })?;

        Ok(Product {
            id,
            farm_id: product.farm_id,
            name: product.name,
            sku: product.sku,
            ingredients: product.ingredients,
            short_description: None,
            long_description: None,
            selected_image_url: None,
            image_attempts: Vec::new(),
            status: ProductStatus::Draft,
            created_at: now,
            updated_at: now,
        })
    }

    async fn list_products(&self, farm_id: Uuid) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE farm_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(farm_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Product::try_from).transpose()
    }

    async fn update_product(&self, id: Uuid, patch: &ProductPatch) -> Result<Product, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::NoFieldsProvided);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE products SET ");
        let mut set = qb.separated(", ");
        if let Some(name) = &patch.name {
            set.push("name = ").push_bind_unseparated(name.clone());
        }
        if let Some(ingredients) = &patch.ingredients {
            set.push("ingredients = ").push_bind_unseparated(ingredients.clone());
        }
        if let Some(short) = &patch.short_description {
            set.push("short_description = ").push_bind_unseparated(short.clone());
        }
        if let Some(long) = &patch.long_description {
            set.push("long_description = ").push_bind_unseparated(long.clone());
        }
        if let Some(url) = &patch.selected_image_url {
            set.push("selected_image_url = ").push_bind_unseparated(url.clone());
        }
        if let Some(attempts) = &patch.image_attempts {
            set.push("image_generation_attempts = ")
                .push_bind_unseparated(encode_attempts(attempts)?);
        }
        if let Some(status) = patch.status {
            set.push("status = ").push_bind_unseparated(status.to_string());
        }
        set.push("updated_at = ").push_bind_unseparated(to_db_time(Utc::now()));
        qb.push(" WHERE id = ").push_bind(id.to_string());

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("product {id}")));
        }
        self.get_product(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))
    }
}
