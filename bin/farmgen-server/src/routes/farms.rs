use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use bytes::Bytes;
use farmgen_core::entities::{Farm, FarmStore, ProductStore};
use farmgen_core::services::{import_csv, ImportReport};
use farmgen_core::{CatalogError, FieldError};
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::error::{ErrorBody, ServerError};
use crate::schemas::farm::{CreateFarmForm, CreateFarmResponse, FarmResponse, ImportForm, RenameFarmRequest};
use crate::schemas::product::ProductResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_farms, create_farm, rename_farm, delete_farm, import_products, list_farm_products),
    components(schemas(
        FarmResponse,
        CreateFarmResponse,
        CreateFarmForm,
        RenameFarmRequest,
        ImportForm,
        ImportReport,
        ErrorBody
    ))
)]
pub struct FarmsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/farms", get(list_farms).post(create_farm))
        .route("/farms/{farmId}", patch(rename_farm).delete(delete_farm))
        .route("/farms/{farmId}/import", post(import_products))
        .route("/farms/{farmId}/products", get(list_farm_products))
}

/// Look a farm up by UUID or external farm id.
async fn resolve_farm(state: &AppState, farm_ref: &str) -> Result<Farm, ServerError> {
    state
        .store
        .find_farm(farm_ref)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("farm {farm_ref} not found")))
}

/// An uploaded CSV.
struct Upload {
    file_name: Option<String>,
    data: Bytes,
}

/// Fields of the farm-creation / import forms.
#[derive(Default)]
struct FarmForm {
    name: Option<String>,
    farm_id: Option<String>,
    file: Option<Upload>,
}

async fn read_form(multipart: Result<Multipart, MultipartRejection>) -> Result<FarmForm, ServerError> {
    let mut multipart = multipart.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let mut form = FarmForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "name" | "farmId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.body_text()))?;
                let value = Some(text.trim().to_owned()).filter(|v| !v.is_empty());
                if name == "name" {
                    form.name = value;
                } else {
                    form.farm_id = value;
                }
            }
            "file" => {
                let file_name = field.file_name().map(str::to_owned);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(e.body_text()))?;
                if !data.is_empty() {
                    form.file = Some(Upload { file_name, data });
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

#[utoipa::path(
    get,
    path = "/farms",
    tag = "farms",
    responses(
        (status = 200, description = "All farms, newest first", body = Vec<FarmResponse>),
        (status = 500, description = "Database error", body = ErrorBody),
    )
)]
pub async fn list_farms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<FarmResponse>>, ServerError> {
    let farms = state.store.list_farms().await?;
    Ok(Json(farms.iter().map(FarmResponse::from).collect()))
}

/// Create a farm and import the optional CSV into it.
#[utoipa::path(
    post,
    path = "/farms",
    tag = "farms",
    request_body(content = CreateFarmForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Farm created; `importError` is set if the CSV was not imported", body = CreateFarmResponse),
        (status = 400, description = "Missing name or farmId", body = ErrorBody),
        (status = 409, description = "farmId already exists", body = ErrorBody),
        (status = 500, description = "Database error", body = ErrorBody),
    )
)]
pub async fn create_farm(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<CreateFarmResponse>), ServerError> {
    let form = read_form(multipart).await?;

    let mut missing = Vec::new();
    if form.name.is_none() {
        missing.push(FieldError::new("name", "is required"));
    }
    if form.farm_id.is_none() {
        missing.push(FieldError::new("farmId", "is required"));
    }
    let (Some(name), Some(external_id)) = (form.name, form.farm_id) else {
        return Err(CatalogError::Validation(missing).into());
    };

    let file_name = form.file.as_ref().and_then(|f| f.file_name.as_deref());
    let farm = state.store.create_farm(&name, &external_id, file_name).await?;
    info!(farm_id = %farm.id, external_farm_id = %farm.external_farm_id, "farm created");

    // The farm row is already committed; an import failure is reported next
    // to it so the caller can retry through the import endpoint.
    let (import, import_error) = match &form.file {
        Some(upload) => match import_csv(state.store.as_ref(), farm.id, &upload.data).await {
            Ok(report) => (Some(report), None),
            Err(e) => {
                warn!(farm_id = %farm.id, error = %e, "CSV import after farm creation failed");
                let (_, body) = ServerError::from(e).body();
                (None, Some(body))
            }
        },
        None => (None, None),
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateFarmResponse {
            farm: FarmResponse::from(&farm),
            import,
            import_error,
        }),
    ))
}

#[utoipa::path(
    patch,
    path = "/farms/{farmId}",
    tag = "farms",
    params(("farmId" = String, Path, description = "Farm UUID or external farm id")),
    request_body = RenameFarmRequest,
    responses(
        (status = 200, description = "Farm renamed", body = FarmResponse),
        (status = 400, description = "Empty name", body = ErrorBody),
        (status = 404, description = "Unknown farm", body = ErrorBody),
    )
)]
pub async fn rename_farm(
    State(state): State<Arc<AppState>>,
    Path(farm_ref): Path<String>,
    payload: Result<Json<RenameFarmRequest>, JsonRejection>,
) -> Result<Json<FarmResponse>, ServerError> {
    let Json(req) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(CatalogError::invalid("name", "is required").into());
    }
    let farm = resolve_farm(&state, &farm_ref).await?;
    let renamed = state.store.rename_farm(farm.id, name).await?;
    Ok(Json(FarmResponse::from(&renamed)))
}

/// Delete a farm together with its products and their history.
#[utoipa::path(
    delete,
    path = "/farms/{farmId}",
    tag = "farms",
    params(("farmId" = String, Path, description = "Farm UUID or external farm id")),
    responses(
        (status = 204, description = "Farm deleted"),
        (status = 404, description = "Unknown farm", body = ErrorBody),
    )
)]
pub async fn delete_farm(
    State(state): State<Arc<AppState>>,
    Path(farm_ref): Path<String>,
) -> Result<StatusCode, ServerError> {
    let farm = resolve_farm(&state, &farm_ref).await?;
    state.store.delete_farm(farm.id).await?;
    info!(farm_id = %farm.id, "farm deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Import a CSV into an existing farm.  Rows whose SKU already exists are
/// counted as duplicates, so repeating an import changes nothing.
#[utoipa::path(
    post,
    path = "/farms/{farmId}/import",
    tag = "farms",
    params(("farmId" = String, Path, description = "Farm UUID or external farm id")),
    request_body(content = ImportForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Import finished", body = ImportReport),
        (status = 400, description = "No file uploaded", body = ErrorBody),
        (status = 404, description = "Unknown farm", body = ErrorBody),
        (status = 500, description = "Unreadable CSV or database error", body = ErrorBody),
    )
)]
pub async fn import_products(
    State(state): State<Arc<AppState>>,
    Path(farm_ref): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImportReport>, ServerError> {
    let farm = resolve_farm(&state, &farm_ref).await?;
    let form = read_form(multipart).await?;
    let upload = form
        .file
        .ok_or_else(|| ServerError::from(CatalogError::invalid("file", "is required")))?;
    let report = import_csv(state.store.as_ref(), farm.id, &upload.data).await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/farms/{farmId}/products",
    tag = "farms",
    params(("farmId" = String, Path, description = "Farm UUID or external farm id")),
    responses(
        (status = 200, description = "Products of the farm, newest first", body = Vec<ProductResponse>),
        (status = 404, description = "Unknown farm or no products", body = ErrorBody),
    )
)]
pub async fn list_farm_products(
    State(state): State<Arc<AppState>>,
    Path(farm_ref): Path<String>,
) -> Result<Json<Vec<ProductResponse>>, ServerError> {
    let farm = resolve_farm(&state, &farm_ref).await?;
    let products = state.store.list_products(farm.id).await?;
    if products.is_empty() {
        return Err(ServerError::NotFound(format!("farm {farm_ref} has no products")));
    }
    Ok(Json(products.iter().map(ProductResponse::from).collect()))
}

#[cfg(test)]
mod test {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::*;

    const CSV: &str = "name,shop_sku,ingredients\nGoat cheese,S1,goat milk\nNo sku,,\n";

    async fn create(app: &TestApp, name: &str, farm_id: &str, csv: Option<&str>) -> axum::http::Response<axum::body::Body> {
        let mut parts = vec![("name", None, name), ("farmId", None, farm_id)];
        if let Some(csv) = csv {
            parts.push(("file", Some("products.csv"), csv));
        }
        send(&app.router, multipart_request("POST", "/farms", &parts)).await
    }

    #[tokio::test]
    async fn create_with_csv_imports_valid_rows_only() {
        let app = app().await;
        let response = create(&app, "Farm A", "A1", Some(CSV)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["externalFarmId"], "A1");
        assert_eq!(body["importFileRef"], "products.csv");
        assert_eq!(body["import"], json!({"inserted": 1, "skipped": 1, "duplicates": 0}));

        let response = send(&app.router, empty_request("GET", "/farms/A1/products")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let products = json_body(response).await;
        assert_eq!(products.as_array().unwrap().len(), 1);
        assert_eq!(products[0]["sku"], "S1");
        assert_eq!(products[0]["status"], "draft");
    }

    #[tokio::test]
    async fn failed_import_keeps_farm_and_can_be_retried() {
        let app = app().await;
        let unreadable: &[u8] = b"name,shop_sku\nCheese,\xff\xfe\n";
        let response = send(
            &app.router,
            multipart_bytes_request(
                "POST",
                "/farms",
                &[
                    ("name", None, "Farm A".as_bytes()),
                    ("farmId", None, "A1".as_bytes()),
                    ("file", Some("products.csv"), unreadable),
                ],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["externalFarmId"], "A1");
        assert!(body.get("import").is_none());
        assert_eq!(body["importError"]["error"], "file");
        assert!(body["importError"]["details"].as_str().unwrap().contains("line 2"));

        let response = send(
            &app.router,
            multipart_request("POST", "/farms/A1/import", &[("file", Some("products.csv"), CSV)]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["inserted"], 1);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let app = app().await;
        let response = send(
            &app.router,
            multipart_request("POST", "/farms", &[("name", None, "Farm A")]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "validation");
        assert_eq!(body["details"][0]["field"], "farmId");
    }

    #[tokio::test]
    async fn duplicate_farm_id_conflicts() {
        let app = app().await;
        create(&app, "Farm A", "A1", None).await;
        let response = create(&app, "Farm B", "A1", None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn farm_without_products_is_not_found() {
        let app = app().await;
        create(&app, "Farm A", "A1", None).await;
        let response = send(&app.router, empty_request("GET", "/farms/A1/products")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let app = app().await;
        create(&app, "Farm A", "A1", Some(CSV)).await;
        let response = send(
            &app.router,
            multipart_request("POST", "/farms/A1/import", &[("file", Some("again.csv"), CSV)]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"inserted": 0, "skipped": 1, "duplicates": 1})
        );
    }

    #[tokio::test]
    async fn rename_and_delete() {
        let app = app().await;
        let created = json_body(create(&app, "Farm A", "A1", Some(CSV)).await).await;
        let uuid = created["id"].as_str().unwrap().to_owned();

        let response = send(
            &app.router,
            json_request("PATCH", &format!("/farms/{uuid}"), json!({"name": "Farm B"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["name"], "Farm B");

        let response = send(&app.router, empty_request("DELETE", "/farms/A1")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let farms = json_body(send(&app.router, empty_request("GET", "/farms")).await).await;
        assert_eq!(farms, json!([]));
    }
}
