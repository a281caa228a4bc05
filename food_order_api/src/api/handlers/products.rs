use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::{
    AppState,
    api::{
        JsonBody,
        models::products::{ProductCreate, ProductPayload, ProductResponse, ProductUpdate},
    },
    auth::permissions::{Admin, RequiresPermission},
    db::models::products::{ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest},
    errors::{Error, Result},
    types::{ProductId, abbrev},
};

pub(crate) fn no_properties() -> Error {
    Error::Validation {
        errors: json!({ "detail": "No properties are found" }),
    }
}

async fn load_product(state: &AppState, id: &str) -> Result<ProductDBResponse> {
    state
        .storage
        .get_product(id)
        .await?
        .ok_or_else(|| Error::not_found("Product", id))
}

/// List products
#[utoipa::path(
    get,
    path = "/api/products/",
    tag = "products",
    summary = "List products",
    responses(
        (status = 200, description = "All products", body = Vec<ProductResponse>),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_products(State(state): State<AppState>, _: RequiresPermission<Admin>) -> Result<Json<Vec<ProductResponse>>> {
    let products = state.storage.list_products().await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// Create one or more products
///
/// Accepts a list of products or a single product object. Nothing is created unless every
/// item is valid.
#[utoipa::path(
    post,
    path = "/api/products/",
    tag = "products",
    summary = "Create products",
    request_body = Vec<ProductCreate>,
    responses(
        (status = 201, description = "Created products", body = Vec<ProductResponse>),
        (status = 400, description = "Empty payload or invalid product data"),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_products(
    State(state): State<AppState>,
    _: RequiresPermission<Admin>,
    JsonBody(payload): JsonBody<Option<ProductPayload>>,
) -> Result<(StatusCode, Json<Vec<ProductResponse>>)> {
    let payload = payload.ok_or_else(no_properties)?;
    let is_list = payload.is_list();
    let items = payload.into_items().ok_or_else(no_properties)?;

    let mut requests: Vec<ProductCreateDBRequest> = Vec::with_capacity(items.len());
    let mut item_errors = Vec::with_capacity(items.len());
    let mut failed = false;
    for item in &items {
        match item.validate() {
            Ok(request) => {
                requests.push(request);
                item_errors.push(json!({}));
            }
            Err(errors) => {
                failed = true;
                item_errors.push(errors.to_value());
            }
        }
    }

    if failed {
        // A list reports one entry per item; a single object reports its own errors
        let errors = if is_list {
            Value::Array(item_errors)
        } else {
            item_errors.swap_remove(0)
        };
        return Err(Error::Validation { errors });
    }

    let created = state.storage.create_products(&requests).await?;
    tracing::info!(count = created.len(), "Products created");
    Ok((StatusCode::CREATED, Json(created.into_iter().map(Into::into).collect())))
}

/// Retrieve a product
#[utoipa::path(
    get,
    path = "/api/products/{id}/",
    tag = "products",
    summary = "Get product",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 404, description = "Product not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(product_id = %id))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    _: RequiresPermission<Admin>,
) -> Result<Json<ProductResponse>> {
    Ok(Json(load_product(&state, &id).await?.into()))
}

/// Replace a product
#[utoipa::path(
    put,
    path = "/api/products/{id}/",
    tag = "products",
    summary = "Update product",
    params(("id" = String, Path, description = "Product ID")),
    request_body = ProductCreate,
    responses(
        (status = 200, description = "Updated product", body = ProductResponse),
        (status = 400, description = "Invalid product data"),
        (status = 404, description = "Product not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(product_id = %id))]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    _: RequiresPermission<Admin>,
    JsonBody(body): JsonBody<Option<ProductCreate>>,
) -> Result<Json<ProductResponse>> {
    let product = load_product(&state, &id).await?;
    let request = body.unwrap_or_default().validate()?;
    let updated = state
        .storage
        .update_product(
            &product.id,
            &ProductUpdateDBRequest {
                name: Some(request.name),
                description: Some(request.description),
                price: Some(request.price),
                image: Some(request.image),
            },
        )
        .await?;
    Ok(Json(updated.into()))
}

/// Partially update a product
#[utoipa::path(
    patch,
    path = "/api/products/{id}/",
    tag = "products",
    summary = "Partially update product",
    params(("id" = String, Path, description = "Product ID")),
    request_body = ProductUpdate,
    responses(
        (status = 200, description = "Updated product", body = ProductResponse),
        (status = 400, description = "Invalid product data"),
        (status = 404, description = "Product not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(product_id = %id))]
pub async fn patch_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    _: RequiresPermission<Admin>,
    JsonBody(body): JsonBody<Option<ProductUpdate>>,
) -> Result<Json<ProductResponse>> {
    let product = load_product(&state, &id).await?;
    // An empty PATCH body changes nothing
    let request = body.unwrap_or_default().validate()?;
    let updated = state.storage.update_product(&product.id, &request).await?;
    Ok(Json(updated.into()))
}

/// Delete a product
#[utoipa::path(
    delete,
    path = "/api/products/{id}/",
    tag = "products",
    summary = "Delete product",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Product not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(product_id = %id))]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    _: RequiresPermission<Admin>,
) -> Result<StatusCode> {
    if !state.storage.delete_product(&id).await? {
        return Err(Error::not_found("Product", id));
    }
    tracing::info!(product_id = abbrev(&id), "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::models::products::ProductResponse;
    use crate::db::models::users::UserType;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test_log::test(tokio::test)]
    async fn test_create_products_from_list_and_object() {
        let (app, state) = create_test_app();
        let admin = create_test_user(&state, "boss", UserType::Admin).await;
        let token = access_token(&state, &admin);

        let response = app
            .post("/api/products/")
            .authorization_bearer(&token)
            .json(&json!([
                { "name": "Dosa", "description": "Crispy", "price": "4.5" },
                { "name": "Idli", "description": "Steamed", "price": 3, "image": "https://img.example.com/idli.png" },
            ]))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: Vec<ProductResponse> = response.json();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].price.to_string(), "4.50");
        assert_eq!(created[1].image.as_deref(), Some("https://img.example.com/idli.png"));

        let response = app
            .post("/api/products/")
            .authorization_bearer(&token)
            .json(&json!({ "name": "Vada", "description": "Fried", "price": "2.00" }))
            .await;
        response.assert_status(StatusCode::CREATED);

        let all: Vec<ProductResponse> = app.get("/api/products/").authorization_bearer(&token).await.json();
        assert_eq!(all.len(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_create_products_rejects_empty_and_invalid_payloads() {
        let (app, state) = create_test_app();
        let admin = create_test_user(&state, "boss", UserType::Admin).await;
        let token = access_token(&state, &admin);

        for body in [json!([]), json!({})] {
            let response = app.post("/api/products/").authorization_bearer(&token).json(&body).await;
            response.assert_status(StatusCode::BAD_REQUEST);
            response.assert_json(&json!({ "detail": "No properties are found" }));
        }
        let response = app.post("/api/products/").authorization_bearer(&token).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "detail": "No properties are found" }));

        // One bad item rejects the whole batch
        let response = app
            .post("/api/products/")
            .authorization_bearer(&token)
            .json(&json!([
                { "name": "Dosa", "description": "Crispy", "price": "4.50" },
                { "name": "Idli", "description": "Steamed", "price": "-2" },
            ]))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!([{}, { "price": ["Ensure this value is greater than or equal to 0."] }]));
        assert!(state.storage.list_products().await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_create_products_rejects_mistyped_payloads() {
        let (app, state) = create_test_app();
        let admin = create_test_user(&state, "boss", UserType::Admin).await;
        let token = access_token(&state, &admin);

        for body in [
            json!(["Dosa"]),
            json!([null]),
            json!("Dosa"),
            json!([{ "name": "Idli", "description": "Steamed", "price": "abc" }]),
        ] {
            let response = app.post("/api/products/").authorization_bearer(&token).json(&body).await;
            response.assert_status(StatusCode::BAD_REQUEST);
            let detail = response.json::<serde_json::Value>()["detail"].as_str().unwrap().to_string();
            assert!(detail.starts_with("JSON parse error - "), "{detail}");
            assert!(!detail.contains("NoneType") && !detail.contains("dict"), "{detail}");
        }
        assert!(state.storage.list_products().await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_products_are_admin_only() {
        let (app, state) = create_test_app();
        let customer = create_test_user(&state, "alice", UserType::User).await;
        let agent = create_test_user(&state, "rider", UserType::DeliveryAgent).await;

        app.get("/api/products/").await.assert_status(StatusCode::UNAUTHORIZED);
        for user in [&customer, &agent] {
            app.get("/api/products/")
                .authorization_bearer(access_token(&state, user))
                .await
                .assert_status(StatusCode::FORBIDDEN);
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_product_crud() {
        let (app, state) = create_test_app();
        let admin = create_test_user(&state, "boss", UserType::Admin).await;
        let token = access_token(&state, &admin);
        let product = create_test_product(&state, "Biryani", "12.50").await;
        let path = format!("/api/products/{}/", product.id);

        let fetched: ProductResponse = app.get(&path).authorization_bearer(&token).await.json();
        assert_eq!(fetched.name, "Biryani");

        let response = app
            .put(&path)
            .authorization_bearer(&token)
            .json(&json!({ "name": "Veg Biryani", "description": "Rice", "price": "10" }))
            .await;
        response.assert_status_ok();
        let updated: ProductResponse = response.json();
        assert_eq!(updated.name, "Veg Biryani");
        assert_eq!(updated.price.to_string(), "10.00");

        // PUT needs every required field
        app.put(&path)
            .authorization_bearer(&token)
            .json(&json!({ "name": "Only a name" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let patched: ProductResponse = app
            .patch(&path)
            .authorization_bearer(&token)
            .json(&json!({ "image": "https://img.example.com/biryani.png" }))
            .await
            .json();
        assert_eq!(patched.image.as_deref(), Some("https://img.example.com/biryani.png"));

        let patched: ProductResponse = app
            .patch(&path)
            .authorization_bearer(&token)
            .json(&json!({ "price": "11.25" }))
            .await
            .json();
        assert_eq!(patched.name, "Veg Biryani");
        assert_eq!(patched.price.to_string(), "11.25");
        assert_eq!(patched.image.as_deref(), Some("https://img.example.com/biryani.png"));

        let cleared: ProductResponse = app
            .patch(&path)
            .authorization_bearer(&token)
            .json(&json!({ "image": null }))
            .await
            .json();
        assert!(cleared.image.is_none());

        app.delete(&path)
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.get(&path)
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.delete(&path)
            .authorization_bearer(&token)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
