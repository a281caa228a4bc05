//! OpenAPI documentation for the `/api` surface, served by Scalar at `/doc/`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::{handlers, models};
use crate::db::models::orders::DeliveryStatus;
use crate::db::models::users::UserType;

/// Bearer JWT issued by `/api/users/login/`.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token from `/api/users/login/`. Include it in the `Authorization` header:\n\n\
                            ```\nAuthorization: Bearer <access>\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Swiggy API",
        version = "v1",
        description = "Food ordering: user accounts, product catalogue, orders and delivery tracking."
    ),
    modifiers(&SecurityAddon),
    paths(
        handlers::users::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::products::list_products,
        handlers::products::create_products,
        handlers::products::get_product,
        handlers::products::update_product,
        handlers::products::patch_product,
        handlers::products::delete_product,
        handlers::orders::list_orders,
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::orders::update_order,
        handlers::orders::verify_otp,
        handlers::tasks::bulk_create,
        handlers::tasks::check_progress,
    ),
    components(schemas(
        UserType,
        DeliveryStatus,
        models::auth::LoginRequest,
        models::auth::TokenPairResponse,
        models::auth::RefreshRequest,
        models::auth::AccessTokenResponse,
        models::users::UserCreate,
        models::users::UserResponse,
        models::users::OrderDetails,
        models::users::UserWithOrderDetails,
        models::products::ProductCreate,
        models::products::ProductUpdate,
        models::products::ProductResponse,
        models::orders::OrderItemCreate,
        models::orders::OrderCreate,
        models::orders::OrderItemPayload,
        models::orders::OrderUpdate,
        models::orders::VerifyOtpRequest,
        models::orders::OrderResponse,
        models::orders::OrderCreatedResponse,
        models::orders::MessageResponse,
        models::tasks::TaskIdResponse,
        models::tasks::ProgressResponse,
        models::tasks::TaskErrorResponse,
    )),
    tags(
        (name = "user", description = "Register a user"),
        (name = "users", description = "Operations related to users"),
        (name = "orders", description = "Operations related to order"),
        (name = "products", description = "Operations related to products"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/user/",
            "/api/users/login/",
            "/api/users/{id}/",
            "/api/products/{id}/",
            "/api/orders/{id}/verify-otp/",
            "/api/orders/check_progress/{task_id}/",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("BearerAuth"));
        let tags: Vec<_> = doc.tags.unwrap_or_default().into_iter().map(|t| t.name).collect();
        assert_eq!(tags, vec!["user", "users", "orders", "products"]);
    }

    #[test]
    fn task_ids_are_documented_as_strings() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let task_id = &doc["components"]["schemas"]["TaskIdResponse"]["properties"]["task_id"];
        assert_eq!(task_id["type"], "string");
    }
}
