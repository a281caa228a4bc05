use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::{
        JsonBody,
        models::{
            auth::TokenPairResponse,
            users::{CurrentUser, ListUsersQuery, OrderDetails, UserCreate, UserResponse, UserWithOrderDetails},
        },
    },
    auth::{
        password,
        permissions::{Admin, AdminOrCustomer, RequiresPermission},
        session,
    },
    db::models::users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserType, UserUpdateDBRequest},
    errors::{Error, Result},
    notifications,
    types::{UserId, abbrev},
};

async fn hash(state: &AppState, plain: String) -> Result<String> {
    let params = state.config.auth.password.argon2_params();
    tokio::task::spawn_blocking(move || password::hash_password(&plain, params))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

async fn load_user(state: &AppState, id: &str) -> Result<UserDBResponse> {
    state.storage.get_user(id).await?.ok_or_else(|| Error::not_found("User", id))
}

/// Customers may only act on their own account.
fn ensure_self_or_admin(caller: &CurrentUser, target: &str, resource: &str) -> Result<()> {
    if caller.is_user() && caller.id != target {
        return Err(Error::InsufficientPermissions {
            required: "owner".to_string(),
            resource: resource.to_string(),
        });
    }
    Ok(())
}

/// Register a user
#[utoipa::path(
    post,
    path = "/api/user/",
    tag = "user",
    summary = "Register a user",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User registered", body = TokenPairResponse),
        (status = 400, description = "Invalid user data"),
        (status = 409, description = "Username or email already taken"),
    ),
    security((), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    caller: Option<CurrentUser>,
    JsonBody(body): JsonBody<Option<UserCreate>>,
) -> Result<(StatusCode, Json<TokenPairResponse>)> {
    let input = body.unwrap_or_default().validate(&state.config.auth.password)?;
    let is_admin = caller.as_ref().is_some_and(CurrentUser::is_admin);

    // Only admins may create admins or delivery agents
    let user_type = if is_admin { input.user_type.unwrap_or_default() } else { UserType::User };
    let plain = input
        .password
        .unwrap_or_else(|| password::random_alphanumeric(state.config.auth.password.generated_length));
    let password_hash = hash(&state, plain.clone()).await?;

    let mut user = state
        .storage
        .create_user(&UserCreateDBRequest {
            username: input.username,
            email: input.email,
            phone: input.phone.flatten(),
            user_type,
            password_hash,
        })
        .await?;

    if is_admin && input.is_active == Some(false) {
        user = state
            .storage
            .update_user(
                &user.id,
                &UserUpdateDBRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
    }

    tracing::info!(user_id = abbrev(&user.id), user_type = %user.user_type, "User registered");

    if let Err(e) = state
        .tasks
        .delay(notifications::registration(&user.username, &user.email, &plain))
        .await
    {
        tracing::error!(error = %e, "Failed to queue registration email");
    }

    let pair = session::issue_token_pair(&user, &state.config)?;
    Ok((StatusCode::CREATED, Json(pair.into())))
}

/// List users with their order totals
#[utoipa::path(
    get,
    path = "/api/users/",
    tag = "users",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users with order details", body = Vec<UserWithOrderDetails>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    _: RequiresPermission<Admin>,
) -> Result<Json<Vec<UserWithOrderDetails>>> {
    let filter = match query.user_type.as_deref().filter(|t| !t.is_empty()) {
        None => UserFilter::default(),
        Some(user_type) => match user_type.parse::<UserType>() {
            Ok(user_type) => UserFilter {
                user_type: Some(user_type),
            },
            // An unknown type matches nobody
            Err(_) => return Ok(Json(Vec::new())),
        },
    };

    let users = state.storage.list_users(&filter).await?;
    let ids: Vec<UserId> = users.iter().map(|u| u.id.clone()).collect();
    let mut summaries = state.storage.order_summaries(&ids).await?;

    let response = users
        .into_iter()
        .map(|user| {
            let order_details = summaries.remove(&user.id).map(OrderDetails::from).unwrap_or_default();
            UserWithOrderDetails {
                user: UserResponse::from(user),
                order_details,
            }
        })
        .collect();
    Ok(Json(response))
}

/// Retrieve a user
#[utoipa::path(
    get,
    path = "/api/users/{id}/",
    tag = "users",
    summary = "Get user",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User profile", body = UserResponse),
        (status = 403, description = "Customers may only read their own profile"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    caller: RequiresPermission<AdminOrCustomer>,
) -> Result<Json<UserResponse>> {
    let user = load_user(&state, &id).await?;
    ensure_self_or_admin(&caller, &user.id, &format!("/api/users/{id}/"))?;
    Ok(Json(user.into()))
}

/// Replace a user's profile
#[utoipa::path(
    put,
    path = "/api/users/{id}/",
    tag = "users",
    summary = "Update user",
    params(("id" = String, Path, description = "User ID")),
    request_body = UserCreate,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Invalid user data"),
        (status = 403, description = "Customers may only update their own profile"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Username or email already taken"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    caller: RequiresPermission<AdminOrCustomer>,
    JsonBody(body): JsonBody<Option<UserCreate>>,
) -> Result<Json<UserResponse>> {
    let user = load_user(&state, &id).await?;
    ensure_self_or_admin(&caller, &user.id, &format!("/api/users/{id}/"))?;

    let input = body.unwrap_or_default().validate(&state.config.auth.password)?;
    let password_hash = match input.password {
        Some(plain) => Some(hash(&state, plain).await?),
        None => None,
    };

    // Role and activation are admin decisions
    let (user_type, is_active) = if caller.is_admin() {
        (input.user_type, input.is_active)
    } else {
        (None, None)
    };

    let updated = state
        .storage
        .update_user(
            &user.id,
            &UserUpdateDBRequest {
                username: Some(input.username),
                email: Some(input.email),
                phone: input.phone,
                user_type,
                password_hash,
                is_active,
            },
        )
        .await?;
    Ok(Json(updated.into()))
}

/// Soft delete a user
#[utoipa::path(
    delete,
    path = "/api/users/{id}/",
    tag = "users",
    summary = "Deactivate user",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 400, description = "User has pending orders or is an admin"),
        (status = 403, description = "Customers may only delete themselves"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    caller: RequiresPermission<AdminOrCustomer>,
) -> Result<StatusCode> {
    let user = load_user(&state, &id).await?;
    ensure_self_or_admin(&caller, &user.id, &format!("/api/users/{id}/"))?;

    if caller.is_user() && state.storage.has_pending_orders(&user.id).await? {
        return Err(Error::bad_request("Cannot delete user with pending orders."));
    }
    if user.is_admin() {
        return Err(Error::bad_request("Cannot delete admin user."));
    }

    state
        .storage
        .update_user(
            &user.id,
            &UserUpdateDBRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
    tracing::info!(user_id = abbrev(&user.id), "User profile soft deleted");
    Ok(StatusCode::NO_CONTENT)
}
