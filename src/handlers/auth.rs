// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    extract::ValidatedJson,
    models::user::{AdminRegisterRequest, LoginRequest, RegisterRequest, Role, User},
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

const USER_COLUMNS: &str = "id, name, email, password, role, created_by, created_at";

/// Inserts a user row, mapping a duplicate email to 409.
pub async fn insert_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
    created_by: Option<i64>,
) -> Result<User, AppError> {
    let hashed_password = hash_password(password)?;
    let email = email.trim().to_lowercase();

    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (name, email, password, role, created_by) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
    ))
    .bind(name.trim())
    .bind(&email)
    .bind(hashed_password)
    .bind(role.as_str())
    .bind(created_by)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Email '{}' is already registered", email))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })
}

/// Self-registration. Always creates a plain user.
pub async fn register(
    State(pool): State<PgPool>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = insert_user(&pool, &payload.name, &payload.email, &payload.password, Role::User, None).await?;
    tracing::info!(user_id = user.id, "user registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Registration by an admin. May create other admins; records who created the account.
pub async fn admin_register(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(payload): ValidatedJson<AdminRegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;
    let role = payload.role.unwrap_or(Role::User);

    let user = insert_user(&pool, &payload.name, &payload.email, &payload.password, role, Some(admin_id)).await?;
    tracing::info!(user_id = user.id, created_by = admin_id, role = role.as_str(), "user registered by admin");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a bearer token.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(payload.email.trim().to_lowercase())
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::from(e)
        })?;

    let user = user.ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid email or password".to_string()));
    }

    let token = sign_jwt(user.id, &user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "expires_in": config.jwt_expiration,
        "user": user,
    })))
}

/// Returns the authenticated user.
pub async fn me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(claims.user_id()?)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}
