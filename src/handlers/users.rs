use actix_web::web::{Data, Json};
use actix_web::{get, post, put, HttpResponse};
use serde::Serialize;
use validator::Validate;

use crate::auth::{self, AuthService, AuthenticatedUser};
use crate::error::ApiError;
use crate::models::common::ApiResponse;
use crate::models::user::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest, User, UserResponse,
};
use crate::services::database::DatabaseService;

#[derive(Serialize)]
struct AuthPayload {
    user: UserResponse,
    token: String,
}

#[post("/signup")]
pub async fn signup(
    db: Data<DatabaseService>,
    auth: Data<AuthService>,
    payload: Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    if db.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash = auth::hash_password(&payload.password)?;
    let user = User::new(payload.name.trim().to_string(), email, password_hash);
    let user = db.create_user(&user).await?;
    log::info!("registered user {} ({})", user.id, user.email);

    let token = auth.issue_token(&user)?;
    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        AuthPayload {
            user: user.into(),
            token,
        },
        "User registered successfully",
    )))
}

#[post("/signin")]
pub async fn signin(
    db: Data<DatabaseService>,
    auth: Data<AuthService>,
    payload: Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    let user = db
        .get_user_by_email(&email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    let hash = user.password_hash.as_deref().ok_or(ApiError::Unauthorized)?;
    if !auth::verify_password(&payload.password, hash)? {
        return Err(ApiError::Unauthorized);
    }

    let token = auth.issue_token(&user)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        AuthPayload {
            user: user.into(),
            token,
        },
        "Signed in successfully",
    )))
}

#[get("/me")]
pub async fn me(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let user = db
        .get_user(&caller.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserPayload { user: user.into() })))
}

#[put("/update")]
pub async fn update_profile(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    payload: Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    // Targeted update so a concurrent subscription mutation is never
    // overwritten by a stale snapshot of the user record.
    let user = match &payload.name {
        Some(name) => db
            .update_user_name(caller.user_id, name.trim())
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?,
        None => db
            .get_user(&caller.user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        UserPayload { user: user.into() },
        "Profile updated successfully",
    )))
}

#[post("/change-password")]
pub async fn change_password(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    payload: Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    let user = db
        .get_user(&caller.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let hash = user.password_hash.as_deref().ok_or(ApiError::Unauthorized)?;
    if !auth::verify_password(&payload.old_password, hash)? {
        return Err(ApiError::validation("Old password is incorrect"));
    }

    let new_hash = auth::hash_password(&payload.new_password)?;
    db.update_user_password(caller.user_id, &new_hash)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    log::info!("password changed for user {}", user.id);

    Ok(HttpResponse::Ok().json(ApiResponse::<()>::message_only(
        "Password changed successfully",
    )))
}

#[derive(Serialize)]
struct UserPayload {
    user: UserResponse,
}
