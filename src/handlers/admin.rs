use actix_web::web::Data;
use actix_web::{get, HttpResponse};
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::common::ApiResponse;
use crate::services::database::DatabaseService;

#[derive(Serialize)]
struct UserStatsPayload {
    total_users: u64,
    subscribed_users: u64,
}

#[get("/stats/users")]
pub async fn user_stats(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;

    let total_users = db.count_users().await?;
    let subscribed_users = db.count_subscribed_users().await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(UserStatsPayload {
        total_users,
        subscribed_users,
    })))
}
