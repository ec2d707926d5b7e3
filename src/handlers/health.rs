use actix_web::web::Data;
use actix_web::HttpResponse;

use crate::error::ApiError;
use crate::models::common::ApiResponse;
use crate::services::database::DatabaseService;

pub async fn health_check(db: Data<DatabaseService>) -> Result<HttpResponse, ApiError> {
    db.health_check().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::<()>::message_only("OK")))
}
