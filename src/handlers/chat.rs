use actix_web::web::{Data, Query};
use actix_web::{get, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::common::ApiResponse;
use crate::services::gemini::GeminiClient;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub message: String,
    pub context: Option<String>,
}

#[derive(Serialize)]
struct ChatPayload {
    reply: String,
}

#[get("")]
pub async fn chat(
    gemini: Data<GeminiClient>,
    _caller: AuthenticatedUser,
    query: Query<ChatQuery>,
) -> Result<HttpResponse, ApiError> {
    let message = query.message.trim();
    if message.is_empty() {
        return Err(ApiError::validation("Message is required"));
    }

    let reply = gemini
        .chat(message, query.context.as_deref())
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(ChatPayload { reply })))
}
