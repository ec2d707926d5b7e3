use actix_web::web::{Data, Json, Query};
use actix_web::{get, post, HttpResponse};
use serde::Serialize;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::common::{ApiResponse, PaginatedResponse};
use crate::models::payment::{PaymentListEntry, PaymentListQuery, VerifyPaymentRequest};
use crate::models::user::SubscriptionStatus;
use crate::services::database::DatabaseService;
use crate::services::subscription::SubscriptionOrchestrator;

#[derive(Serialize)]
struct KeyPayload {
    key: String,
}

/// Publishable key the frontend needs to open the provider checkout.
#[get("/key")]
pub async fn razorpay_key(
    config: Data<Config>,
    _caller: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(KeyPayload {
        key: config.razorpay.key_id.clone(),
    })))
}

#[derive(Serialize)]
struct SubscriptionCreatedPayload {
    subscription_id: String,
}

#[post("/subscription")]
pub async fn buy_subscription(
    orchestrator: Data<SubscriptionOrchestrator>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let subscription_id = orchestrator.create(caller.user_id).await?;
    log::info!("subscription {subscription_id} created for user {}", caller.user_id);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        SubscriptionCreatedPayload { subscription_id },
        "Subscribed successfully",
    )))
}

#[post("/verify")]
pub async fn verify_subscription(
    orchestrator: Data<SubscriptionOrchestrator>,
    caller: AuthenticatedUser,
    payload: Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, ApiError> {
    payload.validate()?;

    let summary = orchestrator.verify(caller.user_id, &payload).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        summary,
        "Payment verified successfully",
    )))
}

#[derive(Serialize)]
struct CancelPayload {
    status: SubscriptionStatus,
    refund_initiated: bool,
}

#[post("/unsubscribe")]
pub async fn cancel_subscription(
    orchestrator: Data<SubscriptionOrchestrator>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let refund_initiated = orchestrator.cancel(caller.user_id).await?;
    log::info!("subscription cancelled for user {}", caller.user_id);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        CancelPayload {
            status: SubscriptionStatus::Cancelled,
            refund_initiated,
        },
        "Subscription cancelled successfully",
    )))
}

#[derive(Serialize)]
struct PaymentListPayload {
    payments: PaginatedResponse<PaymentListEntry>,
}

/// Admin listing of recorded payments, newest first, with an optional
/// status filter.
#[get("")]
pub async fn list_payments(
    db: Data<DatabaseService>,
    caller: AuthenticatedUser,
    query: Query<PaymentListQuery>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;

    let page = db.list_payments(&query).await?;
    let payments = PaginatedResponse {
        data: page.data.into_iter().map(PaymentListEntry::from).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
        total_pages: page.total_pages,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaymentListPayload { payments })))
}
