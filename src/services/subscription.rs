use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::payment::{Payment, VerifyPaymentRequest};
use crate::models::user::{SubscriptionInfo, SubscriptionStatus};
use crate::services::database::DatabaseService;
use crate::services::razorpay::{GatewayError, PaymentGateway, PaymentSignature};

/// Cancellation within this many days of the newest completed payment
/// triggers a refund attempt.
pub const REFUND_WINDOW_DAYS: i64 = 14;

const SUBSCRIPTION_TERM_DAYS: i64 = 365;

pub mod policy {
    //! Declarative gate for subscription operations: role and current
    //! subscription state decide what a caller may do, in one place.

    use crate::error::ApiError;
    use crate::models::user::{Role, SubscriptionInfo, SubscriptionStatus};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Action {
        Purchase,
        Verify,
        Cancel,
    }

    pub fn authorize(
        action: Action,
        role: Role,
        subscription: &SubscriptionInfo,
    ) -> Result<(), ApiError> {
        use Action::*;
        use SubscriptionStatus::*;

        match (action, role, subscription.status) {
            (Purchase, Role::Admin, _) => {
                Err(ApiError::forbidden("Admins cannot purchase subscriptions"))
            }
            (Purchase, _, Active) => {
                Err(ApiError::conflict("User already has an active subscription"))
            }
            (Purchase, _, _) => Ok(()),

            (Verify, _, _) if subscription.id.is_none() => {
                Err(ApiError::not_found("No subscription found for this user"))
            }
            (Verify, _, Active) => {
                Err(ApiError::conflict("Payment has already been verified"))
            }
            (Verify, _, _) => Ok(()),

            (Cancel, Role::Admin, _) => Err(ApiError::forbidden(
                "Admins cannot cancel subscriptions through this endpoint",
            )),
            (Cancel, _, _) if subscription.id.is_none() => {
                Err(ApiError::not_found("No active subscription found"))
            }
            (Cancel, _, Cancelled) => {
                Err(ApiError::conflict("Subscription is already cancelled"))
            }
            (Cancel, _, _) => Ok(()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionSummary {
    pub status: SubscriptionStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Drives a learner's subscription through its lifecycle
/// (`none → created → active → cancelled`), keeping the local user/payment
/// records consistent with the provider's state. Each operation runs behind
/// the per-user lock and commits its local mutations atomically.
pub struct SubscriptionOrchestrator {
    db: DatabaseService,
    gateway: Arc<dyn PaymentGateway>,
    signature: PaymentSignature,
}

impl SubscriptionOrchestrator {
    pub fn new(
        db: DatabaseService,
        gateway: Arc<dyn PaymentGateway>,
        signature: PaymentSignature,
    ) -> Self {
        Self {
            db,
            gateway,
            signature,
        }
    }

    /// Creates a provider-side subscription and mirrors it locally with
    /// status `created`. Returns the provider-assigned subscription id.
    pub async fn create(&self, user_id: Uuid) -> Result<String, ApiError> {
        let mut txn = self.db.begin_user_txn(user_id).await;

        let user = self
            .db
            .get_user(&user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        policy::authorize(policy::Action::Purchase, user.role, &user.subscription)?;

        let provider_sub = self
            .gateway
            .create_subscription(user.id, &user.email)
            .await
            .map_err(gateway_error)?;

        let now = Utc::now();
        let subscription = SubscriptionInfo {
            id: Some(provider_sub.id.clone()),
            status: SubscriptionStatus::from_provider(&provider_sub.status)
                .unwrap_or(SubscriptionStatus::Created),
            start_date: Some(now),
            end_date: Some(now + Duration::days(SUBSCRIPTION_TERM_DAYS)),
            activated_at: None,
            cancelled_at: None,
            payment_id: None,
        };

        txn.stage(
            "UPDATE users SET subscription = $subscription, updated_at = $now \
             WHERE user_id = $user_id",
        );
        txn.bind("subscription", &subscription)?;
        txn.bind("now", now)?;
        txn.bind("user_id", user_id)?;
        txn.commit().await?;

        Ok(provider_sub.id)
    }

    /// Verifies the provider's payment signature, confirms the subscription
    /// is active on the provider side, then records the payment and activates
    /// the local subscription in one transaction.
    pub async fn verify(
        &self,
        user_id: Uuid,
        request: &VerifyPaymentRequest,
    ) -> Result<SubscriptionSummary, ApiError> {
        let mut txn = self.db.begin_user_txn(user_id).await;

        let user = self
            .db
            .get_user(&user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        policy::authorize(policy::Action::Verify, user.role, &user.subscription)?;
        let stored_subscription_id = user
            .subscription
            .id
            .clone()
            .ok_or_else(|| ApiError::not_found("No subscription found for this user"))?;

        // Fail closed on any mismatch; the signature covers the stored
        // subscription id, not the client-supplied one.
        if !self.signature.verify(
            &request.razorpay_payment_id,
            &stored_subscription_id,
            &request.razorpay_signature,
        ) {
            log::warn!("payment verification failed for user {user_id}; possible tampering");
            return Err(ApiError::PaymentVerificationFailed);
        }

        // The provider's view is authoritative; a valid signature over a
        // stale subscription is not enough.
        let provider_sub = self
            .gateway
            .fetch_subscription(&stored_subscription_id)
            .await
            .map_err(gateway_error)?;
        if provider_sub.status != "active" {
            return Err(ApiError::validation(
                "Subscription is not active with the payment provider",
            ));
        }

        let payment = Payment::completed(
            user.id,
            request.razorpay_payment_id.clone(),
            stored_subscription_id,
            request.razorpay_signature.clone(),
            Payment::amount_from_minor_units(provider_sub.plan.amount),
            provider_sub.plan.currency.clone(),
        );

        let now = Utc::now();
        let mut subscription = user.subscription.clone();
        subscription.status = SubscriptionStatus::Active;
        subscription.activated_at = Some(now);
        subscription.payment_id = Some(payment.id);

        txn.stage("CREATE payments CONTENT $payment");
        txn.stage(
            "UPDATE users SET subscription = $subscription, updated_at = $now \
             WHERE user_id = $user_id",
        );
        txn.bind("payment", &payment)?;
        txn.bind("subscription", &subscription)?;
        txn.bind("now", now)?;
        txn.bind("user_id", user_id)?;
        txn.commit().await?;

        Ok(SubscriptionSummary {
            status: subscription.status,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
        })
    }

    /// Cancels the subscription with the provider, attempts a refund of the
    /// newest completed payment when inside the refund window (best-effort;
    /// cancellation proceeds regardless), and marks the local subscription
    /// cancelled. Returns whether a refund was processed.
    pub async fn cancel(&self, user_id: Uuid) -> Result<bool, ApiError> {
        let mut txn = self.db.begin_user_txn(user_id).await;

        let user = self
            .db
            .get_user(&user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        policy::authorize(policy::Action::Cancel, user.role, &user.subscription)?;
        let subscription_id = user
            .subscription
            .id
            .clone()
            .ok_or_else(|| ApiError::not_found("No active subscription found"))?;

        self.gateway
            .cancel_subscription(&subscription_id)
            .await
            .map_err(gateway_error)?;

        let now = Utc::now();
        let mut refunded = false;

        if let Some(payment) = self.db.latest_completed_payment(&subscription_id).await? {
            let within_window =
                now.signed_duration_since(payment.created_at) <= Duration::days(REFUND_WINDOW_DAYS);
            if within_window {
                match self
                    .gateway
                    .refund_payment(&payment.provider_payment_id, user.id)
                    .await
                {
                    Ok(()) => {
                        txn.stage(
                            "UPDATE payments SET status = 'refunded', refunded_at = $now, \
                             updated_at = $now WHERE payment_id = $refund_payment_id",
                        );
                        txn.bind("refund_payment_id", payment.id)?;
                        refunded = true;
                    }
                    Err(e) => {
                        // Refund is best-effort; cancellation is mandatory.
                        log::warn!(
                            "refund of payment {} failed, continuing cancellation: {e}",
                            payment.provider_payment_id
                        );
                    }
                }
            }
        }

        let mut subscription = user.subscription.clone();
        subscription.status = SubscriptionStatus::Cancelled;
        subscription.cancelled_at = Some(now);

        txn.stage(
            "UPDATE users SET subscription = $subscription, updated_at = $now \
             WHERE user_id = $user_id",
        );
        txn.bind("subscription", &subscription)?;
        txn.bind("now", now)?;
        txn.bind("user_id", user_id)?;
        txn.commit().await?;

        Ok(refunded)
    }
}

fn gateway_error(e: GatewayError) -> ApiError {
    ApiError::Upstream(e.to_string())
}
