use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Completed,
    Refunded,
}

/// Append-only payment record. Created only after the provider signature has
/// been verified; never deleted, only transitioned to `refunded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "payment_id")]
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_payment_id: String,
    pub provider_subscription_id: String,
    pub signature: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn completed(
        user_id: Uuid,
        provider_payment_id: String,
        provider_subscription_id: String,
        signature: String,
        amount: Decimal,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider_payment_id,
            provider_subscription_id,
            signature,
            amount,
            currency,
            status: PaymentStatus::Completed,
            created_at: now,
            updated_at: now,
            refunded_at: None,
        }
    }

    /// Converts the provider's minor-unit amount (e.g. paise) to major units.
    pub fn amount_from_minor_units(minor: i64) -> Decimal {
        Decimal::new(minor, 2)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub razorpay_payment_id: String,

    #[validate(length(min = 1, message = "Subscription id is required"))]
    pub razorpay_subscription_id: String,

    #[validate(length(min = 1, message = "Signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentListEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_payment_id: String,
    pub provider_subscription_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentListEntry {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            provider_payment_id: p.provider_payment_id,
            provider_subscription_id: p.provider_subscription_id,
            amount: p.amount,
            currency: p.currency,
            status: p.status,
            created_at: p.created_at,
            refunded_at: p.refunded_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<PaymentStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(
            Payment::amount_from_minor_units(49900),
            Decimal::new(49900, 2)
        );
        assert_eq!(Payment::amount_from_minor_units(49900).to_string(), "499.00");
    }

    #[test]
    fn test_completed_payment_defaults() {
        let payment = Payment::completed(
            Uuid::new_v4(),
            "pay_1".to_string(),
            "sub_123".to_string(),
            "sig".to_string(),
            Decimal::new(49900, 2),
            "INR".to_string(),
        );
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.refunded_at.is_none());
    }
}
