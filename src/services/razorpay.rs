use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::config::RazorpayConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider accepted the request but reported an error of its own.
    #[error("{description}")]
    Api { status: u16, description: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPlan {
    /// Amount in the provider's minor units (e.g. paise).
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct GatewaySubscription {
    pub id: String,
    pub status: String,
    pub plan: GatewayPlan,
}

/// Port to the payment provider. The orchestrator receives this as an
/// injected dependency so tests can substitute a recording fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a provider-side subscription for the fixed plan (12 billing
    /// cycles, customer notified) and returns it.
    async fn create_subscription(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<GatewaySubscription, GatewayError>;

    /// Fetches the provider's authoritative view of a subscription.
    async fn fetch_subscription(&self, id: &str) -> Result<GatewaySubscription, GatewayError>;

    async fn cancel_subscription(&self, id: &str) -> Result<GatewaySubscription, GatewayError>;

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        cancelled_by: Uuid,
    ) -> Result<(), GatewayError>;
}

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        let response = self
            .client
            .post(format!("{}{}", self.config.api_url, path))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await?;
        Self::into_json(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        let response = self
            .client
            .get(format!("{}{}", self.config.api_url, path))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;
        Self::into_json(response).await
    }

    async fn into_json(response: reqwest::Response) -> Result<Value, GatewayError> {
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                description: error_description(&body),
            });
        }
        Ok(body)
    }

    async fn fetch_plan(&self, plan_id: &str) -> Result<GatewayPlan, GatewayError> {
        let body = self.get(&format!("/plans/{plan_id}")).await?;
        parse_plan(&body).ok_or_else(|| GatewayError::Api {
            status: 502,
            description: format!("plan response missing amount/currency: {body}"),
        })
    }

    fn subscription_from(
        &self,
        body: &Value,
        plan: GatewayPlan,
    ) -> Result<GatewaySubscription, GatewayError> {
        let id = body.get("id").and_then(Value::as_str);
        let status = body.get("status").and_then(Value::as_str);
        match (id, status) {
            (Some(id), Some(status)) => Ok(GatewaySubscription {
                id: id.to_string(),
                status: status.to_string(),
                plan,
            }),
            _ => Err(GatewayError::Api {
                status: 502,
                description: format!("subscription response missing id/status: {body}"),
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_subscription(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<GatewaySubscription, GatewayError> {
        let body = self
            .post(
                "/subscriptions",
                json!({
                    "plan_id": self.config.plan_id,
                    "customer_notify": 1,
                    "total_count": 12,
                    "notes": {
                        "user_id": user_id.to_string(),
                        "user_email": email,
                    },
                }),
            )
            .await?;

        log::info!("created provider subscription for user {user_id}");
        let plan = self.fetch_plan(&self.config.plan_id).await?;
        self.subscription_from(&body, plan)
    }

    async fn fetch_subscription(&self, id: &str) -> Result<GatewaySubscription, GatewayError> {
        let body = self.get(&format!("/subscriptions/{id}")).await?;
        let plan_id = body
            .get("plan_id")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.plan_id)
            .to_string();
        let plan = self.fetch_plan(&plan_id).await?;
        self.subscription_from(&body, plan)
    }

    async fn cancel_subscription(&self, id: &str) -> Result<GatewaySubscription, GatewayError> {
        let body = self
            .post(&format!("/subscriptions/{id}/cancel"), json!({}))
            .await?;
        log::info!("cancelled provider subscription {id}");
        let plan = self.fetch_plan(&self.config.plan_id).await?;
        self.subscription_from(&body, plan)
    }

    async fn refund_payment(
        &self,
        provider_payment_id: &str,
        cancelled_by: Uuid,
    ) -> Result<(), GatewayError> {
        self.post(
            &format!("/payments/{provider_payment_id}/refund"),
            json!({
                "speed": "optimum",
                "notes": {
                    "reason": "Subscription cancelled within refund period",
                    "cancelled_by": cancelled_by.to_string(),
                },
            }),
        )
        .await?;
        log::info!("refunded provider payment {provider_payment_id}");
        Ok(())
    }
}

fn parse_plan(body: &Value) -> Option<GatewayPlan> {
    let item = body.get("item")?;
    Some(GatewayPlan {
        amount: item.get("amount")?.as_i64()?,
        currency: item.get("currency")?.as_str()?.to_string(),
    })
}

fn error_description(body: &Value) -> String {
    body.get("error")
        .and_then(|e| e.get("description"))
        .and_then(Value::as_str)
        .unwrap_or("unknown provider error")
        .to_string()
}

/// HMAC-SHA256 check that payment-confirmation data presented by a client
/// actually originated from the payment provider. The comparison is
/// constant-time via `Mac::verify_slice`.
#[derive(Clone)]
pub struct PaymentSignature {
    secret: String,
}

impl PaymentSignature {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn verify(&self, payment_id: &str, subscription_id: &str, supplied_hex: &str) -> bool {
        let Ok(supplied) = hex::decode(supplied_hex) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(format!("{payment_id}|{subscription_id}").as_bytes());
        mac.verify_slice(&supplied).is_ok()
    }

    pub fn sign(&self, payment_id: &str, subscription_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{payment_id}|{subscription_id}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let signature = PaymentSignature::new("shared-secret".to_string());
        let signed = signature.sign("pay_1", "sub_123");
        assert!(signature.verify("pay_1", "sub_123", &signed));
    }

    #[test]
    fn test_single_bit_mutation_rejected() {
        let signature = PaymentSignature::new("shared-secret".to_string());
        let signed = signature.sign("pay_1", "sub_123");

        let bytes = hex::decode(&signed).unwrap();
        for i in 0..bytes.len() {
            let mut mutated = bytes.clone();
            mutated[i] ^= 0x01;
            assert!(!signature.verify("pay_1", "sub_123", &hex::encode(mutated)));
        }
    }

    #[test]
    fn test_malformed_signature_rejected() {
        let signature = PaymentSignature::new("shared-secret".to_string());
        assert!(!signature.verify("pay_1", "sub_123", "not-hex"));
        assert!(!signature.verify("pay_1", "sub_123", ""));
    }

    #[test]
    fn test_wrong_context_rejected() {
        let signature = PaymentSignature::new("shared-secret".to_string());
        let signed = signature.sign("pay_1", "sub_123");
        assert!(!signature.verify("pay_2", "sub_123", &signed));
        assert!(!signature.verify("pay_1", "sub_456", &signed));
    }

    #[test]
    fn test_plan_parsing() {
        let body = json!({
            "id": "plan_1",
            "item": { "amount": 49900, "currency": "INR" }
        });
        let plan = parse_plan(&body).unwrap();
        assert_eq!(plan.amount, 49900);
        assert_eq!(plan.currency, "INR");

        assert!(parse_plan(&json!({ "id": "plan_1" })).is_none());
    }

    #[test]
    fn test_error_description_extraction() {
        let body = json!({
            "error": { "code": "BAD_REQUEST_ERROR", "description": "Subscription is not active" }
        });
        assert_eq!(error_description(&body), "Subscription is not active");
        assert_eq!(error_description(&json!({})), "unknown provider error");
    }
}
