use crate::error::{Error, Result};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, RoundingMode, Signed, ToPrimitive};
use hmac::{Hmac, Mac};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::env;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Gateway-side order created for a local payment. The order id is the
/// correlation key joining local and remote records.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

/// Authoritative payment details fetched from the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub short_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentLinkRequest {
    pub amount: BigDecimal,
    pub currency: String,
    pub description: String,
    pub reference_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_contact: Option<String>,
}

/// The payment gateway seam. The production implementation talks to
/// Razorpay over HTTPS; tests substitute a fake so reconciliation logic
/// runs without network access.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: &BigDecimal,
        currency: &str,
        receipt: &str,
        notes: Option<serde_json::Value>,
    ) -> Result<GatewayOrder>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment>;

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: &BigDecimal,
        reason: Option<&str>,
    ) -> Result<GatewayRefund>;

    async fn create_payment_link(&self, request: PaymentLinkRequest) -> Result<PaymentLink>;

    /// HMAC-SHA256 over `order_id|payment_id` with the API key secret.
    /// Returns false on mismatch; errors only when no secret is configured.
    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool>;

    /// HMAC-SHA256 over the raw webhook body with the webhook secret.
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> Result<bool>;
}

/// Newtype so a gateway override can be injected through actix app data.
#[derive(Clone)]
pub struct GatewayHandle(pub Arc<dyn PaymentGateway>);

/// Convert a major-unit amount to the gateway's integer minor units
/// (paise for INR): ×100, rounded half-up.
pub fn to_minor_units(amount: &BigDecimal) -> Result<i64> {
    if !amount.is_positive() {
        return Err(Error::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }

    (amount * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()
        .ok_or_else(|| Error::Validation("amount is out of range".to_string()))
}

fn hmac_hex(secret: &str, message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::Internal("invalid HMAC key".to_string()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: Option<String>,
    timeout: Duration,
}

impl RazorpayClient {
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: String,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            key_id,
            key_secret,
            webhook_secret,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_env() -> Result<Self> {
        let key_id = env::var("RAZORPAY_KEY_ID")
            .map_err(|_| Error::Internal("RAZORPAY_KEY_ID not set".to_string()))?;
        let key_secret = env::var("RAZORPAY_KEY_SECRET")
            .map_err(|_| Error::Internal("RAZORPAY_KEY_SECRET not set".to_string()))?;
        let webhook_secret = env::var("RAZORPAY_WEBHOOK_SECRET").ok();
        let base_url = env::var("RAZORPAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.razorpay.com".to_string());

        let timeout_secs = env::var("RAZORPAY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let mut client = Self::new(base_url, key_id, key_secret, webhook_secret);
        client.timeout = Duration::from_secs(timeout_secs);
        Ok(client)
    }

    /// Timeouts and connection failures are inconclusive: the gateway may
    /// have processed the request. They map to `GatewayTimeout` so callers
    /// never treat them as a definitive rejection.
    fn transport_error(e: reqwest::Error) -> Error {
        if e.is_timeout() || e.is_connect() {
            Error::GatewayTimeout(e.to_string())
        } else {
            Error::Gateway(e.to_string())
        }
    }

    async fn read_response<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            resp.json::<T>()
                .await
                .map_err(|e| Error::Gateway(format!("invalid gateway response: {}", e)))
        } else {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            warn!("Gateway returned HTTP {}: {}", status.as_u16(), snippet);
            Err(Error::Gateway(format!("HTTP {}: {}", status.as_u16(), snippet)))
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::read_response(resp).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::read_response(resp).await
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount: &BigDecimal,
        currency: &str,
        receipt: &str,
        notes: Option<serde_json::Value>,
    ) -> Result<GatewayOrder> {
        let amount_minor = to_minor_units(amount)?;
        let mut body = json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
            "payment_capture": 1,
        });
        if let Some(notes) = notes {
            body["notes"] = notes;
        }

        self.post("/v1/orders", body).await
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        self.get(&format!("/v1/payments/{}", payment_id)).await
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: &BigDecimal,
        reason: Option<&str>,
    ) -> Result<GatewayRefund> {
        let amount_minor = to_minor_units(amount)?;
        let body = json!({
            "amount": amount_minor,
            "notes": { "reason": reason.unwrap_or("requested by organizer") },
        });

        self.post(&format!("/v1/payments/{}/refund", payment_id), body)
            .await
    }

    async fn create_payment_link(&self, request: PaymentLinkRequest) -> Result<PaymentLink> {
        let amount_minor = to_minor_units(&request.amount)?;
        let body = json!({
            "amount": amount_minor,
            "currency": request.currency,
            "description": request.description,
            "reference_id": request.reference_id,
            "customer": {
                "name": request.customer_name,
                "email": request.customer_email,
                "contact": request.customer_contact,
            },
            "notify": { "sms": request.customer_contact.is_some(), "email": true },
        });

        self.post("/v1/payment_links", body).await
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool> {
        let message = format!("{}|{}", order_id, payment_id);
        let expected = hmac_hex(&self.key_secret, message.as_bytes())?;
        Ok(expected == signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> Result<bool> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| Error::Internal("RAZORPAY_WEBHOOK_SECRET not set".to_string()))?;
        let expected = hmac_hex(secret, body)?;
        Ok(expected == signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn test_client() -> RazorpayClient {
        RazorpayClient::new(
            "http://localhost:1".to_string(),
            "rzp_test_key".to_string(),
            "test_key_secret".to_string(),
            Some("test_webhook_secret".to_string()),
        )
    }

    #[test]
    fn minor_units_multiply_by_one_hundred() {
        let amount = BigDecimal::from_str("499.00").unwrap();
        assert_eq!(to_minor_units(&amount).unwrap(), 49900);

        let amount = BigDecimal::from_str("0.5").unwrap();
        assert_eq!(to_minor_units(&amount).unwrap(), 50);
    }

    #[test]
    fn minor_units_round_half_up() {
        let amount = BigDecimal::from_str("10.005").unwrap();
        assert_eq!(to_minor_units(&amount).unwrap(), 1001);

        let amount = BigDecimal::from_str("10.004").unwrap();
        assert_eq!(to_minor_units(&amount).unwrap(), 1000);
    }

    #[test]
    fn minor_units_reject_non_positive_amounts() {
        assert!(to_minor_units(&BigDecimal::from(0)).is_err());
        assert!(to_minor_units(&BigDecimal::from(-5)).is_err());
    }

    #[test]
    fn payment_signature_accepts_the_expected_hmac() {
        let client = test_client();
        let signature =
            hmac_hex("test_key_secret", b"order_abc123|pay_xyz789").unwrap();

        assert!(client
            .verify_payment_signature("order_abc123", "pay_xyz789", &signature)
            .unwrap());
    }

    #[test]
    fn payment_signature_rejects_a_tampered_hmac() {
        let client = test_client();
        let mut signature =
            hmac_hex("test_key_secret", b"order_abc123|pay_xyz789").unwrap();

        // flip the last character
        let last = signature.pop().unwrap();
        signature.push(if last == '0' { '1' } else { '0' });

        assert!(!client
            .verify_payment_signature("order_abc123", "pay_xyz789", &signature)
            .unwrap());
    }

    #[test]
    fn webhook_signature_round_trips() {
        let client = test_client();
        let body = br#"{"event":"payment.captured","payload":{}}"#;
        let signature = hmac_hex("test_webhook_secret", body).unwrap();

        assert!(client.verify_webhook_signature(body, &signature).unwrap());
        assert!(!client.verify_webhook_signature(body, "deadbeef").unwrap());
    }

    #[test]
    fn webhook_signature_requires_a_configured_secret() {
        let client = RazorpayClient::new(
            "http://localhost:1".to_string(),
            "rzp_test_key".to_string(),
            "test_key_secret".to_string(),
            None,
        );

        assert!(client.verify_webhook_signature(b"{}", "anything").is_err());
    }
}
