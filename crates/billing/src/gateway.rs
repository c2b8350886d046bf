//! Asaas Pix Automático gateway client
//!
//! Thin HTTP client over the four gateway calls the billing flows need,
//! behind the [`PaymentGateway`] trait so services can run against a mock.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::Date;

const PROD_BASE_URL: &str = "https://api.asaas.com/v3";
const SANDBOX_BASE_URL: &str = "https://sandbox.asaas.com/api/v3";

/// Billing type sent on every charge; the product only collects via Pix.
pub const BILLING_TYPE_PIX: &str = "PIX";

/// Date format the gateway expects (YYYY-MM-DD).
pub(crate) fn iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Errors from gateway calls.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transport-level failure: connect, timeout, or undecodable body.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with an error status.
    #[error("asaas {status}: {message}")]
    Api { status: u16, message: String },
}

/// Gateway connection settings.
#[derive(Debug, Clone)]
pub struct AsaasConfig {
    pub api_key: String,
    pub sandbox: bool,
}

impl AsaasConfig {
    /// Read `ASAAS_API_KEY` and `ASAAS_SANDBOX`; `None` when no key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ASAAS_API_KEY").ok().filter(|k| !k.is_empty())?;
        let sandbox = std::env::var("ASAAS_SANDBOX")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        Some(Self { api_key, sandbox })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Authorization {
    pub id: String,
    #[serde(default)]
    pub status: String,
    /// Pix copia-e-cola for the combined QR code.
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeRequest {
    pub value: f64,
    pub original_value: f64,
    pub due_date: String,
    pub expiration_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub customer_id: String,
    pub description: String,
    /// MONTHLY, QUARTERLY, etc.
    pub frequency: String,
    pub contract_id: String,
    pub start_date: String,
    pub immediate_qr_code: QrCodeRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub customer: String,
    pub billing_type: String,
    pub value: f64,
    pub due_date: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub external_reference: String,
    pub pix_automatic_authorization_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerBody<'a> {
    name: &'a str,
    email: &'a str,
    cpf_cnpj: &'a str,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    description: String,
}

/// Port over the payment gateway calls the billing flows make.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(
        &self,
        name: &str,
        email: &str,
        tax_id: &str,
    ) -> Result<Customer, GatewayError>;

    async fn create_authorization(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Authorization, GatewayError>;

    async fn cancel_authorization(&self, authorization_id: &str) -> Result<(), GatewayError>;

    async fn create_charge(&self, request: ChargeRequest) -> Result<Payment, GatewayError>;
}

/// HTTP client for the Asaas API.
pub struct AsaasGateway {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl AsaasGateway {
    pub fn new(config: AsaasConfig) -> Self {
        let base = if config.sandbox {
            SANDBOX_BASE_URL
        } else {
            PROD_BASE_URL
        };
        Self {
            base_url: base.to_string(),
            api_key: config.api_key,
            http: reqwest::Client::new(),
        }
    }

    /// Client pointing at a custom base URL, for tests against a local server.
    pub fn with_base_url(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("access_token", &self.api_key)
            .json(body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        let response = self
            .http
            .delete(format!("{}{}", self.base_url, path))
            .header("access_token", &self.api_key)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope
                .errors
                .into_iter()
                .map(|detail| detail.description)
                .find(|description| !description.is_empty())
                .unwrap_or_else(|| "unexpected gateway response".to_string()),
            Err(_) => "unexpected gateway response".to_string(),
        };
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for AsaasGateway {
    async fn create_customer(
        &self,
        name: &str,
        email: &str,
        tax_id: &str,
    ) -> Result<Customer, GatewayError> {
        let body = CreateCustomerBody {
            name,
            email,
            cpf_cnpj: tax_id,
        };
        self.post("/customers", &body).await
    }

    async fn create_authorization(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Authorization, GatewayError> {
        self.post("/pix/automatic/authorizations", &request).await
    }

    async fn cancel_authorization(&self, authorization_id: &str) -> Result<(), GatewayError> {
        self.delete(&format!("/pix/automatic/authorizations/{authorization_id}"))
            .await
    }

    async fn create_charge(&self, request: ChargeRequest) -> Result<Payment, GatewayError> {
        self.post("/payments", &request).await
    }
}
