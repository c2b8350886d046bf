//! API error types and HTTP mapping
//!
//! Client-facing responses carry a small fixed set of Portuguese messages;
//! gateway and database detail stays in the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use pauta_billing::{BillingError, GatewayOp};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Gone(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    /// Internal failure; the source is logged, the client sees a fixed
    /// message.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Answer for payment routes when no gateway is configured.
    pub fn payments_not_configured() -> Self {
        ApiError::ServiceUnavailable("pagamentos não configurados".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized => "unauthorized".to_string(),
            ApiError::Internal(_) => "erro interno".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            tracing::error!(error = ?e, "internal error");
        }
        let status = self.status_code();
        (status, Json(json!({ "message": self.message() }))).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::NotFound => ApiError::NotFound("não encontrado".to_string()),
            BillingError::InviteExpired => ApiError::Gone(
                "convite expirado. Peça um novo ao seu gestor de conteúdo.".to_string(),
            ),
            BillingError::AlreadyActive => {
                ApiError::Conflict("assinatura já está ativa".to_string())
            }
            BillingError::AlreadyAccepted => {
                ApiError::Conflict("convite já aceito ou assinatura ativa".to_string())
            }
            BillingError::ClaimConflict => {
                ApiError::Conflict("convite está sendo processado".to_string())
            }
            BillingError::InvalidState(_) => {
                ApiError::BadRequest("convite não pode ser aceito neste estado".to_string())
            }
            BillingError::NoActiveSubscription => {
                ApiError::BadRequest("nenhuma assinatura ativa".to_string())
            }
            BillingError::InvalidPlan => {
                ApiError::BadRequest("plano ou compromisso inválido".to_string())
            }
            BillingError::Validation(message) => ApiError::BadRequest(message),
            BillingError::Gateway { op, .. } => ApiError::BadGateway(
                match op {
                    GatewayOp::CreateCustomer => "erro ao criar conta de pagamento",
                    GatewayOp::CreateAuthorization => "erro ao criar autorização de pagamento",
                    GatewayOp::CancelAuthorization => "erro ao cancelar assinatura",
                    GatewayOp::CreateCharge => "erro ao criar cobrança",
                }
                .to_string(),
            ),
            BillingError::Delivery(_) => {
                ApiError::BadGateway("erro ao enviar mensagem".to_string())
            }
            BillingError::Database(e) => ApiError::Internal(e.into()),
        }
    }
}
