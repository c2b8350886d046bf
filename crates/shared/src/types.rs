//! Domain enums shared by the api, billing, and worker crates.
//!
//! All three persist as lowercase text in Postgres; `parse` is the single
//! place raw column values become typed.

use serde::{Deserialize, Serialize};

/// Product tier selecting the monthly content volume for a business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basico,
    Parceiro,
    Profissional,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Basico => "basico",
            Tier::Parceiro => "parceiro",
            Tier::Profissional => "profissional",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basico" => Some(Tier::Basico),
            "parceiro" => Some(Tier::Parceiro),
            "profissional" => Some(Tier::Profissional),
            _ => None,
        }
    }

    /// Accented name used in client-facing text.
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Basico => "Básico",
            Tier::Parceiro => "Parceiro",
            Tier::Profissional => "Profissional",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing-cycle length the client committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Mensal,
    Trimestral,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Mensal => "mensal",
            Commitment::Trimestral => "trimestral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mensal" => Some(Commitment::Mensal),
            "trimestral" => Some(Commitment::Trimestral),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Commitment::Mensal => "Mensal",
            Commitment::Trimestral => "Trimestral",
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a business subscription.
///
/// Transitions: draft -> invited -> accepted -> active -> {cancelled,
/// payment_failed}. The only backward edge is accepted -> invited, taken when
/// a gateway call fails mid-acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Draft,
    Invited,
    Accepted,
    Active,
    Cancelled,
    PaymentFailed,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Draft => "draft",
            InviteStatus::Invited => "invited",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Active => "active",
            InviteStatus::Cancelled => "cancelled",
            InviteStatus::PaymentFailed => "payment_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InviteStatus::Draft),
            "invited" => Some(InviteStatus::Invited),
            "accepted" => Some(InviteStatus::Accepted),
            "active" => Some(InviteStatus::Active),
            "cancelled" => Some(InviteStatus::Cancelled),
            "payment_failed" => Some(InviteStatus::PaymentFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
