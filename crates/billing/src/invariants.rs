//! Billing Invariants Module
//!
//! Provides runnable consistency checks over the subscription records.
//! These invariants can be run after any mutation or webhook burst to ensure
//! the system is in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write
//! 4. **Complete**: Covers all critical billing consistency requirements

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Business record(s) affected
    pub business_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - charges may be stalled or duplicated
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

/// Row type for stuck charge violation
#[derive(Debug, sqlx::FromRow)]
struct StuckChargeRow {
    business_id: Uuid,
    name: String,
    charge_requested_at: Option<OffsetDateTime>,
}

/// Row type for charge pending on a non-active record
#[derive(Debug, sqlx::FromRow)]
struct PendingNotActiveRow {
    business_id: Uuid,
    name: String,
    invite_status: String,
}

/// Row type for settled record without authorization
#[derive(Debug, sqlx::FromRow)]
struct MissingAuthorizationRow {
    business_id: Uuid,
    name: String,
    invite_status: String,
}

/// Row type for unknown plan selection
#[derive(Debug, sqlx::FromRow)]
struct InvalidPlanRow {
    business_id: Uuid,
    name: String,
    tier: String,
    commitment: String,
}

/// Row type for active record with no upcoming charge
#[derive(Debug, sqlx::FromRow)]
struct MissingNextChargeRow {
    business_id: Uuid,
    name: String,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        // Run all checks
        violations.extend(self.check_pending_charges_settle().await?);
        violations.extend(self.check_pending_requires_active().await?);
        violations.extend(self.check_settled_have_authorization().await?);
        violations.extend(self.check_plans_are_known().await?);
        violations.extend(self.check_active_have_next_charge().await?);

        let checks_run = 5;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: Pending charges settle promptly
    ///
    /// `charge_pending` is set right before the gateway call and cleared by a
    /// payment webhook or a rollback. A flag older than 30 minutes means the
    /// record is wedged and the scheduler will never charge it again.
    async fn check_pending_charges_settle(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<StuckChargeRow> = sqlx::query_as(
            r#"
            SELECT id as business_id, name, charge_requested_at
            FROM businesses
            WHERE charge_pending = TRUE
              AND (charge_requested_at IS NULL
                   OR charge_requested_at < NOW() - INTERVAL '30 minutes')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "pending_charges_settle".to_string(),
                business_ids: vec![row.business_id],
                description: format!(
                    "Business '{}' has had a charge pending since {}",
                    row.name,
                    row.charge_requested_at
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "(unknown)".to_string())
                ),
                context: serde_json::json!({
                    "name": row.name,
                    "charge_requested_at": row.charge_requested_at,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Only active records carry a pending charge
    ///
    /// The charge claim requires `active`, and payment settlement clears the
    /// flag. Authorization-level transitions (cancelled, expired) move the
    /// record off `active` without touching the flag, so a pending charge on
    /// any other status marks a record whose in-flight charge was never
    /// settled and needs manual reconciliation.
    async fn check_pending_requires_active(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PendingNotActiveRow> = sqlx::query_as(
            r#"
            SELECT id as business_id, name, invite_status
            FROM businesses
            WHERE charge_pending = TRUE
              AND invite_status <> 'active'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "pending_requires_active".to_string(),
                business_ids: vec![row.business_id],
                description: format!(
                    "Business '{}' has a pending charge while status is '{}'",
                    row.name, row.invite_status
                ),
                context: serde_json::json!({
                    "name": row.name,
                    "invite_status": row.invite_status,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: Settled records carry a gateway authorization
    ///
    /// Once an acceptance completes, the record holds the authorization id
    /// the webhooks key on. Records are given a 5 minute grace period so an
    /// acceptance still talking to the gateway is not flagged.
    async fn check_settled_have_authorization(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MissingAuthorizationRow> = sqlx::query_as(
            r#"
            SELECT id as business_id, name, invite_status
            FROM businesses
            WHERE invite_status IN ('accepted', 'active')
              AND authorization_id = ''
              AND updated_at < NOW() - INTERVAL '5 minutes'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "settled_have_authorization".to_string(),
                business_ids: vec![row.business_id],
                description: format!(
                    "Business '{}' is '{}' but has no gateway authorization",
                    row.name, row.invite_status
                ),
                context: serde_json::json!({
                    "name": row.name,
                    "invite_status": row.invite_status,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: Invited and settled records have a known plan
    ///
    /// Acceptance and charging both resolve the stored tier and commitment
    /// against the pricing table; text the table does not know leaves the
    /// record unchargeable.
    async fn check_plans_are_known(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<InvalidPlanRow> = sqlx::query_as(
            r#"
            SELECT id as business_id, name, tier, commitment
            FROM businesses
            WHERE invite_status IN ('invited', 'accepted', 'active')
              AND (tier NOT IN ('basico', 'parceiro', 'profissional')
                   OR commitment NOT IN ('mensal', 'trimestral'))
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "plans_are_known".to_string(),
                business_ids: vec![row.business_id],
                description: format!(
                    "Business '{}' has unknown plan '{}'/'{}'",
                    row.name, row.tier, row.commitment
                ),
                context: serde_json::json!({
                    "name": row.name,
                    "tier": row.tier,
                    "commitment": row.commitment,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 5: Active records have an upcoming charge date
    ///
    /// The scheduler only looks at `next_charge_date`; an active record
    /// without one is never billed again.
    async fn check_active_have_next_charge(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MissingNextChargeRow> = sqlx::query_as(
            r#"
            SELECT id as business_id, name
            FROM businesses
            WHERE invite_status = 'active'
              AND next_charge_date IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "active_have_next_charge".to_string(),
                business_ids: vec![row.business_id],
                description: format!(
                    "Business '{}' is active with no next charge date",
                    row.name
                ),
                context: serde_json::json!({
                    "name": row.name,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "pending_charges_settle" => self.check_pending_charges_settle().await,
            "pending_requires_active" => self.check_pending_requires_active().await,
            "settled_have_authorization" => self.check_settled_have_authorization().await,
            "plans_are_known" => self.check_plans_are_known().await,
            "active_have_next_charge" => self.check_active_have_next_charge().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "pending_charges_settle",
            "pending_requires_active",
            "settled_have_authorization",
            "plans_are_known",
            "active_have_next_charge",
        ]
    }
}
