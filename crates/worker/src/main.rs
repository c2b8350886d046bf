//! Pauta Background Worker
//!
//! Handles scheduled jobs:
//! - Charge creation for due subscriptions (daily at 10:00 UTC)
//! - Billing consistency sweep, including stuck charge_pending detection (hourly)
//! - Health check heartbeat (every 5 minutes)
//!
//! The charge job is the Billing Scheduler: each tick scans for active
//! subscriptions due within the look-ahead window and creates one gateway
//! charge per billing period. Retrying a failed charge is just the next
//! tick; the `charge_pending` claim on the record is what keeps re-runs
//! from double-charging.

use std::sync::Arc;
use std::time::Duration;

use pauta_billing::BillingService;
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Daily charge creation. Overridable for staging via `CHARGE_CRON`.
const DEFAULT_CHARGE_CRON: &str = "0 0 10 * * *";

/// Hourly consistency sweep. Overridable via `SWEEP_CRON`.
const DEFAULT_SWEEP_CRON: &str = "0 15 * * * *";

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Pauta Worker");

    let pool = create_db_pool().await?;
    let billing = Arc::new(BillingService::from_env(pool.clone()));

    let scheduler = JobScheduler::new().await?;
    let mut jobs = 0;

    // Job 1: Create charges for subscriptions due within the look-ahead window
    if let Some(charges) = billing.charges.clone() {
        let charge_cron =
            std::env::var("CHARGE_CRON").unwrap_or_else(|_| DEFAULT_CHARGE_CRON.to_string());
        scheduler
            .add(Job::new_async(charge_cron.as_str(), move |_uuid, _l| {
                let charges = charges.clone();
                Box::pin(async move {
                    info!("Running scheduled charge creation");
                    match charges.run_once().await {
                        Ok(summary) => info!(
                            due = summary.due,
                            created = summary.created,
                            skipped = summary.skipped,
                            failed = summary.failed,
                            "Charge run complete"
                        ),
                        Err(e) => error!(error = %e, "Charge run failed"),
                    }
                })
            })?)
            .await?;
        jobs += 1;
        info!(cron = %charge_cron, "Scheduled: charge creation");
    } else {
        warn!("Payment gateway not configured - charge creation job not scheduled");
    }

    // Job 2: Consistency sweep. Surfaces stuck charge_pending records and
    // other contradictions; detection only, the sweep never writes.
    let sweep_billing = billing.clone();
    let sweep_cron = std::env::var("SWEEP_CRON").unwrap_or_else(|_| DEFAULT_SWEEP_CRON.to_string());
    scheduler
        .add(Job::new_async(sweep_cron.as_str(), move |_uuid, _l| {
            let billing = sweep_billing.clone();
            Box::pin(async move {
                info!("Running billing consistency sweep");
                match billing.invariants.run_all_checks().await {
                    Ok(summary) if summary.healthy => {
                        info!(checks = summary.checks_run, "Consistency sweep clean")
                    }
                    Ok(summary) => {
                        for violation in &summary.violations {
                            warn!(
                                invariant = %violation.invariant,
                                severity = %violation.severity,
                                business_ids = ?violation.business_ids,
                                "{}",
                                violation.description
                            );
                        }
                        warn!(
                            violations = summary.violations.len(),
                            "Consistency sweep found violations"
                        );
                    }
                    Err(e) => error!(error = %e, "Consistency sweep failed"),
                }
            })
        })?)
        .await?;
    jobs += 1;
    info!(cron = %sweep_cron, "Scheduled: billing consistency sweep");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    jobs += 1;
    info!("Scheduled: health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Pauta Worker started successfully with {} scheduled jobs", jobs);

    // Keep the main task running; the scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
