//! Pricing table for the subscription plans.
//!
//! Six combinations of tier and commitment, each with a fixed price per
//! billing period. Prices are what the gateway charges, in BRL; the
//! quarterly price is the total for three months, not a monthly rate.

use time::{Date, Month};

use pauta_shared::{Commitment, Tier};

/// Price charged per billing period, in BRL.
pub fn price_for(tier: Tier, commitment: Commitment) -> f64 {
    match (tier, commitment) {
        (Tier::Basico, Commitment::Mensal) => 69.90,
        (Tier::Basico, Commitment::Trimestral) => 179.70,
        (Tier::Parceiro, Commitment::Mensal) => 108.90,
        (Tier::Parceiro, Commitment::Trimestral) => 299.70,
        (Tier::Profissional, Commitment::Mensal) => 249.90,
        (Tier::Profissional, Commitment::Trimestral) => 599.70,
    }
}

/// Billing cycle length in months.
pub fn cycle_months(commitment: Commitment) -> i32 {
    match commitment {
        Commitment::Mensal => 1,
        Commitment::Trimestral => 3,
    }
}

/// Recurrence value the gateway expects for this commitment.
pub fn frequency(commitment: Commitment) -> &'static str {
    match commitment {
        Commitment::Mensal => "MONTHLY",
        Commitment::Trimestral => "QUARTERLY",
    }
}

/// One billing cycle after `from`, clamping to the last day of shorter months.
pub fn next_cycle_date(from: Date, commitment: Commitment) -> Date {
    add_months(from, cycle_months(commitment))
}

/// Human-readable plan description, recorded verbatim on the business record
/// when the client accepts the terms.
pub fn plan_summary(tier: Tier, commitment: Commitment) -> String {
    let price = price_for(tier, commitment);
    format!(
        "Plano {}: cobrança {} de {} via Pix Automático.",
        tier.display_name(),
        commitment.as_str(),
        format_brl(price),
    )
}

fn format_brl(value: f64) -> String {
    format!("R$ {value:.2}").replace('.', ",")
}

fn add_months(date: Date, months: i32) -> Date {
    let zero_based = date.month() as i32 - 1 + months;
    let year = date.year() + zero_based.div_euclid(12);
    let month = match Month::try_from((zero_based.rem_euclid(12) + 1) as u8) {
        Ok(month) => month,
        Err(_) => date.month(),
    };
    let day = date.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).unwrap_or(date)
}
