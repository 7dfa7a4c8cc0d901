// src/rules/wheel.rs
use anyhow::{ensure, Result};
use rust_decimal::Decimal;
use serde::Serialize;

const CONTRACT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;
const DAYS_PER_YEAR: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WheelLeg {
    CashSecuredPut,
    CoveredCall,
}

/// Per-contract figures for selling one wheel leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WheelSummary {
    pub leg: WheelLeg,
    pub collateral: Decimal,
    pub max_profit: Decimal,
    pub breakeven: Decimal,
    pub roc_pct: Decimal,
    /// `None` when there are no days left to annualize over.
    pub annualized_roc_pct: Option<Decimal>,
}

fn annualize(roc_pct: Decimal, dte: i64) -> Option<Decimal> {
    (dte > 0).then(|| roc_pct * Decimal::from(DAYS_PER_YEAR) / Decimal::from(dte))
}

pub fn cash_secured_put(strike: Decimal, premium: Decimal, dte: i64) -> Result<WheelSummary> {
    ensure!(strike > Decimal::ZERO, "strike must be positive");
    ensure!(premium >= Decimal::ZERO, "premium cannot be negative");

    let roc_pct = premium / strike * Decimal::ONE_HUNDRED;
    Ok(WheelSummary {
        leg: WheelLeg::CashSecuredPut,
        collateral: strike * CONTRACT_MULTIPLIER,
        max_profit: premium * CONTRACT_MULTIPLIER,
        breakeven: strike - premium,
        roc_pct,
        annualized_roc_pct: annualize(roc_pct, dte),
    })
}

/// Covered call against shares bought at `spot`. Upside is capped at the strike.
pub fn covered_call(
    strike: Decimal,
    premium: Decimal,
    spot: Decimal,
    dte: i64,
) -> Result<WheelSummary> {
    ensure!(strike > Decimal::ZERO, "strike must be positive");
    ensure!(spot > Decimal::ZERO, "spot must be positive");
    ensure!(premium >= Decimal::ZERO, "premium cannot be negative");

    let upside = (strike - spot).max(Decimal::ZERO);
    let max_profit = upside + premium;
    let roc_pct = max_profit / spot * Decimal::ONE_HUNDRED;
    Ok(WheelSummary {
        leg: WheelLeg::CoveredCall,
        collateral: strike * CONTRACT_MULTIPLIER,
        max_profit: max_profit * CONTRACT_MULTIPLIER,
        breakeven: spot - premium,
        roc_pct,
        annualized_roc_pct: annualize(roc_pct, dte),
    })
}
