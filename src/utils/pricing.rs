// src/utils/pricing.rs
use rust_decimal::Decimal;
use serde::Deserialize;

/// Which price wins when both a two-sided quote and a last trade exist.
/// Zero and missing values are both treated as "not available".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotePolicy {
    #[default]
    PreferMid,
    PreferLast,
}

/// Midpoint of a two-sided quote, `None` unless both sides are positive.
pub fn two_sided_mid(bid: Decimal, ask: Decimal) -> Option<Decimal> {
    if bid > Decimal::ZERO && ask > Decimal::ZERO {
        Some((bid + ask) / Decimal::TWO)
    } else {
        None
    }
}

/// Premium used for comparisons. `None` means the quote is unusable this cycle.
pub fn mid_price(
    bid: Decimal,
    ask: Decimal,
    last: Option<Decimal>,
    policy: QuotePolicy,
) -> Option<Decimal> {
    let last = last.filter(|l| *l > Decimal::ZERO);
    match policy {
        QuotePolicy::PreferMid => two_sided_mid(bid, ask).or(last),
        QuotePolicy::PreferLast => last.or_else(|| two_sided_mid(bid, ask)),
    }
}

/// (ask - bid) / mid * 100. `None` for one-sided or crossed quotes.
pub fn spread_pct(bid: Decimal, ask: Decimal) -> Option<Decimal> {
    if ask < bid {
        return None;
    }
    let mid = two_sided_mid(bid, ask)?;
    Some((ask - bid) / mid * Decimal::ONE_HUNDRED)
}

/// Percent change from `base` to `value`. `None` when `base` is not positive.
pub fn pct_change(value: Decimal, base: Decimal) -> Option<Decimal> {
    if base <= Decimal::ZERO {
        return None;
    }
    Some((value - base) / base * Decimal::ONE_HUNDRED)
}
