// src/rules/buyback.rs
//! Buyback rules for one short position and one fresh mid. FLOOR, CAPTURE and
//! FAST_DROP are mutually exclusive, checked in that order; SPREAD stands apart.

use crate::types::{AlertKind, ContractObservation, ShortPosition};
use crate::utils::pricing;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct BuybackSignal {
    pub kind: AlertKind,
    pub old_value: Decimal,
    pub new_value: Decimal,
    pub change_pct: Option<Decimal>,
}

/// First matching rule out of FLOOR > CAPTURE > FAST_DROP.
pub fn primary_signal(
    position: &ShortPosition,
    new_mid: Decimal,
    fast_drop_pct: Decimal,
) -> Option<BuybackSignal> {
    if let Some(floor) = position.floor_price {
        if new_mid <= floor {
            return Some(BuybackSignal {
                kind: AlertKind::Floor,
                old_value: floor,
                new_value: new_mid,
                change_pct: None,
            });
        }
    }

    let captured = position.captured_pct(new_mid);
    if captured >= position.target_capture_pct {
        return Some(BuybackSignal {
            kind: AlertKind::Capture,
            old_value: position.credit_received,
            new_value: new_mid,
            change_pct: Some(captured),
        });
    }

    let previous = position.last_known_mid?;
    let drop_pct = -pricing::pct_change(new_mid, previous)?;
    if drop_pct >= fast_drop_pct {
        return Some(BuybackSignal {
            kind: AlertKind::FastDrop,
            old_value: previous,
            new_value: new_mid,
            change_pct: Some(drop_pct),
        });
    }

    None
}

/// Informational illiquidity flag. Needs a two-sided quote.
pub fn spread_signal(
    observation: &ContractObservation,
    threshold: Option<Decimal>,
) -> Option<BuybackSignal> {
    let threshold = threshold?;
    let spread = observation.spread_pct()?;
    (spread >= threshold).then(|| BuybackSignal {
        kind: AlertKind::Spread,
        old_value: observation.bid,
        new_value: observation.ask,
        change_pct: Some(spread),
    })
}
