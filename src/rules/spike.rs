// src/rules/spike.rs
use crate::config::SpikeConfig;
use crate::types::ContractObservation;
use crate::utils::pricing;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpikeDecision {
    /// No baseline yet; the mid becomes the baseline.
    Baseline,
    /// Change below threshold (or a drop). Baseline still advances.
    Quiet,
    /// Qualifies as a spike, subject to cooldown.
    Spike { change_pct: Decimal },
}

/// Why an otherwise usable observation is ignored this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpikeFilter {
    BelowMinPremium,
    SpreadTooWide,
    LowVolume,
}

/// Liquidity filters applied before an observation may touch tracked state.
pub fn filter_observation(
    observation: &ContractObservation,
    mid: Decimal,
    config: &SpikeConfig,
) -> Option<SpikeFilter> {
    if mid < config.min_premium {
        return Some(SpikeFilter::BelowMinPremium);
    }
    if let Some(max_spread) = config.max_spread_pct {
        // one-sided quotes have no spread to judge
        if matches!(observation.spread_pct(), Some(spread) if spread > max_spread) {
            return Some(SpikeFilter::SpreadTooWide);
        }
    }
    if config.min_volume > 0 && observation.volume.unwrap_or(0) < config.min_volume {
        return Some(SpikeFilter::LowVolume);
    }
    None
}

/// Cycle-over-cycle comparison of a contract's mid against its last baseline.
pub fn evaluate_spike(
    last_known_mid: Option<Decimal>,
    new_mid: Decimal,
    config: &SpikeConfig,
) -> SpikeDecision {
    // 1. First sighting: nothing to compare against
    let Some(previous) = last_known_mid else {
        return SpikeDecision::Baseline;
    };

    // 2. Percent and absolute move must both clear their thresholds
    match pricing::pct_change(new_mid, previous) {
        Some(change_pct)
            if change_pct >= config.min_spike_pct
                && new_mid - previous >= config.min_abs_change =>
        {
            SpikeDecision::Spike { change_pct }
        }
        _ => SpikeDecision::Quiet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::fake::{key, obs};
    use crate::types::OptionType;
    use rust_decimal_macros::dec;

    #[test]
    fn first_observation_only_sets_baseline() {
        let config = SpikeConfig::default();
        assert_eq!(evaluate_spike(None, dec!(5), &config), SpikeDecision::Baseline);
    }

    #[test]
    fn threshold_is_inclusive() {
        let config = SpikeConfig::default();
        assert_eq!(
            evaluate_spike(Some(dec!(1.00)), dec!(1.20), &config),
            SpikeDecision::Spike { change_pct: dec!(20) }
        );
        assert_eq!(
            evaluate_spike(Some(dec!(1.00)), dec!(1.15), &config),
            SpikeDecision::Spike { change_pct: dec!(15) }
        );
        assert_eq!(
            evaluate_spike(Some(dec!(1.00)), dec!(1.10), &config),
            SpikeDecision::Quiet
        );
        assert_eq!(
            evaluate_spike(Some(dec!(1.00)), dec!(0.50), &config),
            SpikeDecision::Quiet
        );
    }

    #[test]
    fn absolute_floor_suppresses_penny_spikes() {
        let config = SpikeConfig {
            min_abs_change: dec!(0.10),
            ..SpikeConfig::default()
        };
        // +50% but only five cents
        assert_eq!(
            evaluate_spike(Some(dec!(0.10)), dec!(0.15), &config),
            SpikeDecision::Quiet
        );
        assert!(matches!(
            evaluate_spike(Some(dec!(1.00)), dec!(1.50), &config),
            SpikeDecision::Spike { .. }
        ));
    }

    #[test]
    fn filters_skip_cheap_and_wide_quotes() {
        let config = SpikeConfig {
            min_premium: dec!(0.25),
            max_spread_pct: Some(dec!(30)),
            ..SpikeConfig::default()
        };
        let k = key("AMD", OptionType::Call, dec!(150));

        let cheap = obs(&k, dec!(0.05), dec!(0.15), None);
        assert_eq!(
            filter_observation(&cheap, dec!(0.10), &config),
            Some(SpikeFilter::BelowMinPremium)
        );

        let wide = obs(&k, dec!(1.00), dec!(2.00), None);
        assert_eq!(
            filter_observation(&wide, dec!(1.50), &config),
            Some(SpikeFilter::SpreadTooWide)
        );

        let fine = obs(&k, dec!(1.00), dec!(1.10), None);
        assert_eq!(filter_observation(&fine, dec!(1.05), &config), None);

        let last_only = obs(&k, dec!(0), dec!(0), Some(dec!(1.00)));
        assert_eq!(filter_observation(&last_only, dec!(1.00), &config), None);
    }

    #[test]
    fn thin_volume_is_skipped_when_a_minimum_is_set() {
        let k = key("AMD", OptionType::Call, dec!(150));
        let mut traded = obs(&k, dec!(1.00), dec!(1.10), None);
        assert_eq!(filter_observation(&traded, dec!(1.05), &SpikeConfig::default()), None);

        let config = SpikeConfig {
            min_volume: 5,
            ..SpikeConfig::default()
        };
        assert_eq!(
            filter_observation(&traded, dec!(1.05), &config),
            Some(SpikeFilter::LowVolume)
        );
        traded.volume = Some(4);
        assert_eq!(
            filter_observation(&traded, dec!(1.05), &config),
            Some(SpikeFilter::LowVolume)
        );
        traded.volume = Some(5);
        assert_eq!(filter_observation(&traded, dec!(1.05), &config), None);
    }
}
