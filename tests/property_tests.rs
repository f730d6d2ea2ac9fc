/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use proptest::prelude::*;
use rust_finrisk_api::core::investment::{decide, growth_rate, PricePoint, StockSeries, Verdict};
use rust_finrisk_api::core::ratios::{liquidity, BalanceSheet};
use rust_finrisk_api::core::scoring::{
    Agency, CreditProfile, EnsemblePrediction, ModelSlot, RiskCategory,
};
use rust_finrisk_api::orchestrator::is_symbol;
use chrono::{Duration, NaiveDate};
use serde_json::json;
use std::collections::HashMap;

fn agency() -> impl Strategy<Value = Agency> {
    prop_oneof![
        Just(Agency::Experian),
        Just(Agency::Equifax),
        Just(Agency::TransUnion)
    ]
}

// Property: standardized score stays in [0, 1] and hits both ends
proptest! {
    #[test]
    fn standardized_score_in_unit_interval(agency in agency(), fraction in 0.0f64..=1.0) {
        let (lo, hi) = agency.range();
        let score = lo + ((hi - lo) as f64 * fraction).round() as i64;
        let profile = CreditProfile::new(agency, score, HashMap::new()).unwrap();
        prop_assert!((0.0..=1.0).contains(&profile.standardized_score));
        prop_assert_eq!(profile.standardized_score, (score - lo) as f64 / (hi - lo) as f64);
    }

    #[test]
    fn range_endpoints_map_to_zero_and_one(agency in agency()) {
        let (lo, hi) = agency.range();
        prop_assert_eq!(agency.standardize(lo), 0.0);
        prop_assert_eq!(agency.standardize(hi), 1.0);
    }

    #[test]
    fn out_of_range_scores_rejected(agency in agency(), offset in 1i64..10_000, below in any::<bool>()) {
        let (lo, hi) = agency.range();
        let score = if below { lo - offset } else { hi + offset };
        let payload = json!({ "agency": agency.name(), "credit_score": score });
        let err = CreditProfile::from_payload(&payload).unwrap_err();
        let expected = format!("Must be between {} and {}.", lo, hi);
        prop_assert!(err.to_string().contains(&expected));
    }
}

// Property: ensemble average is k/6 and the category is monotonic in it
proptest! {
    #[test]
    fn average_is_multiple_of_one_sixth(labels in prop::collection::vec(0u8..=1, 6)) {
        let prediction = EnsemblePrediction::from_labels(
            ModelSlot::ALL.iter().copied().zip(labels.iter().copied()).collect(),
        );
        let positives = labels.iter().filter(|l| **l == 1).count();
        prop_assert_eq!(prediction.average_score, positives as f64 / 6.0);
        prop_assert!((0.0..=1.0).contains(&prediction.average_score));
    }

    #[test]
    fn risk_category_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let rank = |c: RiskCategory| match c {
            RiskCategory::Low => 0,
            RiskCategory::Medium => 1,
            RiskCategory::High => 2,
        };
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(rank(RiskCategory::from_average(low)) <= rank(RiskCategory::from_average(high)));
    }
}

// Property: liquidity ratios never fail on non-positive denominators
proptest! {
    #[test]
    fn ratios_infinite_on_non_positive_denominators(
        current_assets in -1e9f64..1e9,
        current_liabilities in -1e9f64..=0.0,
        total_liabilities in -1e9f64..=0.0,
    ) {
        let report = liquidity(&BalanceSheet {
            total_assets: 0.0,
            total_liabilities,
            current_assets,
            current_liabilities,
        });
        prop_assert_eq!(report.quick_ratio, f64::INFINITY);
        prop_assert_eq!(report.cash_ratio, f64::INFINITY);
    }
}

// Property: growth rate does not depend on the order prices arrive in
proptest! {
    #[test]
    fn growth_rate_independent_of_input_order(prices in prop::collection::vec(1.0f64..1000.0, 2..60)) {
        let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        let points: Vec<PricePoint> = prices
            .iter()
            .enumerate()
            .map(|(i, price)| PricePoint { date: start + Duration::days(30 * i as i64), price: *price })
            .collect();
        let mut reversed = points.clone();
        reversed.reverse();

        let forward = growth_rate(&StockSeries::new(0.0, points)).unwrap();
        let backward = growth_rate(&StockSeries::new(0.0, reversed)).unwrap();
        prop_assert_eq!(forward, backward);

        let expected = (prices[prices.len() - 1] - prices[0]) / prices[0] * 100.0;
        prop_assert!((forward - expected).abs() < 1e-9);
    }

    #[test]
    fn invest_requires_news_and_growth(growth in -100.0f64..500.0, news in 0usize..10) {
        let verdict = decide(growth, news);
        prop_assert_eq!(verdict == Verdict::Invest, growth > 20.0 && news >= 3);
        prop_assert_eq!(verdict == Verdict::Avoid, growth <= 0.0);
    }

    #[test]
    fn symbol_check_never_panics(input in "\\PC*") {
        let _ = is_symbol(&input);
    }
}
