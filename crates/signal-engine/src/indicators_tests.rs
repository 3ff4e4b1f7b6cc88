#[cfg(test)]
mod tests {
    use super::super::engine::*;
    use super::super::indicators::*;
    use super::super::phase::*;
    use chrono::{Duration, NaiveDate};
    use market_core::{AssetStore, Phase, PricePoint, SymbolSeries, TradeSignal};

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
    }

    fn series(closes: &[f64]) -> SymbolSeries {
        SymbolSeries::from_points(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| PricePoint::new(day(i as i64), c))
                .collect(),
        )
    }

    fn rules() -> RuleSet {
        RuleSet {
            anchor: "QQQ".to_string(),
            symbols: vec!["QQQ".to_string(), "TQQQ".to_string(), "SPY".to_string()],
            short_period: 2,
            long_period: 3,
        }
    }

    // Walks HEDGE -> LONG at index 3, holds LONG through a dip under the short
    // average at index 6, then SELLs at index 7
    fn crossover_closes() -> Vec<f64> {
        vec![10.0, 9.0, 8.0, 9.0, 12.0, 13.0, 12.8, 9.0, 8.0]
    }

    fn crossover_store() -> AssetStore {
        let mut store = AssetStore::new();
        store.insert_series("QQQ", series(&crossover_closes()));
        store
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 5);
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!((result[2].unwrap() - 2.0).abs() < 0.001); // (1+2+3)/3 = 2
        assert!((result[3].unwrap() - 3.0).abs() < 0.001); // (2+3+4)/3 = 3
        assert!((result[4].unwrap() - 4.0).abs() < 0.001); // (3+4+5)/3 = 4
    }

    #[test]
    fn test_sma_insufficient_data() {
        let data = vec![1.0, 2.0];
        let result = sma(&data, 5);

        assert_eq!(result, vec![None, None]);
        assert!(sma(&[], 5).is_empty());
        assert_eq!(sma(&data, 0), vec![None, None]);
    }

    #[test]
    fn test_sma_matches_trailing_mean() {
        let data: Vec<f64> = (0..250).map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0).collect();
        let result = sma(&data, 200);

        assert!(result[198].is_none());
        for i in 199..data.len() {
            let expected = data[i + 1 - 200..=i].iter().sum::<f64>() / 200.0;
            assert_eq!(result[i], Some(expected));
        }
    }

    #[test]
    fn test_phase_enters_long_above_both_averages() {
        assert_eq!(next_phase(Phase::Hedge, 92.0, Some(91.0), Some(85.0)), Phase::Long);
        assert_eq!(next_phase(Phase::Hedge, 90.0, Some(91.0), Some(85.0)), Phase::Hedge);
        assert_eq!(next_phase(Phase::Hedge, 91.0, Some(91.0), Some(85.0)), Phase::Hedge);
    }

    #[test]
    fn test_phase_exits_only_below_long_average() {
        // Below SMA100 but above SMA200 keeps LONG
        assert_eq!(next_phase(Phase::Long, 88.0, Some(91.0), Some(85.0)), Phase::Long);
        assert_eq!(next_phase(Phase::Long, 84.0, Some(91.0), Some(85.0)), Phase::Hedge);
        // Above both never re-enters HEDGE
        assert_eq!(next_phase(Phase::Long, 120.0, Some(91.0), Some(85.0)), Phase::Long);
    }

    #[test]
    fn test_phase_holds_without_averages() {
        assert_eq!(next_phase(Phase::Hedge, 500.0, Some(1.0), None), Phase::Hedge);
        assert_eq!(next_phase(Phase::Long, 0.5, None, Some(1.0)), Phase::Long);
    }

    #[test]
    fn test_machine_reports_flips() {
        let mut machine = PhaseMachine::new();
        assert_eq!(machine.phase(), Phase::Hedge);
        assert_eq!(machine.step(92.0, Some(91.0), Some(85.0)), Some(TradeSignal::Buy));
        assert_eq!(machine.step(93.0, Some(91.0), Some(85.0)), None);
        assert_eq!(machine.step(80.0, Some(91.0), Some(85.0)), Some(TradeSignal::Sell));
        assert_eq!(machine.phase(), Phase::Hedge);
    }

    #[test]
    fn test_signal_rows_follow_crossovers() {
        let rows = compute_signals(&crossover_store(), &rules());

        let phases: Vec<Phase> = rows.iter().map(|r| r.phase).collect();
        let signals: Vec<Option<TradeSignal>> = rows.iter().map(|r| r.signal).collect();

        use Phase::{Hedge as H, Long as L};
        assert_eq!(phases, vec![H, H, H, L, L, L, L, H, H]);
        assert_eq!(
            signals,
            vec![None, None, None, Some(TradeSignal::Buy), None, None, None, Some(TradeSignal::Sell), None]
        );
    }

    #[test]
    fn test_signal_iff_phase_changes() {
        let rows = compute_signals(&crossover_store(), &rules());

        assert_eq!(rows[0].signal, None);
        for i in 1..rows.len() {
            let changed = rows[i].phase != rows[i - 1].phase;
            match rows[i].signal {
                Some(TradeSignal::Buy) => assert!(changed && rows[i].phase == Phase::Long),
                Some(TradeSignal::Sell) => assert!(changed && rows[i].phase == Phase::Hedge),
                None => assert!(!changed),
            }
        }
    }

    #[test]
    fn test_rows_carry_averages() {
        let rows = compute_signals(&crossover_store(), &rules());

        assert_eq!(rows[0].sma_short, None);
        assert_eq!(rows[1].sma_short, Some(9.5));
        assert_eq!(rows[1].sma_long, None);
        assert_eq!(rows[2].sma_long, Some(9.0));
    }

    #[test]
    fn test_price_gap_fill_and_sentiment_no_fill() {
        let mut store = crossover_store();
        // TQQQ skips day 2, SPY starts on day 1
        store.insert_series(
            "TQQQ",
            SymbolSeries::from_points(vec![
                PricePoint::new(day(0), 50.0),
                PricePoint::new(day(1), 51.0),
                PricePoint::new(day(3), 53.0),
            ]),
        );
        store.insert_series("SPY", SymbolSeries::from_points(vec![PricePoint::new(day(1), 470.0)]));
        store.sentiment.insert(day(0), 40);
        store.sentiment.insert(day(2), 44);

        let rows = compute_signals(&store, &rules());

        assert_eq!(rows[2].closes["TQQQ"], Some(51.0));
        assert_eq!(rows[3].closes["TQQQ"], Some(53.0));
        assert_eq!(rows[0].closes["SPY"], None);
        assert_eq!(rows[5].closes["SPY"], Some(470.0));
        assert_eq!(rows[4].closes["QQQ"], Some(12.0));

        assert_eq!(rows[0].sentiment, Some(40));
        assert_eq!(rows[1].sentiment, None);
        assert_eq!(rows[2].sentiment, Some(44));
        assert_eq!(rows[3].sentiment, None);
    }

    #[test]
    fn test_empty_anchor_yields_no_rows() {
        let mut store = AssetStore::new();
        assert!(compute_signals(&store, &rules()).is_empty());

        store.insert_series("TQQQ", series(&[1.0, 2.0]));
        store.insert_series("QQQ", SymbolSeries::default());
        assert!(compute_signals(&store, &rules()).is_empty());
    }

    #[test]
    fn test_compute_is_idempotent() {
        let mut store = crossover_store();
        store.insert_series("SPY", series(&[1.5, 2.5, 3.5]));
        let engine = SignalEngine::new(rules());

        let first = engine.compute(&store);
        let second = engine.compute(&store);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_default_rules() {
        let rules = RuleSet::default();
        assert_eq!(rules.anchor, "QQQ");
        assert_eq!(rules.symbols.len(), 7);
        assert_eq!((rules.short_period, rules.long_period), (100, 200));
    }
}
