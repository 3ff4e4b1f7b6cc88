use chrono::NaiveDate;
use market_core::{AssetStore, SignalRow};
use std::collections::BTreeMap;

use crate::indicators::sma;
use crate::phase::PhaseMachine;

pub const DEFAULT_ANCHOR: &str = "QQQ";
pub const DEFAULT_SYMBOLS: &[&str] = &["QQQ", "TQQQ", "SPY", "DIA", "GLD", "TLT", "VXX"];
pub const DEFAULT_SHORT_PERIOD: usize = 100;
pub const DEFAULT_LONG_PERIOD: usize = 200;

/// The single rule set the engine evaluates
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    /// Instrument whose trading calendar defines the output rows
    pub anchor: String,
    /// Symbols whose closes are joined onto each row
    pub symbols: Vec<String>,
    pub short_period: usize,
    pub long_period: usize,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            anchor: DEFAULT_ANCHOR.to_string(),
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            short_period: DEFAULT_SHORT_PERIOD,
            long_period: DEFAULT_LONG_PERIOD,
        }
    }
}

/// Derive the full signal table from the store.
///
/// Pure and total: the phase machine is replayed from the first anchor row on
/// every call, and an anchor without data yields no rows.
pub fn compute_signals(store: &AssetStore, rules: &RuleSet) -> Vec<SignalRow> {
    let Some(anchor) = store.series(&rules.anchor).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    let closes = anchor.closes();
    let sma_short = sma(&closes, rules.short_period);
    let sma_long = sma(&closes, rules.long_period);

    let close_maps: Vec<(&String, BTreeMap<NaiveDate, f64>)> = rules
        .symbols
        .iter()
        .map(|s| (s, store.series(s).map(|series| series.close_map()).unwrap_or_default()))
        .collect();

    let mut machine = PhaseMachine::new();
    let mut rows: Vec<SignalRow> = Vec::with_capacity(closes.len());

    for (i, point) in anchor.points().iter().enumerate() {
        let flipped = machine.step(point.close, sma_short[i], sma_long[i]);

        // Prices gap-fill from the previous row; sentiment does not
        let closes_row: BTreeMap<String, Option<f64>> = close_maps
            .iter()
            .map(|(symbol, by_date)| {
                let value = by_date
                    .get(&point.date)
                    .copied()
                    .or_else(|| rows.last().and_then(|prev| prev.closes.get(*symbol).copied().flatten()));
                ((*symbol).clone(), value)
            })
            .collect();

        rows.push(SignalRow {
            date: point.date,
            phase: machine.phase(),
            signal: if i > 0 { flipped } else { None },
            sma_short: sma_short[i],
            sma_long: sma_long[i],
            sentiment: store.sentiment.get(&point.date),
            closes: closes_row,
        });
    }

    rows
}

/// Holds a rule set and derives rows from a store.
#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    rules: RuleSet,
}

impl SignalEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn compute(&self, store: &AssetStore) -> Vec<SignalRow> {
        let rows = compute_signals(store, &self.rules);
        if let Some(last) = rows.last() {
            tracing::debug!(
                "Computed {} signal rows, latest {} phase {}",
                rows.len(),
                last.date,
                last.phase
            );
        }
        rows
    }
}
