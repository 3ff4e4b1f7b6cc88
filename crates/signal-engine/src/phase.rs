use market_core::{Phase, TradeSignal};

/// Next phase for one bar.
///
/// HEDGE -> LONG needs the close above both averages; LONG -> HEDGE only
/// needs it below the long average. Dropping under the short average alone
/// keeps LONG. Missing averages hold the current phase.
pub fn next_phase(current: Phase, close: f64, sma_short: Option<f64>, sma_long: Option<f64>) -> Phase {
    let (Some(short), Some(long)) = (sma_short, sma_long) else {
        return current;
    };

    match current {
        Phase::Hedge if close > short && close > long => Phase::Long,
        Phase::Long if close < long => Phase::Hedge,
        other => other,
    }
}

/// Signal emitted when moving from `previous` to `current`.
pub fn transition_signal(previous: Phase, current: Phase) -> Option<TradeSignal> {
    match (previous, current) {
        (Phase::Hedge, Phase::Long) => Some(TradeSignal::Buy),
        (Phase::Long, Phase::Hedge) => Some(TradeSignal::Sell),
        _ => None,
    }
}

/// Two-state machine replayed from the start of history on every computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMachine {
    phase: Phase,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self { phase: Phase::Hedge }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Feed one bar; returns the signal if the phase flipped.
    pub fn step(&mut self, close: f64, sma_short: Option<f64>, sma_long: Option<f64>) -> Option<TradeSignal> {
        let previous = self.phase;
        self.phase = next_phase(previous, close, sma_short, sma_long);
        transition_signal(previous, self.phase)
    }
}
