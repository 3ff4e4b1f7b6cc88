use std::time::Duration;

const SECONDS_PER_DAY: u64 = 86_400;

/// Seconds between live updates so that one quote request per symbol per
/// cycle stays inside the daily request budget.
///
/// A zero budget is treated as a budget of one.
pub fn smart_interval_secs(symbol_count: usize, daily_budget: u32) -> u64 {
    let budget = u64::from(daily_budget.max(1));
    (SECONDS_PER_DAY * symbol_count as u64).div_ceil(budget)
}

pub fn smart_interval(symbol_count: usize, daily_budget: u32) -> Duration {
    Duration::from_secs(smart_interval_secs(symbol_count, daily_budget))
}
