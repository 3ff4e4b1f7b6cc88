/// Simple Moving Average, index-aligned with `data`.
///
/// `None` for indices before the first full window, and everywhere when the
/// series is shorter than `period`. Each window is summed independently so
/// the values do not drift with series length.
pub fn sma(data: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || data.len() < period {
        return vec![None; data.len()];
    }

    let mut result = Vec::with_capacity(data.len());
    for i in 0..data.len() {
        if i + 1 < period {
            result.push(None);
            continue;
        }
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(Some(sum / period as f64));
    }
    result
}
