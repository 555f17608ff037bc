/// Arithmetic mean, `None` for an empty slice.
///
/// Accumulates offsets from the first value so that a run of identical
/// samples averages to exactly that sample.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (&first, rest) = values.split_first()?;
    let offset: f64 = rest.iter().map(|v| v - first).sum();
    Some(first + offset / values.len() as f64)
}
