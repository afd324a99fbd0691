/// Periodic Hann window, the analysis and synthesis window of [`crate::transform`].
pub fn hann_window(size: usize) -> Vec<f32> {
    let omega = std::f32::consts::TAU / size as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (omega * i as f32).cos()))
        .collect()
}
