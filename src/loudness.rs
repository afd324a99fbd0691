//! Windowed peak-RMS loudness and gain matching.
//!
//! Framing: frames of `window_size` samples start every `hop_size` samples as
//! long as a full window fits. When the last full frame stops short of the end
//! of the signal, one more frame aligned to the end is added, so every sample
//! is measured and no frame contains padding. A signal shorter than one window
//! is measured as a single frame.

use crate::error::{Error, Result};

/// 80 ms at 16 kHz.
pub const DEFAULT_WINDOW_SIZE: usize = 1280;
/// 40 ms at 16 kHz.
pub const DEFAULT_HOP_SIZE: usize = 640;

pub fn rms(buf: &[f32]) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    (buf.iter().map(|&x| x.powi(2)).sum::<f32>() / buf.len() as f32).sqrt()
}

pub fn frames(
    signal: &[f32],
    window_size: usize,
    hop_size: usize,
) -> Result<impl Iterator<Item = &[f32]>> {
    check_parameters(window_size, hop_size)?;
    if signal.is_empty() {
        return Err(Error::EmptySignal);
    }

    let len = signal.len();
    let window_size = window_size.min(len);
    let last_start = len - window_size;
    let mut starts: Vec<usize> = (0..=last_start).step_by(hop_size).collect();
    if starts.last() != Some(&last_start) {
        starts.push(last_start);
    }

    Ok(starts
        .into_iter()
        .map(move |start| &signal[start..start + window_size]))
}

/// Largest per-frame RMS of `signal`.
///
/// An all-zero signal gives 0.0; an empty one, or one holding a NaN or an
/// infinity, is an error.
pub fn peak_windowed_rms(signal: &[f32], window_size: usize, hop_size: usize) -> Result<f32> {
    let frames = frames(signal, window_size, hop_size)?;
    if let Some(index) = signal.iter().position(|x| !x.is_finite()) {
        return Err(Error::NonFiniteSample {
            index,
            value: signal[index],
        });
    }
    Ok(frames.map(rms).fold(0.0, f32::max))
}

/// Scales `target` by `reference_peak_rms / target_peak_rms`.
pub fn normalize_to_reference(
    target: &[f32],
    reference_peak_rms: f32,
    target_peak_rms: f32,
) -> Result<Vec<f32>> {
    if !(target_peak_rms.is_finite() && target_peak_rms > 0.0) {
        return Err(Error::DegenerateSignal(target_peak_rms));
    }
    if !(reference_peak_rms.is_finite() && reference_peak_rms >= 0.0) {
        return Err(Error::InvalidParameters(format!(
            "reference peak RMS {reference_peak_rms} is not a loudness"
        )));
    }
    let gain = reference_peak_rms / target_peak_rms;
    log::debug!("applying gain {gain:.4} ({:+.2} dB)", 20.0 * gain.log10());
    Ok(target.iter().map(|&x| x * gain).collect())
}

fn check_parameters(window_size: usize, hop_size: usize) -> Result<()> {
    if window_size == 0 || hop_size == 0 {
        return Err(Error::InvalidParameters(
            "rms window and hop must be positive".into(),
        ));
    }
    if hop_size > window_size {
        return Err(Error::InvalidParameters(format!(
            "rms hop {hop_size} exceeds window {window_size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = DEFAULT_WINDOW_SIZE;
    const H: usize = DEFAULT_HOP_SIZE;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-4 * b.abs().max(1.0)
    }

    #[test]
    fn constant_signal_peak_is_its_amplitude() {
        for a in [0.1f32, 0.5, 1.0] {
            let buf = vec![a; 4 * W];
            assert!(close(peak_windowed_rms(&buf, W, H).unwrap(), a));
            let neg = vec![-a; W];
            assert!(close(peak_windowed_rms(&neg, W, H).unwrap(), a));
        }
    }

    #[test]
    fn silence_is_zero_not_an_error() {
        assert_eq!(peak_windowed_rms(&vec![0.0; 3000], W, H).unwrap(), 0.0);
    }

    #[test]
    fn empty_signal_is_an_error() {
        assert!(matches!(
            peak_windowed_rms(&[], W, H),
            Err(Error::EmptySignal)
        ));
    }

    #[test]
    fn rejects_invalid_window_and_hop() {
        let buf = vec![0.1; 100];
        assert!(matches!(
            peak_windowed_rms(&buf, 0, 0),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            peak_windowed_rms(&buf, 10, 20),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn frames_cover_the_tail_without_padding() {
        let buf: Vec<f32> = (0..2000).map(|i| i as f32).collect();
        let frames: Vec<_> = frames(&buf, W, H).unwrap().collect();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == W));
        assert_eq!(frames[0][0], 0.0);
        assert_eq!(frames[1][0], 640.0);
        assert_eq!(frames[2][0], 720.0);
        assert_eq!(*frames[2].last().unwrap(), 1999.0);
    }

    #[test]
    fn exact_fit_adds_no_extra_frame() {
        let buf = vec![0.0; W + 2 * H];
        assert_eq!(frames(&buf, W, H).unwrap().count(), 3);
    }

    #[test]
    fn short_signal_is_one_frame() {
        let buf = vec![0.3; 100];
        let frames: Vec<_> = frames(&buf, W, H).unwrap().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 100);
        assert!(close(peak_windowed_rms(&buf, W, H).unwrap(), 0.3));
    }

    #[test]
    fn burst_in_tail_is_measured() {
        let mut buf = vec![0.0; 3000];
        buf[2990..].fill(1.0);
        let peak = peak_windowed_rms(&buf, W, H).unwrap();
        assert!(close(peak, (10.0 / W as f32).sqrt()));
    }

    #[test]
    fn normalized_signal_matches_reference_peak() {
        let target: Vec<f32> = (0..8000)
            .map(|i| 0.05 * (i as f32 * 0.02).sin() * (1.0 + (i as f32 * 0.001).cos()))
            .collect();
        let reference = 0.3;
        let t = peak_windowed_rms(&target, W, H).unwrap();
        let out = normalize_to_reference(&target, reference, t).unwrap();
        assert_eq!(out.len(), target.len());
        assert!(close(peak_windowed_rms(&out, W, H).unwrap(), reference));
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        let mut buf = vec![0.5; 4000];
        buf[1234] = f32::NAN;
        assert!(matches!(
            peak_windowed_rms(&buf, W, H),
            Err(Error::NonFiniteSample { index: 1234, .. })
        ));
        assert!(matches!(
            peak_windowed_rms(&vec![f32::NAN; 4000], W, H),
            Err(Error::NonFiniteSample { index: 0, .. })
        ));
        buf[1234] = f32::INFINITY;
        assert!(matches!(
            peak_windowed_rms(&buf, W, H),
            Err(Error::NonFiniteSample { index: 1234, .. })
        ));
    }

    #[test]
    fn non_finite_reference_loudness_is_rejected() {
        assert!(matches!(
            normalize_to_reference(&[0.1; 10], f32::NAN, 0.1),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn zero_target_loudness_is_degenerate() {
        assert!(matches!(
            normalize_to_reference(&[0.0; 10], 0.2, 0.0),
            Err(Error::DegenerateSignal(_))
        ));
        assert!(matches!(
            normalize_to_reference(&[0.0; 10], 0.2, f32::NAN),
            Err(Error::DegenerateSignal(_))
        ));
    }
}
