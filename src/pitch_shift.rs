//! Phase-vocoder pitch shifting that keeps duration and sample rate.
//!
//! The signal is first stretched in time by the pitch ratio with a phase
//! vocoder, then read back at that ratio so it regains its original length.

use std::f32::consts::{PI, TAU};

use rustfft::num_complex::Complex32;

use crate::{
    error::{Error, Result},
    fft::Fft,
    transform::{overlap_add, stft},
    windows::hann_window,
};

pub const DEFAULT_WINDOW_SIZE: usize = 1024;

/// Shifts `signal` by `semitones` with the default analysis window.
///
/// The result has the same number of samples as the input. A shift of zero
/// returns an exact copy.
pub fn transpose(signal: &[f32], sample_rate: u32, semitones: i32) -> Result<Vec<f32>> {
    transpose_with_window(signal, sample_rate, semitones, DEFAULT_WINDOW_SIZE)
}

pub fn transpose_with_window(
    signal: &[f32],
    sample_rate: u32,
    semitones: i32,
    window_size: usize,
) -> Result<Vec<f32>> {
    if sample_rate == 0 {
        return Err(Error::InvalidParameters("sample rate must be positive".into()));
    }
    if window_size < 4 || window_size % 4 != 0 {
        return Err(Error::InvalidParameters(format!(
            "pitch shift window {window_size} must be a positive multiple of 4"
        )));
    }
    if semitones == 0 || signal.is_empty() {
        return Ok(signal.to_vec());
    }

    log::debug!(
        "shifting {} samples at {} Hz by {} semitones (window {})",
        signal.len(),
        sample_rate,
        semitones,
        window_size
    );

    let pitch_change_amount = pitch_change_amount(semitones as f32);
    let stretched = time_stretch(signal, window_size, window_size / 4, pitch_change_amount);
    Ok(resample(&stretched, pitch_change_amount, signal.len()))
}

pub fn pitch_change_amount(semitones: f32) -> f32 {
    2.0f32.powf(semitones / 12.0)
}

/// Makes `signal` `rate` times longer without changing its pitch.
///
/// When the result is meant to be read back faster (`rate > 1`), the bins that
/// would fold over Nyquist are cleared.
pub fn time_stretch(signal: &[f32], window_size: usize, hop_size: usize, rate: f32) -> Vec<f32> {
    let fft = Fft::new(window_size);
    let window = hann_window(window_size);
    let frames = stft(&fft, &window, hop_size, signal);
    let silence = vec![Complex32::new(0.0, 0.0); window_size];

    let mut vocoder = PhaseVocoder::new(window_size, hop_size);
    let step_count = (frames.len() as f32 * rate).ceil() as usize;
    let mut stretched = Vec::with_capacity(step_count);
    for step in 0..step_count {
        let position = step as f32 / rate;
        let m = position.floor() as usize;
        let Some(current) = frames.get(m) else {
            break;
        };
        let next = frames.get(m + 1).unwrap_or(&silence);
        let mut spectrum = vocoder.process(current, next, position - m as f32);
        remove_aliasing(rate, &mut spectrum);
        stretched.push(spectrum);
    }

    let len = (signal.len() as f64 * rate as f64).round() as usize;
    overlap_add(&fft, &window, hop_size, &mut stretched, len)
}

/// Reads `buf` with a step of `rate` samples per output sample, interpolating
/// linearly, and returns `len` samples.
pub fn resample(buf: &[f32], rate: f32, len: usize) -> Vec<f32> {
    let sample = |k: usize| buf.get(k).copied().unwrap_or(0.0);
    (0..len)
        .map(|i| {
            let position = i as f64 * rate as f64;
            let k = position.floor() as usize;
            let frac = (position - k as f64) as f32;
            let (a, b) = (sample(k), sample(k + 1));
            a + (b - a) * frac
        })
        .collect()
}

/// Output phases carried between synthesized frames of one signal.
///
/// Every bin advances by the frequency measured between the two analysis
/// frames it is interpolated from, so the bins of one partial keep the phase
/// relation they had in the input.
pub struct PhaseVocoder {
    phase_advance: Vec<f32>,
    phases: Option<Vec<f32>>,
}

impl PhaseVocoder {
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        Self {
            phase_advance: (0..window_size / 2 + 1)
                .map(|i| TAU * i as f32 * hop_size as f32 / window_size as f32)
                .collect(),
            phases: None,
        }
    }

    /// Synthesizes the frame lying `alpha` of the way from `current` to `next`.
    pub fn process(
        &mut self,
        current: &[Complex32],
        next: &[Complex32],
        alpha: f32,
    ) -> Vec<Complex32> {
        let len = current.len();
        let phases = self
            .phases
            .get_or_insert_with(|| current[..len / 2 + 1].iter().map(|x| x.arg()).collect());

        let mut spectrum = vec![Complex32::new(0.0, 0.0); len];
        for i in 0..len / 2 + 1 {
            let norm = (1.0 - alpha) * current[i].norm() + alpha * next[i].norm();
            spectrum[i] = Complex32::from_polar(norm, phases[i]);

            let deviation = wrap_phase(next[i].arg() - current[i].arg() - self.phase_advance[i]);
            phases[i] = wrap_phase(phases[i] + self.phase_advance[i] + deviation);
        }
        spectrum
    }
}

pub fn wrap_phase(phase: f32) -> f32 {
    if phase >= 0.0 {
        (phase + PI) % TAU - PI
    } else {
        (phase - PI) % TAU + PI
    }
}

/// Clears the bins above `Nyquist / rate` when the signal is to be read back
/// `rate` times faster.
pub fn remove_aliasing(rate: f32, spectrum: &mut [Complex32]) {
    let len = spectrum.len();

    if rate > 1.0 {
        let nyquist = (len as f32 / 2.0 / rate).round() as usize;
        spectrum[nyquist..len / 2 + 1].fill(Complex32::new(0.0, 0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16000;
    const ANALYSIS_SIZE: usize = 8192;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (TAU * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    /// Magnitudes of the lower half spectrum of the middle of `buf`.
    fn magnitudes(buf: &[f32]) -> Vec<f32> {
        let start = (buf.len() - ANALYSIS_SIZE) / 2;
        let window = hann_window(ANALYSIS_SIZE);
        let frame: Vec<f32> = buf[start..start + ANALYSIS_SIZE]
            .iter()
            .zip(&window)
            .map(|(x, w)| x * w)
            .collect();
        let spectrum = Fft::new(ANALYSIS_SIZE).spectrum(&frame);
        spectrum[..ANALYSIS_SIZE / 2].iter().map(|x| x.norm()).collect()
    }

    fn bin_frequency(bin: usize) -> f32 {
        bin as f32 * SR as f32 / ANALYSIS_SIZE as f32
    }

    fn dominant_bin(magnitudes: &[f32]) -> usize {
        (1..magnitudes.len())
            .max_by(|&a, &b| magnitudes[a].total_cmp(&magnitudes[b]))
            .unwrap()
    }

    fn dominant_frequency(buf: &[f32]) -> f32 {
        bin_frequency(dominant_bin(&magnitudes(buf)))
    }

    fn quarter_tone(freq: f32) -> f32 {
        freq * (pitch_change_amount(0.5) - 1.0)
    }

    fn peak_rms(buf: &[f32]) -> f32 {
        buf.chunks_exact(1280)
            .map(|c| (c.iter().map(|x| x * x).sum::<f32>() / c.len() as f32).sqrt())
            .fold(0.0, f32::max)
    }

    #[test]
    fn zero_shift_is_exact_copy() {
        let buf = sine(220.0, 0.4, 5000);
        assert_eq!(transpose(&buf, SR, 0).unwrap(), buf);
    }

    #[test]
    fn preserves_length() {
        let buf = sine(330.0, 0.3, 7777);
        for n in [-12, -11, -5, -1, 1, 2, 7, 11, 12] {
            assert_eq!(transpose(&buf, SR, n).unwrap().len(), buf.len(), "{n}");
        }
        assert!(transpose(&[], SR, 3).unwrap().is_empty());
    }

    #[test]
    fn shifted_tone_lands_on_target_without_sidebands() {
        for f0 in [196.0, 220.0, 330.0, 392.0, 440.0] {
            let buf = sine(f0, 0.5, SR as usize);
            for n in [-11, -7, -2, 1, 5, 10, 11] {
                let out = transpose(&buf, SR, n).unwrap();
                let magnitudes = magnitudes(&out);
                let peak = dominant_bin(&magnitudes);

                let expected = f0 * pitch_change_amount(n as f32);
                let freq = bin_frequency(peak);
                assert!(
                    (freq - expected).abs() < quarter_tone(expected),
                    "{f0} Hz by {n}: peak at {freq} Hz, expected {expected} Hz"
                );

                // anything more than 20 Hz away from the carrier
                let guard = (20.0 / bin_frequency(1)).ceil() as usize;
                let sideband = magnitudes
                    .iter()
                    .enumerate()
                    .filter(|(k, _)| k.abs_diff(peak) > guard)
                    .map(|(_, m)| *m)
                    .fold(0.0, f32::max);
                assert!(
                    magnitudes[peak] > 20.0 * sideband,
                    "{f0} Hz by {n}: carrier {} vs sideband {sideband}",
                    magnitudes[peak]
                );
            }
        }
    }

    #[test]
    fn octave_up_doubles_frequency() {
        let buf = sine(440.0, 0.5, SR as usize);
        let freq = dominant_frequency(&transpose(&buf, SR, 12).unwrap());
        assert!((freq - 880.0).abs() < quarter_tone(880.0), "{freq}");
    }

    #[test]
    fn two_partials_keep_their_loudness() {
        let buf: Vec<f32> = sine(220.0, 0.3, SR as usize)
            .iter()
            .zip(sine(445.0, 0.3, SR as usize))
            .map(|(a, b)| a + b)
            .collect();
        let before = peak_rms(&buf);
        for n in [-11, 5, 11] {
            let after = peak_rms(&transpose(&buf, SR, n).unwrap());
            assert!((after / before - 1.0).abs() < 0.2, "{n}: {before} -> {after}");
        }
    }

    #[test]
    fn resample_reads_at_rate() {
        let buf: Vec<f32> = (0..10).map(|i| i as f32).collect();
        assert_eq!(resample(&buf, 1.5, 4), vec![0.0, 1.5, 3.0, 4.5]);
        assert_eq!(resample(&buf, 0.5, 3), vec![0.0, 0.5, 1.0]);
        // past the end reads as silence
        assert_eq!(resample(&buf, 4.0, 4), vec![0.0, 4.0, 8.0, 0.0]);
    }

    #[test]
    fn time_stretch_keeps_frequency() {
        let buf = sine(440.0, 0.5, SR as usize);
        let stretched = time_stretch(&buf, DEFAULT_WINDOW_SIZE, DEFAULT_WINDOW_SIZE / 4, 1.5);
        assert_eq!(stretched.len(), 24000);
        let freq = dominant_frequency(&stretched);
        assert!((freq - 440.0).abs() < quarter_tone(440.0), "{freq}");
    }

    #[test]
    fn rejects_bad_parameters() {
        let buf = sine(440.0, 0.5, 100);
        assert!(matches!(
            transpose(&buf, 0, 1),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            transpose_with_window(&buf, SR, 1, 1022),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn wrap_phase_stays_in_range() {
        for k in -20..20 {
            let p = wrap_phase(k as f32 * 1.3);
            assert!((-PI..=PI).contains(&p), "{p}");
        }
    }
}
