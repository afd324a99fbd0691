use rustfft::num_complex::Complex32;

use crate::fft::Fft;

/// Short-time spectra of `buf`, one frame every `hop_size` samples.
///
/// Frame `m` is centred on sample `m * hop_size`; the signal is zero-padded by
/// half a window in front and as far as the last frame needs behind.
pub fn stft(fft: &Fft, window: &[f32], hop_size: usize, buf: &[f32]) -> Vec<Vec<Complex32>> {
    let window_size = window.len();
    assert!(0 < hop_size && hop_size <= window_size / 2);

    let frame_count = buf.len() / hop_size + 1;
    let mut padded = vec![0.0; window_size / 2];
    padded.extend_from_slice(buf);
    padded.resize((frame_count - 1) * hop_size + window_size, 0.0);

    let mut frame = vec![0.0; window_size];
    (0..frame_count)
        .map(|m| {
            let start = m * hop_size;
            for ((y, x), w) in frame.iter_mut().zip(&padded[start..]).zip(window) {
                *y = x * w;
            }
            fft.spectrum(&frame)
        })
        .collect()
}

/// Weighted overlap-add of `frames` placed the way [`stft`] lays them out.
///
/// Each inverse frame is windowed again and the sum is divided by the summed
/// squared window, so an untouched [`stft`] comes back as the input. Only the
/// lower half of each spectrum is read. The output has exactly `len` samples.
pub fn overlap_add(
    fft: &Fft,
    window: &[f32],
    hop_size: usize,
    frames: &mut [Vec<Complex32>],
    len: usize,
) -> Vec<f32> {
    let window_size = window.len();
    let lead = window_size / 2;
    let total = (frames.len().saturating_sub(1) * hop_size + window_size).max(lead + len);

    let mut output = vec![0.0; total];
    let mut envelope = vec![0.0; total];
    for (j, spectrum) in frames.iter_mut().enumerate() {
        let start = j * hop_size;
        let frame = fft.real_inverse(spectrum);
        for (((y, e), x), w) in output[start..]
            .iter_mut()
            .zip(&mut envelope[start..])
            .zip(frame)
            .zip(window)
        {
            *y += x * w;
            *e += w * w;
        }
    }

    for (y, e) in output.iter_mut().zip(&envelope) {
        if *e > 1e-6 {
            *y /= e;
        }
    }

    output.drain(..lead);
    output.truncate(len);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windows::hann_window;

    #[test]
    fn untouched_frames_reconstruct_signal() {
        let window = hann_window(256);
        let fft = Fft::new(256);
        let buf: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let mut frames = stft(&fft, &window, 64, &buf);
        let out = overlap_add(&fft, &window, 64, &mut frames, buf.len());
        assert_eq!(out.len(), buf.len());
        for (a, b) in buf.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn frames_cover_short_and_empty_input() {
        let window = hann_window(256);
        let fft = Fft::new(256);
        assert_eq!(stft(&fft, &window, 64, &[]).len(), 1);
        let mut frames = stft(&fft, &window, 64, &[0.25; 10]);
        let out = overlap_add(&fft, &window, 64, &mut frames, 10);
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|x| (x - 0.25).abs() < 1e-4));
    }
}
