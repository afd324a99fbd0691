use std::sync::Arc;

use rustfft::num_complex::Complex32;

pub struct Fft {
    forward: Arc<dyn rustfft::Fft<f32>>,
    inverse: Arc<dyn rustfft::Fft<f32>>,
}

impl Fft {
    pub fn new(size: usize) -> Self {
        let mut planner = rustfft::FftPlanner::new();
        Self {
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    /// Spectrum of the real frame `buf`.
    pub fn spectrum(&self, buf: &[f32]) -> Vec<Complex32> {
        let mut spectrum: Vec<_> = buf.iter().map(|&x| Complex32::new(x, 0.0)).collect();
        self.forward(&mut spectrum);
        spectrum
    }

    /// Real frame whose spectrum has the lower half `spectrum[..=len/2]`.
    ///
    /// The upper half is overwritten with the mirrored lower half first.
    pub fn real_inverse(&self, spectrum: &mut [Complex32]) -> Vec<f32> {
        fill_right_part_of_spectrum(spectrum);
        self.inverse(spectrum);
        fix_scale(spectrum);
        spectrum.iter().map(|x| x.re).collect()
    }

    pub fn forward(&self, buffer: &mut [Complex32]) {
        self.forward.process(buffer);
    }

    pub fn inverse(&self, buffer: &mut [Complex32]) {
        self.inverse.process(buffer);
    }
}

pub fn fix_scale(buf: &mut [Complex32]) {
    let scale = 1.0 / buf.len() as f32;
    for x in buf.iter_mut() {
        *x *= scale;
    }
}

/// Mirrors bins `1..len/2` into the upper half so the inverse transform of a
/// real signal stays real.
pub fn fill_right_part_of_spectrum(spectrum: &mut [Complex32]) {
    let len = spectrum.len();
    for i in 1..len / 2 {
        spectrum[len - i] = spectrum[i].conj();
    }
}
