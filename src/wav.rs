//! Mono WAV input and in-place output.

use std::{
    fs,
    path::{Path, PathBuf},
};

use hound::{SampleFormat, WavSpec};

use crate::error::{Error, Result};

/// Decoded samples in [-1.0, 1.0] together with the spec they were stored with.
#[derive(Debug, Clone)]
pub struct Audio {
    pub spec: WavSpec,
    pub samples: Vec<f32>,
}

impl Audio {
    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }
}

pub fn load(p: impl AsRef<Path>) -> Result<Audio> {
    let p = p.as_ref();
    let wav_error = |source| Error::Wav {
        path: p.to_path_buf(),
        source,
    };

    let mut reader = hound::WavReader::open(p).map_err(wav_error)?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(Error::UnsupportedFormat {
            path: p.to_path_buf(),
            reason: format!("{} channels, expected mono", spec.channels),
        });
    }

    let samples: Vec<f32> = match &spec {
        WavSpec {
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
            ..
        } => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_error)?,
        WavSpec {
            bits_per_sample: bits @ (8 | 16 | 24 | 32),
            sample_format: SampleFormat::Int,
            ..
        } => {
            let full_scale = int_full_scale(*bits);
            reader
                .samples::<i32>()
                .map(|x| x.map(|x| x as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(wav_error)?
        }
        _ => {
            return Err(Error::UnsupportedFormat {
                path: p.to_path_buf(),
                reason: format!("{}-bit {:?}", spec.bits_per_sample, spec.sample_format),
            })
        }
    };

    log::debug!(
        "loaded {}: {} samples at {} Hz",
        p.display(),
        samples.len(),
        spec.sample_rate
    );
    Ok(Audio { spec, samples })
}

/// Like [`load`], but rejects files whose sample rate is not `sample_rate`.
pub fn load_at(p: impl AsRef<Path>, sample_rate: u32) -> Result<Audio> {
    let p = p.as_ref();
    let audio = load(p)?;
    if audio.sample_rate() != sample_rate {
        return Err(Error::SampleRateMismatch {
            path: p.to_path_buf(),
            expected: sample_rate,
            found: audio.sample_rate(),
        });
    }
    Ok(audio)
}

/// Writes `buf` with `spec`, clamping integer formats to full scale.
pub fn save(p: impl AsRef<Path>, spec: WavSpec, buf: &[f32]) -> Result<()> {
    let p = p.as_ref();
    let wav_error = |source| Error::Wav {
        path: p.to_path_buf(),
        source,
    };

    let mut writer = hound::WavWriter::create(p, spec).map_err(wav_error)?;
    match spec.sample_format {
        SampleFormat::Float => {
            for &x in buf.iter() {
                writer.write_sample(x).map_err(wav_error)?;
            }
        }
        SampleFormat::Int => {
            let full_scale = int_full_scale(spec.bits_per_sample);
            let mut clipped = 0usize;
            for &x in buf.iter() {
                let scaled = (x * full_scale).round();
                let y = scaled.clamp(-full_scale, full_scale - 1.0);
                if y != scaled {
                    clipped += 1;
                }
                let written = match spec.bits_per_sample {
                    8 => writer.write_sample(y as i8),
                    16 => writer.write_sample(y as i16),
                    _ => writer.write_sample(y as i32),
                };
                written.map_err(wav_error)?;
            }
            if clipped > 0 {
                log::warn!("{}: {} samples clipped", p.display(), clipped);
            }
        }
    }
    writer.finalize().map_err(wav_error)
}

/// Replaces the file at `p` with `buf`.
///
/// The samples are written to a sibling temporary file which is then renamed
/// over `p`, so the file is never left half written.
pub fn overwrite(p: impl AsRef<Path>, spec: WavSpec, buf: &[f32]) -> Result<()> {
    let p = p.as_ref();
    let tmp = temporary_path(p);
    if let Err(e) = save(&tmp, spec, buf) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, p).map_err(|e| Error::io(p, e))
}

fn temporary_path(p: &Path) -> PathBuf {
    let mut name = p.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    p.with_file_name(name)
}

fn int_full_scale(bits_per_sample: u16) -> f32 {
    (1u32 << (bits_per_sample - 1)) as f32
}
