//! Per-song processing as an ordered list of named stages.
//!
//! Each stage reads and rewrites the audio of one song. A stage declares the
//! stages it depends on; those must appear earlier in the pipeline and must
//! have completed (or been explicitly skipped) before it runs for a song.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::{DatasetConfig, Role},
    error::{Error, Result},
    key::semitone_difference,
    layout::DatasetLayout,
    loudness::{normalize_to_reference, peak_windowed_rms},
    metadata::KeyTable,
    pitch_shift::transpose_with_window,
    wav,
};

/// Everything a stage may consult while processing one song.
pub struct SongContext<'a> {
    pub song_id: &'a str,
    pub config: &'a DatasetConfig,
    pub keys: &'a KeyTable,
    pub audio_dir: PathBuf,
}

impl<'a> SongContext<'a> {
    pub fn new(song_id: &'a str, config: &'a DatasetConfig, keys: &'a KeyTable) -> Self {
        Self {
            song_id,
            config,
            keys,
            audio_dir: DatasetLayout::new(&config.dest_dir).audio_dir(),
        }
    }

    pub fn audio_path(&self, role: Role) -> PathBuf {
        self.audio_dir
            .join(self.config.audio_file_name(self.song_id, role))
    }

    pub fn performer_code(&self, role: Role) -> Result<&'a str> {
        self.config
            .performer(role)
            .map(|p| p.code.as_str())
            .ok_or_else(|| Error::InvalidParameters(format!("no performer has role {role}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Target rewritten, shifted by `semitones`.
    Transposed { semitones: i32 },
    /// Nothing to do; the file was not touched.
    Unchanged,
    Normalized {
        gain: f32,
        reference_peak_rms: f32,
        target_peak_rms: f32,
    },
}

pub trait Stage {
    fn name(&self) -> &'static str;

    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    fn run(&self, song: &SongContext<'_>) -> Result<StageOutcome>;
}

/// Shifts the target recording into the key of the reference recording.
pub struct TransposeStage;

impl Stage for TransposeStage {
    fn name(&self) -> &'static str {
        "transpose"
    }

    fn run(&self, song: &SongContext<'_>) -> Result<StageOutcome> {
        let ref_key = song.keys.key(song.song_id, song.performer_code(Role::Ref)?)?;
        let target_key = song
            .keys
            .key(song.song_id, song.performer_code(Role::Target)?)?;
        let semitones = song
            .config
            .offset_wrap
            .apply(semitone_difference(&target_key, &ref_key));
        log::debug!(
            "song {}: {} -> {} is {:+} semitones",
            song.song_id,
            target_key,
            ref_key,
            semitones
        );
        if semitones == 0 {
            return Ok(StageOutcome::Unchanged);
        }

        let path = song.audio_path(Role::Target);
        let audio = wav::load_at(&path, song.config.sample_rate)?;
        let shifted = transpose_with_window(
            &audio.samples,
            audio.sample_rate(),
            semitones,
            song.config.pitch_window,
        )?;
        wav::overwrite(&path, audio.spec, &shifted)?;
        Ok(StageOutcome::Transposed { semitones })
    }
}

/// Rescales the target so its peak windowed RMS equals the reference's.
pub struct NormalizeStage;

impl Stage for NormalizeStage {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["transpose"]
    }

    fn run(&self, song: &SongContext<'_>) -> Result<StageOutcome> {
        let (window, hop) = (song.config.rms_window, song.config.rms_hop);
        let reference = wav::load_at(song.audio_path(Role::Ref), song.config.sample_rate)?;
        let path = song.audio_path(Role::Target);
        let target = wav::load_at(&path, song.config.sample_rate)?;

        let reference_peak_rms = peak_windowed_rms(&reference.samples, window, hop)?;
        let target_peak_rms = peak_windowed_rms(&target.samples, window, hop)?;
        let normalized =
            normalize_to_reference(&target.samples, reference_peak_rms, target_peak_rms)?;
        wav::overwrite(&path, target.spec, &normalized)?;

        Ok(StageOutcome::Normalized {
            gain: reference_peak_rms / target_peak_rms,
            reference_peak_rms,
            target_peak_rms,
        })
    }
}

/// A failure while processing one song.
#[derive(Debug, thiserror::Error)]
#[error("song {song_id}: {stage} failed: {source}")]
pub struct SongError {
    pub song_id: String,
    pub stage: &'static str,
    #[source]
    pub source: Error,
}

#[derive(Debug)]
pub enum StageStatus {
    Done(StageOutcome),
    Skipped,
    Failed(SongError),
    /// Not run because the named dependency did not complete.
    Blocked { by: &'static str },
}

#[derive(Debug)]
pub struct SongReport {
    pub song_id: String,
    pub stages: Vec<(&'static str, StageStatus)>,
}

impl SongReport {
    pub fn error(&self) -> Option<&SongError> {
        self.stages.iter().find_map(|(_, status)| match status {
            StageStatus::Failed(e) => Some(e),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.stages
            .iter()
            .all(|(_, s)| matches!(s, StageStatus::Done(_) | StageStatus::Skipped))
    }

    /// True when some stage rewrote the audio but a later one did not complete,
    /// leaving the song in an intermediate state.
    pub fn is_partial(&self) -> bool {
        let wrote = self.stages.iter().any(|(_, s)| {
            matches!(s, StageStatus::Done(outcome) if *outcome != StageOutcome::Unchanged)
        });
        wrote && !self.is_success()
    }

    pub fn status(&self, stage: &str) -> Option<&StageStatus> {
        self.stages
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, s)| s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// Stop after the first song that fails.
    FailFast,
    /// Process every song and report all failures.
    #[default]
    Continue,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub songs: Vec<SongReport>,
}

#[derive(Serialize)]
struct ReportRow<'a> {
    song_id: &'a str,
    stage: &'a str,
    status: &'a str,
    detail: String,
}

/// Name of the [`TransposeLedger`] file in the destination root.
pub const TRANSPOSE_LEDGER_FILE: &str = "transposed_songs.csv";

#[derive(Serialize, Deserialize)]
struct LedgerRow {
    song_id: String,
    semitones: i32,
}

/// Songs whose target audio has been shifted since it was last copied from the
/// source dataset. Shifting the same file twice would leave it in the wrong
/// key, so a run that transposes must consult this first.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransposeLedger {
    shifted: BTreeMap<String, i32>,
}

impl TransposeLedger {
    /// Reads the ledger at `p`. A missing file is an empty ledger.
    pub fn load(p: impl AsRef<Path>) -> Result<Self> {
        let p = p.as_ref();
        if !p.exists() {
            return Ok(Self::default());
        }
        let mut reader = csv::Reader::from_path(p).map_err(|e| Error::csv(p, e))?;
        let mut shifted = BTreeMap::new();
        for row in reader.deserialize::<LedgerRow>() {
            let row = row.map_err(|e| Error::csv(p, e))?;
            shifted.insert(row.song_id, row.semitones);
        }
        Ok(Self { shifted })
    }

    pub fn save(&self, p: impl AsRef<Path>) -> Result<()> {
        let p = p.as_ref();
        let mut writer = csv::Writer::from_path(p).map_err(|e| Error::csv(p, e))?;
        for (song_id, &semitones) in &self.shifted {
            writer
                .serialize(LedgerRow {
                    song_id: song_id.clone(),
                    semitones,
                })
                .map_err(|e| Error::csv(p, e))?;
        }
        writer.flush().map_err(|e| Error::io(p, e))
    }

    /// Adds every song whose target `report` shows as shifted.
    pub fn record(&mut self, report: &BatchReport) {
        let stage = TransposeStage.name();
        for song in &report.songs {
            if let Some(StageStatus::Done(StageOutcome::Transposed { semitones })) =
                song.status(stage)
            {
                self.shifted.insert(song.song_id.clone(), *semitones);
            }
        }
    }

    pub fn semitones(&self, song_id: &str) -> Option<i32> {
        self.shifted.get(song_id).copied()
    }

    /// The ids among `song_ids` that have already been shifted.
    pub fn shifted_among(&self, song_ids: &[String]) -> Vec<String> {
        song_ids
            .iter()
            .filter(|id| self.shifted.contains_key(id.as_str()))
            .cloned()
            .collect()
    }
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &SongError> {
        self.songs.iter().filter_map(SongReport::error)
    }

    pub fn is_success(&self) -> bool {
        self.songs.iter().all(SongReport::is_success)
    }

    pub fn song(&self, song_id: &str) -> Option<&SongReport> {
        self.songs.iter().find(|s| s.song_id == song_id)
    }

    /// One row per song and stage: `song_id,stage,status,detail`.
    pub fn write_csv(&self, p: impl AsRef<Path>) -> Result<()> {
        let p = p.as_ref();
        let mut writer = csv::Writer::from_path(p).map_err(|e| Error::csv(p, e))?;
        for song in &self.songs {
            for (stage, status) in &song.stages {
                let (status, detail) = match status {
                    StageStatus::Done(StageOutcome::Transposed { semitones }) => {
                        ("done", format!("{semitones:+} semitones"))
                    }
                    StageStatus::Done(StageOutcome::Unchanged) => ("done", "unchanged".into()),
                    StageStatus::Done(StageOutcome::Normalized { gain, .. }) => {
                        ("done", format!("gain {gain:.6}"))
                    }
                    StageStatus::Skipped => ("skipped", String::new()),
                    StageStatus::Failed(e) => ("failed", e.source.to_string()),
                    StageStatus::Blocked { by } => ("blocked", format!("{by} did not complete")),
                };
                writer
                    .serialize(ReportRow {
                        song_id: &song.song_id,
                        stage: *stage,
                        status,
                        detail,
                    })
                    .map_err(|e| Error::csv(p, e))?;
            }
        }
        writer.flush().map_err(|e| Error::io(p, e))
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    skipped: HashSet<&'static str>,
}

impl Pipeline {
    /// Checks that every stage's dependencies are declared before it.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let mut seen: HashSet<&'static str> = HashSet::new();
        for stage in &stages {
            for dependency in stage.dependencies() {
                if !seen.contains(dependency) {
                    return Err(Error::InvalidPipeline(format!(
                        "stage `{}` depends on `{}`, which does not run before it",
                        stage.name(),
                        dependency
                    )));
                }
            }
            if !seen.insert(stage.name()) {
                return Err(Error::InvalidPipeline(format!(
                    "stage `{}` appears twice",
                    stage.name()
                )));
            }
        }
        Ok(Self {
            stages,
            skipped: HashSet::new(),
        })
    }

    /// Transposition followed by loudness normalization.
    pub fn standard() -> Self {
        Self {
            stages: vec![Box::new(TransposeStage), Box::new(NormalizeStage)],
            skipped: HashSet::new(),
        }
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.name())
    }

    /// True when `name` is one of the stages and is not skipped.
    pub fn runs(&self, name: &str) -> bool {
        self.stage_names().any(|n| n == name) && !self.skipped.contains(name)
    }

    /// Leaves `name` out of every song. Its dependents treat it as satisfied.
    pub fn skip(&mut self, name: &str) -> Result<()> {
        let name = self
            .stage_names()
            .find(|&n| n == name)
            .ok_or_else(|| Error::InvalidPipeline(format!("no stage named `{name}`")))?;
        self.skipped.insert(name);
        Ok(())
    }

    pub fn run_song(&self, song: &SongContext<'_>) -> SongReport {
        let mut stages: Vec<(&'static str, StageStatus)> = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let name = stage.name();
            let blocker = stage.dependencies().iter().copied().find(|dependency| {
                !stages.iter().any(|(n, s)| {
                    n == dependency && matches!(s, StageStatus::Done(_) | StageStatus::Skipped)
                })
            });

            let status = if self.skipped.contains(name) {
                StageStatus::Skipped
            } else if let Some(by) = blocker {
                StageStatus::Blocked { by }
            } else {
                match stage.run(song) {
                    Ok(outcome) => {
                        log::debug!("song {}: {}: {:?}", song.song_id, name, outcome);
                        StageStatus::Done(outcome)
                    }
                    Err(source) => StageStatus::Failed(SongError {
                        song_id: song.song_id.to_string(),
                        stage: name,
                        source,
                    }),
                }
            };
            stages.push((name, status));
        }

        SongReport {
            song_id: song.song_id.to_string(),
            stages,
        }
    }

    /// Processes the configured songs one at a time.
    pub fn run(&self, config: &DatasetConfig, keys: &KeyTable, policy: BatchPolicy) -> BatchReport {
        let mut report = BatchReport::default();

        for song_id in &config.song_ids {
            let song = SongContext::new(song_id, config, keys);
            let song_report = self.run_song(&song);

            if let Some(e) = song_report.error() {
                if song_report.is_partial() {
                    log::warn!("{e} (song {song_id} is only partially processed)");
                } else {
                    log::warn!("{e}");
                }
            } else {
                log::info!("song {song_id} processed");
            }

            let failed = !song_report.is_success();
            report.songs.push(song_report);
            if failed && policy == BatchPolicy::FailFast {
                log::warn!("stopping after song {song_id}");
                break;
            }
        }

        report
    }
}
