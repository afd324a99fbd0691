//! Dataset configuration.

use std::{fmt, path::PathBuf, str::FromStr};

use crate::{key::OffsetWrap, loudness, pitch_shift};

/// Which side of a song pair a performance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Ref,
    Target,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Ref => "ref",
            Role::Target => "target",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ref" => Ok(Role::Ref),
            "target" => Ok(Role::Target),
            _ => Err(format!("unknown role `{s}` (expected `ref` or `target`)")),
        }
    }
}

/// A recorded performer and the role their recordings take in the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Performer {
    /// Performance code used by the source dataset, e.g. `HU33`.
    pub code: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Root of the source Schubert Winterreise Dataset.
    pub src_dir: PathBuf,
    /// Root of the reconstructed dataset; audio is modified here in place.
    pub dest_dir: PathBuf,
    pub filename_prefix: String,
    /// Two-digit song ids to process, in order.
    pub song_ids: Vec<String>,
    pub performers: Vec<Performer>,
    /// Rate every audio file must already have (no resampling is done).
    pub sample_rate: u32,
    pub rms_window: usize,
    pub rms_hop: usize,
    pub pitch_window: usize,
    pub offset_wrap: OffsetWrap,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("./winterreise"),
            dest_dir: PathBuf::from("./winterreise_rt"),
            filename_prefix: "Schubert_D911-".to_string(),
            song_ids: (1..=24).map(|i| format!("{i:02}")).collect(),
            performers: vec![
                Performer {
                    code: "HU33".to_string(),
                    role: Role::Ref,
                },
                Performer {
                    code: "SC06".to_string(),
                    role: Role::Target,
                },
            ],
            sample_rate: 16000,
            rms_window: loudness::DEFAULT_WINDOW_SIZE,
            rms_hop: loudness::DEFAULT_HOP_SIZE,
            pitch_window: pitch_shift::DEFAULT_WINDOW_SIZE,
            offset_wrap: OffsetWrap::None,
        }
    }
}

impl DatasetConfig {
    pub fn performer(&self, role: Role) -> Option<&Performer> {
        self.performers.iter().find(|p| p.role == role)
    }

    /// `Schubert_D911-01_ref.wav` style name of a song's audio file.
    pub fn audio_file_name(&self, song_id: &str, role: Role) -> String {
        format!("{}{}_{}.wav", self.filename_prefix, song_id, role)
    }

    /// Work id of a song as written in the key annotation table.
    pub fn work_id(&self, song_id: &str) -> String {
        format!("{}{}", self.filename_prefix, song_id)
    }
}
