//! Directory layout of the dataset and the copy steps that populate it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::DatasetConfig,
    error::{Error, Result},
};

pub const AUDIO_DIR: &str = "01_RawData/audio_wav";
pub const SCORE_DIR: &str = "01_RawData/score_musicxml";
pub const LYRICS_DIR: &str = "01_RawData/lyrics_txt";
pub const NOTE_ANN_DIR: &str = "02_Annotations/ann_audio_note";
pub const AUDIO_KEY_ANN_DIR: &str = "03_ExtraMaterial";
pub const KEY_ANN_FILE: &str = "ann_audio_globalkey-tuning.csv";

/// Paths inside one dataset root. Both the source dataset and the
/// reconstructed one use this layout.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join(AUDIO_DIR)
    }

    pub fn score_dir(&self) -> PathBuf {
        self.root.join(SCORE_DIR)
    }

    pub fn lyrics_dir(&self) -> PathBuf {
        self.root.join(LYRICS_DIR)
    }

    pub fn note_ann_dir(&self) -> PathBuf {
        self.root.join(NOTE_ANN_DIR)
    }

    pub fn key_ann_path(&self) -> PathBuf {
        self.root.join(AUDIO_KEY_ANN_DIR).join(KEY_ANN_FILE)
    }

    fn dirs(&self) -> [PathBuf; 5] {
        [
            self.audio_dir(),
            self.score_dir(),
            self.lyrics_dir(),
            self.note_ann_dir(),
            self.root.join(AUDIO_KEY_ANN_DIR),
        ]
    }
}

pub fn make_empty_directory(dest: &DatasetLayout) -> Result<()> {
    for dir in dest.dirs() {
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    }
    Ok(())
}

fn copy(src: &Path, dest: &Path) -> Result<()> {
    log::debug!("copy {} -> {}", src.display(), dest.display());
    fs::copy(src, dest).map_err(|e| Error::io(src, e))?;
    Ok(())
}

/// Copies each performer's recording, renaming the performer code to its role.
pub fn copy_audio_wav(config: &DatasetConfig) -> Result<()> {
    log::info!("copying audio_wav");
    let (src, dest) = layouts(config);
    for song_id in &config.song_ids {
        for performer in &config.performers {
            copy(
                &src.audio_dir().join(format!(
                    "{}{}_{}.wav",
                    config.filename_prefix, song_id, performer.code
                )),
                &dest
                    .audio_dir()
                    .join(config.audio_file_name(song_id, performer.role)),
            )?;
        }
    }
    Ok(())
}

pub fn copy_audio_key_ann(config: &DatasetConfig) -> Result<()> {
    log::info!("copying audio key annotation");
    let (src, dest) = layouts(config);
    copy(&src.key_ann_path(), &dest.key_ann_path())
}

pub fn copy_score_musicxml(config: &DatasetConfig) -> Result<()> {
    log::info!("copying score");
    copy_per_song(config, DatasetLayout::score_dir, "xml")
}

pub fn copy_lyrics_txt(config: &DatasetConfig) -> Result<()> {
    log::info!("copying lyrics");
    copy_per_song(config, DatasetLayout::lyrics_dir, "txt")
}

fn copy_per_song(
    config: &DatasetConfig,
    dir: fn(&DatasetLayout) -> PathBuf,
    extension: &str,
) -> Result<()> {
    let (src, dest) = layouts(config);
    for song_id in &config.song_ids {
        let name = format!("{}.{}", config.work_id(song_id), extension);
        copy(&dir(&src).join(&name), &dir(&dest).join(&name))?;
    }
    Ok(())
}

#[derive(Debug, Deserialize, Serialize)]
struct NoteRow {
    start: String,
    pitch: String,
    pitchclass: String,
    instrument: String,
}

const NOTE_COLUMNS: [&str; 4] = ["start", "pitch", "pitchclass", "instrument"];

/// Keeps only the sung notes of each note annotation.
///
/// Reads `;`-separated `{prefix}{id}_{code}.csv` from the source dataset and
/// writes comma-separated `ann_{prefix}{id}_{role}.csv` into the destination.
pub fn filter_voice_note_ann(config: &DatasetConfig) -> Result<()> {
    log::info!("copying & filtering voice note annotation");
    let (src, dest) = layouts(config);
    for song_id in &config.song_ids {
        for performer in &config.performers {
            let source = src.note_ann_dir().join(format!(
                "{}{}_{}.csv",
                config.filename_prefix, song_id, performer.code
            ));
            let out = dest.note_ann_dir().join(format!(
                "ann_{}{}_{}.csv",
                config.filename_prefix, song_id, performer.role
            ));
            let kept = filter_voice_notes(&source, &out)?;
            log::debug!("{}: kept {} voice notes", out.display(), kept);
        }
    }
    Ok(())
}

fn filter_voice_notes(source: &Path, out: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_path(source)
        .map_err(|e| Error::csv(source, e))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(out)
        .map_err(|e| Error::csv(out, e))?;
    writer
        .write_record(NOTE_COLUMNS)
        .map_err(|e| Error::csv(out, e))?;

    let mut kept = 0;
    for row in reader.deserialize::<NoteRow>() {
        let row = row.map_err(|e| Error::csv(source, e))?;
        if row.instrument != "voice" {
            continue;
        }
        writer.serialize(&row).map_err(|e| Error::csv(out, e))?;
        kept += 1;
    }
    writer.flush().map_err(|e| Error::io(out, e))?;
    Ok(kept)
}

/// Runs every copy step, in the order the directories are listed.
pub fn copy_from_orig_dataset(config: &DatasetConfig) -> Result<()> {
    copy_audio_wav(config)?;
    copy_audio_key_ann(config)?;
    copy_score_musicxml(config)?;
    copy_lyrics_txt(config)?;
    filter_voice_note_ann(config)
}

fn layouts(config: &DatasetConfig) -> (DatasetLayout, DatasetLayout) {
    (
        DatasetLayout::new(&config.src_dir),
        DatasetLayout::new(&config.dest_dir),
    )
}
