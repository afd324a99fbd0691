//! Global key annotations (`ann_audio_globalkey-tuning.csv`).

use std::{collections::HashMap, io, path::Path};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    key::KeyLabel,
};

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "WorkID")]
    work_id: String,
    #[serde(rename = "PerformanceID")]
    performance_id: String,
    #[serde(rename = "Key", alias = "key")]
    key: String,
}

/// Key labels by (song id, performance code). Loaded once, read-only after.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    keys: HashMap<(String, String), String>,
}

impl KeyTable {
    pub fn from_path(p: impl AsRef<Path>) -> Result<Self> {
        let p = p.as_ref();
        let rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_path(p)
            .map_err(|e| Error::csv(p, e))?;
        let table = Self::from_csv(rdr).map_err(|e| Error::csv(p, e))?;
        log::debug!("loaded {} key annotations from {}", table.len(), p.display());
        Ok(table)
    }

    pub fn from_reader(rdr: impl io::Read) -> Result<Self> {
        let rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_reader(rdr);
        Self::from_csv(rdr).map_err(|e| Error::csv("<reader>", e))
    }

    fn from_csv<R: io::Read>(mut rdr: csv::Reader<R>) -> Result<Self, csv::Error> {
        let mut keys = HashMap::new();
        for row in rdr.deserialize::<Row>() {
            let row = row?;
            let Some(song_id) = song_id_of(&row.work_id) else {
                log::debug!("skipping work {}: no song number", row.work_id);
                continue;
            };
            let entry = (song_id.to_string(), row.performance_id.trim().to_string());
            if let Some(previous) = keys.insert(entry, row.key.trim().to_string()) {
                log::warn!(
                    "duplicate key annotation for {} {}, replacing {}",
                    row.work_id,
                    row.performance_id,
                    previous
                );
            }
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn raw(&self, song_id: &str, performer: &str) -> Option<&str> {
        self.keys
            .get(&(song_id.to_string(), performer.to_string()))
            .map(String::as_str)
    }

    pub fn key(&self, song_id: &str, performer: &str) -> Result<KeyLabel> {
        let raw = self
            .raw(song_id, performer)
            .ok_or_else(|| Error::MissingMetadata {
                song_id: song_id.to_string(),
                performer: performer.to_string(),
            })?;
        KeyLabel::parse(raw)
    }
}

/// Two-digit song number after the last `-` of a work id such as `Schubert_D911-07`.
fn song_id_of(work_id: &str) -> Option<&str> {
    let (_, suffix) = work_id.trim().rsplit_once('-')?;
    (suffix.len() == 2 && suffix.bytes().all(|b| b.is_ascii_digit())).then_some(suffix)
}
