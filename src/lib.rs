//! Rebuilds the `winterreise_rt` dataset from the Schubert Winterreise Dataset.
//!
//! For each song the target performance is shifted into the key of the
//! reference performance ([`pitch_shift`], keys from [`metadata`]) and then
//! rescaled so its peak windowed RMS matches the reference ([`loudness`]).

pub mod config;
pub mod error;
pub mod fft;
pub mod key;
pub mod layout;
pub mod loudness;
pub mod metadata;
pub mod pipeline;
pub mod pitch_shift;
pub mod transform;
pub mod wav;
pub mod windows;

pub use config::{DatasetConfig, Performer, Role};
pub use error::{Error, Result};
pub use key::{semitone_difference, KeyLabel, OffsetWrap};
pub use loudness::{normalize_to_reference, peak_windowed_rms};
pub use metadata::KeyTable;
pub use pipeline::{BatchPolicy, BatchReport, Pipeline, TransposeLedger};
pub use pitch_shift::transpose;

use pipeline::{Stage, TransposeStage, TRANSPOSE_LEDGER_FILE};

/// Builds the destination dataset and runs `pipeline` over its audio.
///
/// With `copy` unset the destination is assumed to be populated already and
/// only the audio stages run. Such a run refuses to shift songs that an
/// earlier run already shifted (see [`TransposeLedger`]). Errors
/// here concern the whole dataset; per-song failures are collected in the
/// returned report.
pub fn reconstruct(
    config: &DatasetConfig,
    pipeline: &Pipeline,
    policy: BatchPolicy,
    copy: bool,
) -> Result<BatchReport> {
    let dest = layout::DatasetLayout::new(&config.dest_dir);
    let ledger_path = config.dest_dir.join(TRANSPOSE_LEDGER_FILE);
    let mut ledger = if copy {
        layout::make_empty_directory(&dest)?;
        layout::copy_from_orig_dataset(config)?;
        TransposeLedger::default()
    } else {
        TransposeLedger::load(&ledger_path)?
    };

    if pipeline.runs(TransposeStage.name()) {
        let songs = ledger.shifted_among(&config.song_ids);
        if !songs.is_empty() {
            return Err(Error::AlreadyTransposed { songs });
        }
    }

    let keys = KeyTable::from_path(dest.key_ann_path())?;
    log::info!(
        "processing {} songs with stages [{}]",
        config.song_ids.len(),
        pipeline.stage_names().collect::<Vec<_>>().join(", ")
    );
    let report = pipeline.run(config, &keys, policy);

    ledger.record(&report);
    ledger.save(&ledger_path)?;
    Ok(report)
}
