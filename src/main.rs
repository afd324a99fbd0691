use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use winterreise_rt::{reconstruct, BatchPolicy, DatasetConfig, OffsetWrap, Pipeline};

#[derive(Debug, Parser)]
#[command(
    version,
    about = "Rebuild winterreise_rt: key- and loudness-matched song pairs \
             from the Schubert Winterreise Dataset"
)]
struct Args {
    /// Path to the original dataset directory
    #[arg(long, default_value = "./winterreise")]
    src_dir: PathBuf,

    /// Path to the reconstructed dataset directory
    #[arg(long, default_value = "./winterreise_rt")]
    dest_dir: PathBuf,

    /// Two-digit song ids to process (default: 01-24)
    #[arg(long, value_delimiter = ',')]
    songs: Vec<String>,

    /// Stage to leave out (transpose, normalize); may be repeated
    #[arg(long, value_name = "STAGE")]
    skip: Vec<String>,

    /// Stop at the first song that fails
    #[arg(long)]
    fail_fast: bool,

    /// Only run the audio stages on an already populated destination.
    /// Songs shifted by an earlier run are refused unless transpose is skipped.
    #[arg(long)]
    no_copy: bool,

    /// Shift by the smallest interval reaching the reference key (-6..=5)
    #[arg(long)]
    wrap_offsets: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = DatasetConfig {
        src_dir: args.src_dir,
        dest_dir: args.dest_dir,
        ..DatasetConfig::default()
    };
    if !args.songs.is_empty() {
        if let Some(bad) = args
            .songs
            .iter()
            .find(|s| s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()))
        {
            bail!("song id `{bad}` is not two digits");
        }
        config.song_ids = args.songs;
    }
    if args.wrap_offsets {
        config.offset_wrap = OffsetWrap::Nearest;
    }

    let mut pipeline = Pipeline::standard();
    for stage in &args.skip {
        pipeline.skip(stage)?;
    }
    let policy = if args.fail_fast {
        BatchPolicy::FailFast
    } else {
        BatchPolicy::Continue
    };

    let report = reconstruct(&config, &pipeline, policy, !args.no_copy)
        .with_context(|| format!("failed to reconstruct {}", config.dest_dir.display()))?;

    let report_path = config.dest_dir.join("processing_report.csv");
    report
        .write_csv(&report_path)
        .context("failed to write processing report")?;

    let failures: Vec<_> = report.failures().collect();
    for failure in &failures {
        log::error!("{failure}");
    }
    if !failures.is_empty() {
        bail!(
            "{} of {} songs failed, see {}",
            failures.len(),
            report.songs.len(),
            report_path.display()
        );
    }
    log::info!("done: {} songs", report.songs.len());
    Ok(())
}
