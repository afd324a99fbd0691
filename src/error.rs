use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unrecognized key label `{label}`")]
    Parse { label: String },

    #[error("cannot measure loudness of an empty signal")]
    EmptySignal,

    #[error("sample {index} is {value}, cannot measure loudness")]
    NonFiniteSample { index: usize, value: f32 },

    /// Peak RMS of the signal to be rescaled is zero (or not finite).
    #[error("target peak RMS is {0}, cannot compute a normalization gain")]
    DegenerateSignal(f32),

    #[error("no key annotation for song {song_id} performed by {performer}")]
    MissingMetadata { song_id: String, performer: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("{}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: unsupported wav format ({reason})", .path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("{}: sample rate {found} Hz, expected {expected} Hz", .path.display())]
    SampleRateMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Target audio in the destination was shifted by an earlier run.
    #[error(
        "song(s) {} already transposed since the dataset was copied; copy it again first",
        .songs.join(", ")
    )]
    AlreadyTransposed { songs: Vec<String> },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Error::Csv {
            path: path.into(),
            source,
        }
    }

    /// True for the variants caused by the filesystem rather than the data.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Wav { .. } | Error::Csv { .. })
    }
}
