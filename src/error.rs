//! Error taxonomy for the diary core.
//!
//! Only `ValidationError` and `StorageError` surface to callers of entry
//! creation; location and weather failures are absorbed inside the
//! enrichment pipeline and degrade to an entry without weather fields.

use thiserror::Error;

/// The durable store rejected or failed a read/write.
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(String),

    /// A record failed the store's required-field checks
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The database worker thread is no longer running
    #[error("database worker terminated unexpectedly")]
    WorkerClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// User input failed required-field checks, or the mandatory image
/// write failed. No entry is created when this is returned.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("an image must be selected")]
    MissingImage,

    #[error("image could not be saved: {0}")]
    ImageRejected(#[from] MediaError),
}

/// Failure of a whole `create_entry` call. Enrichment failures never
/// appear here.
#[derive(Error, Debug)]
pub enum CreateEntryError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Image persistence failure.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("source image not found: {0}")]
    SourceMissing(String),

    #[error("source is not a decodable image: {0}")]
    NotAnImage(String),

    #[error("image persist worker failed")]
    Worker,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device location could not be acquired. A single failed attempt
/// resolves the call; retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum LocationError {
    #[error("location permission not granted")]
    PermissionDenied,

    #[error("location unavailable")]
    Unavailable,
}

/// Remote weather lookup failure. Timeouts, non-2xx responses and
/// malformed payloads all land here; downstream handling treats them
/// identically.
#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("weather service returned {0}")]
    Status(reqwest::StatusCode),

    #[error("weather API key not configured")]
    MissingApiKey,
}
