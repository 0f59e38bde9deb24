use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by an upload run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to begin multipart upload for {key}: {source}")]
    SessionBeginFailed {
        key: String,
        #[source]
        source: CallError,
    },

    #[error(
        "multipart upload aborted after part {} failed{}",
        .failure.index,
        abort_suffix(.abort_error)
    )]
    PartUploadFailed {
        #[source]
        failure: PartFailure,
        abort_error: Option<Box<Error>>,
    },

    #[error("failed to abort multipart upload {upload_id} for {key}: {source}")]
    SessionAbortFailed {
        upload_id: String,
        key: String,
        #[source]
        source: CallError,
    },

    #[error("failed to complete multipart upload {upload_id} for {key}: {source}")]
    SessionCompleteFailed {
        upload_id: String,
        key: String,
        #[source]
        source: CallError,
    },
}

fn abort_suffix(abort_error: &Option<Box<Error>>) -> String {
    match abort_error {
        Some(e) => format!("; additionally {e}"),
        None => String::new(),
    }
}

/// Why a single remote call (begin, complete or abort) failed.
#[derive(thiserror::Error, Debug)]
pub enum CallError {
    #[error(transparent)]
    ObjectStore(#[from] parcel_objectstore::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Local failure to produce the bytes of a part.
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("range {offset}+{length} is out of bounds for a source of {len} bytes")]
    OutOfBounds { offset: u64, length: u64, len: u64 },

    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),
}

/// Cause of a single failed part upload attempt.
#[derive(thiserror::Error, Debug)]
pub enum PartError {
    #[error(transparent)]
    ObjectStore(#[from] parcel_objectstore::Error),

    #[error("read error: {0}")]
    Read(#[from] ReadError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Terminal failure of one part after its retry budget has been spent.
#[derive(thiserror::Error, Debug)]
#[error("part {index} failed after {attempts} attempt(s): {source}")]
pub struct PartFailure {
    pub index: u32,
    pub attempts: u32,
    #[source]
    pub source: PartError,
}
