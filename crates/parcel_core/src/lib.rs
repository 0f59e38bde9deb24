//! Multipart upload orchestration.
//!
//! A source of known length is cut into parts by [`PartSplitter`], each part is pushed through
//! [`PartUploader`] (which retries failed attempts), and [`Orchestrator`] ties the parts to a
//! single multipart upload session that is either completed or aborted as a whole.

mod config;
pub use config::{RetryPolicy, UploadConfig};
pub use config::{DEFAULT_CALL_TIMEOUT_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_PART_SIZE};

pub mod errors;
pub use errors::{CallError, Error, PartError, PartFailure, ReadError, Result};

mod orchestrator;
pub use orchestrator::{Orchestrator, UploadOutcome};

mod session;
pub use session::{PartAck, UploadSession};

mod source;
pub use source::{ByteSource, FileSource};

mod split;
pub use split::{Part, PartSplitter, Parts, MAX_PART_COUNT};

mod uploader;
pub use uploader::PartUploader;
