use std::path::Component;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;

mod config;
pub use config::Config;
mod errors;
pub use errors::{Error, KeyError, Result};
mod memory;
pub use memory::{InMemory, StoredObject};
pub(crate) mod s3;
pub use s3::S3Config;
pub use s3::S3;

/// Acknowledgment of a single uploaded part, echoed back when the upload is completed.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub e_tag: Option<String>,
    pub chunk_number: i32,
}

/// Describes an object once its multipart upload has been completed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectDescriptor {
    pub key: String,
    pub e_tag: Option<String>,
    pub location: Option<String>,
    pub version_id: Option<String>,
}

impl std::fmt::Display for ObjectDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(e_tag) = &self.e_tag {
            write!(f, " (etag {e_tag})")?;
        }
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

/// A wrapper around [`std::path::PathBuf`] that rejects unsavory key names.
///
/// The following rules applied during the [`TryFrom<PathBuf>`] implementation:
///
/// * paths must not start with `/`
/// * paths are delimited by `/`
/// * paths are normalized (`//` are replaced with `/` and never end in `/`)
/// * paths must not contain relative segments (ie `.` or `..`)
/// * only characters explicitly documented as safe [in the S3
///   docs](https://docs.aws.amazon.com/AmazonS3/latest/userguide/object-keys.html) are allowed in
///   path segments
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    key: PathBuf,
}

impl From<&uuid::Uuid> for Key {
    fn from(uuid: &uuid::Uuid) -> Key {
        Key {
            key: PathBuf::from(uuid.to_string()),
        }
    }
}

impl From<&Key> for String {
    fn from(k: &Key) -> String {
        format!("{}", k.key.display())
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.key.display())
    }
}

impl TryFrom<PathBuf> for Key {
    type Error = Error;

    fn try_from(pb: PathBuf) -> Result<Key> {
        let key = pb
            .components()
            .try_fold(PathBuf::new(), validate_component)?;
        if key.as_os_str().is_empty() {
            return Err(KeyError::Empty.into());
        }
        Ok(Key { key })
    }
}

impl TryFrom<&str> for Key {
    type Error = Error;

    fn try_from(s: &str) -> Result<Key> {
        Key::try_from(PathBuf::from(s))
    }
}

fn validate_component(mut pb: PathBuf, c: Component<'_>) -> std::result::Result<PathBuf, KeyError> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.*'()!-]+$").expect("key regex must compile"));
    match c {
        Component::Prefix(_) => return Err(KeyError::PrefixNotAllowed),
        Component::RootDir => return Err(KeyError::RootDirNotAllowed),
        Component::CurDir => return Err(KeyError::CurDirNotAllowed),
        Component::ParentDir => return Err(KeyError::ParentDirNotAllowed),
        Component::Normal(s) => {
            if let Some(s) = s.to_str() {
                if !RE.is_match(s) {
                    return Err(KeyError::PathComponentsMustMatchRegex(
                        RE.as_str().to_string(),
                    ));
                }
            } else {
                return Err(KeyError::PathComponentsMustBeValidUnicode);
            }
        }
    }
    pb.push(c);
    Ok(pb)
}

/// Provides a common interface for driving multipart uploads against different kinds of backend
/// object stores.
///
/// Each method maps onto a single remote call. Implementations must not retry internally; retry
/// policy belongs to the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Open a multipart upload for `key`, returning the backend's upload id.
    async fn initiate_multipart_upload(&self, key: &Key, content_type: &str) -> Result<String>;

    /// Upload the body of part `part_number` (1-based).
    async fn upload_part(
        &self,
        upload_id: &str,
        key: &Key,
        part_number: i32,
        body: Bytes,
    ) -> Result<Chunk>;

    /// Assemble the object from `chunks`, which must be sorted by `chunk_number`.
    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        key: &Key,
        chunks: Vec<Chunk>,
    ) -> Result<ObjectDescriptor>;

    async fn abort_multipart_upload(&self, upload_id: &str, key: &Key) -> Result<()>;
}
