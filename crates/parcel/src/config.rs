use std::path::PathBuf;

use serde::Deserialize;

use parcel_core::UploadConfig;
use parcel_objectstore::Key;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone, Deserialize)]
pub struct Config {
    pub objects: parcel_objectstore::Config,
    #[serde(default)]
    pub upload: UploadConfig,
    /// Prepended to generated keys; ignored when a key is given explicitly.
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Config {
    /// A random key under `key_prefix`.
    pub fn generate_key(&self) -> parcel_objectstore::Result<Key> {
        let uuid = uuid::Uuid::new_v4();
        match &self.key_prefix {
            Some(prefix) => Key::try_from(PathBuf::from(prefix).join(uuid.to_string())),
            None => Ok(Key::from(&uuid)),
        }
    }

    pub fn content_type<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.content_type.as_deref())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}
