//! Process-local [`ObjectStore`] that keeps pending uploads and completed objects in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use super::errors::{Error, Result};
use super::{Chunk, Key, ObjectDescriptor, ObjectStore};

struct PendingUpload {
    key: String,
    content_type: String,
    parts: BTreeMap<i32, (String, Bytes)>,
}

/// An object assembled by a completed multipart upload.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub content_type: String,
    pub e_tag: String,
    pub body: Bytes,
}

#[derive(Default)]
struct State {
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<String, StoredObject>,
}

#[derive(Clone, Default)]
pub struct InMemory {
    state: Arc<Mutex<State>>,
}

impl InMemory {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .expect("no code path panics while holding the in-memory store lock")
    }

    /// Returns the completed object stored under `key`, if any.
    pub fn object(&self, key: &Key) -> Option<StoredObject> {
        self.lock().objects.get(&String::from(key)).cloned()
    }

    /// Number of multipart uploads that have been initiated but neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }
}

#[async_trait]
impl ObjectStore for InMemory {
    async fn initiate_multipart_upload(&self, key: &Key, content_type: &str) -> Result<String> {
        let upload_id = Uuid::new_v4().simple().to_string();
        self.lock().uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: String::from(key),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        key: &Key,
        part_number: i32,
        body: Bytes,
    ) -> Result<Chunk> {
        if part_number < 1 {
            return Err(Error::InvalidPart {
                part_number,
                reason: "part numbers start at 1",
            });
        }
        let mut state = self.lock();
        let upload = pending_upload(&mut state, upload_id, key)?;
        let e_tag = format!("\"{}\"", Uuid::new_v4().simple());
        upload.parts.insert(part_number, (e_tag.clone(), body));
        Ok(Chunk {
            e_tag: Some(e_tag),
            chunk_number: part_number,
        })
    }

    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        key: &Key,
        chunks: Vec<Chunk>,
    ) -> Result<ObjectDescriptor> {
        let mut state = self.lock();
        let upload = pending_upload(&mut state, upload_id, key)?;
        if chunks.is_empty() {
            return Err(Error::InvalidPart {
                part_number: 0,
                reason: "at least one part is required",
            });
        }

        let mut body = BytesMut::new();
        let mut previous = 0;
        for chunk in &chunks {
            if chunk.chunk_number <= previous {
                return Err(Error::InvalidPart {
                    part_number: chunk.chunk_number,
                    reason: "parts must be in ascending order",
                });
            }
            previous = chunk.chunk_number;

            let (e_tag, bytes) =
                upload
                    .parts
                    .get(&chunk.chunk_number)
                    .ok_or(Error::InvalidPart {
                        part_number: chunk.chunk_number,
                        reason: "part was never uploaded",
                    })?;
            if chunk.e_tag.as_deref() != Some(e_tag.as_str()) {
                return Err(Error::InvalidPart {
                    part_number: chunk.chunk_number,
                    reason: "etag mismatch",
                });
            }
            body.extend_from_slice(bytes);
        }

        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| Error::NoSuchUpload(upload_id.to_string()))?;
        let e_tag = format!("\"{}-{}\"", Uuid::new_v4().simple(), chunks.len());
        state.objects.insert(
            upload.key.clone(),
            StoredObject {
                content_type: upload.content_type,
                e_tag: e_tag.clone(),
                body: body.freeze(),
            },
        );

        Ok(ObjectDescriptor {
            key: upload.key,
            e_tag: Some(e_tag),
            location: None,
            version_id: None,
        })
    }

    async fn abort_multipart_upload(&self, upload_id: &str, key: &Key) -> Result<()> {
        let mut state = self.lock();
        pending_upload(&mut state, upload_id, key)?;
        state.uploads.remove(upload_id);
        Ok(())
    }
}

fn pending_upload<'a>(
    state: &'a mut State,
    upload_id: &str,
    key: &Key,
) -> Result<&'a mut PendingUpload> {
    match state.uploads.get_mut(upload_id) {
        Some(upload) if upload.key == String::from(key) => Ok(upload),
        _ => Err(Error::NoSuchUpload(upload_id.to_string())),
    }
}
