use std::time::Duration;

use bytes::Bytes;
use parcel_objectstore::{Chunk, ObjectStore};

use crate::config::RetryPolicy;
use crate::errors::{PartError, PartFailure, ReadError};
use crate::session::{PartAck, UploadSession};
use crate::source::ByteSource;
use crate::split::Part;

/// Uploads single parts, retrying any failure until the policy's attempt budget is spent.
pub struct PartUploader<'a> {
    store: &'a dyn ObjectStore,
    policy: &'a RetryPolicy,
    call_timeout: Duration,
}

impl<'a> PartUploader<'a> {
    pub fn new(store: &'a dyn ObjectStore, policy: &'a RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            store,
            policy,
            call_timeout,
        }
    }

    pub async fn upload(
        &self,
        session: &UploadSession,
        part: &Part,
        source: &dyn ByteSource,
    ) -> std::result::Result<PartAck, PartFailure> {
        // read once, resend the same bytes on every retry
        let mut body: Option<Bytes> = None;
        let mut attempts = 0;
        loop {
            attempts += 1;
            tracing::debug!(
                "uploading part {} of {} ({} bytes at offset {}), attempt {attempts}",
                part.index,
                session.key,
                part.length,
                part.offset,
            );
            match self.attempt(session, part, source, &mut body).await {
                Ok(chunk) => {
                    tracing::info!(
                        "uploaded part {} of {} on attempt {attempts}",
                        part.index,
                        session.key
                    );
                    return Ok(PartAck {
                        index: part.index,
                        integrity_token: chunk.e_tag,
                    });
                }
                Err(e) if attempts < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempts);
                    tracing::warn!(
                        "retrying part {} of {} after attempt {attempts} failed: {e}",
                        part.index,
                        session.key
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(cause) => {
                    tracing::error!(
                        "giving up on part {} of {} after {attempts} attempt(s): {cause}",
                        part.index,
                        session.key
                    );
                    return Err(PartFailure {
                        index: part.index,
                        attempts,
                        source: cause,
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        session: &UploadSession,
        part: &Part,
        source: &dyn ByteSource,
        body: &mut Option<Bytes>,
    ) -> std::result::Result<Chunk, PartError> {
        let bytes = match body.clone() {
            Some(bytes) => bytes,
            None => {
                let bytes = source.read_range(part.offset, part.length).await?;
                if bytes.len() as u64 != part.length {
                    return Err(ReadError::ShortRead {
                        offset: part.offset,
                        expected: part.length,
                        actual: bytes.len() as u64,
                    }
                    .into());
                }
                *body = Some(bytes.clone());
                bytes
            }
        };

        let upload = self.store.upload_part(
            &session.upload_id,
            &session.key,
            part.index as i32,
            bytes,
        );
        match tokio::time::timeout(self.call_timeout, upload).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PartError::Timeout(self.call_timeout)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use parcel_objectstore::{Error as StoreError, Key, ObjectDescriptor};

    use super::*;

    /// Claims `len` bytes but always hands back one byte fewer than asked for.
    struct Truncating {
        len: u64,
    }

    #[async_trait]
    impl ByteSource for Truncating {
        fn len(&self) -> u64 {
            self.len
        }

        async fn read_range(&self, _offset: u64, length: u64) -> Result<Bytes, ReadError> {
            Ok(Bytes::from(vec![0u8; length.saturating_sub(1) as usize]))
        }
    }

    /// Fails each part a scripted number of times before accepting it, recording every body.
    #[derive(Default)]
    struct Scripted {
        failures: Mutex<HashMap<i32, u32>>,
        bodies: Mutex<Vec<(i32, Bytes)>>,
    }

    #[async_trait]
    impl ObjectStore for Scripted {
        async fn initiate_multipart_upload(
            &self,
            _key: &Key,
            _content_type: &str,
        ) -> parcel_objectstore::Result<String> {
            Ok(String::from("upload"))
        }

        async fn upload_part(
            &self,
            _upload_id: &str,
            _key: &Key,
            part_number: i32,
            body: Bytes,
        ) -> parcel_objectstore::Result<Chunk> {
            self.bodies.lock().unwrap().push((part_number, body));
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&part_number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::Backend(String::from("injected")));
                }
            }
            Ok(Chunk {
                e_tag: Some(format!("etag-{part_number}")),
                chunk_number: part_number,
            })
        }

        async fn complete_multipart_upload(
            &self,
            _upload_id: &str,
            _key: &Key,
            _chunks: Vec<Chunk>,
        ) -> parcel_objectstore::Result<ObjectDescriptor> {
            unreachable!("the part uploader never completes")
        }

        async fn abort_multipart_upload(
            &self,
            _upload_id: &str,
            _key: &Key,
        ) -> parcel_objectstore::Result<()> {
            unreachable!("the part uploader never aborts")
        }
    }

    fn session(total_size: u64) -> UploadSession {
        UploadSession {
            upload_id: String::from("upload"),
            key: Key::try_from("object").unwrap(),
            content_type: String::from("application/octet-stream"),
            total_size,
        }
    }

    fn part(index: u32, offset: u64, length: u64) -> Part {
        Part {
            index,
            offset,
            length,
        }
    }

    #[tokio::test]
    async fn sends_only_the_part_range() {
        let store = Scripted::default();
        let policy = RetryPolicy::default();
        let uploader = PartUploader::new(&store, &policy, Duration::from_secs(5));
        let source = Bytes::from_static(b"0123456789");

        let ack = uploader
            .upload(&session(10), &part(2, 4, 4), &source)
            .await
            .unwrap();
        assert_eq!(
            ack,
            PartAck {
                index: 2,
                integrity_token: Some(String::from("etag-2"))
            }
        );
        assert_eq!(
            *store.bodies.lock().unwrap(),
            vec![(2, Bytes::from_static(b"4567"))]
        );
    }

    #[tokio::test]
    async fn retries_same_range_until_success() {
        let store = Scripted::default();
        store.failures.lock().unwrap().insert(1, 2);
        let policy = RetryPolicy::default();
        let uploader = PartUploader::new(&store, &policy, Duration::from_secs(5));
        let source = Bytes::from_static(b"abcdef");

        let ack = uploader
            .upload(&session(6), &part(1, 0, 3), &source)
            .await
            .unwrap();
        assert_eq!(ack.index, 1);

        let bodies = store.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 3);
        assert!(bodies
            .iter()
            .all(|(n, b)| *n == 1 && b == &Bytes::from_static(b"abc")));
    }

    #[tokio::test]
    async fn gives_up_at_ceiling() {
        let store = Scripted::default();
        store.failures.lock().unwrap().insert(1, 3);
        let policy = RetryPolicy::default();
        let uploader = PartUploader::new(&store, &policy, Duration::from_secs(5));
        let source = Bytes::from_static(b"abcdef");

        let failure = uploader
            .upload(&session(6), &part(1, 0, 6), &source)
            .await
            .unwrap_err();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.attempts, 3);
        assert!(matches!(
            failure.source,
            PartError::ObjectStore(StoreError::Backend(_))
        ));
        assert_eq!(store.bodies.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn read_errors_use_retry_budget() {
        let store = Scripted::default();
        let policy = RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        };
        let uploader = PartUploader::new(&store, &policy, Duration::from_secs(5));
        let source = Bytes::from_static(b"abc");

        let failure = uploader
            .upload(&session(10), &part(1, 0, 10), &source)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert!(matches!(
            failure.source,
            PartError::Read(ReadError::OutOfBounds { .. })
        ));
        assert!(store.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backs_off_between_attempts() {
        let store = Scripted::default();
        store.failures.lock().unwrap().insert(1, 2);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 20,
            max_backoff_ms: 0,
        };
        let uploader = PartUploader::new(&store, &policy, Duration::from_secs(5));
        let source = Bytes::from_static(b"abc");

        let started = std::time::Instant::now();
        uploader
            .upload(&session(3), &part(1, 0, 3), &source)
            .await
            .unwrap();
        // 20ms after the first failure, 40ms after the second
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn short_read_is_never_sent() {
        let store = Scripted::default();
        let policy = RetryPolicy::default();
        let uploader = PartUploader::new(&store, &policy, Duration::from_secs(5));
        let source = Truncating { len: 8 };

        let failure = uploader
            .upload(&session(8), &part(1, 0, 8), &source)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert!(matches!(
            failure.source,
            PartError::Read(ReadError::ShortRead {
                offset: 0,
                expected: 8,
                actual: 7,
            })
        ));
        assert!(store.bodies.lock().unwrap().is_empty());
    }
}
