use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parcel_objectstore::{Chunk, Key, ObjectDescriptor, ObjectStore};

use crate::config::UploadConfig;
use crate::errors::{CallError, Error, PartFailure, Result};
use crate::session::{PartAck, UploadSession};
use crate::source::ByteSource;
use crate::split::PartSplitter;
use crate::uploader::PartUploader;

/// Terminal result of a multipart upload whose session was successfully opened.
#[derive(Debug)]
pub enum UploadOutcome {
    Completed(ObjectDescriptor),
    /// A part exhausted its retries and the session was aborted. `abort_error` holds an
    /// [`Error::SessionAbortFailed`] if the abort call itself failed, in which case the remote
    /// upload may still be open.
    Aborted {
        failure: PartFailure,
        abort_error: Option<Error>,
    },
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn into_result(self) -> Result<ObjectDescriptor> {
        match self {
            Self::Completed(descriptor) => Ok(descriptor),
            Self::Aborted {
                failure,
                abort_error,
            } => Err(Error::PartUploadFailed {
                failure,
                abort_error: abort_error.map(Box::new),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Init,
    SessionOpen,
    UploadingParts,
    Completing,
    Completed,
    Aborting,
    Aborted,
}

impl SessionState {
    fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Init, SessionOpen)
                | (SessionOpen, UploadingParts)
                | (UploadingParts, Completing)
                | (UploadingParts, Aborting)
                | (Completing, Completed)
                | (Aborting, Aborted)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::SessionOpen => "session-open",
            Self::UploadingParts => "uploading-parts",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Aborting => "aborting",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

struct Lifecycle<'a> {
    key: &'a Key,
    state: SessionState,
}

impl<'a> Lifecycle<'a> {
    fn new(key: &'a Key) -> Self {
        Self {
            key,
            state: SessionState::Init,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal session transition {} -> {next}",
            self.state
        );
        tracing::debug!("{}: {} -> {next}", self.key, self.state);
        self.state = next;
    }
}

async fn with_timeout<T, F>(timeout: Duration, call: F) -> std::result::Result<T, CallError>
where
    F: Future<Output = parcel_objectstore::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CallError::Timeout(timeout)),
    }
}

/// Drives a multipart upload from begin to complete, or to abort on the first part that cannot
/// be uploaded.
///
/// An `Orchestrator` carries no per-upload state; every [`Orchestrator::run`] opens its own
/// session.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    config: UploadConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn ObjectStore>, config: UploadConfig) -> Self {
        Self { store, config }
    }

    /// Upload all of `source` to `key`.
    ///
    /// Returns `Err` when nothing was uploaded (bad configuration, failed begin) or when every
    /// part was uploaded but the complete call failed; that last case leaves the remote upload
    /// open. Part failures are reported through [`UploadOutcome::Aborted`].
    pub async fn run(
        &self,
        source: &dyn ByteSource,
        key: Key,
        content_type: &str,
    ) -> Result<UploadOutcome> {
        self.config.validate()?;
        let splitter = PartSplitter::new(source.len(), self.config.max_part_size)?;
        let call_timeout = self.config.call_timeout();
        let mut lifecycle = Lifecycle::new(&key);

        let upload_id = with_timeout(
            call_timeout,
            self.store.initiate_multipart_upload(&key, content_type),
        )
        .await
        .map_err(|cause| {
            tracing::error!("could not begin multipart upload for {key}: {cause}");
            Error::SessionBeginFailed {
                key: key.to_string(),
                source: cause,
            }
        })?;
        lifecycle.advance(SessionState::SessionOpen);

        let session = UploadSession {
            upload_id,
            key: key.clone(),
            content_type: content_type.to_string(),
            total_size: splitter.total_size(),
        };
        tracing::info!(
            "began multipart upload {} for {} ({} bytes in {} part(s))",
            session.upload_id,
            session.key,
            session.total_size,
            splitter.len()
        );

        lifecycle.advance(SessionState::UploadingParts);
        match self.upload_parts(&session, &splitter, source).await {
            Ok(acks) => {
                lifecycle.advance(SessionState::Completing);
                let descriptor = self.complete(&session, acks).await?;
                lifecycle.advance(SessionState::Completed);
                tracing::info!("completed multipart upload of {descriptor}");
                Ok(UploadOutcome::Completed(descriptor))
            }
            Err(failure) => {
                lifecycle.advance(SessionState::Aborting);
                let abort_error = self.abort(&session).await.err();
                lifecycle.advance(SessionState::Aborted);
                Ok(UploadOutcome::Aborted {
                    failure,
                    abort_error,
                })
            }
        }
    }

    /// Uploads every part, at most `concurrency` at a time, and returns the acknowledgments
    /// sorted by part index.
    ///
    /// Stops at the first terminal failure: no further parts are started and parts still in
    /// flight are dropped along with their results.
    async fn upload_parts(
        &self,
        session: &UploadSession,
        splitter: &PartSplitter,
        source: &dyn ByteSource,
    ) -> std::result::Result<Vec<PartAck>, PartFailure> {
        let uploader = PartUploader::new(
            &*self.store,
            &self.config.retry,
            self.config.call_timeout(),
        );
        let uploader = &uploader;

        let mut uploads = stream::iter(splitter.iter())
            .map(move |part| async move { uploader.upload(session, &part, source).await })
            .buffer_unordered(self.config.concurrency);

        let mut acks = Vec::with_capacity(splitter.len() as usize);
        while let Some(result) = uploads.next().await {
            match result {
                Ok(ack) => acks.push(ack),
                Err(failure) => {
                    tracing::debug!(
                        "cancelling remaining parts of {} after {} succeeded",
                        session.key,
                        acks.len()
                    );
                    return Err(failure);
                }
            }
        }

        acks.sort_by_key(|ack| ack.index);
        debug_assert_eq!(acks.len(), splitter.len() as usize);
        Ok(acks)
    }

    async fn complete(
        &self,
        session: &UploadSession,
        acks: Vec<PartAck>,
    ) -> Result<ObjectDescriptor> {
        let chunks: Vec<Chunk> = acks.into_iter().map(Chunk::from).collect();
        with_timeout(
            self.config.call_timeout(),
            self.store
                .complete_multipart_upload(&session.upload_id, &session.key, chunks),
        )
        .await
        .map_err(|source| {
            tracing::error!(
                "multipart upload {} for {} could not be completed and remains open: {source}",
                session.upload_id,
                session.key
            );
            Error::SessionCompleteFailed {
                upload_id: session.upload_id.clone(),
                key: session.key.to_string(),
                source,
            }
        })
    }

    /// Best-effort abort; attempted exactly once.
    async fn abort(&self, session: &UploadSession) -> Result<()> {
        tracing::warn!(
            "aborting multipart upload {} for {}",
            session.upload_id,
            session.key
        );
        with_timeout(
            self.config.call_timeout(),
            self.store
                .abort_multipart_upload(&session.upload_id, &session.key),
        )
        .await
        .map_err(|source| {
            tracing::error!(
                "abort of multipart upload {} for {} failed, it may need manual cleanup: {source}",
                session.upload_id,
                session.key
            );
            Error::SessionAbortFailed {
                upload_id: session.upload_id.clone(),
                key: session.key.to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn legal_transitions() {
        use SessionState::*;
        assert!(Init.can_advance_to(SessionOpen));
        assert!(UploadingParts.can_advance_to(Aborting));
        assert!(UploadingParts.can_advance_to(Completing));
        assert!(!Completing.can_advance_to(Aborting));
        assert!(!Aborted.can_advance_to(Completing));
        assert!(!Init.can_advance_to(UploadingParts));
    }
}
