use parcel_objectstore::{Chunk, Key};

/// A multipart upload that has been opened on the object store.
///
/// Immutable once created; it belongs to the orchestrator run that opened it and is finished by
/// exactly one complete or abort call.
#[derive(Clone, Debug)]
pub struct UploadSession {
    pub upload_id: String,
    pub key: Key,
    pub content_type: String,
    pub total_size: u64,
}

/// Proof that one part was accepted by the object store.
#[derive(Clone, Debug, PartialEq)]
pub struct PartAck {
    pub index: u32,
    pub integrity_token: Option<String>,
}

impl From<PartAck> for Chunk {
    fn from(ack: PartAck) -> Chunk {
        Chunk {
            e_tag: ack.integrity_token,
            chunk_number: ack.index as i32,
        }
    }
}
