//! Chunked image upload state machine.
//!
//! One [`ImageAssembler`] owns the state of one upload stream: the info
//! message names the target record, then raw chunks accumulate into a bounded
//! buffer, and stream completion persists the buffer through the image store.
//! The assembler is owned by exactly one stream task and needs no locking.

use crate::image_store::{ImageStore, ImageStoreError};
use crate::store::RecordStore;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default cap on the accumulated image size.
pub const MAX_IMAGE_BYTES: usize = 1 << 20;

/// Errors that can occur while assembling an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("record {0} does not exist")]
    RecordNotFound(String),

    #[error("image info was not sent before chunk data")]
    MissingInfo,

    #[error("image info was sent twice on one stream")]
    DuplicateInfo,

    #[error("image is too large: {size} > {max}")]
    TooLarge { size: usize, max: usize },

    #[error("upload session is already closed")]
    Closed,

    #[error("cannot save image to the store: {0}")]
    Storage(#[from] ImageStoreError),
}

/// First message of an upload stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Target record ID
    pub record_id: String,
    /// Image type tag, used as the stored file extension
    pub image_type: String,
}

/// One inbound message of an upload stream.
#[derive(Debug, Clone)]
pub enum UploadMessage {
    Info(ImageInfo),
    Chunk(Bytes),
}

/// Result of a completed upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Freshly assigned image ID
    pub image_id: String,
    /// Total accumulated bytes
    pub size_bytes: usize,
}

/// Observable phase of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    AwaitingInfo,
    Accumulating,
    Completed,
    Rejected,
    Aborted,
}

enum UploadState {
    AwaitingInfo,
    Accumulating {
        record_id: String,
        image_type: String,
        data: BytesMut,
    },
    Completed,
    Rejected,
    Aborted,
}

/// Per-upload session state machine.
pub struct ImageAssembler<S> {
    store: Arc<RecordStore>,
    images: Arc<S>,
    max_bytes: usize,
    state: UploadState,
}

impl<S: ImageStore> ImageAssembler<S> {
    pub fn new(store: Arc<RecordStore>, images: Arc<S>) -> Self {
        Self::with_max_bytes(store, images, MAX_IMAGE_BYTES)
    }

    pub fn with_max_bytes(store: Arc<RecordStore>, images: Arc<S>, max_bytes: usize) -> Self {
        Self {
            store,
            images,
            max_bytes,
            state: UploadState::AwaitingInfo,
        }
    }

    /// Current phase of the session.
    pub fn phase(&self) -> UploadPhase {
        match self.state {
            UploadState::AwaitingInfo => UploadPhase::AwaitingInfo,
            UploadState::Accumulating { .. } => UploadPhase::Accumulating,
            UploadState::Completed => UploadPhase::Completed,
            UploadState::Rejected => UploadPhase::Rejected,
            UploadState::Aborted => UploadPhase::Aborted,
        }
    }

    /// Bytes accumulated so far.
    pub fn buffered_bytes(&self) -> usize {
        match &self.state {
            UploadState::Accumulating { data, .. } => data.len(),
            _ => 0,
        }
    }

    /// Handle the stream's info message.
    ///
    /// The target record must exist before any chunk is accepted; an unknown
    /// record rejects the session outright.
    pub fn handle_info(&mut self, info: ImageInfo) -> Result<(), UploadError> {
        match self.state {
            UploadState::AwaitingInfo => {
                debug!(
                    record_id = %info.record_id,
                    image_type = %info.image_type,
                    "received image info"
                );
                let Some(record) = self.store.find(&info.record_id) else {
                    self.state = UploadState::Rejected;
                    return Err(UploadError::RecordNotFound(info.record_id));
                };
                self.state = UploadState::Accumulating {
                    record_id: record.id,
                    image_type: info.image_type,
                    data: BytesMut::new(),
                };
                Ok(())
            }
            UploadState::Accumulating { .. } => {
                self.state = UploadState::Rejected;
                Err(UploadError::DuplicateInfo)
            }
            UploadState::Rejected => Ok(()),
            UploadState::Completed | UploadState::Aborted => Err(UploadError::Closed),
        }
    }

    /// Append one chunk to the accumulation buffer.
    ///
    /// Chunks arriving after the session was rejected are ignored without
    /// accumulating anything.
    pub fn handle_chunk(&mut self, chunk: Bytes) -> Result<(), UploadError> {
        match &mut self.state {
            UploadState::Accumulating { data, .. } => {
                let size = data.len() + chunk.len();
                if size > self.max_bytes {
                    warn!(size = size, max = self.max_bytes, "image is too large");
                    self.state = UploadState::Rejected;
                    return Err(UploadError::TooLarge {
                        size,
                        max: self.max_bytes,
                    });
                }
                data.extend_from_slice(&chunk);
                debug!(chunk_bytes = chunk.len(), total_bytes = size, "received image chunk");
                Ok(())
            }
            UploadState::AwaitingInfo => {
                self.state = UploadState::Rejected;
                Err(UploadError::MissingInfo)
            }
            UploadState::Rejected => Ok(()),
            UploadState::Completed | UploadState::Aborted => Err(UploadError::Closed),
        }
    }

    /// Persist the accumulated buffer on clean stream completion.
    pub async fn complete(&mut self) -> Result<UploadSummary, UploadError> {
        match std::mem::replace(&mut self.state, UploadState::Completed) {
            UploadState::Accumulating {
                record_id,
                image_type,
                data,
            } => {
                let size_bytes = data.len();
                let image_id = match self.images.save(&record_id, &image_type, data.freeze()).await
                {
                    Ok(id) => id,
                    Err(err) => {
                        self.state = UploadState::Rejected;
                        return Err(UploadError::Storage(err));
                    }
                };
                debug!(
                    record_id = %record_id,
                    image_id = %image_id,
                    size_bytes = size_bytes,
                    "image upload completed"
                );
                Ok(UploadSummary {
                    image_id,
                    size_bytes,
                })
            }
            UploadState::AwaitingInfo => {
                self.state = UploadState::Rejected;
                Err(UploadError::MissingInfo)
            }
            UploadState::Rejected => {
                self.state = UploadState::Rejected;
                Err(UploadError::Closed)
            }
            UploadState::Completed => Err(UploadError::Closed),
            UploadState::Aborted => {
                self.state = UploadState::Aborted;
                Err(UploadError::Closed)
            }
        }
    }

    /// Transport-level abort: discard everything, emit nothing.
    pub fn abort(&mut self) {
        if matches!(self.state, UploadState::Accumulating { .. }) {
            debug!(
                buffered_bytes = self.buffered_bytes(),
                "upload aborted, discarding buffer"
            );
        }
        self.state = UploadState::Aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_store::MemoryImageStore;
    use crate::record::{Cpu, Memory, MemoryUnit, Record};

    fn stored_record(store: &RecordStore, id: &str) {
        store
            .save(Record {
                id: id.to_string(),
                brand: "Apex".to_string(),
                name: "Apex Station 15".to_string(),
                cpu: Cpu {
                    brand: "AMD".to_string(),
                    name: "Ryzen 7 4800H".to_string(),
                    cores: 8,
                    threads: 16,
                    min_ghz: 2.9,
                    max_ghz: 4.2,
                },
                ram: Memory::new(16, MemoryUnit::Gigabyte),
                price_usd: 1800.0,
                release_year: 2020,
                weight_kg: 2.0,
                updated_at: chrono::Utc::now(),
            })
            .unwrap();
    }

    fn assembler() -> (ImageAssembler<MemoryImageStore>, Arc<MemoryImageStore>) {
        let store = Arc::new(RecordStore::new());
        stored_record(&store, "r1");
        let images = Arc::new(MemoryImageStore::new());
        (ImageAssembler::new(store, images.clone()), images)
    }

    fn info(record_id: &str) -> ImageInfo {
        ImageInfo {
            record_id: record_id.to_string(),
            image_type: "jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_accumulate_and_complete() {
        let (mut assembler, images) = assembler();

        assembler.handle_info(info("r1")).unwrap();
        assembler.handle_chunk(Bytes::from_static(b"hello ")).unwrap();
        assembler.handle_chunk(Bytes::from_static(b"world")).unwrap();
        assert_eq!(assembler.phase(), UploadPhase::Accumulating);
        assert_eq!(assembler.buffered_bytes(), 11);

        let summary = assembler.complete().await.unwrap();
        assert_eq!(summary.size_bytes, 11);
        assert_eq!(assembler.phase(), UploadPhase::Completed);

        let stored = images.get(&summary.image_id).unwrap();
        assert_eq!(stored.record_id, "r1");
        assert_eq!(stored.data, Bytes::from_static(b"hello world"));
    }

    #[test]
    fn test_unknown_record_rejects_before_any_chunk() {
        let (mut assembler, _images) = assembler();

        let err = assembler.handle_info(info("missing")).unwrap_err();
        assert!(matches!(err, UploadError::RecordNotFound(_)));
        assert_eq!(assembler.phase(), UploadPhase::Rejected);

        // Chunks for the dead session are ignored, not accumulated.
        assembler.handle_chunk(Bytes::from_static(b"data")).unwrap();
        assert_eq!(assembler.buffered_bytes(), 0);
    }

    #[test]
    fn test_chunk_before_info_rejected() {
        let (mut assembler, _images) = assembler();

        let err = assembler
            .handle_chunk(Bytes::from_static(b"data"))
            .unwrap_err();
        assert!(matches!(err, UploadError::MissingInfo));
        assert_eq!(assembler.phase(), UploadPhase::Rejected);
    }

    #[test]
    fn test_duplicate_info_rejected() {
        let (mut assembler, _images) = assembler();

        assembler.handle_info(info("r1")).unwrap();
        let err = assembler.handle_info(info("r1")).unwrap_err();
        assert!(matches!(err, UploadError::DuplicateInfo));
        assert_eq!(assembler.phase(), UploadPhase::Rejected);
    }

    #[tokio::test]
    async fn test_exactly_at_cap_accepted() {
        let store = Arc::new(RecordStore::new());
        stored_record(&store, "r1");
        let images = Arc::new(MemoryImageStore::new());
        let mut assembler = ImageAssembler::with_max_bytes(store, images, MAX_IMAGE_BYTES);

        assembler.handle_info(info("r1")).unwrap();
        let half = vec![0u8; MAX_IMAGE_BYTES / 2];
        assembler.handle_chunk(Bytes::from(half.clone())).unwrap();
        assembler.handle_chunk(Bytes::from(half)).unwrap();

        let summary = assembler.complete().await.unwrap();
        assert_eq!(summary.size_bytes, MAX_IMAGE_BYTES);
    }

    #[test]
    fn test_one_byte_over_cap_rejected_and_later_chunks_ignored() {
        let store = Arc::new(RecordStore::new());
        stored_record(&store, "r1");
        let images = Arc::new(MemoryImageStore::new());
        let mut assembler = ImageAssembler::with_max_bytes(store, images, MAX_IMAGE_BYTES);

        assembler.handle_info(info("r1")).unwrap();
        assembler
            .handle_chunk(Bytes::from(vec![0u8; MAX_IMAGE_BYTES]))
            .unwrap();

        let err = assembler
            .handle_chunk(Bytes::from_static(b"x"))
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::TooLarge {
                size,
                max
            } if size == MAX_IMAGE_BYTES + 1 && max == MAX_IMAGE_BYTES
        ));
        assert_eq!(assembler.phase(), UploadPhase::Rejected);

        assembler.handle_chunk(Bytes::from_static(b"more")).unwrap();
        assert_eq!(assembler.buffered_bytes(), 0);
    }

    #[tokio::test]
    async fn test_complete_without_info_fails() {
        let (mut assembler, images) = assembler();

        let err = assembler.complete().await.unwrap_err();
        assert!(matches!(err, UploadError::MissingInfo));
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn test_abort_discards_buffer() {
        let (mut assembler, images) = assembler();

        assembler.handle_info(info("r1")).unwrap();
        assembler.handle_chunk(Bytes::from_static(b"partial")).unwrap();
        assembler.abort();

        assert_eq!(assembler.phase(), UploadPhase::Aborted);
        assert_eq!(assembler.buffered_bytes(), 0);

        let err = assembler.complete().await.unwrap_err();
        assert!(matches!(err, UploadError::Closed));
        assert!(images.is_empty());
    }
}
