//! Catalog operation orchestration.
//!
//! One [`CatalogService`] is shared by every request task and binds a single
//! request (or stream) to the record store, the rating aggregator and an
//! upload session. The streamed operations consume a lazy inbound message
//! sequence and emit into a bounded outbound channel; suspension is waiting
//! for the next inbound message, never a blocking read.

use crate::error::ServiceError;
use crate::image_store::ImageStore;
use crate::rating::RatingAggregator;
use crate::record::{Filter, Record};
use crate::store::{RecordStore, StoreError};
use crate::upload::{ImageAssembler, UploadMessage, UploadSummary, MAX_IMAGE_BYTES};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One inbound rating of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRequest {
    pub record_id: String,
    pub score: f64,
}

/// Outbound response to one [`RateRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateResponse {
    pub record_id: String,
    /// Number of ratings applied to the record so far
    pub rated_count: u64,
    /// Mean of all applied scores
    pub average_score: f64,
}

/// Shared orchestrator for the four catalog operations.
pub struct CatalogService<S> {
    store: Arc<RecordStore>,
    ratings: Arc<RatingAggregator>,
    images: Arc<S>,
    max_image_bytes: usize,
}

impl<S: ImageStore> CatalogService<S> {
    pub fn new(
        store: Arc<RecordStore>,
        ratings: Arc<RatingAggregator>,
        images: Arc<S>,
    ) -> Self {
        Self {
            store,
            ratings,
            images,
            max_image_bytes: MAX_IMAGE_BYTES,
        }
    }

    /// Override the upload size cap.
    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    /// The shared record store.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Register a record and return its resolved ID.
    ///
    /// An empty ID gets a fresh v4 UUID; a non-empty ID must parse as a UUID
    /// and is stored in canonical form. The cancellation signal is checked
    /// once, after ID resolution and before the store is touched.
    #[instrument(skip(self, record, cancel), fields(record_id = %record.id))]
    pub fn create_record(
        &self,
        mut record: Record,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        let id = if record.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            Uuid::parse_str(&record.id)
                .map_err(|err| {
                    ServiceError::InvalidArgument(format!("record ID is not a valid UUID: {err}"))
                })?
                .to_string()
        };

        if cancel.is_cancelled() {
            info!(record_id = %id, "create request cancelled before save");
            return Err(ServiceError::Cancelled);
        }

        record.id = id.clone();
        self.store.save(record).map_err(|err| match err {
            StoreError::AlreadyExists => {
                ServiceError::AlreadyExists(format!("record ID {id} already exists"))
            }
        })?;

        info!(record_id = %id, "record created");
        metrics::counter!("catalog.records.created").increment(1);
        Ok(id)
    }

    /// Look up a single record.
    pub fn find_record(&self, id: &str) -> Option<Record> {
        self.store.find(id)
    }

    /// Stream every record matching `filter` into `out`.
    ///
    /// Completes successfully even when cancellation ended the scan early;
    /// early cancellation is not an error at this layer.
    pub async fn search_records(
        &self,
        filter: Filter,
        cancel: CancellationToken,
        out: mpsc::Sender<Record>,
    ) {
        info!(
            max_price_usd = filter.max_price_usd,
            min_cpu_cores = filter.min_cpu_cores,
            min_cpu_ghz = filter.min_cpu_ghz,
            "search started"
        );
        self.store.search(&cancel, &filter, &out).await;
        info!("search completed");
    }

    /// Drive one upload stream to its single summary or failure.
    ///
    /// An `Err` item is the transport's abort notification: the session is
    /// dropped and no summary is produced. Stream end completes the upload.
    pub async fn upload_image(
        &self,
        inbound: impl Stream<Item = Result<UploadMessage, ServiceError>>,
    ) -> Result<UploadSummary, ServiceError> {
        tokio::pin!(inbound);
        let mut assembler = ImageAssembler::with_max_bytes(
            self.store.clone(),
            self.images.clone(),
            self.max_image_bytes,
        );

        while let Some(item) = inbound.next().await {
            match item {
                Ok(UploadMessage::Info(info)) => assembler.handle_info(info)?,
                Ok(UploadMessage::Chunk(chunk)) => assembler.handle_chunk(chunk)?,
                Err(err) => {
                    warn!(error = %err, "upload stream aborted");
                    assembler.abort();
                    return Err(err);
                }
            }
        }

        let summary = assembler.complete().await?;
        info!(
            image_id = %summary.image_id,
            size_bytes = summary.size_bytes,
            "image uploaded"
        );
        metrics::counter!("catalog.images.uploaded").increment(1);
        Ok(summary)
    }

    /// Pair every inbound rating with one outbound response.
    ///
    /// Fail-fast: the first unknown record ID terminates the whole stream
    /// with `NotFound`, and nothing after it in the stream is processed.
    pub async fn rate_records(
        &self,
        inbound: impl Stream<Item = Result<RateRequest, ServiceError>>,
        out: mpsc::Sender<RateResponse>,
    ) -> Result<(), ServiceError> {
        tokio::pin!(inbound);

        while let Some(item) = inbound.next().await {
            let request = item?;
            info!(
                record_id = %request.record_id,
                score = request.score,
                "rating received"
            );

            if self.store.find(&request.record_id).is_none() {
                return Err(ServiceError::NotFound(format!(
                    "record {} does not exist",
                    request.record_id
                )));
            }

            let aggregate = self.ratings.add(&request.record_id, request.score);
            metrics::counter!("catalog.ratings.added").increment(1);
            let response = RateResponse {
                record_id: request.record_id,
                rated_count: aggregate.count,
                average_score: aggregate.average(),
            };
            if out.send(response).await.is_err() {
                // Consumer went away mid-stream; nothing left to report to.
                return Err(ServiceError::Cancelled);
            }
        }

        Ok(())
    }
}
