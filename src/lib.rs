//! Catalog Service
//!
//! In-memory device catalog service: clients register device records, search
//! them with a structured filter, attach images through a streamed chunked
//! upload, and submit numeric ratings aggregated per record.
//!
//! ## Features
//!
//! - **Lock-free record store**: readers scan snapshots of a
//!   structurally-shared map; writers compare-and-swap, so a stalled search
//!   consumer never blocks writers or other searches
//! - **Incremental search streaming**: matches flow to the consumer one at a
//!   time through a bounded channel, with cooperative cancellation polled
//!   before every candidate
//! - **Bounded chunked uploads**: a per-stream state machine enforces the
//!   info-then-chunks protocol and the image size cap
//! - **Contention-free ratings**: per-record (count, sum) cells, atomic
//!   add-and-read
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum)                 CatalogService              Shared state
//! ┌──────────────┐           ┌──────────────┐           ┌──────────────┐
//! │ POST records │──────────▶│ create       │──────────▶│ RecordStore  │
//! │ GET  search  │──────────▶│ search       │──────────▶│ (snapshots)  │
//! │ POST image   │──────────▶│ upload ──────┼──┐        └──────────────┘
//! │ POST ratings │──────────▶│ rate         │  │        ┌──────────────┐
//! └──────────────┘           └──────┬───────┘  │        │ Rating       │
//!        ▲                          │          │        │ Aggregator   │
//!        │      NDJSON / JSON       │          ▼        └──────────────┘
//!        └──────────────────────────┘   ┌──────────────┐
//!                                       │ ImageStore   │
//!                                       │ (disk)       │
//!                                       └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod image_store;
pub mod rating;
pub mod record;
pub mod service;
pub mod store;
pub mod upload;

pub use api::{AppState, CreateRecordResponse, SearchParams};
pub use config::Config;
pub use error::ServiceError;
pub use image_store::{DiskImageStore, ImageStore, ImageStoreError, MemoryImageStore};
pub use rating::{RatingAggregate, RatingAggregator};
pub use record::{Cpu, Filter, Memory, MemoryUnit, Record};
pub use service::{CatalogService, RateRequest, RateResponse};
pub use store::{RecordStore, StoreError};
pub use upload::{
    ImageAssembler, ImageInfo, UploadError, UploadMessage, UploadPhase, UploadSummary,
    MAX_IMAGE_BYTES,
};
