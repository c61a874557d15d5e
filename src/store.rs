//! Concurrent in-memory record store.
//!
//! The map lives behind an [`ArcSwap`]: readers take lock-free snapshots and
//! writers swap in a structurally-shared updated map through a compare-and-swap
//! retry loop. A scan therefore never holds a lock, not even while its
//! consumer applies backpressure, and two writers only ever retry against
//! each other instead of blocking.

use crate::record::{Filter, Record};
use arc_swap::{ArcSwap, Guard};
use imbl::OrdMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors signaled by the record store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record ID already exists")]
    AlreadyExists,
}

/// Shared catalog record map.
pub struct RecordStore {
    records: ArcSwap<OrdMap<String, Record>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: ArcSwap::from_pointee(OrdMap::new()),
        }
    }

    /// Insert a record under its ID.
    ///
    /// The duplicate check and the insert are one atomic unit: of two
    /// concurrent saves with the same ID, exactly one succeeds and the other
    /// observes [`StoreError::AlreadyExists`].
    pub fn save(&self, record: Record) -> Result<(), StoreError> {
        let id = record.id.clone();
        let mut current = self.records.load_full();
        loop {
            if current.contains_key(&id) {
                return Err(StoreError::AlreadyExists);
            }
            let next = Arc::new(current.update(id.clone(), record.clone()));
            let previous = self.records.compare_and_swap(&current, next);
            if Arc::ptr_eq(&previous, &current) {
                return Ok(());
            }
            // Lost the race against another writer; retry on its map.
            current = Guard::into_inner(previous);
        }
    }

    /// Look up a record by ID, returning an independent copy.
    pub fn find(&self, id: &str) -> Option<Record> {
        self.records.load().get(id).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.load().is_empty()
    }

    /// Scan the store and send every record matching `filter` into `out`.
    ///
    /// The scan runs over one snapshot of the map in key order. `cancel` is
    /// polled before each candidate; once set, the scan stops without any
    /// error signal of its own. Each match is awaited into the bounded
    /// channel before the scan advances, so at most one match is in flight
    /// ahead of the consumer. A dropped receiver ends the scan the same
    /// silent way.
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
        out: &mpsc::Sender<Record>,
    ) {
        let snapshot = self.records.load_full();
        for (id, record) in snapshot.iter() {
            if cancel.is_cancelled() {
                debug!("search cancelled, stopping scan");
                return;
            }
            if !filter.matches(record) {
                continue;
            }
            debug!(record_id = %id, "record matched filter");
            metrics::counter!("catalog.search.matches").increment(1);
            if out.send(record.clone()).await.is_err() {
                debug!("search consumer went away, stopping scan");
                return;
            }
        }
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
