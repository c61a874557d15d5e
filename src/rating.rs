//! Per-record rating aggregation.
//!
//! Aggregates are kept in per-record cells so that concurrent ratings of
//! different records never contend: the outer map is only write-locked to
//! create a missing cell, and each update serializes on its own cell mutex.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Running (count, sum) pair for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatingAggregate {
    /// Number of ratings applied
    pub count: u64,
    /// Sum of all applied scores
    pub sum: f64,
}

impl RatingAggregate {
    /// Mean score. Meaningless (NaN) while `count` is zero; [`RatingAggregator::add`]
    /// never returns such an aggregate.
    pub fn average(&self) -> f64 {
        self.sum / self.count as f64
    }
}

type AggregateCell = Arc<Mutex<RatingAggregate>>;

/// Shared rating state across all records.
pub struct RatingAggregator {
    scores: RwLock<HashMap<String, AggregateCell>>,
}

impl RatingAggregator {
    pub fn new() -> Self {
        Self {
            scores: RwLock::new(HashMap::new()),
        }
    }

    /// Apply one score and return the updated aggregate as of this update.
    ///
    /// Adds for the same record serialize on that record's cell; adds for
    /// different records proceed independently.
    pub fn add(&self, id: &str, score: f64) -> RatingAggregate {
        let cell = self.cell(id);
        let mut aggregate = cell.lock();
        aggregate.count += 1;
        aggregate.sum += score;
        debug!(
            record_id = %id,
            score = score,
            count = aggregate.count,
            "rating applied"
        );
        *aggregate
    }

    /// Current aggregate for a record, if it has ever been rated.
    pub fn get(&self, id: &str) -> Option<RatingAggregate> {
        self.scores.read().get(id).map(|cell| *cell.lock())
    }

    fn cell(&self, id: &str) -> AggregateCell {
        if let Some(cell) = self.scores.read().get(id) {
            return cell.clone();
        }
        self.scores
            .write()
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

impl Default for RatingAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn test_add_accumulates_count_and_sum() {
        let ratings = RatingAggregator::new();

        let first = ratings.add("r1", 8.0);
        assert_eq!(first, RatingAggregate { count: 1, sum: 8.0 });

        let second = ratings.add("r1", 6.0);
        assert_eq!(second.count, 2);
        assert_eq!(second.sum, 14.0);
        assert_eq!(second.average(), 7.0);
    }

    #[test]
    fn test_records_aggregate_independently() {
        let ratings = RatingAggregator::new();
        ratings.add("r1", 10.0);
        ratings.add("r2", 4.0);

        assert_eq!(ratings.get("r1").unwrap().sum, 10.0);
        assert_eq!(ratings.get("r2").unwrap().sum, 4.0);
        assert!(ratings.get("r3").is_none());
    }

    #[test]
    fn test_concurrent_adds_lose_no_updates() {
        let ratings = Arc::new(RatingAggregator::new());
        let threads = 8;
        let adds_per_thread = 100;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let ratings = ratings.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..adds_per_thread {
                        ratings.add("contested", 1.0);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let total = (threads * adds_per_thread) as u64;
        let aggregate = ratings.get("contested").unwrap();
        assert_eq!(aggregate.count, total);
        assert_eq!(aggregate.sum, total as f64);
    }

    #[test]
    fn test_each_add_returns_consistent_snapshot() {
        let ratings = Arc::new(RatingAggregator::new());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ratings = ratings.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..50 {
                        let aggregate = ratings.add("contested", 2.0);
                        // Count and sum always move together.
                        assert_eq!(aggregate.sum, aggregate.count as f64 * 2.0);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
