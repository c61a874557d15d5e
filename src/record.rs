//! Catalog record model and search filter.
//!
//! Records are plain owned values. `Clone` is the deep copy: nothing handed
//! out by the store can alias store-held state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device record in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record ID (UUID text). Empty on a create request means "assign one".
    #[serde(default)]
    pub id: String,
    /// Manufacturer brand
    pub brand: String,
    /// Model name
    pub name: String,
    /// CPU specification
    pub cpu: Cpu,
    /// Installed memory
    pub ram: Memory,
    /// List price in USD
    pub price_usd: f64,
    /// Year the model was released
    #[serde(default)]
    pub release_year: u32,
    /// Weight in kilograms
    #[serde(default)]
    pub weight_kg: f64,
    /// Last modification time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// CPU specification of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU brand
    pub brand: String,
    /// CPU model name
    pub name: String,
    /// Number of physical cores
    pub cores: u32,
    /// Number of hardware threads
    #[serde(default)]
    pub threads: u32,
    /// Base clock frequency in GHz
    pub min_ghz: f64,
    /// Boost clock frequency in GHz
    #[serde(default)]
    pub max_ghz: f64,
}

/// A memory size as magnitude plus unit.
///
/// Sizes with different units compare through [`Memory::to_bytes`]; the
/// struct itself has no derived ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    pub value: u64,
    pub unit: MemoryUnit,
}

/// Memory size unit, in 1024 multiples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryUnit {
    #[default]
    Byte,
    Kilobyte,
    Megabyte,
    Gigabyte,
    Terabyte,
}

impl Memory {
    pub fn new(value: u64, unit: MemoryUnit) -> Self {
        Self { value, unit }
    }

    /// Normalize to bytes. Saturates instead of overflowing on absurd sizes.
    pub fn to_bytes(&self) -> u64 {
        let multiplier: u64 = match self.unit {
            MemoryUnit::Byte => 1,
            MemoryUnit::Kilobyte => 1 << 10,
            MemoryUnit::Megabyte => 1 << 20,
            MemoryUnit::Gigabyte => 1 << 30,
            MemoryUnit::Terabyte => 1 << 40,
        };
        self.value.saturating_mul(multiplier)
    }
}

/// Caller-supplied search predicate. Immutable for the duration of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Maximum list price in USD (inclusive)
    pub max_price_usd: f64,
    /// Minimum number of CPU cores
    pub min_cpu_cores: u32,
    /// Minimum base clock frequency in GHz
    pub min_cpu_ghz: f64,
    /// Minimum installed memory
    pub min_ram: Memory,
}

impl Filter {
    /// Whether a record satisfies every bound of this filter.
    pub fn matches(&self, record: &Record) -> bool {
        record.price_usd <= self.max_price_usd
            && record.cpu.cores >= self.min_cpu_cores
            && record.cpu.min_ghz >= self.min_cpu_ghz
            && record.ram.to_bytes() >= self.min_ram.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record {
            id: String::new(),
            brand: "Apex".to_string(),
            name: "Apex Station 15".to_string(),
            cpu: Cpu {
                brand: "Intel".to_string(),
                name: "Core i7-9750H".to_string(),
                cores: 6,
                threads: 12,
                min_ghz: 3.0,
                max_ghz: 4.5,
            },
            ram: Memory::new(16, MemoryUnit::Gigabyte),
            price_usd: 2000.0,
            release_year: 2019,
            weight_kg: 2.2,
            updated_at: Utc::now(),
        }
    }

    fn sample_filter() -> Filter {
        Filter {
            max_price_usd: 3000.0,
            min_cpu_cores: 4,
            min_cpu_ghz: 2.5,
            min_ram: Memory::new(8, MemoryUnit::Gigabyte),
        }
    }

    #[test]
    fn test_to_bytes_unit_table() {
        assert_eq!(Memory::new(3, MemoryUnit::Byte).to_bytes(), 3);
        assert_eq!(Memory::new(2, MemoryUnit::Kilobyte).to_bytes(), 2048);
        assert_eq!(Memory::new(1, MemoryUnit::Megabyte).to_bytes(), 1 << 20);
        assert_eq!(Memory::new(8, MemoryUnit::Gigabyte).to_bytes(), 8 << 30);
        assert_eq!(Memory::new(1, MemoryUnit::Terabyte).to_bytes(), 1 << 40);
    }

    #[test]
    fn test_to_bytes_saturates() {
        let absurd = Memory::new(u64::MAX, MemoryUnit::Terabyte);
        assert_eq!(absurd.to_bytes(), u64::MAX);
    }

    #[test]
    fn test_filter_matches_qualifying_record() {
        assert!(sample_filter().matches(&sample_record()));
    }

    #[test]
    fn test_filter_rejects_price_above_maximum() {
        let mut record = sample_record();
        record.price_usd = 3500.0;
        assert!(!sample_filter().matches(&record));
    }

    #[test]
    fn test_filter_rejects_too_few_cores() {
        let mut record = sample_record();
        record.cpu.cores = 2;
        assert!(!sample_filter().matches(&record));
    }

    #[test]
    fn test_filter_rejects_slow_cpu() {
        let mut record = sample_record();
        record.cpu.min_ghz = 2.0;
        assert!(!sample_filter().matches(&record));
    }

    #[test]
    fn test_filter_compares_memory_across_units() {
        let mut record = sample_record();
        record.ram = Memory::new(8192, MemoryUnit::Megabyte);
        assert!(sample_filter().matches(&record));

        record.ram = Memory::new(4096, MemoryUnit::Megabyte);
        assert!(!sample_filter().matches(&record));
    }

    #[test]
    fn test_memory_unit_serde_names() {
        let json = serde_json::to_string(&MemoryUnit::Gigabyte).unwrap();
        assert_eq!(json, "\"gigabyte\"");

        let unit: MemoryUnit = serde_json::from_str("\"kilobyte\"").unwrap();
        assert_eq!(unit, MemoryUnit::Kilobyte);
    }
}
