//! Transfer sizing
//!
//! Part sizes, read window and fan-out width shared by writers, readers and
//! bulk uploads, plus the arithmetic that maps a payload onto parts.

use serde::{Deserialize, Serialize};

/// Default part size: 64 MiB
pub const DEFAULT_PART_SIZE: u64 = 64 * 1024 * 1024;

/// Minimum part size: 5 MiB (S3 requirement, all parts but the last)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: usize = 10_000;

/// Default read window: 8 MiB
pub const DEFAULT_READ_WINDOW: u64 = 8 * 1024 * 1024;

/// Default number of concurrent part uploads for bulk writes
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Transfer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Write buffer capacity; every part except the last has this size
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Bytes fetched per ranged read
    #[serde(default = "default_read_window")]
    pub read_window: u64,

    /// Parts in flight during a bulk write
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_read_window() -> u64 {
    DEFAULT_READ_WINDOW
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            read_window: DEFAULT_READ_WINDOW,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl TransferOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        self
    }

    pub fn read_window(mut self, size: u64) -> Self {
        self.read_window = size.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Part size to use for a payload of known length
    ///
    /// Grows the configured part size when the payload would otherwise need
    /// more than [`MAX_PARTS`] parts.
    pub fn calculate_part_size(&self, total_size: u64) -> u64 {
        let part_size = self.part_size.max(1);
        let parts = total_size.div_ceil(part_size);

        if parts <= MAX_PARTS as u64 {
            part_size
        } else {
            total_size
                .div_ceil(MAX_PARTS as u64)
                .clamp(MIN_PART_SIZE, MAX_PART_SIZE)
        }
    }
}

/// Calculate number of parts for a payload
pub fn calculate_parts(total_size: u64, part_size: u64) -> usize {
    total_size.div_ceil(part_size.max(1)) as usize
}

/// Get the half-open byte range `[start, end)` covered by a part
pub fn part_byte_range(part_number: i32, part_size: u64, total_size: u64) -> (u64, u64) {
    let start = (part_number as u64 - 1) * part_size;
    let end = (start + part_size).min(total_size);
    (start, end)
}
