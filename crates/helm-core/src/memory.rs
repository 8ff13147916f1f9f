//! Per-session directive log backing the system probes.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::next_timestamp;
use crate::compactor::estimate_tokens;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub input: String,
    pub output: String,
    pub ts: i64,
    pub tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub items: usize,
    pub total_tokens: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("memory capacity {0} exceeded")]
    CapacityExceeded(usize),
}

/// Append-only store of completed directives. Mutated only between
/// directives (single-in-flight processor); the lock just keeps the API
/// safe for concurrent probes.
pub struct MemoryStore {
    items: Mutex<Vec<MemoryItem>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MemoryItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(
        &self,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Result<(), MemoryError> {
        let input = input.into();
        let output = output.into();
        let tokens = estimate_tokens(&input).saturating_add(estimate_tokens(&output));

        let mut items = self.lock();
        if items.len() >= self.capacity {
            return Err(MemoryError::CapacityExceeded(self.capacity));
        }
        items.push(MemoryItem {
            input,
            output,
            ts: next_timestamp(),
            tokens,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> MemoryStats {
        let items = self.lock();
        MemoryStats {
            items: items.len(),
            total_tokens: items.iter().map(|item| u64::from(item.tokens)).sum(),
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn items(&self) -> Vec<MemoryItem> {
        self.lock().clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
