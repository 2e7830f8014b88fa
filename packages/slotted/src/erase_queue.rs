//! Deferred erase requests.
//!
//! Producers push from inside the parallel update pass; the registry drains
//! once per tick from a single thread. The primary queue is a lock-free
//! bounded ring. When it is full, requests spill into a mutex-guarded
//! fallback, waiting at most `fallback_timeout` for the lock. If that fails
//! too the request is dropped and logged, so a producer never stalls the tick
//! for longer than the timeout.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::config::RegistryConfig;
use crate::entity::EntityId;
use crate::error::{Error, Result};

/// A two-stage queue of entities waiting to be erased.
pub struct EraseQueue {
    primary: ArrayQueue<EntityId>,
    fallback: Mutex<VecDeque<EntityId>>,
    fallback_timeout: Duration,
    fallback_capacity: Option<usize>,
    dropped: AtomicUsize,
}

impl EraseQueue {
    /// Create a queue with the default configuration.
    pub fn new() -> EraseQueue {
        EraseQueue::with_config(&RegistryConfig::default())
    }

    pub fn with_config(config: &RegistryConfig) -> EraseQueue {
        EraseQueue {
            primary: ArrayQueue::new(config.erase_queue_capacity.max(1)),
            fallback: Mutex::new(VecDeque::new()),
            fallback_timeout: config.fallback_timeout(),
            fallback_capacity: config.fallback_capacity,
            dropped: AtomicUsize::new(0),
        }
    }

    /// Queue `entity` for erasure.
    ///
    /// Never blocks for longer than the fallback timeout. Returns
    /// `Error::QueueOverflow` if the request was dropped.
    pub fn push(&self, entity: EntityId) -> Result<()> {
        let entity = match self.primary.push(entity) {
            Ok(()) => return Ok(()),
            Err(entity) => entity,
        };

        warn!("primary erase queue full, diverting {} to fallback", entity);

        if let Some(mut fallback) = self.fallback.try_lock_for(self.fallback_timeout) {
            let full = self.fallback_capacity
                .map_or(false, |capacity| fallback.len() >= capacity);
            if !full {
                fallback.push_back(entity);
                return Ok(());
            }
        }

        self.dropped.fetch_add(1, Ordering::Relaxed);
        error!("erase queues overloaded, dropping erase request for {}", entity);
        Err(Error::QueueOverflow { entity })
    }

    /// Remove every queued request, primary queue first.
    pub fn drain(&self) -> Vec<EntityId> {
        let mut drained = Vec::with_capacity(self.primary.len());
        while let Some(entity) = self.primary.pop() {
            drained.push(entity);
        }

        drained.extend(self.fallback.lock().drain(..));
        drained
    }

    /// Discard every queued request.
    pub fn clear(&self) {
        while self.primary.pop().is_some() {}
        self.fallback.lock().clear();
    }

    /// The number of queued requests.
    pub fn len(&self) -> usize {
        self.primary.len() + self.fallback.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the primary queue.
    pub fn capacity(&self) -> usize {
        self.primary.capacity()
    }

    /// The number of requests dropped since creation.
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EraseQueue {
    fn default() -> Self {
        EraseQueue::new()
    }
}
