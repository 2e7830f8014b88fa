//! Dense synced pools.
//!
//! A `DenseSyncedPool` keeps every bound record of one type packed into a
//! list, and mirrors that list into a `BufferSink` behind a fixed header. It
//! is registered with the registry both as an update system, which notices
//! changed records and syncs them, and as an erase listener, which unbinds
//! records as their entities are destroyed.
//!
//! Only one pool may exist per record type in a registry: a record's binding
//! is an index into exactly one pool.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use crossbeam_queue::SegQueue;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, error, trace};

use crate::config::PoolConfig;
use crate::entity::Entity;
use crate::system::{EraseListener, TickContext, UpdateSystem};

pub use record::{Light, LightType, Pooled, Shockwave, SphereParticle, SyncedRecord};
pub use sink::{BufferSink, MemorySink};

mod record;
mod sink;

/// The byte layout of a pool's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLayout {
    pub header_bytes: usize,
    pub record_bytes: usize,
}

impl PoolLayout {
    pub fn new(header_bytes: usize, record_bytes: usize) -> PoolLayout {
        PoolLayout { header_bytes, record_bytes }
    }

    /// The layout used for records of type `T`.
    pub fn of<T: SyncedRecord>() -> PoolLayout {
        PoolLayout::new(T::HEADER_BYTES, T::RECORD_BYTES)
    }

    /// Returns true if the header is large enough to hold a record count.
    pub fn has_count(&self) -> bool {
        self.header_bytes >= 4
    }

    /// The byte offset of the record at `index`.
    pub fn record_offset(&self, index: usize) -> usize {
        self.header_bytes + index * self.record_bytes
    }

    /// The buffer size needed for `capacity` records.
    pub fn total_bytes(&self, capacity: usize) -> usize {
        self.record_offset(capacity)
    }

    /// Build a header block for `count` records.
    pub fn header(&self, count: usize) -> Vec<u8> {
        let mut header = vec![0; self.header_bytes];
        if self.has_count() {
            header[..4].copy_from_slice(&(count as u32).to_le_bytes());
        }
        header
    }
}

/// A serialized record waiting to be synced.
struct Pending {
    binding: Arc<AtomicI32>,
    bytes: Vec<u8>,
}

struct PoolState<S> {
    sink: S,
    bindings: Vec<Arc<AtomicI32>>,
    /// Host copy of the record storage, `bindings.len() * record_bytes` long.
    shadow: Vec<u8>,
    capacity: usize,
    header_count: usize,
}

impl<S: BufferSink> PoolState<S> {
    fn write_header(&mut self, layout: &PoolLayout) {
        let count = self.bindings.len();
        if layout.has_count() {
            self.sink.write(0, &layout.header(count));
        }
        self.header_count = count;
    }

    fn write_record(&mut self, layout: &PoolLayout, index: usize) {
        let start = index * layout.record_bytes;
        let end = start + layout.record_bytes;
        self.sink.write(layout.record_offset(index), &self.shadow[start..end]);
    }

    /// Remove the record at `index`, moving the last record into its slot.
    /// The header is left for the caller to rewrite.
    fn swap_remove(&mut self, layout: &PoolLayout, index: usize) {
        let last = self.bindings.len() - 1;
        let removed = self.bindings.swap_remove(index);
        removed.store(-1, Ordering::Release);

        if index != last {
            self.bindings[index].store(index as i32, Ordering::Release);
            let start = last * layout.record_bytes;
            self.shadow.copy_within(start..start + layout.record_bytes, index * layout.record_bytes);
            self.write_record(layout, index);
        }

        self.shadow.truncate(last * layout.record_bytes);
    }

    /// Remove records whose `Pooled` was dropped without being unbound, such
    /// as when an entity's slot is cleared or replaced. Returns the number
    /// removed.
    fn release_orphans(&mut self, layout: &PoolLayout) -> usize {
        let mut released = 0;
        let mut index = 0;
        while index < self.bindings.len() {
            if Arc::strong_count(&self.bindings[index]) == 1 {
                self.swap_remove(layout, index);
                released += 1;
            } else {
                index += 1;
            }
        }
        released
    }

    /// Reallocate the sink and rewrite everything.
    fn grow(&mut self, layout: &PoolLayout, growth_factor: f32) {
        let len = self.bindings.len();
        let old_capacity = self.capacity;
        self.capacity = (((len + 1) as f32 * growth_factor) as usize).max(len + 1);

        let total_bytes = layout.total_bytes(self.capacity);
        debug!("resizing pool from {} to {} records ({} bytes)", old_capacity, self.capacity, total_bytes);
        self.sink.resize(total_bytes);

        if layout.header_bytes > 0 {
            self.sink.write(0, &layout.header(len));
        }
        if !self.shadow.is_empty() {
            self.sink.write(layout.header_bytes, &self.shadow);
        }
        self.header_count = len;
    }
}

/// A packed, index-stable list of records of type `T`, mirrored into `S`.
pub struct DenseSyncedPool<T, S> {
    layout: PoolLayout,
    growth_factor: f32,
    pending: SegQueue<Pending>,
    state: Mutex<PoolState<S>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SyncedRecord, S: BufferSink> DenseSyncedPool<T, S> {
    /// Create a pool over `sink` with the default configuration.
    pub fn new(sink: S) -> DenseSyncedPool<T, S> {
        DenseSyncedPool::with_config(sink, &PoolConfig::default())
    }

    /// Create a pool over `sink`, allocating room for the configured
    /// initial capacity.
    pub fn with_config(mut sink: S, config: &PoolConfig) -> DenseSyncedPool<T, S> {
        let layout = PoolLayout::of::<T>();
        sink.resize(layout.total_bytes(config.initial_capacity));
        if layout.header_bytes > 0 {
            sink.write(0, &layout.header(0));
        }

        DenseSyncedPool {
            layout,
            growth_factor: config.growth_factor,
            pending: SegQueue::new(),
            state: Mutex::new(PoolState {
                sink,
                bindings: Vec::new(),
                shadow: Vec::new(),
                capacity: config.initial_capacity,
                header_count: 0,
            }),
            _marker: PhantomData,
        }
    }

    pub fn layout(&self) -> PoolLayout {
        self.layout
    }

    /// The number of bound records.
    pub fn len(&self) -> usize {
        self.state.lock().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of records the sink currently has room for.
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Lock the pool and access its sink, for example to bind it for drawing.
    pub fn sink(&self) -> MappedMutexGuard<'_, S> {
        MutexGuard::map(self.state.lock(), |state| &mut state.sink)
    }

    /// Bind newly seen records and write changed ones to the sink.
    ///
    /// Records whose `Pooled` has been dropped while still bound are removed
    /// first, as though their entity had been erased.
    ///
    /// This runs from `on_done`, after the parallel pass which queued the
    /// changes has finished.
    pub fn sync(&self) {
        let layout = self.layout;
        let mut state = self.state.lock();
        let mut changed = Vec::new();

        let released = state.release_orphans(&layout);
        if released > 0 {
            debug!("released {} pool records whose owners were dropped while bound", released);
        }

        while let Some(Pending { binding, bytes }) = self.pending.pop() {
            let index = match binding.load(Ordering::Acquire) {
                index if index >= 0 => index as usize,
                _ => {
                    // The owning component was dropped before it was ever bound.
                    if Arc::strong_count(&binding) == 1 {
                        continue;
                    }

                    let index = state.bindings.len();
                    binding.store(index as i32, Ordering::Release);
                    state.bindings.push(binding);
                    state.shadow.resize((index + 1) * layout.record_bytes, 0);
                    index
                }
            };

            let start = index * layout.record_bytes;
            state.shadow[start..start + layout.record_bytes].copy_from_slice(&bytes);
            changed.push(index);
        }

        trace!("pool sync: {} changed, {} bound", changed.len(), state.bindings.len());

        if state.bindings.len() > state.capacity {
            state.grow(&layout, self.growth_factor);
        } else {
            for index in changed {
                state.write_record(&layout, index);
            }

            if state.header_count != state.bindings.len() {
                state.write_header(&layout);
            }
        }

        debug_assert!(check_bindings(&state.bindings));
    }

    /// Remove `pooled` from the pool, moving the last record into its slot.
    pub fn unbind(&self, pooled: &Pooled<T>) {
        let index = match pooled.manager_index() {
            Some(index) => index,
            None => return,
        };

        let layout = self.layout;
        let mut state = self.state.lock();
        let len = state.bindings.len();
        if index >= len {
            error!("tried to unbind pool record {}, but only {} are bound", index, len);
            return;
        }

        state.swap_remove(&layout, index);
        state.write_header(&layout);

        debug_assert!(check_bindings(&state.bindings));
    }

    /// Check that every bound record's index matches its position.
    pub fn check_invariants(&self) -> bool {
        let state = self.state.lock();
        check_bindings(&state.bindings)
            && state.shadow.len() == state.bindings.len() * self.layout.record_bytes
    }
}

fn check_bindings(bindings: &[Arc<AtomicI32>]) -> bool {
    bindings.iter()
        .enumerate()
        .all(|(i, b)| b.load(Ordering::Acquire) == i as i32)
}

impl<T: SyncedRecord, S: BufferSink> UpdateSystem for DenseSyncedPool<T, S> {
    fn is_target(&self, entity: &Entity) -> bool {
        match (T::component(entity), entity.transform.as_ref()) {
            (Some(pooled), Some(transform)) => pooled.needs_sync(transform),
            _ => false,
        }
    }

    fn apply(&self, entity: &mut Entity, _ctx: &TickContext<'_>) {
        if let Some((pooled, transform)) = T::split_mut(entity) {
            let mut bytes = vec![0; T::RECORD_BYTES];
            pooled.value().write(transform, &mut bytes);
            pooled.mark_synced(transform.change_id());
            self.pending.push(Pending {
                binding: pooled.binding().clone(),
                bytes,
            });
        }
    }

    fn on_done(&self) {
        self.sync();
    }
}

impl<T: SyncedRecord, S: BufferSink> EraseListener for DenseSyncedPool<T, S> {
    fn on_erase(&self, entity: &Entity) {
        if let Some(pooled) = T::component(entity) {
            self.unbind(pooled);
        }
    }
}
