//! Buffer sinks: the external targets pools mirror into.

use tracing::error;

use crate::pool::PoolLayout;

/// An external growable buffer which a pool keeps in sync.
///
/// `resize` reallocates; callers must assume the previous contents are gone
/// afterwards and rewrite everything they need.
pub trait BufferSink: Send {
    /// Reallocate the buffer to exactly `total_bytes`.
    fn resize(&mut self, total_bytes: usize);

    /// Overwrite `bytes.len()` bytes starting at `offset`.
    fn write(&mut self, offset: usize, bytes: &[u8]);
}

impl<S: BufferSink + ?Sized> BufferSink for Box<S> {
    fn resize(&mut self, total_bytes: usize) {
        (**self).resize(total_bytes)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) {
        (**self).write(offset, bytes)
    }
}

/// A `BufferSink` backed by host memory.
///
/// Resizing zeroes the whole buffer, the way a fresh GPU allocation would
/// hold nothing useful, so a pool which forgets to rewrite after a resize
/// shows up immediately.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    bytes: Vec<u8>,
    resize_count: usize,
    write_count: usize,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    /// The current buffer contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// How many times `resize` was called.
    pub fn resize_count(&self) -> usize {
        self.resize_count
    }

    /// How many times `write` was called.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// The record count stored in the header, if the layout has one.
    pub fn header_count(&self, layout: &PoolLayout) -> Option<u32> {
        if !layout.has_count() {
            return None;
        }

        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.bytes.get(0..4)?);
        Some(u32::from_le_bytes(raw))
    }

    /// The bytes of the record at `index`.
    pub fn record(&self, layout: &PoolLayout, index: usize) -> Option<&[u8]> {
        let offset = layout.record_offset(index);
        self.bytes.get(offset..offset + layout.record_bytes)
    }
}

impl BufferSink for MemorySink {
    fn resize(&mut self, total_bytes: usize) {
        self.bytes.clear();
        self.bytes.resize(total_bytes, 0);
        self.resize_count += 1;
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        if end > self.bytes.len() {
            error!("write of {} bytes at {} overruns sink of {} bytes", bytes.len(), offset, self.bytes.len());
            return;
        }

        self.bytes[offset..end].copy_from_slice(bytes);
        self.write_count += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_memory_sink() {
        let layout = PoolLayout::new(16, 8);
        let mut sink = MemorySink::new();
        sink.resize(layout.total_bytes(2));
        assert_eq!(sink.bytes().len(), 32);

        sink.write(0, &3u32.to_le_bytes());
        sink.write(layout.record_offset(1), &[7; 8]);
        assert_eq!(sink.header_count(&layout), Some(3));
        assert_eq!(sink.record(&layout, 1), Some(&[7u8; 8][..]));
        assert_eq!(sink.record(&layout, 2), None);

        // Overrunning writes are refused.
        sink.write(30, &[1; 4]);
        assert_eq!(sink.write_count(), 2);

        sink.resize(layout.total_bytes(1));
        assert_eq!(sink.resize_count(), 2);
        assert!(sink.bytes().iter().all(|b| *b == 0));
    }
}
