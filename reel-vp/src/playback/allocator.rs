//! Default heap-backed buffer allocator
//!
//! Buffers are plain `Vec<u8>` allocations. An optional byte budget bounds the
//! total size of outstanding buffers (simulating limited video memory), and a
//! set of formats can be marked unsupported so that format degradation is
//! exercised the same way a real display backend would exercise it.

use super::interfaces::BufferAllocator;
use super::types::{FrameBuffer, PixelFormat};
use crate::error::AllocError;
use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, Default)]
pub struct HeapAllocator {
    budget: Option<usize>,
    unsupported: Vec<PixelFormat>,
    outstanding: Mutex<usize>,
}

impl HeapAllocator {
    /// Unlimited allocator supporting every format
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit outstanding buffer memory to `bytes`
    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.budget = Some(bytes);
        self
    }

    /// Refuse buffers in `format`
    pub fn without_format(mut self, format: PixelFormat) -> Self {
        if !self.unsupported.contains(&format) {
            self.unsupported.push(format);
        }
        self
    }

    /// Bytes currently handed out
    pub fn outstanding_bytes(&self) -> usize {
        *self.outstanding.lock()
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<FrameBuffer, AllocError> {
        if self.unsupported.contains(&format) {
            return Err(AllocError::UnsupportedFormat(format.to_string()));
        }

        let size = FrameBuffer::size_for(format, width, height);
        let mut outstanding = self.outstanding.lock();
        if let Some(budget) = self.budget {
            let available = budget.saturating_sub(*outstanding);
            if size > available {
                return Err(AllocError::OutOfMemory {
                    requested: size,
                    available,
                });
            }
        }
        *outstanding += size;
        trace!("Allocated {}x{} {} buffer ({} bytes)", width, height, format, size);

        Ok(FrameBuffer::new(format, width, height))
    }

    fn release(&self, buffer: FrameBuffer) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(buffer.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_limits_allocation() {
        let size = FrameBuffer::size_for(PixelFormat::Rgba8, 8, 8);
        let alloc = HeapAllocator::new().with_budget(size * 2);

        let a = alloc.allocate(PixelFormat::Rgba8, 8, 8).unwrap();
        let _b = alloc.allocate(PixelFormat::Rgba8, 8, 8).unwrap();
        let err = alloc.allocate(PixelFormat::Rgba8, 8, 8).unwrap_err();
        assert_eq!(
            err,
            AllocError::OutOfMemory {
                requested: size,
                available: 0
            }
        );

        alloc.release(a);
        assert_eq!(alloc.outstanding_bytes(), size);
        assert!(alloc.allocate(PixelFormat::Rgba8, 8, 8).is_ok());
    }

    #[test]
    fn test_unsupported_format() {
        let alloc = HeapAllocator::new().without_format(PixelFormat::Bgra8);
        assert!(matches!(
            alloc.allocate(PixelFormat::Bgra8, 4, 4),
            Err(AllocError::UnsupportedFormat(_))
        ));
        assert!(alloc.allocate(PixelFormat::Gray8, 4, 4).is_ok());
    }
}
