//! Presentation buffer pool with per-slot ownership handoff
//!
//! A fixed ring of 3..=64 slots shared by exactly two threads: the frame
//! generator (producer) and the frame displayer (consumer). Each slot is owned
//! by at most one thread at a time. Ownership is expressed by a [`SlotGuard`]
//! typed by role: only a `SlotGuard<Producer>` can write the buffer or record
//! frame metadata, a `SlotGuard<Consumer>` can only read. Dropping a guard
//! releases the slot and wakes the other thread.
//!
//! **Handoff protocol:** to move from slot `i` to `i + 1 mod N` a thread
//! acquires the new slot *before* dropping the old one, so it holds two
//! adjacent slots during the handoff and one at rest. The generator starts on
//! slot 0 and the displayer on slot N-1, so:
//! - the displayer never acquires a slot the generator has not finished
//! - the generator never laps the displayer
//! - with N >= 3 the two threads cannot deadlock
//!
//! **Lead bound:** a producer only advances once the consumer has taken every
//! frame it released earlier. At most one finished frame therefore waits for
//! the displayer, whatever N is; larger pools add headroom, not latency.
//!
//! **Shutdown:** [`BufferPool::close`] wakes every waiter; blocked and later
//! acquisitions return [`Error::PoolClosed`]. Waits run in bounded slices so
//! closure is observed promptly even without a wakeup.

use super::interfaces::BufferAllocator;
use super::types::{FrameBuffer, PixelFormat, SlotFrame};
use crate::config::BufferConfig;
use crate::error::{AllocError, Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Smallest pool the handoff protocol supports without deadlock
pub const MIN_BUFFERS: usize = 3;

/// Largest pool a request is clamped to
pub const MAX_BUFFERS: usize = 64;

/// Upper bound on a single condvar wait before closure is re-checked
const ACQUIRE_WAIT_SLICE: Duration = Duration::from_millis(20);

/// Which thread currently owns a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    Producer,
    Consumer,
}

mod sealed {
    pub trait Sealed {}
}

/// Slot ownership role
pub trait Role: sealed::Sealed {
    const HOLDER: Holder;
}

/// Generator role: may write the buffer
#[derive(Debug)]
pub struct Producer;

/// Displayer role: may only read the buffer
#[derive(Debug)]
pub struct Consumer;

impl sealed::Sealed for Producer {}
impl sealed::Sealed for Consumer {}

impl Role for Producer {
    const HOLDER: Holder = Holder::Producer;
}

impl Role for Consumer {
    const HOLDER: Holder = Holder::Consumer;
}

#[derive(Debug, Default)]
struct SlotState {
    owner: Option<Holder>,
    frame: Option<SlotFrame>,
    /// Released by the producer with a frame the consumer has not taken yet
    unread: bool,
}

#[derive(Debug)]
struct Slot {
    state: Mutex<SlotState>,
    released: Condvar,
    // Only locked by the slot's owner, so never contended
    buffer: Mutex<FrameBuffer>,
}

/// Ring of presentation buffers
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Slot>,
    format: PixelFormat,
    closed: AtomicBool,
    /// Number of slots with `unread` set
    unread: Mutex<usize>,
    drained: Condvar,
}

impl BufferPool {
    /// Allocate the pool, degrading through the configured formats
    ///
    /// For each format (preferred first, then fallbacks in order) buffers are
    /// allocated until the requested count or the first failure. The first
    /// format yielding at least [`MIN_BUFFERS`] buffers is used; partial sets
    /// are returned to the allocator. An unsupported *fallback* format is a
    /// configuration error unless `ignore_missing_fallback` is set.
    pub fn allocate(
        allocator: &dyn BufferAllocator,
        config: &BufferConfig,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let requested = config.count.min(MAX_BUFFERS);
        let mut candidates = vec![config.preferred_format];
        for format in &config.fallback_formats {
            if !candidates.contains(format) {
                candidates.push(*format);
            }
        }

        let mut best = 0;
        for (attempt, format) in candidates.into_iter().enumerate() {
            let is_fallback = attempt > 0;
            let mut buffers = Vec::with_capacity(requested);
            let mut unsupported = false;

            while buffers.len() < requested {
                match allocator.allocate(format, width, height) {
                    Ok(buffer) => buffers.push(buffer),
                    Err(AllocError::UnsupportedFormat(name)) => {
                        unsupported = true;
                        if is_fallback && !config.ignore_missing_fallback {
                            release_all(allocator, buffers);
                            return Err(Error::Config(format!(
                                "fallback pixel format {} not supported by allocator",
                                name
                            )));
                        }
                        break;
                    }
                    Err(e) => {
                        debug!("Buffer allocation stopped at {} ({})", buffers.len(), e);
                        break;
                    }
                }
            }

            if unsupported {
                warn!("Pixel format {} not supported, trying next format", format);
            } else if buffers.len() >= MIN_BUFFERS {
                if is_fallback {
                    warn!(
                        "Preferred format {} unavailable, degraded to {}",
                        config.preferred_format, format
                    );
                }
                if buffers.len() < requested {
                    warn!(
                        "Allocated {} of {} requested {} buffers",
                        buffers.len(),
                        requested,
                        format
                    );
                }
                info!(
                    "Buffer pool ready: {} x {}x{} {}",
                    buffers.len(),
                    width,
                    height,
                    format
                );
                return Ok(Self::from_buffers(buffers, format));
            } else {
                warn!(
                    "Only {} {} buffers available (need {})",
                    buffers.len(),
                    format,
                    MIN_BUFFERS
                );
            }

            best = best.max(buffers.len());
            release_all(allocator, buffers);
        }

        Err(Error::InsufficientBuffers {
            allocated: best,
            required: MIN_BUFFERS,
        })
    }

    fn from_buffers(buffers: Vec<FrameBuffer>, format: PixelFormat) -> Self {
        let slots = buffers
            .into_iter()
            .map(|buffer| Slot {
                state: Mutex::new(SlotState::default()),
                released: Condvar::new(),
                buffer: Mutex::new(buffer),
            })
            .collect();
        Self {
            slots,
            format,
            closed: AtomicBool::new(false),
            unread: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Format actually allocated (after degradation)
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Ring successor of `index`
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    /// Block until slot `index` is free, then own it as role `R`
    pub fn acquire<R: Role>(&self, index: usize) -> Result<SlotGuard<'_, R>> {
        let index = index % self.slots.len();
        let slot = &self.slots[index];
        let mut state = slot.state.lock();
        loop {
            if self.is_closed() {
                return Err(Error::PoolClosed);
            }
            if state.owner.is_none() {
                state.owner = Some(R::HOLDER);
                if R::HOLDER == Holder::Consumer && state.unread {
                    state.unread = false;
                    *self.unread.lock() -= 1;
                    self.drained.notify_all();
                }
                return Ok(SlotGuard {
                    pool: self,
                    index,
                    recorded: false,
                    _role: PhantomData,
                });
            }
            slot.released.wait_for(&mut state, ACQUIRE_WAIT_SLICE);
        }
    }

    /// Block until the consumer has taken every frame released so far
    fn wait_until_read(&self) -> Result<()> {
        let mut unread = self.unread.lock();
        loop {
            if self.is_closed() {
                return Err(Error::PoolClosed);
            }
            if *unread == 0 {
                return Ok(());
            }
            self.drained.wait_for(&mut unread, ACQUIRE_WAIT_SLICE);
        }
    }

    /// Finished frames released by the producer and not yet taken
    pub fn unread_frames(&self) -> usize {
        *self.unread.lock()
    }

    /// Wake every waiter; all further acquisitions fail with `PoolClosed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for slot in &self.slots {
            // Taking the state lock orders this wakeup after any waiter's check
            let _state = slot.state.lock();
            slot.released.notify_all();
        }
        let _unread = self.unread.lock();
        self.drained.notify_all();
        debug!("Buffer pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current owner of slot `index`
    pub fn owner(&self, index: usize) -> Option<Holder> {
        self.slots.get(index).and_then(|s| s.state.lock().owner)
    }

    /// Frame last recorded in slot `index`
    pub fn frame(&self, index: usize) -> Option<SlotFrame> {
        self.slots.get(index).and_then(|s| s.state.lock().frame)
    }

    /// Hand every buffer back to the allocator
    ///
    /// Only valid once no thread holds a slot (after the workers are joined).
    pub fn release_buffers(&self, allocator: &dyn BufferAllocator) {
        for slot in &self.slots {
            let buffer = std::mem::take(&mut *slot.buffer.lock());
            if !buffer.is_empty() {
                allocator.release(buffer);
            }
        }
    }
}

fn release_all(allocator: &dyn BufferAllocator, buffers: Vec<FrameBuffer>) {
    for buffer in buffers {
        allocator.release(buffer);
    }
}

/// Exclusive ownership of one slot; dropping it releases the slot
#[derive(Debug)]
pub struct SlotGuard<'a, R: Role> {
    pool: &'a BufferPool,
    index: usize,
    recorded: bool,
    _role: PhantomData<R>,
}

impl<'a, R: Role> SlotGuard<'a, R> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Frame last recorded in this slot
    pub fn frame(&self) -> Option<SlotFrame> {
        self.slot().state.lock().frame
    }

    /// Read access to the buffer
    pub fn buffer(&self) -> impl Deref<Target = FrameBuffer> + '_ {
        self.slot().buffer.lock()
    }

    /// Acquire the successor slot, then release this one
    ///
    /// A producer first waits until no earlier frame is left unread.
    pub fn advance(self) -> Result<SlotGuard<'a, R>> {
        let pool = self.pool;
        if R::HOLDER == Holder::Producer {
            pool.wait_until_read()?;
        }
        let next = pool.acquire::<R>(pool.next_index(self.index))?;
        drop(self);
        Ok(next)
    }

    fn slot(&self) -> &Slot {
        &self.pool.slots[self.index]
    }
}

impl<'a> SlotGuard<'a, Producer> {
    /// Write access to the buffer
    pub fn buffer_mut(&mut self) -> MutexGuard<'_, FrameBuffer> {
        self.slot().buffer.lock()
    }

    /// Record which frame this slot now holds
    pub fn record(&mut self, frame: SlotFrame) {
        self.slot().state.lock().frame = Some(frame);
        self.recorded = true;
    }
}

impl<R: Role> Drop for SlotGuard<'_, R> {
    fn drop(&mut self) {
        let slot = &self.pool.slots[self.index];
        let mut state = slot.state.lock();
        state.owner = None;
        if self.recorded && !state.unread {
            state.unread = true;
            *self.pool.unread.lock() += 1;
        }
        drop(state);
        slot.released.notify_all();
    }
}
