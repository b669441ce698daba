//! # Jitter Buffer for PCM Audio Samples
//!
//! Bounded FIFO of interleaved `f32` samples between the decode worker
//! (producer) and the platform audio callback (consumer).
//!
//! ## Design
//!
//! - **Capacity**: an audio duration, converted to samples for the stream's
//!   PCM spec, so water marks do not depend on the sample rate.
//! - **Backpressure**: [`push`](JitterBuffer::push) blocks on a condition
//!   variable while the buffer is full; [`close`](JitterBuffer::close) wakes it.
//! - **Realtime side**: [`pop`](JitterBuffer::pop) never blocks on space and
//!   holds the lock only for a copy.
//! - **Queries**: the fill level is mirrored in an atomic so the tick handler
//!   never touches the data lock.
//!
//! ## Usage
//!
//! ```rust
//! use core_playback::jitter_buffer::JitterBuffer;
//! use bridge_traits::PcmSpec;
//! use std::time::Duration;
//!
//! let buffer = JitterBuffer::new(1, PcmSpec::new(44_100, 2), Duration::from_secs(8));
//!
//! buffer.push(&[0.1, -0.1, 0.2, -0.2]);
//!
//! let mut output = [0.0f32; 1024];
//! let read = buffer.pop(&mut output);
//! assert_eq!(read, 4);
//! ```

use bridge_traits::playback::{PcmSource, PcmSpec};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

struct Ring {
    data: Vec<f32>,
    head: usize,
    len: usize,
}

impl Ring {
    fn write(&mut self, samples: &[f32]) -> usize {
        let capacity = self.data.len();
        let count = samples.len().min(capacity - self.len);
        let tail = (self.head + self.len) % capacity;

        let first = count.min(capacity - tail);
        self.data[tail..tail + first].copy_from_slice(&samples[..first]);
        self.data[..count - first].copy_from_slice(&samples[first..count]);

        self.len += count;
        count
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        let capacity = self.data.len();
        let count = out.len().min(self.len);

        let first = count.min(capacity - self.head);
        out[..first].copy_from_slice(&self.data[self.head..self.head + first]);
        out[first..count].copy_from_slice(&self.data[..count - first]);

        self.head = (self.head + count) % capacity;
        self.len -= count;
        count
    }
}

/// Bounded PCM queue for one connection generation.
pub struct JitterBuffer {
    generation: u64,
    spec: PcmSpec,
    capacity: usize,
    ring: Mutex<Ring>,
    space: Condvar,
    len: AtomicUsize,
    closed: AtomicBool,
}

impl JitterBuffer {
    /// Create a buffer holding at most `max_duration` of `spec` audio.
    pub fn new(generation: u64, spec: PcmSpec, max_duration: Duration) -> Self {
        let per_second = spec.samples_per_second().max(1);
        let capacity = ((max_duration.as_secs_f64() * per_second as f64) as usize).max(1);

        Self {
            generation,
            spec,
            capacity,
            ring: Mutex::new(Ring {
                data: vec![0.0; capacity],
                head: 0,
                len: 0,
            }),
            space: Condvar::new(),
            len: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Append samples, blocking while the buffer is full.
    ///
    /// Returns the number of samples accepted; fewer than `samples.len()`
    /// only if the buffer was closed meanwhile.
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut written = 0;
        let mut ring = self.ring.lock();

        while written < samples.len() {
            if self.closed.load(Ordering::Acquire) {
                break;
            }
            if ring.len == self.capacity {
                self.space.wait(&mut ring);
                continue;
            }

            written += ring.write(&samples[written..]);
            self.len.store(ring.len, Ordering::Release);
        }

        written
    }

    /// Remove up to `out.len()` samples from the front. Never waits for data.
    pub fn pop(&self, out: &mut [f32]) -> usize {
        if out.is_empty() || self.len.load(Ordering::Acquire) == 0 {
            return 0;
        }

        let read = {
            let mut ring = self.ring.lock();
            let read = ring.read(out);
            self.len.store(ring.len, Ordering::Release);
            read
        };

        if read > 0 {
            self.space.notify_all();
        }
        read
    }

    /// Drop buffered audio.
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.head = 0;
        ring.len = 0;
        self.len.store(0, Ordering::Release);
        drop(ring);
        self.space.notify_all();
    }

    /// Reject further pushes and wake a blocked producer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Taking the lock orders the flag with a producer about to wait.
        drop(self.ring.lock());
        self.space.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Connection generation this buffer belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn spec(&self) -> PcmSpec {
        self.spec
    }

    /// Buffered samples.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_space(&self) -> usize {
        self.capacity - self.len()
    }

    /// Fill ratio in `0.0..=1.0`.
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }

    /// Playback time held in the buffer.
    pub fn buffered_duration(&self) -> Duration {
        let per_second = self.spec.samples_per_second();
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.len() as f64 / per_second as f64)
    }
}

impl PcmSource for JitterBuffer {
    fn fill(&self, out: &mut [f32]) -> usize {
        self.pop(out)
    }
}

impl std::fmt::Debug for JitterBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitterBuffer")
            .field("generation", &self.generation)
            .field("spec", &self.spec)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
