//! Lock-free SPSC ring buffer between the cpal callback thread and the
//! segmented capture loop.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// ~10 seconds of 16 kHz mono audio.
const DEFAULT_CAPACITY: usize = 160_000;

/// Producer half, written from the cpal audio callback.
pub struct CaptureProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half, drained by the segment polling loop.
pub struct CaptureConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair.
pub fn capture_ring_buffer(capacity: Option<usize>) -> (CaptureProducer, CaptureConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let rb = HeapRb::<f32>::new(cap);
    let (prod, cons) = rb.split();
    (CaptureProducer { inner: prod }, CaptureConsumer { inner: cons })
}

impl CaptureProducer {
    /// Push samples, returning how many were written. When the buffer is
    /// full the newest audio is dropped; the polling loop catches up.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

// Safety: each half is only ever used from a single thread — the
// producer from the cpal callback thread, the consumer from the
// segmented capture task.
unsafe impl Send for CaptureProducer {}

impl CaptureConsumer {
    /// Number of samples currently readable.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Drain everything currently buffered.
    pub fn drain_all(&mut self) -> Vec<f32> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}

unsafe impl Send for CaptureConsumer {}
