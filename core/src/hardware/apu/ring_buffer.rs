use std::sync::Mutex;

/// Frames of buffering between the emulation thread and the audio thread.
pub const RING_CAPACITY_FRAMES: usize = 16_384;

/// A bounded stereo sample queue. The emulation thread pushes one frame per
/// output sample, an audio thread pulls batches; both sides take a short
/// mutex so interleaved left/right pairs can never tear.
#[derive(Debug)]
pub struct AudioRingBuffer {
    inner: Mutex<RingState>,
}

#[derive(Debug)]
struct RingState {
    samples: Vec<i16>,
    /// Frame index of the oldest element.
    head: usize,
    /// Buffered frame count.
    len: usize,
}

impl Default for AudioRingBuffer {
    fn default() -> Self {
        AudioRingBuffer {
            inner: Mutex::new(RingState {
                samples: vec![0; RING_CAPACITY_FRAMES * 2],
                head: 0,
                len: 0,
            }),
        }
    }
}

impl AudioRingBuffer {
    /// Append one stereo frame, dropping it when the consumer has fallen
    /// a full buffer behind.
    pub fn push_stereo(&self, left: i16, right: i16) {
        let mut ring = self.inner.lock().unwrap();

        if ring.len == RING_CAPACITY_FRAMES {
            return;
        }

        let slot = ((ring.head + ring.len) % RING_CAPACITY_FRAMES) * 2;
        ring.samples[slot] = left;
        ring.samples[slot + 1] = right;
        ring.len += 1;
    }

    /// Pop up to `max_frames` frames as interleaved left/right samples.
    pub fn pull_stereo(&self, max_frames: usize) -> Vec<i16> {
        let mut ring = self.inner.lock().unwrap();
        let frames = ring.len.min(max_frames);
        let mut output = Vec::with_capacity(frames * 2);

        for _ in 0..frames {
            let slot = ring.head * 2;
            output.push(ring.samples[slot]);
            output.push(ring.samples[slot + 1]);
            ring.head = (ring.head + 1) % RING_CAPACITY_FRAMES;
            ring.len -= 1;
        }

        output
    }

    /// Buffered frame count.
    pub fn available(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    /// Drop the oldest frames until at most `frames` remain, for hosts
    /// clamping their audio latency.
    pub fn trim_to(&self, frames: usize) {
        let mut ring = self.inner.lock().unwrap();
        while ring.len > frames {
            ring.head = (ring.head + 1) % RING_CAPACITY_FRAMES;
            ring.len -= 1;
        }
    }

    pub fn clear(&self) {
        let mut ring = self.inner.lock().unwrap();
        ring.head = 0;
        ring.len = 0;
    }
}
