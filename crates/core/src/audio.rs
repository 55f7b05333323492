//! Speaker sampling and the audio hand-off to the host callback.
//!
//! The MicroBeast drives its speaker from the UART's `OUT2` modem-control
//! line. The engine samples that line once per output sample period and
//! pushes a square-wave value into a lock-free single-producer /
//! single-consumer ring:
//!
//! - **Producer** ([`AudioSampler`]) lives in the machine and runs on the
//!   tick thread. A full ring drops the new sample, never blocks.
//! - **Consumer** ([`AudioConsumer`]) moves to the host audio callback. An
//!   empty ring repeats the last delivered sample so the waveform keeps its
//!   phase instead of clicking to silence.
//!
//! An optional [`AudioCapture`] sink receives every delivered sample as raw
//! little-endian `i16` mono PCM.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::error::Result;
use crate::PS_PER_SECOND;

/// Amplitude of one speaker level at volume 1.
pub const SAMPLE_AMPLITUDE: i16 = 400;
/// UART modem-control bit wired to the speaker.
pub const MCR_OUT2: u8 = 0x08;

// ─── Capture sink ───────────────────────────────────────────────────────────

type Sink = Box<dyn Write + Send>;

/// Shared handle to the optional capture file. Clones refer to the same sink.
#[derive(Clone, Default)]
pub struct AudioCapture {
    sink: Arc<Mutex<Option<Sink>>>,
}

impl AudioCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.sink.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Start appending to `path`, creating it if needed.
    pub fn start(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.start_with(Box::new(BufWriter::new(file)));
        log::info!("audio capture started: {}", path.display());
        Ok(())
    }

    /// Start capturing into an arbitrary writer.
    pub fn start_with(&self, writer: Sink) {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = Some(writer);
        }
    }

    /// Stop capturing and flush whatever is buffered.
    pub fn stop(&self) -> Result<()> {
        let taken = match self.sink.lock() {
            Ok(mut sink) => sink.take(),
            Err(_) => None,
        };
        if let Some(mut w) = taken {
            w.flush()?;
            log::info!("audio capture stopped");
        }
        Ok(())
    }

    /// Append from the audio callback. Skips the block rather than waiting
    /// if the main thread holds the lock.
    fn append(&self, samples: &[i16]) {
        let Ok(mut guard) = self.sink.try_lock() else { return };
        let failed = match guard.as_mut() {
            Some(w) => samples.iter().try_for_each(|s| w.write_all(&s.to_le_bytes())).err(),
            None => return,
        };
        if let Some(e) = failed {
            log::warn!("audio capture write failed, closing: {e}");
            *guard = None;
        }
    }
}

// ─── Producer ───────────────────────────────────────────────────────────────

/// Tick-side half: turns the speaker level into samples at a fixed rate.
pub struct AudioSampler {
    producer: HeapProd<i16>,
    /// Sample period in picoseconds.
    pub period_ps: u64,
    last_sample_ps: u64,
    amplitude: i16,
    /// Samples discarded because the ring was full.
    pub dropped: u64,
}

impl AudioSampler {
    /// Take at most one sample if a full period has elapsed since the last.
    #[inline]
    pub fn sample(&mut self, now_ps: u64, level: bool) {
        if now_ps.saturating_sub(self.last_sample_ps) <= self.period_ps {
            return;
        }
        self.last_sample_ps += self.period_ps;
        let value = if level { self.amplitude } else { -self.amplitude };
        if self.producer.try_push(value).is_err() {
            self.dropped += 1;
        }
    }

    /// Samples waiting for the consumer.
    pub fn queued(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }
}

// ─── Consumer ───────────────────────────────────────────────────────────────

/// Callback-side half. Never blocks and never allocates.
pub struct AudioConsumer {
    consumer: HeapCons<i16>,
    last: i16,
    capture: AudioCapture,
}

impl AudioConsumer {
    /// Fill `out` from the ring, repeating the last sample on underrun.
    pub fn fill(&mut self, out: &mut [i16]) {
        let got = self.consumer.pop_slice(out);
        if got > 0 {
            self.last = out[got - 1];
            // Only drained samples are captured, never the underrun padding
            self.capture.append(&out[..got]);
        }
        out[got..].fill(self.last);
    }

    /// Samples ready to be drained.
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }
}

/// Build a connected sampler/consumer pair.
///
/// `start_ps` is the machine time the first sample period is measured from.
pub fn channel(
    sample_rate: u32,
    volume: i16,
    capacity: usize,
    start_ps: u64,
    capture: AudioCapture,
) -> (AudioSampler, AudioConsumer) {
    let (producer, consumer) = HeapRb::<i16>::new(capacity.max(1)).split();
    let sampler = AudioSampler {
        producer,
        period_ps: PS_PER_SECOND / sample_rate.max(1) as u64,
        last_sample_ps: start_ps,
        amplitude: SAMPLE_AMPLITUDE.saturating_mul(volume.max(0)),
        dropped: 0,
    };
    (sampler, AudioConsumer { consumer, last: 0, capture })
}

// ─── rodio adapter ──────────────────────────────────────────────────────────

/// Mono `rodio::Source` pulling from an [`AudioConsumer`] in fixed chunks.
#[cfg(feature = "rodio")]
pub struct RodioSource {
    consumer: AudioConsumer,
    chunk: Vec<i16>,
    pos: usize,
    sample_rate: u32,
}

#[cfg(feature = "rodio")]
impl RodioSource {
    pub fn new(consumer: AudioConsumer, sample_rate: u32, chunk: usize) -> Self {
        let chunk = vec![0; chunk.max(1)];
        let pos = chunk.len();
        RodioSource { consumer, chunk, pos, sample_rate }
    }
}

#[cfg(feature = "rodio")]
impl Iterator for RodioSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.pos >= self.chunk.len() {
            self.consumer.fill(&mut self.chunk);
            self.pos = 0;
        }
        let s = self.chunk[self.pos];
        self.pos += 1;
        Some(s)
    }
}

#[cfg(feature = "rodio")]
impl rodio::Source for RodioSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }
    fn channels(&self) -> u16 {
        1
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn total_duration(&self) -> Option<std::time::Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that shares its bytes with the test.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn pair(capacity: usize) -> (AudioSampler, AudioConsumer) {
        channel(1_000_000, 1, capacity, 0, AudioCapture::new())
    }

    #[test]
    fn test_one_sample_per_period() {
        let (mut s, c) = pair(64);
        assert_eq!(s.period_ps, 1_000_000);
        s.sample(1_000_000, true);
        assert_eq!(c.available(), 0);
        s.sample(1_000_001, true);
        assert_eq!(c.available(), 1);
        s.sample(1_000_002, true);
        assert_eq!(c.available(), 1);
        s.sample(2_000_001, false);
        assert_eq!(c.available(), 2);
    }

    #[test]
    fn test_level_maps_to_scaled_amplitude() {
        let (mut s, mut c) = channel(1_000_000, 3, 8, 0, AudioCapture::new());
        s.sample(1_000_001, true);
        s.sample(2_000_001, false);
        let mut out = [0i16; 2];
        c.fill(&mut out);
        assert_eq!(out, [1200, -1200]);
    }

    #[test]
    fn test_full_ring_drops_newest() {
        let (mut s, mut c) = pair(4);
        let mut t = 0;
        for i in 0..10 {
            t += 1_000_001;
            s.sample(t, i % 2 == 0);
        }
        assert_eq!(c.available(), 4);
        assert_eq!(s.queued(), 4);
        assert_eq!(s.dropped, 6);
        let mut out = [0i16; 4];
        c.fill(&mut out);
        assert_eq!(out, [400, -400, 400, -400]);
    }

    #[test]
    fn test_partial_drain_is_fifo() {
        let (mut s, mut c) = pair(16);
        let levels = [true, true, false, true, false, false];
        let mut t = 0;
        for &l in &levels {
            t += 1_000_001;
            s.sample(t, l);
        }
        let mut out = [0i16; 2];
        c.fill(&mut out);
        assert_eq!(out, [400, 400]);
        c.fill(&mut out);
        assert_eq!(out, [-400, 400]);
        assert_eq!(c.available(), 2);
    }

    #[test]
    fn test_underrun_repeats_last() {
        let (mut s, mut c) = pair(16);
        s.sample(1_000_001, false);
        let mut out = [0i16; 5];
        c.fill(&mut out);
        assert_eq!(out, [-400; 5]);
        c.fill(&mut out);
        assert_eq!(out, [-400; 5]);
    }

    #[test]
    fn test_capture_receives_delivered_samples() {
        let capture = AudioCapture::new();
        let (mut s, mut c) = channel(1_000_000, 1, 16, 0, capture.clone());
        let shared = Shared::default();
        capture.start_with(Box::new(shared.clone()));
        assert!(capture.is_active());
        s.sample(1_000_001, true);
        let mut out = [0i16; 2];
        c.fill(&mut out);
        capture.stop().unwrap();
        assert!(!capture.is_active());
        let bytes = shared.0.lock().unwrap().clone();
        assert_eq!(bytes, 400i16.to_le_bytes());
        assert_eq!(out, [400, 400]);

        // Nothing is recorded once stopped
        s.sample(2_000_001, false);
        c.fill(&mut out);
        assert_eq!(shared.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_capture_skips_underrun_padding() {
        let capture = AudioCapture::new();
        let (mut s, mut c) = channel(1_000_000, 1, 16, 0, capture.clone());
        let shared = Shared::default();
        capture.start_with(Box::new(shared.clone()));
        let mut out = [0i16; 4];
        c.fill(&mut out);
        assert!(shared.0.lock().unwrap().is_empty());
        s.sample(1_000_001, false);
        s.sample(2_000_001, true);
        c.fill(&mut out);
        assert_eq!(out, [-400, 400, 400, 400]);
        let bytes = shared.0.lock().unwrap().clone();
        let expected: Vec<u8> = [-400i16, 400].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_extreme_volume_saturates_without_overflow() {
        let (mut s, mut c) = channel(1_000_000, i16::MAX, 8, 0, AudioCapture::new());
        s.sample(1_000_001, false);
        s.sample(2_000_001, true);
        let mut out = [0i16; 2];
        c.fill(&mut out);
        assert_eq!(out, [-i16::MAX, i16::MAX]);

        let (mut s, mut c) = channel(1_000_000, -100, 8, 0, AudioCapture::new());
        s.sample(1_000_001, false);
        c.fill(&mut out[..1]);
        assert_eq!(out[0], 0);
    }
}
