//! Built-in audio sources for the standalone server.
//!
//! Real file/URL/stream decoding is an external collaborator the core engine
//! deliberately excludes (see the crate-level docs); this binary ships a
//! self-contained tone generator so the server is runnable without wiring in
//! a decoder.

use sendspin_core::protocol::format::Sample;
use sendspin_core::protocol::{AudioFormat, Codec};
use sendspin_core::server::AudioSource;

/// Generates a continuous sine tone at a fixed frequency, looping forever.
/// Used as the server's default source when no external decoder is wired in.
pub struct ToneSource {
    format: AudioFormat,
    frequency_hz: f64,
    phase: f64,
}

impl ToneSource {
    pub fn new(sample_rate: u32, channels: u16, frequency_hz: f64) -> Self {
        Self {
            format: AudioFormat::new(Codec::Pcm, sample_rate, channels, 24),
            frequency_hz,
            phase: 0.0,
        }
    }
}

impl AudioSource for ToneSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, out: &mut [Sample]) -> usize {
        let channels = self.format.channels as usize;
        let step = self.frequency_hz / self.format.sample_rate as f64;

        for frame in out.chunks_mut(channels) {
            let value = (self.phase * std::f64::consts::TAU).sin();
            let sample = Sample((value * Sample::MAX as f64 * 0.25) as i32);
            for s in frame.iter_mut() {
                *s = sample;
            }
            self.phase = (self.phase + step).fract();
        }

        out.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_source_fills_the_whole_buffer() {
        let mut source = ToneSource::new(48_000, 2, 440.0);
        let mut buf = vec![Sample::default(); 960];
        assert_eq!(source.read(&mut buf), 960);
    }

    #[test]
    fn tone_source_stays_within_the_valid_sample_range() {
        let mut source = ToneSource::new(48_000, 2, 440.0);
        let mut buf = vec![Sample::default(); 4800];
        source.read(&mut buf);
        for s in &buf {
            assert!(s.0 >= Sample::MIN && s.0 <= Sample::MAX);
        }
    }
}
