//! Audio format description and sample representation.

use serde::{Deserialize, Serialize};

use super::messages::AudioFormatSpec;

/// Codec identifier for a negotiated or advertised audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Pcm,
    Opus,
    Flac,
}

impl Codec {
    /// Parses the wire codec string, returning `None` for anything unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pcm" => Some(Self::Pcm),
            "opus" => Some(Self::Opus),
            "flac" => Some(Self::Flac),
            _ => None,
        }
    }

    /// Returns the wire codec string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm => "pcm",
            Self::Opus => "opus",
            Self::Flac => "flac",
        }
    }
}

/// An audio format bound to a single stream session: codec, sample rate,
/// channel count, and bit depth. A session is bound to one `AudioFormat` from
/// `stream/start` to `stream/end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub codec: Codec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl AudioFormat {
    pub fn new(codec: Codec, sample_rate: u32, channels: u16, bit_depth: u16) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            bit_depth,
        }
    }

    /// Number of interleaved samples per channel for a tick of `duration_ms`.
    ///
    /// `chunk_samples = (sample_rate * duration_ms) / 1000`, per the server
    /// streaming pipeline's tick computation.
    #[inline]
    pub fn chunk_samples(&self, duration_ms: u64) -> usize {
        ((self.sample_rate as u64 * duration_ms) / 1000) as usize
    }

    /// Total interleaved samples (all channels) for a tick of `duration_ms`.
    #[inline]
    pub fn chunk_frame_count(&self, duration_ms: u64) -> usize {
        self.chunk_samples(duration_ms) * self.channels as usize
    }

    /// Byte length of a PCM payload carrying `duration_ms` of audio at this
    /// format, assuming the wire's fixed 24-bit/3-byte-per-sample packing
    /// (see `Sample::to_wire24`), regardless of `bit_depth`.
    #[inline]
    pub fn pcm_payload_bytes(&self, duration_ms: u64) -> usize {
        self.chunk_frame_count(duration_ms) * 3
    }

    /// Whether a client-advertised format spec matches this format exactly on
    /// codec, sample rate, and bit depth (channel count is not part of the
    /// exact-match test: the server's channel layout always wins).
    pub fn matches_spec(&self, spec: &AudioFormatSpec) -> bool {
        Codec::parse(&spec.codec) == Some(self.codec)
            && spec.sample_rate == self.sample_rate
            && spec.bit_depth as u16 == self.bit_depth
    }
}

/// A signed 24-bit sample carried in a 32-bit container, left-justified with
/// sign extension. Range `[-2^23, 2^23-1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sample(pub i32);

impl Sample {
    pub const MIN: i32 = -(1 << 23);
    pub const MAX: i32 = (1 << 23) - 1;

    /// Builds a `Sample` from a 16-bit value: `s24 = s16 << 8`.
    #[inline]
    pub fn from_i16(s: i16) -> Self {
        Self((s as i32) << 8)
    }

    /// Narrows back to 16-bit: `s16 = s24 >> 8`.
    #[inline]
    pub fn to_i16(self) -> i16 {
        (self.0 >> 8) as i16
    }

    /// Clamps to the valid 24-bit range.
    #[inline]
    pub fn clamp(self) -> Self {
        Self(self.0.clamp(Self::MIN, Self::MAX))
    }

    /// Applies a linear gain and clamps the result, used for player-side
    /// volume/mute application in the sample domain.
    #[inline]
    pub fn scale(self, gain: f32) -> Self {
        Self(((self.0 as f32) * gain).round() as i32).clamp()
    }

    /// Packs into the wire's 3-byte little-endian representation.
    #[inline]
    pub fn to_wire24(self) -> [u8; 3] {
        let bytes = self.0.to_le_bytes();
        [bytes[0], bytes[1], bytes[2]]
    }

    /// Unpacks from the wire's 3-byte little-endian representation, sign
    /// extending bit 23 into the top byte of the 32-bit container.
    #[inline]
    pub fn from_wire24(bytes: [u8; 3]) -> Self {
        let mut word = [bytes[0], bytes[1], bytes[2], 0];
        if bytes[2] & 0x80 != 0 {
            word[3] = 0xFF;
        }
        Self(i32::from_le_bytes(word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_16_bit_round_trips() {
        for s in [i16::MIN, -1, 0, 1, 1234, i16::MAX] {
            let sample = Sample::from_i16(s);
            assert_eq!(sample.to_i16(), s);
        }
    }

    #[test]
    fn sample_24_bit_wire_round_trips() {
        for s in [Sample::MIN, -1, 0, 1, 1_000_000, Sample::MAX] {
            let sample = Sample(s);
            let wire = sample.to_wire24();
            assert_eq!(Sample::from_wire24(wire), sample);
        }
    }

    #[test]
    fn scale_clamps_to_valid_range() {
        let loud = Sample(Sample::MAX);
        assert_eq!(loud.scale(2.0), Sample(Sample::MAX));
        let quiet = loud.scale(0.0);
        assert_eq!(quiet, Sample(0));
    }

    #[test]
    fn chunk_samples_matches_spec_arithmetic() {
        let fmt = AudioFormat::new(Codec::Pcm, 192_000, 2, 24);
        assert_eq!(fmt.chunk_samples(20), 3_840);
        assert_eq!(fmt.chunk_frame_count(20), 7_680);
        assert_eq!(fmt.pcm_payload_bytes(20), 23_040);
    }

    #[test]
    fn matches_spec_ignores_channel_count() {
        let fmt = AudioFormat::new(Codec::Pcm, 48_000, 2, 24);
        let spec = AudioFormatSpec {
            codec: "pcm".to_string(),
            channels: 1,
            sample_rate: 48_000,
            bit_depth: 24,
        };
        assert!(fmt.matches_spec(&spec));
    }
}
