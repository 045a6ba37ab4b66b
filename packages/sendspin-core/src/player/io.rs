//! External collaborator boundaries for the player: the device output sink
//! and the codec-specific decoder.

use crate::error::Result;
use crate::protocol::format::Sample;
use crate::protocol::AudioFormat;

/// The host audio output device. Implementations own the platform-specific
/// device handle; this engine only calls `write`.
///
/// `write` MUST be blocking (or back-pressured) so that the wall-clock
/// pacing of playback follows the device's own sample clock; the scheduler
/// tick only decides *when* to release, the device absorbs residual skew.
pub trait Output: Send {
    /// Opens the device for the given format. Called once per `stream/start`.
    fn open(&mut self, format: AudioFormat) -> Result<()>;

    /// Writes interleaved samples, blocking until accepted by the device.
    fn write(&mut self, samples: &[Sample]) -> Result<()>;

    /// Closes the device. Called on `stream/end`.
    fn close(&mut self);
}

/// Decodes a codec-specific payload into interleaved PCM samples.
///
/// One decoder instance is bound to a single stream session's negotiated
/// format, constructed fresh on every `stream/start`.
pub trait Decoder: Send {
    /// Decodes one chunk's payload. A decode error drops the chunk and
    /// keeps the session alive, per the player failure semantics.
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<Sample>>;
}

/// Decoder for the wire's fixed 24-bit little-endian PCM packing.
pub struct PcmDecoder;

impl Decoder for PcmDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<Sample>> {
        use crate::error::Error;

        if payload.len() % 3 != 0 {
            return Err(Error::Codec(format!(
                "pcm payload length {} is not a multiple of 3",
                payload.len()
            )));
        }
        Ok(payload
            .chunks_exact(3)
            .map(|b| Sample::from_wire24([b[0], b[1], b[2]]))
            .collect())
    }
}

/// Applies volume and mute in the sample domain, clipping to the valid
/// 24-bit range. Mute overrides volume.
pub fn apply_gain(samples: &mut [Sample], volume: u8, muted: bool) {
    let gain = if muted {
        0.0
    } else {
        (volume.min(100) as f32) / 100.0
    };
    if gain == 1.0 {
        return;
    }
    for sample in samples.iter_mut() {
        *sample = sample.scale(gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_decoder_round_trips_encoded_samples() {
        let samples = vec![Sample(0), Sample(123_456), Sample(-1)];
        let mut payload = Vec::new();
        for s in &samples {
            payload.extend_from_slice(&s.to_wire24());
        }
        let mut decoder = PcmDecoder;
        let decoded = decoder.decode(&payload).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn pcm_decoder_rejects_misaligned_payload() {
        let mut decoder = PcmDecoder;
        assert!(decoder.decode(&[0u8, 1, 2, 3]).is_err());
    }

    #[test]
    fn mute_overrides_volume() {
        let mut samples = vec![Sample(Sample::MAX)];
        apply_gain(&mut samples, 100, true);
        assert_eq!(samples[0], Sample(0));
    }

    #[test]
    fn volume_scales_linearly() {
        let mut samples = vec![Sample(1000)];
        apply_gain(&mut samples, 50, false);
        assert_eq!(samples[0], Sample(500));
    }
}
