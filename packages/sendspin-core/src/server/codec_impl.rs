//! Per-client audio encoders bound to a negotiated [`AudioFormat`].

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::format::Sample;
use crate::protocol::{AudioFormat, Codec};

/// Encodes one tick's worth of interleaved PCM samples into the wire payload
/// for a client's negotiated codec.
///
/// Implementations are stateful (an Opus encoder carries its own internal
/// state across calls) and are bound to exactly one client connection for
/// its lifetime.
pub trait Encoder: Send {
    /// Encodes `samples` (interleaved, one `i32`-per-24-bit-sample) into the
    /// wire payload for this encoder's format.
    fn encode(&mut self, samples: &[Sample]) -> Result<Bytes>;

    /// A short description for logging, e.g. `"pcm/48000/2ch"`.
    fn description(&self) -> String;
}

/// Packs samples into the wire's fixed 24-bit little-endian layout. Used
/// whenever the negotiated codec is `pcm`, regardless of the source's
/// original bit depth.
pub struct PcmEncoder {
    format: AudioFormat,
}

impl PcmEncoder {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl Encoder for PcmEncoder {
    fn encode(&mut self, samples: &[Sample]) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(samples.len() * 3);
        for sample in samples {
            buf.extend_from_slice(&sample.to_wire24());
        }
        Ok(buf.freeze())
    }

    fn description(&self) -> String {
        format!(
            "pcm/{}/{}ch/24bit",
            self.format.sample_rate, self.format.channels
        )
    }
}

/// Constructs the encoder for a negotiated format.
///
/// Opus is reserved as a negotiation outcome (see `server/negotiation.rs`)
/// but this engine carries no bundled Opus implementation; callers that
/// negotiate `opus` must supply their own [`Encoder`] via an external
/// codec plugin. Attempting to build one here fails with
/// [`Error::Codec`].
pub fn build_encoder(format: AudioFormat) -> Result<Box<dyn Encoder>> {
    match format.codec {
        Codec::Pcm => Ok(Box::new(PcmEncoder::new(format))),
        Codec::Opus => Err(Error::Codec(
            "opus encoding requires an external codec plugin".to_string(),
        )),
        Codec::Flac => Err(Error::Codec(
            "flac is not a supported streaming encoder target".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_encoder_packs_three_bytes_per_sample() {
        let format = AudioFormat::new(Codec::Pcm, 48_000, 2, 24);
        let mut encoder = PcmEncoder::new(format);
        let samples = vec![Sample(0), Sample(1), Sample(-1), Sample(Sample::MAX)];
        let encoded = encoder.encode(&samples).unwrap();
        assert_eq!(encoded.len(), samples.len() * 3);
    }

    #[test]
    fn build_encoder_rejects_opus_without_plugin() {
        let format = AudioFormat::new(Codec::Opus, 48_000, 2, 24);
        assert!(build_encoder(format).is_err());
    }

    #[test]
    fn build_encoder_builds_pcm() {
        let format = AudioFormat::new(Codec::Pcm, 44_100, 2, 24);
        assert!(build_encoder(format).is_ok());
    }
}
