//! Per-client codec negotiation, performed once at `player` role registration.

use crate::protocol::messages::AudioFormatSpec;
use crate::protocol::{AudioFormat, Codec};

/// Negotiates the codec the server will use to stream to a client, given the
/// source format and the client's advertised `supported_formats`, in
/// preference order. Pure and deterministic: the same inputs always produce
/// the same output.
pub fn negotiate(source: AudioFormat, client_formats: &[AudioFormatSpec]) -> AudioFormat {
    let exact_pcm = client_formats.iter().any(|f| {
        Codec::parse(&f.codec) == Some(Codec::Pcm)
            && f.sample_rate == source.sample_rate
            && f.bit_depth == 24
    });
    if exact_pcm {
        return AudioFormat::new(Codec::Pcm, source.sample_rate, source.channels, 24);
    }

    let wants_opus = source.sample_rate == 48_000
        && client_formats
            .iter()
            .any(|f| Codec::parse(&f.codec) == Some(Codec::Opus));
    if wants_opus {
        return AudioFormat::new(Codec::Opus, source.sample_rate, source.channels, 24);
    }

    // FLAC is a container, not a streaming codec here: degrade to PCM rather
    // than attempt to frame FLAC per-chunk.
    AudioFormat::new(Codec::Pcm, source.sample_rate, source.channels, 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(codec: &str, sample_rate: u32, bit_depth: u8) -> AudioFormatSpec {
        AudioFormatSpec {
            codec: codec.to_string(),
            channels: 2,
            sample_rate,
            bit_depth,
        }
    }

    #[test]
    fn prefers_exact_pcm_match() {
        let source = AudioFormat::new(Codec::Pcm, 48_000, 2, 24);
        let formats = vec![spec("opus", 48_000, 16), spec("pcm", 48_000, 24)];
        let chosen = negotiate(source, &formats);
        assert_eq!(chosen.codec, Codec::Pcm);
        assert_eq!(chosen.sample_rate, 48_000);
    }

    #[test]
    fn falls_back_to_opus_at_48khz_when_no_exact_pcm() {
        let source = AudioFormat::new(Codec::Pcm, 48_000, 2, 24);
        let formats = vec![spec("opus", 48_000, 16)];
        let chosen = negotiate(source, &formats);
        assert_eq!(chosen.codec, Codec::Opus);
    }

    #[test]
    fn does_not_choose_opus_off_48khz() {
        let source = AudioFormat::new(Codec::Pcm, 44_100, 2, 24);
        let formats = vec![spec("opus", 44_100, 16)];
        let chosen = negotiate(source, &formats);
        assert_eq!(chosen.codec, Codec::Pcm);
    }

    #[test]
    fn flac_preference_degrades_to_pcm() {
        let source = AudioFormat::new(Codec::Pcm, 96_000, 2, 24);
        let formats = vec![spec("flac", 96_000, 24)];
        let chosen = negotiate(source, &formats);
        assert_eq!(chosen.codec, Codec::Pcm);
    }

    #[test]
    fn defaults_to_pcm_with_no_matching_formats() {
        let source = AudioFormat::new(Codec::Pcm, 44_100, 2, 24);
        let formats = vec![spec("opus", 48_000, 16)];
        let chosen = negotiate(source, &formats);
        assert_eq!(chosen.codec, Codec::Pcm);
        assert_eq!(chosen.sample_rate, 44_100);
    }

    #[test]
    fn negotiation_is_deterministic() {
        let source = AudioFormat::new(Codec::Pcm, 48_000, 2, 24);
        let formats = vec![spec("opus", 48_000, 16)];
        let a = negotiate(source, &formats);
        let b = negotiate(source, &formats);
        assert_eq!(a, b);
    }
}
