//! The server's 20 ms tick-driven streaming pipeline: read once from the
//! source, encode per client, frame, and fan out.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::protocol::codec::AudioChunk;
use crate::protocol::format::Sample;
use crate::protocol::AudioFormat;
use crate::protocol_constants::{LEAD_TIME_US, SERVER_TICK_MS};
use crate::server::registry::ClientRegistry;

/// External collaborator supplying interleaved PCM samples at a fixed rate.
/// Owned and driven exclusively by the streaming pipeline's tick loop.
pub trait AudioSource: Send {
    /// The source's native format. Checked once at pipeline start.
    fn format(&self) -> AudioFormat;

    /// Reads up to `count` interleaved samples (all channels) into `out`,
    /// returning the number of samples actually written. Short reads are
    /// acceptable; looping on EOF is the source's own policy.
    fn read(&mut self, out: &mut [Sample]) -> usize;
}

/// Monotonic microsecond clock the pipeline stamps chunks with. Abstracted
/// so tests can supply a deterministic fake instead of wall time.
pub trait LoopClock: Send + Sync {
    fn now_micros(&self) -> i64;
}

/// Default loop clock, monotonic from the moment it's constructed.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopClock for MonotonicClock {
    fn now_micros(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }
}

/// Owns the negotiated per-client encoder state and drives the tick loop.
pub struct StreamingPipeline {
    registry: Arc<ClientRegistry>,
    clock: Arc<dyn LoopClock>,
}

impl StreamingPipeline {
    pub fn new(registry: Arc<ClientRegistry>, clock: Arc<dyn LoopClock>) -> Self {
        Self { registry, clock }
    }

    /// Runs the tick loop until `cancel` fires. Each client's negotiated
    /// encoder lives in its own [`crate::server::registry::ClientEntry`],
    /// installed once by the connection handler after negotiation; this loop
    /// takes a fresh snapshot of the registry every tick, so a client
    /// registering or dropping mid-stream never requires external
    /// synchronization and a vanishing client simply falls out of the next
    /// snapshot instead of panicking mid-iteration.
    pub async fn run(&self, mut source: Box<dyn AudioSource>, cancel: CancellationToken) {
        let format = source.format();
        let chunk_samples = format.chunk_frame_count(SERVER_TICK_MS);
        let mut buf = vec![Sample::default(); chunk_samples];

        let mut ticker = interval(std::time::Duration::from_millis(SERVER_TICK_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "[Pipeline] starting stream: {} samples/tick at {}ms cadence",
            chunk_samples,
            SERVER_TICK_MS
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("[Pipeline] cancelled, stopping tick loop");
                    break;
                }
                _ = ticker.tick() => {
                    let read = source.read(&mut buf);
                    if read == 0 {
                        log::trace!("[Pipeline] short read from source: 0 samples");
                        continue;
                    }
                    let samples = &buf[..read];
                    let playback_ts = (self.clock.now_micros() + LEAD_TIME_US) as u64;

                    for entry in self.registry.all() {
                        match entry.encode(samples) {
                            Some(Ok(payload)) => {
                                let chunk = AudioChunk::new(playback_ts, payload);
                                entry.try_send_audio(chunk.encode());
                            }
                            Some(Err(err)) => {
                                log::warn!(
                                    "[Pipeline] encode error for {}: {err}",
                                    entry.client_id
                                );
                            }
                            None => {
                                // Still mid-handshake; no encoder installed yet.
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Codec;

    struct FixedClock(i64);
    impl LoopClock for FixedClock {
        fn now_micros(&self) -> i64 {
            self.0
        }
    }

    struct SilentSource {
        format: AudioFormat,
    }
    impl AudioSource for SilentSource {
        fn format(&self) -> AudioFormat {
            self.format
        }
        fn read(&mut self, out: &mut [Sample]) -> usize {
            for s in out.iter_mut() {
                *s = Sample(0);
            }
            out.len()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_stops_immediately_when_cancelled_up_front() {
        let registry = Arc::new(ClientRegistry::new());
        let clock: Arc<dyn LoopClock> = Arc::new(FixedClock(0));
        let pipeline = StreamingPipeline::new(Arc::clone(&registry), clock);
        let source: Box<dyn AudioSource> = Box::new(SilentSource {
            format: AudioFormat::new(Codec::Pcm, 48_000, 2, 24),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        pipeline.run(source, cancel).await;
    }

    #[tokio::test(start_paused = true)]
    async fn emits_a_frame_every_tick_to_a_negotiated_client() {
        use crate::protocol::messages::{AudioFormatSpec, PlayerV1Support};
        use crate::server::codec_impl::PcmEncoder;
        use tokio::time::{self, Duration};

        let registry = Arc::new(ClientRegistry::new());
        let support = PlayerV1Support {
            supported_formats: vec![AudioFormatSpec {
                codec: "pcm".to_string(),
                channels: 2,
                sample_rate: 48_000,
                bit_depth: 24,
            }],
            buffer_capacity: 100,
            supported_commands: vec![],
        };
        let (_guard, mut audio_rx, _control_rx) = registry
            .register("c1".to_string(), "Kitchen".to_string(), support)
            .unwrap();
        let entry = registry.get("c1").unwrap();
        let format = AudioFormat::new(Codec::Pcm, 48_000, 2, 24);
        entry.set_negotiated(format, Box::new(PcmEncoder::new(format)));

        let clock: Arc<dyn LoopClock> = Arc::new(MonotonicClock::new());
        let pipeline = StreamingPipeline::new(Arc::clone(&registry), clock);
        let source: Box<dyn AudioSource> = Box::new(SilentSource { format });
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            pipeline.run(source, run_cancel).await;
        });

        // Let the tick loop register its ticker before advancing paused time.
        tokio::task::yield_now().await;
        time::advance(Duration::from_millis(SERVER_TICK_MS)).await;
        tokio::task::yield_now().await;
        let first = audio_rx
            .recv()
            .await
            .expect("expected a frame after one tick");
        assert!(!first.is_empty());

        time::advance(Duration::from_millis(SERVER_TICK_MS)).await;
        tokio::task::yield_now().await;
        let second = audio_rx
            .recv()
            .await
            .expect("expected a second frame after another tick");
        assert_ne!(
            first, second,
            "consecutive ticks should stamp distinct playback timestamps"
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn tick_tolerates_a_client_with_no_encoder_installed_yet() {
        use crate::protocol::messages::{AudioFormatSpec, PlayerV1Support};

        let registry = Arc::new(ClientRegistry::new());
        let support = PlayerV1Support {
            supported_formats: vec![AudioFormatSpec {
                codec: "pcm".to_string(),
                channels: 2,
                sample_rate: 48_000,
                bit_depth: 24,
            }],
            buffer_capacity: 100,
            supported_commands: vec![],
        };
        let (_guard, _audio_rx, _control_rx) = registry
            .register("c1".to_string(), "Kitchen".to_string(), support)
            .unwrap();

        let mut source = SilentSource {
            format: AudioFormat::new(Codec::Pcm, 48_000, 2, 24),
        };
        let mut buf = vec![Sample::default(); 10];
        source.read(&mut buf);

        for entry in registry.all() {
            assert!(entry.encode(&buf).is_none());
        }
    }
}
