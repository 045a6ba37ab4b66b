//! Client connection tracking: registration, per-client outbound queues, and
//! RAII cleanup on disconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::messages::{AudioFormatSpec, PlayerV1Support};
use crate::protocol::AudioFormat;
use crate::protocol_constants::{CLIENT_OUTBOUND_QUEUE_CAPACITY, CONTROL_BACKPRESSURE_BUDGET_MS};
use crate::server::codec_impl::Encoder;

/// Per-client state held by the registry while a connection is active.
pub struct ClientEntry {
    pub client_id: String,
    pub name: String,
    pub player_support: PlayerV1Support,
    /// Bounded outbound audio queue. A full queue drops the new frame rather
    /// than blocking the server's tick.
    pub audio_tx: mpsc::Sender<Bytes>,
    /// Outbound JSON control message queue, separate from the audio queue so
    /// a backlogged audio fan-out never starves control messages.
    pub control_tx: mpsc::Sender<Bytes>,
    pub negotiated_format: Mutex<Option<AudioFormat>>,
    /// This client's negotiated encoder, set once at registration by the
    /// connection handler and read every tick by the streaming pipeline.
    pub encoder: Mutex<Option<Box<dyn Encoder>>>,
}

impl ClientEntry {
    /// Best-effort enqueue of an encoded audio frame. Drops and logs on a
    /// full queue rather than letting one slow client stall the tick.
    pub fn try_send_audio(&self, frame: Bytes) {
        if self.audio_tx.try_send(frame).is_err() {
            log::warn!(
                "[Registry] dropping audio frame for client {}: queue full",
                self.client_id
            );
        }
    }

    /// Enqueues a control frame, tolerating a momentarily full queue by
    /// waiting up to [`CONTROL_BACKPRESSURE_BUDGET_MS`] for room rather than
    /// dropping immediately the way the bulkier audio path does; control
    /// messages (volume, metadata, server/state) are comparatively rare and
    /// worth a short wait before giving up.
    pub async fn try_send_control(&self, frame: Bytes) {
        let budget = std::time::Duration::from_millis(CONTROL_BACKPRESSURE_BUDGET_MS);
        match tokio::time::timeout(budget, self.control_tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                log::warn!(
                    "[Registry] dropping control frame for client {}: channel closed",
                    self.client_id
                );
            }
            Err(_) => {
                log::warn!(
                    "[Registry] dropping control frame for client {}: queue still full after {}ms",
                    self.client_id,
                    CONTROL_BACKPRESSURE_BUDGET_MS
                );
            }
        }
    }

    /// Installs this client's negotiated format and encoder, called once by
    /// the connection handler right after negotiation completes.
    pub fn set_negotiated(&self, format: AudioFormat, encoder: Box<dyn Encoder>) {
        *self.negotiated_format.lock() = Some(format);
        *self.encoder.lock() = Some(encoder);
    }

    /// Encodes a block of samples with this client's negotiated encoder, if
    /// one has been installed yet. Returns `None` rather than erroring so a
    /// streamer tick can simply skip clients still mid-handshake.
    pub fn encode(&self, samples: &[crate::protocol::Sample]) -> Option<Result<Bytes>> {
        let mut guard = self.encoder.lock();
        guard.as_mut().map(|encoder| encoder.encode(samples))
    }
}

/// Tracks all connected clients, keyed by their self-reported `client_id`.
///
/// Connection IDs are caller-chosen (the wire protocol's `client_id`), unlike
/// a server-assigned connection counter, so registration can fail on a
/// duplicate ID rather than always succeeding.
pub struct ClientRegistry {
    clients: DashMap<String, Arc<ClientEntry>>,
    global_cancel: RwLock<CancellationToken>,
    registered_total: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            global_cancel: RwLock::new(CancellationToken::new()),
            registered_total: AtomicU64::new(0),
        }
    }

    /// Registers a new client, returning a guard that unregisters it on
    /// drop. Fails with [`Error::Protocol`] if `client_id` is already
    /// connected, per the wire protocol's duplicate-ID rejection rule.
    pub fn register(
        self: &Arc<Self>,
        client_id: String,
        name: String,
        player_support: PlayerV1Support,
    ) -> Result<(ClientGuard, mpsc::Receiver<Bytes>, mpsc::Receiver<Bytes>)> {
        if self.clients.contains_key(&client_id) {
            return Err(Error::Protocol(format!(
                "duplicate client_id '{client_id}'"
            )));
        }

        let (audio_tx, audio_rx) = mpsc::channel(CLIENT_OUTBOUND_QUEUE_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CLIENT_OUTBOUND_QUEUE_CAPACITY);

        let entry = Arc::new(ClientEntry {
            client_id: client_id.clone(),
            name,
            player_support,
            audio_tx,
            control_tx,
            negotiated_format: Mutex::new(None),
            encoder: Mutex::new(None),
        });

        self.clients.insert(client_id.clone(), Arc::clone(&entry));
        self.registered_total.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "[Registry] client {} registered ({} total connected)",
            client_id,
            self.clients.len()
        );

        let cancel_token = self.global_cancel.read().child_token();
        Ok((
            ClientGuard {
                client_id,
                registry: Arc::clone(self),
                cancel_token,
            },
            audio_rx,
            control_rx,
        ))
    }

    fn unregister(&self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            log::info!(
                "[Registry] client {} unregistered ({} remaining)",
                client_id,
                self.clients.len()
            );
        }
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<ClientEntry>> {
        self.clients.get(client_id).map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Snapshot of every currently registered client.
    pub fn all(&self) -> Vec<Arc<ClientEntry>> {
        self.clients.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Cancels every active connection's token and arms a fresh token for
    /// subsequent registrations.
    pub fn close_all(&self) -> usize {
        let count = self.clients.len();
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        count
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`ClientRegistry::register`]. Unregisters the
/// client when dropped, so disconnects (clean or abrupt) always clean up.
pub struct ClientGuard {
    client_id: String,
    registry: Arc<ClientRegistry>,
    cancel_token: CancellationToken,
}

impl ClientGuard {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.client_id);
    }
}

/// Converts a client's supported format list into the advertised spec form,
/// used by negotiation.
pub fn supported_formats(support: &PlayerV1Support) -> &[AudioFormatSpec] {
    &support.supported_formats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_support() -> PlayerV1Support {
        PlayerV1Support {
            supported_formats: vec![AudioFormatSpec {
                codec: "pcm".to_string(),
                channels: 2,
                sample_rate: 48_000,
                bit_depth: 24,
            }],
            buffer_capacity: 100,
            supported_commands: vec!["volume".to_string()],
        }
    }

    #[test]
    fn registers_and_unregisters_on_guard_drop() {
        let registry = Arc::new(ClientRegistry::new());
        {
            let (guard, _audio_rx, _control_rx) = registry
                .register("c1".to_string(), "Kitchen".to_string(), sample_support())
                .unwrap();
            assert_eq!(registry.len(), 1);
            assert_eq!(guard.client_id(), "c1");
        }
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn rejects_duplicate_client_id() {
        let registry = Arc::new(ClientRegistry::new());
        let (_guard, _a, _c) = registry
            .register("c1".to_string(), "Kitchen".to_string(), sample_support())
            .unwrap();
        let second = registry.register("c1".to_string(), "Other".to_string(), sample_support());
        assert!(second.is_err());
    }

    #[test]
    fn encode_is_none_until_negotiation_installs_an_encoder() {
        use crate::protocol::{Codec, Sample};
        use crate::server::codec_impl::PcmEncoder;

        let registry = Arc::new(ClientRegistry::new());
        let (_guard, _a, _c) = registry
            .register("c1".to_string(), "Kitchen".to_string(), sample_support())
            .unwrap();
        let entry = registry.get("c1").unwrap();

        assert!(entry.encode(&[Sample(0)]).is_none());

        let format = AudioFormat::new(Codec::Pcm, 48_000, 2, 24);
        entry.set_negotiated(format, Box::new(PcmEncoder::new(format)));

        let encoded = entry.encode(&[Sample(0), Sample(1)]).unwrap().unwrap();
        assert_eq!(encoded.len(), 6);
    }

    #[test]
    fn full_audio_queue_drops_without_blocking() {
        let registry = Arc::new(ClientRegistry::new());
        let (_guard, _audio_rx, _control_rx) = registry
            .register("c1".to_string(), "Kitchen".to_string(), sample_support())
            .unwrap();
        let entry = registry.get("c1").unwrap();
        for _ in 0..(CLIENT_OUTBOUND_QUEUE_CAPACITY + 5) {
            entry.try_send_audio(Bytes::from_static(b"x"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn control_send_waits_out_backpressure_then_succeeds_once_drained() {
        let registry = Arc::new(ClientRegistry::new());
        let (_guard, _audio_rx, mut control_rx) = registry
            .register("c1".to_string(), "Kitchen".to_string(), sample_support())
            .unwrap();
        let entry = registry.get("c1").unwrap();

        for _ in 0..CLIENT_OUTBOUND_QUEUE_CAPACITY {
            entry.try_send_control(Bytes::from_static(b"x")).await;
        }

        let entry2 = Arc::clone(&entry);
        let send = tokio::spawn(async move {
            entry2.try_send_control(Bytes::from_static(b"late")).await;
        });

        tokio::task::yield_now().await;
        let _ = control_rx.recv().await.unwrap();
        send.await.unwrap();

        let drained = control_rx.recv().await.unwrap();
        assert_eq!(drained, Bytes::from_static(b"late"));
    }

    #[tokio::test(start_paused = true)]
    async fn control_send_drops_after_backpressure_budget_expires() {
        let registry = Arc::new(ClientRegistry::new());
        let (_guard, _audio_rx, control_rx) = registry
            .register("c1".to_string(), "Kitchen".to_string(), sample_support())
            .unwrap();
        let entry = registry.get("c1").unwrap();

        for _ in 0..CLIENT_OUTBOUND_QUEUE_CAPACITY {
            entry.try_send_control(Bytes::from_static(b"x")).await;
        }

        // Queue stays full for the whole budget: this call should time out
        // and drop rather than hang.
        entry.try_send_control(Bytes::from_static(b"dropped")).await;
        drop(control_rx);
    }
}
