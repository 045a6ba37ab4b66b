//! Player-side protocol session: handshake, message routing, clock sync
//! ticker, and the scheduler release loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::callbacks::{PlayerCallbacks, SessionState};
use crate::error::{Error, Result};
use crate::protocol::codec::AudioChunk;
use crate::protocol::messages::{
    ClientHello, ClientTime, Message, PlayerState, PlayerSyncState,
};
use crate::protocol::AudioFormat;
use crate::protocol_constants::{
    CLOCK_LOST_AFTER_MS, CLOCK_SYNC_BURST_INTERVAL_MS, CLOCK_SYNC_BURST_ROUNDS,
    CLOCK_SYNC_STEADY_INTERVAL_MS, PLAYER_TICK_MS,
};
use crate::player::io::{apply_gain, Decoder, Output, PcmDecoder};
use crate::player::scheduler::{ReleaseDecision, ScheduledChunk, SchedulerQueue};
use crate::sync::ClockSync;
use crate::utils::now_micros;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Drives one player connection end to end: handshake, routing incoming
/// binary/text frames, ticking the clock sync and scheduler, and writing
/// decoded audio to the host's [`Output`].
pub struct PlayerSession {
    client_id: String,
    ws_tx: mpsc::UnboundedSender<WsMessage>,
    audio_rx: mpsc::UnboundedReceiver<AudioChunk>,
    message_rx: mpsc::UnboundedReceiver<Message>,
    clock: Arc<Mutex<ClockSync>>,
    callbacks: Arc<dyn PlayerCallbacks>,
}

impl PlayerSession {
    /// Connects, performs the `client/hello` / `server/hello` handshake,
    /// and spawns the background message router. Fails if the server
    /// rejects the handshake or closes before replying.
    pub async fn connect(
        url: &str,
        hello: ClientHello,
        callbacks: Arc<dyn PlayerCallbacks>,
    ) -> Result<Self> {
        let client_id = hello.client_id.clone();
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let hello_json = serde_json::to_string(&Message::ClientHello(hello))
            .map_err(|e| Error::Protocol(e.to_string()))?;
        write
            .send(WsMessage::Text(hello_json.into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        loop {
            match read.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let msg: Message = serde_json::from_str(text.as_str())
                        .map_err(|e| Error::Protocol(e.to_string()))?;
                    match msg {
                        Message::ServerHello(hello) => {
                            log::info!(
                                "[Player] connected to server {} ({})",
                                hello.name,
                                hello.server_id
                            );
                            break;
                        }
                        Message::ServerError(err) => {
                            return Err(Error::Protocol(format!(
                                "handshake rejected: {} ({})",
                                err.message, err.error
                            )));
                        }
                        other => {
                            return Err(Error::Protocol(format!(
                                "expected server/hello, got {other:?}"
                            )));
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(Error::Transport(
                        "connection closed before server/hello".to_string(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::Transport(e.to_string())),
            }
        }

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<WsMessage>();

        tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(Self::message_router(read, audio_tx, message_tx));

        Ok(Self {
            client_id,
            ws_tx,
            audio_rx,
            message_rx,
            clock: Arc::new(Mutex::new(ClockSync::new())),
            callbacks,
        })
    }

    async fn message_router(
        mut read: futures::stream::SplitStream<WsStream>,
        audio_tx: mpsc::UnboundedSender<AudioChunk>,
        message_tx: mpsc::UnboundedSender<Message>,
    ) {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(WsMessage::Binary(data)) => match AudioChunk::decode(&data) {
                    Ok(chunk) => {
                        let _ = audio_tx.send(chunk);
                    }
                    Err(e) => log::warn!("[Player] discarding malformed binary frame: {e}"),
                },
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<Message>(text.as_str()) {
                    Ok(msg) => {
                        let _ = message_tx.send(msg);
                    }
                    Err(e) => log::warn!("[Player] failed to parse text message: {e}"),
                },
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(_)) => {
                    log::info!("[Player] server closed connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("[Player] transport error: {e}");
                    break;
                }
            }
        }
    }

    fn send_json(&self, msg: Message) {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                let _ = self.ws_tx.send(WsMessage::Text(json.into()));
            }
            Err(e) => log::warn!("[Player] failed to serialize outgoing message: {e}"),
        }
    }

    /// Sends one `client/time` round and records `t1` for when the matching
    /// `server/time` arrives.
    fn request_time_sync(&self) -> i64 {
        let t1 = now_micros();
        self.send_json(Message::ClientTime(ClientTime {
            client_transmitted: t1,
        }));
        t1
    }

    /// Runs the session to completion: decodes incoming audio into the
    /// scheduler, releases due chunks to `output`, drives the clock-sync
    /// ticker, and routes control messages to `callbacks`.
    ///
    /// Returns when the transport closes or `format` changes mid-session in
    /// a way the caller must restart (`stream/end` with no matching
    /// `stream/start` yet observed is treated as session end).
    pub async fn run(
        mut self,
        mut decoder: Box<dyn Decoder>,
        mut output: Box<dyn Output>,
        format: AudioFormat,
    ) -> Result<()> {
        output.open(format)?;
        self.callbacks.on_state_change(SessionState::Handshaking);

        let mut scheduler = SchedulerQueue::new();
        let mut volume: u8 = 100;
        let mut muted = false;
        let mut lost_notified = false;

        let mut release_tick = interval(Duration::from_millis(PLAYER_TICK_MS));
        let mut sync_tick = interval(Duration::from_millis(CLOCK_SYNC_BURST_INTERVAL_MS));
        let mut sync_round: u32 = 0;
        self.request_time_sync();

        self.callbacks.on_state_change(SessionState::Buffering);

        loop {
            tokio::select! {
                Some(chunk) = self.audio_rx.recv() => {
                    let (synced, stale) = {
                        let clock = self.clock.lock();
                        (clock.is_synced(), clock.is_stale())
                    };
                    if should_drop_for_lost_sync(synced, stale) {
                        if !lost_notified {
                            self.callbacks.on_state_change(SessionState::Lost);
                            lost_notified = true;
                        }
                        log::debug!(
                            "[Player:{}] clock sync lost (no accepted sample in {}ms); dropping incoming chunk",
                            self.client_id,
                            CLOCK_LOST_AFTER_MS
                        );
                    } else {
                        lost_notified = false;
                        match decoder.decode(&chunk.payload) {
                            Ok(mut samples) => {
                                apply_gain(&mut samples, volume, muted);
                                let clock = self.clock.lock();
                                if let Some(play_at) = clock.server_to_local_instant(chunk.playback_ts_us as i64) {
                                    drop(clock);
                                    scheduler.push(ScheduledChunk { play_at_local: play_at, samples });
                                }
                            }
                            Err(e) => self.callbacks.on_error(&e),
                        }
                    }
                }
                Some(msg) = self.message_rx.recv() => {
                    if self.handle_control_message(msg, &mut scheduler, &mut volume, &mut muted).await {
                        break;
                    }
                }
                _ = release_tick.tick() => {
                    match scheduler.tick(Instant::now()) {
                        ReleaseDecision::Released(chunk) => {
                            if let Err(e) = output.write(&chunk.samples) {
                                self.callbacks.on_error(&e);
                            }
                        }
                        ReleaseDecision::Dropped => {
                            log::debug!("[Player:{}] dropped a late chunk", self.client_id);
                        }
                        _ => {}
                    }
                }
                _ = sync_tick.tick() => {
                    self.request_time_sync();
                    sync_round += 1;
                    if sync_round == CLOCK_SYNC_BURST_ROUNDS {
                        sync_tick = interval(Duration::from_millis(CLOCK_SYNC_STEADY_INTERVAL_MS));
                    }
                }
                else => break,
            }
        }

        output.close();
        self.callbacks.on_state_change(SessionState::Closed);
        Ok(())
    }

    /// Returns `true` if the session should terminate.
    async fn handle_control_message(
        &self,
        msg: Message,
        scheduler: &mut SchedulerQueue,
        volume: &mut u8,
        muted: &mut bool,
    ) -> bool {
        match msg {
            Message::ServerTime(time) => {
                let t4 = now_micros();
                let mut clock = self.clock.lock();
                let accepted = clock.update(
                    time.client_transmitted,
                    time.server_received,
                    time.server_transmitted,
                    t4,
                );
                drop(clock);
                if accepted {
                    self.callbacks.on_state_change(SessionState::Playing);
                }
            }
            Message::ServerState(state) => {
                if let Some(metadata) = state.metadata {
                    self.callbacks.on_metadata(&metadata);
                }
            }
            Message::ServerCommand(cmd) => {
                if let Some(player_cmd) = cmd.player {
                    match player_cmd.command.as_str() {
                        "volume" => {
                            if let Some(v) = player_cmd.volume {
                                *volume = v;
                            }
                        }
                        "mute" => {
                            if let Some(m) = player_cmd.mute {
                                *muted = m;
                            }
                        }
                        other => log::warn!("[Player] unknown command: {other}"),
                    }
                    self.send_json(Message::ClientState(crate::protocol::messages::ClientState {
                        player: Some(PlayerState {
                            state: PlayerSyncState::Synchronized,
                            volume: Some(*volume),
                            muted: Some(*muted),
                        }),
                    }));
                }
            }
            Message::StreamClear(_) => {
                scheduler.clear();
            }
            Message::StreamEnd(_) => {
                return true;
            }
            Message::GroupUpdate(_) | Message::StreamStart(_) => {}
            other => {
                log::trace!("[Player] ignoring unexpected message: {other:?}");
            }
        }
        false
    }
}

/// Whether an incoming chunk should be dropped rather than enqueued, given
/// the clock's current sync state. Once a client has synced at least once
/// and then goes stale for [`CLOCK_LOST_AFTER_MS`], incoming audio is
/// discarded rather than piling up behind a scheduler that can no longer
/// trust its timestamps; a clock that has never synced yet is handled by
/// `server_to_local_instant` returning `None`, not by this check.
fn should_drop_for_lost_sync(synced: bool, stale: bool) -> bool {
    synced && stale
}

#[cfg(test)]
impl PlayerSession {
    /// Builds a session directly from its channels, bypassing the real
    /// `connect_async` handshake so tests can drive `run()` against a fake
    /// transport.
    fn new_for_test(
        client_id: String,
        ws_tx: mpsc::UnboundedSender<WsMessage>,
        audio_rx: mpsc::UnboundedReceiver<AudioChunk>,
        message_rx: mpsc::UnboundedReceiver<Message>,
        callbacks: Arc<dyn PlayerCallbacks>,
    ) -> Self {
        Self {
            client_id,
            ws_tx,
            audio_rx,
            message_rx,
            clock: Arc::new(Mutex::new(ClockSync::new())),
            callbacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::BytesMut;
    use tokio::time;

    use super::*;
    use crate::protocol::format::Sample;
    use crate::protocol::messages::{MetadataState, ServerTime, StreamEnd};
    use crate::protocol::{AudioFormat, Codec};
    use crate::protocol_constants::STARTUP_BUFFER_TARGET;

    #[test]
    fn drops_audio_only_once_a_previously_synced_clock_goes_stale() {
        assert!(should_drop_for_lost_sync(true, true));
        assert!(!should_drop_for_lost_sync(true, false));
        assert!(!should_drop_for_lost_sync(false, true));
        assert!(!should_drop_for_lost_sync(false, false));
    }

    #[derive(Default)]
    struct RecordingCallbacks {
        states: parking_lot::Mutex<Vec<SessionState>>,
    }

    impl PlayerCallbacks for RecordingCallbacks {
        fn on_error(&self, _err: &Error) {}
        fn on_state_change(&self, state: SessionState) {
            self.states.lock().push(state);
        }
        fn on_metadata(&self, _metadata: &MetadataState) {}
    }

    struct CountingOutput {
        samples_written: Arc<AtomicUsize>,
    }

    impl Output for CountingOutput {
        fn open(&mut self, _format: AudioFormat) -> Result<()> {
            Ok(())
        }
        fn write(&mut self, samples: &[Sample]) -> Result<()> {
            self.samples_written
                .fetch_add(samples.len(), Ordering::SeqCst);
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn stereo_chunk(playback_ts_us: u64) -> AudioChunk {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Sample(1_000).to_wire24());
        buf.extend_from_slice(&Sample(-1_000).to_wire24());
        AudioChunk::new(playback_ts_us, buf.freeze())
    }

    async fn yield_many(times: usize) {
        for _ in 0..times {
            tokio::task::yield_now().await;
        }
    }

    /// Drives a session end to end with a fake transport: handshake (the
    /// initial clock sync), streaming (decode, schedule, release audio to
    /// the output), and a clean shutdown on `stream/end`.
    #[tokio::test(start_paused = true)]
    async fn run_releases_synced_audio_then_closes_on_stream_end() {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<WsMessage>();

        let callbacks = Arc::new(RecordingCallbacks::default());
        let session = PlayerSession::new_for_test(
            "test-client".to_string(),
            ws_tx,
            audio_rx,
            message_rx,
            callbacks.clone(),
        );

        let samples_written = Arc::new(AtomicUsize::new(0));
        let output: Box<dyn Output> = Box::new(CountingOutput {
            samples_written: samples_written.clone(),
        });
        let decoder: Box<dyn Decoder> = Box::new(PcmDecoder);
        let format = AudioFormat::new(Codec::Pcm, 48_000, 2, 24);

        let handle = tokio::spawn(session.run(decoder, output, format));
        yield_many(5).await;

        // The session requests a clock sync before entering its loop.
        let first = ws_rx.recv().await.expect("expected an outgoing client/time");
        let WsMessage::Text(text) = first else {
            panic!("expected a text frame");
        };
        let Message::ClientTime(ClientTime { client_transmitted }) =
            serde_json::from_str(text.as_str()).unwrap()
        else {
            panic!("expected client/time");
        };

        message_tx
            .send(Message::ServerTime(ServerTime {
                client_transmitted,
                server_received: 0,
                server_transmitted: 0,
            }))
            .unwrap();
        yield_many(5).await;
        assert!(callbacks.states.lock().contains(&SessionState::Playing));

        for _ in 0..STARTUP_BUFFER_TARGET {
            audio_tx.send(stereo_chunk(0)).unwrap();
        }
        yield_many(5).await;

        time::advance(Duration::from_millis(PLAYER_TICK_MS)).await;
        yield_many(5).await;
        assert!(
            samples_written.load(Ordering::SeqCst) > 0,
            "expected at least one chunk released to the output"
        );

        message_tx
            .send(Message::StreamEnd(StreamEnd::default()))
            .unwrap();
        yield_many(5).await;

        handle.await.unwrap().unwrap();
        assert!(callbacks.states.lock().contains(&SessionState::Closed));
    }
}
