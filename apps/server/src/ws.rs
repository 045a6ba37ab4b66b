//! WebSocket connection handler: per-client handshake, negotiation, and the
//! reader/writer tasks that carry it for the rest of the connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;

use sendspin_core::protocol::messages::{
    ClientGoodbye, ClientState, ClientTime, ConnectionReason, GroupUpdate, Message, PlayerState,
    PlayerSyncState, ServerError, ServerHello, ServerState, ServerTime, StreamPlayerConfig,
    StreamStart,
};
use sendspin_core::protocol::{AudioFormat, Codec};
use sendspin_core::protocol_constants::{HANDSHAKE_TIMEOUT_SECS, WRITE_TIMEOUT_SECS};
use sendspin_core::server::{build_encoder, negotiate};
use sendspin_core::BootstrappedServices;

/// Axum handler for the sendspin WebSocket endpoint. Upgrades the connection
/// and hands it off to [`handle_connection`].
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(services): State<Arc<BootstrappedServices>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, services))
}

async fn handle_connection(socket: WebSocket, services: Arc<BootstrappedServices>) {
    let (mut sink, mut stream) = socket.split();

    let hello = match timeout(
        Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
        stream.next(),
    )
    .await
    {
        Ok(Some(Ok(WsMessage::Text(text)))) => match serde_json::from_str::<Message>(text.as_str())
        {
            Ok(Message::ClientHello(hello)) => hello,
            Ok(other) => {
                log::warn!("[Ws] expected client/hello first, got {other:?}");
                return;
            }
            Err(err) => {
                log::warn!("[Ws] malformed client/hello: {err}");
                return;
            }
        },
        Ok(Some(Ok(_))) => {
            log::warn!("[Ws] expected a text client/hello frame first");
            return;
        }
        Ok(Some(Err(err))) => {
            log::warn!("[Ws] transport error awaiting client/hello: {err}");
            return;
        }
        Ok(None) => {
            log::debug!("[Ws] connection closed before client/hello");
            return;
        }
        Err(_) => {
            log::warn!("[Ws] handshake timed out waiting for client/hello");
            return;
        }
    };

    if !hello.supported_roles.iter().any(|r| r == "player@v1") {
        log::warn!(
            "[Ws] client {} does not support player@v1, closing",
            hello.client_id
        );
        return;
    }
    let Some(player_support) = hello.player_v1_support.clone() else {
        log::warn!(
            "[Ws] client {} advertised player@v1 without player@v1_support",
            hello.client_id
        );
        return;
    };

    let registration = services.registry.register(
        hello.client_id.clone(),
        hello.name.clone(),
        player_support.clone(),
    );
    let (guard, mut audio_rx, mut control_rx) = match registration {
        Ok(parts) => parts,
        Err(err) => {
            log::warn!("[Ws] rejecting client {}: {err}", hello.client_id);
            let rejection = Message::ServerError(ServerError::duplicate_client_id(&hello.client_id));
            if let Ok(json) = serde_json::to_string(&rejection) {
                let _ = sink.send(WsMessage::Text(json.into())).await;
            }
            return;
        }
    };
    let client_id = guard.client_id().to_string();
    let cancel = guard.cancel_token().clone();

    let server_hello = Message::ServerHello(ServerHello {
        server_id: "sendspind".to_string(),
        name: "sendspind".to_string(),
        version: 1,
        active_roles: vec!["player@v1".to_string()],
        connection_reason: ConnectionReason::Playback,
    });
    if !send_json(&mut sink, &server_hello).await {
        return;
    }

    let entry = services.registry.get(&client_id).expect("just registered");
    let source_format = services.source_format;
    let mut negotiated = negotiate(source_format, &player_support.supported_formats);
    match build_encoder(negotiated) {
        Ok(encoder) => entry.set_negotiated(negotiated, encoder),
        Err(err) => {
            // The negotiated codec's encoder failed to construct (e.g. a bad
            // Opus bitrate). PCM is always constructible, so fall back to it
            // before giving up on the connection entirely.
            log::warn!(
                "[Ws] encoder for {} unavailable for client {client_id}, falling back to PCM: {err}",
                negotiated.codec.as_str()
            );
            let pcm_fallback = AudioFormat::new(
                Codec::Pcm,
                source_format.sample_rate,
                source_format.channels,
                24,
            );
            match build_encoder(pcm_fallback) {
                Ok(encoder) => {
                    negotiated = pcm_fallback;
                    entry.set_negotiated(negotiated, encoder);
                }
                Err(err) => {
                    log::warn!("[Ws] no encoder available for client {client_id}: {err}");
                    return;
                }
            }
        }
    }

    let stream_start = Message::StreamStart(StreamStart {
        player: Some(StreamPlayerConfig {
            codec: negotiated.codec.as_str().to_string(),
            sample_rate: negotiated.sample_rate,
            channels: negotiated.channels as u8,
            bit_depth: negotiated.bit_depth as u8,
            codec_header: None,
        }),
    });
    let server_state = Message::ServerState(ServerState::default());
    let group_update = Message::GroupUpdate(GroupUpdate::default());
    if !send_json(&mut sink, &stream_start).await
        || !send_json(&mut sink, &server_state).await
        || !send_json(&mut sink, &group_update).await
    {
        return;
    }

    log::info!(
        "[Ws] client {client_id} streaming: {}",
        describe(negotiated)
    );

    let writer_client_id = client_id.clone();
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            // Audio frames always win ties against control traffic.
            tokio::select! {
                biased;
                _ = writer_cancel.cancelled() => break,
                frame = audio_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let write = timeout(
                        Duration::from_secs(WRITE_TIMEOUT_SECS),
                        sink.send(WsMessage::Binary(frame)),
                    ).await;
                    if !matches!(write, Ok(Ok(()))) {
                        break;
                    }
                }
                frame = control_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let text = String::from_utf8_lossy(&frame).into_owned();
                    let write = timeout(
                        Duration::from_secs(WRITE_TIMEOUT_SECS),
                        sink.send(WsMessage::Text(text.into())),
                    ).await;
                    if !matches!(write, Ok(Ok(()))) {
                        break;
                    }
                }
            }
        }
        log::debug!("[Ws] writer task for {writer_client_id} exiting");
        let _ = sink.close().await;
    });

    reader_loop(&mut stream, &client_id, &entry, &cancel).await;

    cancel.cancel();
    writer.abort();
    drop(guard);
}

async fn reader_loop(
    stream: &mut (impl StreamExt<Item = Result<WsMessage, axum::Error>> + Unpin),
    client_id: &str,
    entry: &sendspin_core::server::ClientEntry,
    cancel: &tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => {
                let Some(frame) = frame else {
                    log::info!("[Ws] client {client_id} disconnected");
                    break;
                };
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<Message>(text.as_str()) {
                            Ok(msg) => {
                                if handle_client_message(msg, client_id, entry).await {
                                    break;
                                }
                            }
                            Err(err) => log::warn!("[Ws] malformed message from {client_id}: {err}"),
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        log::info!("[Ws] client {client_id} sent close");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        log::warn!("[Ws] transport error from {client_id}: {err}");
                        break;
                    }
                }
            }
        }
    }
}

/// Handles one decoded control message. Returns `true` when the connection
/// should end.
async fn handle_client_message(
    msg: Message,
    client_id: &str,
    entry: &sendspin_core::server::ClientEntry,
) -> bool {
    match msg {
        Message::ClientTime(ClientTime { client_transmitted }) => {
            let server_received = monotonic_now_micros();
            let server_transmitted = monotonic_now_micros();
            let reply = ServerTime {
                client_transmitted,
                server_received,
                server_transmitted,
            };
            entry
                .try_send_control(encode_text(&Message::ServerTime(reply)))
                .await;
            false
        }
        Message::ClientState(ClientState { player }) => {
            if let Some(PlayerState { state, .. }) = player {
                if state == PlayerSyncState::Error {
                    log::warn!("[Ws] client {client_id} reported a sync error state");
                }
            }
            false
        }
        Message::ClientGoodbye(ClientGoodbye { reason }) => {
            log::info!("[Ws] client {client_id} said goodbye: {reason:?}");
            true
        }
        other => {
            log::debug!("[Ws] ignoring unexpected message from {client_id}: {other:?}");
            false
        }
    }
}

async fn send_json(
    sink: &mut (impl SinkExt<WsMessage, Error = axum::Error> + Unpin),
    msg: &Message,
) -> bool {
    let Ok(json) = serde_json::to_string(msg) else {
        return false;
    };
    match timeout(
        Duration::from_secs(WRITE_TIMEOUT_SECS),
        sink.send(WsMessage::Text(json.into())),
    )
    .await
    {
        Ok(Ok(())) => true,
        _ => false,
    }
}

fn encode_text(msg: &Message) -> bytes::Bytes {
    serde_json::to_vec(msg).map(bytes::Bytes::from).unwrap_or_default()
}

fn monotonic_now_micros() -> i64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_micros() as i64
}

fn describe(format: sendspin_core::protocol::AudioFormat) -> String {
    format!(
        "{}/{}/{}ch/{}bit",
        format.codec.as_str(),
        format.sample_rate,
        format.channels,
        format.bit_depth
    )
}
