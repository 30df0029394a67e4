//! Per-call bridge between a telephony media stream and a speech session
//!
//! One WebSocket connection is one call. After the upgrade the dialed number
//! is resolved through the client directory; unknown numbers are closed with
//! code 4004 before anything else is created. Otherwise the call runs three
//! flows until either side ends it:
//!
//! - ingest: telephony frames → transcoder uplink → speech session
//! - drain: speech session output → transcoder downlink → telephony frames
//! - writer: serializes every outbound frame onto the socket
//!
//! Teardown always shuts the session down, aborts the background tasks and
//! closes the socket.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use base64::prelude::*;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::realtime::SpeechSessionState;
use crate::core::session::{SpeechSessionWorker, WorkerOutput};
use crate::core::transcoder::{AudioTranscoder, decode_base64_payload};
use crate::state::AppState;

use super::messages::{
    CLOSE_CLIENT_NOT_FOUND, CLOSE_NORMAL, CLOSE_VOICE_SERVER_ERROR, EXPECTED_ENCODING,
    OutgoingMedia, TelephonyEvent, TelephonyOutgoing, TelephonyRoute,
};

/// Outbound frame queue depth
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Time allowed for the close frame to reach the socket at teardown
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Telephony media-stream WebSocket handler
///
/// `GET /ws/audio/{sip_number}` upgrades to a bidirectional media stream for
/// one call to `sip_number`.
pub async fn telephony_handler(
    ws: WebSocketUpgrade,
    Path(sip_number): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(sip_number = %sip_number, "Telephony WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_call(socket, state, sip_number))
}

async fn handle_call(socket: WebSocket, app_state: Arc<AppState>, sip_number: String) {
    let (mut sender, mut receiver) = socket.split();

    let tenant = match app_state.directory.get_config(&sip_number).await {
        Ok(Some(tenant)) => tenant,
        Ok(None) => {
            warn!(sip_number = %sip_number, "No client for dialed number, rejecting call");
            let _ = sender
                .send(close_message(CLOSE_CLIENT_NOT_FOUND, "client not found"))
                .await;
            return;
        }
        Err(e) => {
            error!(sip_number = %sip_number, "Client directory lookup failed: {}", e);
            let _ = sender
                .send(close_message(CLOSE_VOICE_SERVER_ERROR, "voice server error"))
                .await;
            return;
        }
    };

    let call_id = Uuid::new_v4().to_string();
    let _call_guard = app_state.begin_call();
    info!(
        sip_number = %sip_number,
        call_id = %call_id,
        client = tenant.client_name.as_deref().unwrap_or("-"),
        "Call accepted"
    );

    let (route_tx, mut route_rx) = mpsc::channel::<TelephonyRoute>(CHANNEL_BUFFER_SIZE);

    // Writer task for outgoing frames
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let result = match route {
                TelephonyRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                TelephonyRoute::Close { code, reason } => {
                    let _ = sender.send(close_message(code, reason)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send telephony frame: {}", e);
                break;
            }
        }
    });

    let transcoder = Arc::new(Mutex::new(AudioTranscoder::new()));
    let (stream_id_tx, stream_id_rx) = watch::channel::<Option<String>>(None);

    let (worker, outputs) = SpeechSessionWorker::new(
        call_id.clone(),
        tenant,
        app_state.config.session.clone(),
        app_state.connector.clone(),
    );

    let worker_task = tokio::spawn({
        let worker = worker.clone();
        async move {
            if let Err(e) = worker.connect_and_run().await {
                error!(call_id = %worker.call_id(), "Speech session ended with error: {}", e);
            }
        }
    });

    let mut drain_task = tokio::spawn(drain_worker_output(
        outputs,
        transcoder.clone(),
        stream_id_rx,
        route_tx.clone(),
        call_id.clone(),
    ));

    let mut malformed_frames: u64 = 0;

    loop {
        tokio::select! {
            msg_result = receiver.next() => {
                let msg = match msg_result {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(call_id = %call_id, "Telephony WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(call_id = %call_id, "Telephony WebSocket closed by peer");
                        break;
                    }
                };

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => {
                        info!(call_id = %call_id, "Telephony close received");
                        break;
                    }
                    Message::Binary(data) => {
                        debug!(call_id = %call_id, "Ignoring binary frame: {} bytes", data.len());
                        continue;
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                let event = match TelephonyEvent::parse(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        malformed_frames += 1;
                        debug!(call_id = %call_id, "Dropping unparseable frame: {}", e);
                        continue;
                    }
                };

                match event {
                    TelephonyEvent::Media { payload } => {
                        let Some(frame) = decode_base64_payload(&payload) else {
                            malformed_frames += 1;
                            debug!(call_id = %call_id, "Dropping undecodable media payload");
                            continue;
                        };
                        let pcm = transcoder.lock().uplink(&frame);
                        if let Some(pcm) = pcm {
                            worker.send_audio(&pcm).await;
                        }
                    }
                    TelephonyEvent::Start { stream_id, media_format } => {
                        let encoding = media_format.and_then(|f| f.encoding);
                        if let Some(encoding) = encoding.as_deref()
                            && encoding != EXPECTED_ENCODING
                        {
                            warn!(call_id = %call_id, encoding, "Unexpected media encoding, treating as μ-law");
                        }
                        info!(call_id = %call_id, stream_id = ?stream_id, "Media stream started");
                        if stream_id.is_some() {
                            stream_id_tx.send_replace(stream_id);
                        }
                    }
                    TelephonyEvent::Connected => {
                        debug!(call_id = %call_id, "Telephony connected");
                    }
                    TelephonyEvent::Mark { name } => {
                        debug!(call_id = %call_id, mark = %name, "Mark received");
                    }
                    TelephonyEvent::Stop => {
                        info!(call_id = %call_id, "Media stream stopped");
                        break;
                    }
                    TelephonyEvent::Unknown(name) => {
                        debug!(call_id = %call_id, event = %name, "Ignoring telephony event");
                    }
                }
            }

            _ = &mut drain_task => {
                debug!(call_id = %call_id, "Speech output ended");
                break;
            }
        }
    }

    // Cleanup
    worker.shutdown();
    worker_task.abort();
    drain_task.abort();
    transcoder.lock().clear();

    if malformed_frames > 0 {
        warn!(call_id = %call_id, malformed_frames, "Dropped malformed telephony frames");
    }

    let (code, reason) = if worker.state() == SpeechSessionState::Failed {
        (CLOSE_VOICE_SERVER_ERROR, "voice server error")
    } else {
        (CLOSE_NORMAL, "call ended")
    };
    let _ = route_tx.send(TelephonyRoute::Close { code, reason }).await;
    if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }

    info!(call_id = %call_id, sip_number = %sip_number, "Call terminated");
}

/// Turn worker output into telephony frames.
///
/// Audio and flush signals arrive on one channel, so a flush is always
/// applied before any audio produced after it.
async fn drain_worker_output(
    mut outputs: mpsc::UnboundedReceiver<WorkerOutput>,
    transcoder: Arc<Mutex<AudioTranscoder>>,
    stream_id: watch::Receiver<Option<String>>,
    route_tx: mpsc::Sender<TelephonyRoute>,
    call_id: String,
) {
    while let Some(output) = outputs.recv().await {
        match output {
            WorkerOutput::Audio(pcm) => {
                let chunks = transcoder.lock().downlink(&pcm);
                if chunks.is_empty() {
                    continue;
                }
                let Some(sid) = stream_id.borrow().clone() else {
                    debug!(call_id = %call_id, chunks = chunks.len(), "No stream id yet, dropping agent audio");
                    continue;
                };
                for chunk in chunks {
                    let frame = TelephonyOutgoing::Media {
                        stream_id: sid.clone(),
                        media: OutgoingMedia {
                            payload: BASE64_STANDARD.encode(&chunk),
                        },
                    };
                    if route_tx.send(TelephonyRoute::Outgoing(frame)).await.is_err() {
                        return;
                    }
                }
            }
            WorkerOutput::Flush => {
                transcoder.lock().clear();
                let sid = stream_id.borrow().clone();
                if let Some(stream_id) = sid {
                    let clear = TelephonyOutgoing::Clear { stream_id };
                    if route_tx.send(TelephonyRoute::Outgoing(clear)).await.is_err() {
                        return;
                    }
                }
                debug!(call_id = %call_id, "Telephony audio flushed");
            }
            WorkerOutput::Failed(reason) => {
                error!(call_id = %call_id, reason = %reason, "Speech session failed, closing call");
                let _ = route_tx
                    .send(TelephonyRoute::Close {
                        code: CLOSE_VOICE_SERVER_ERROR,
                        reason: "voice server error",
                    })
                    .await;
                return;
            }
        }
    }
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}
