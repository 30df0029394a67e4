//! In-process speech service for integration tests.
//!
//! [`MockSpeechService`] implements the connector seam. Every successful
//! connect hands the test a [`RemoteSession`], the service half of the link,
//! so a test can script `session.updated`, speech and audio events and assert
//! on what the bridge sent.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use callbridge_gateway::core::realtime::{
    ClientEvent, ConnectRequest, RealtimeError, RealtimeResult, ServerEvent, SpeechConnector,
    SpeechLink,
};

pub const WAIT: Duration = Duration::from_secs(3);

/// Service half of one link.
pub struct RemoteSession {
    pub request: ConnectRequest,
    from_bridge: mpsc::Receiver<ClientEvent>,
    to_bridge: mpsc::Sender<RealtimeResult<ServerEvent>>,
}

impl RemoteSession {
    /// Next event the bridge sent.
    pub async fn recv(&mut self) -> ClientEvent {
        tokio::time::timeout(WAIT, self.from_bridge.recv())
            .await
            .expect("timed out waiting for bridge event")
            .expect("bridge closed the link")
    }

    /// Skip audio appends until an event of another kind arrives.
    pub async fn recv_control(&mut self) -> ClientEvent {
        loop {
            let event = self.recv().await;
            if !matches!(event, ClientEvent::InputAudioBufferAppend { .. }) {
                return event;
            }
        }
    }

    /// Send a raw server event.
    pub async fn send_json(&self, json: serde_json::Value) {
        let event = ServerEvent::parse(&json.to_string()).expect("valid server event");
        self.to_bridge
            .send(Ok(event))
            .await
            .expect("bridge dropped the link");
    }

    /// Expect `session.update` and acknowledge it.
    pub async fn accept_session(&mut self) {
        match self.recv().await {
            ClientEvent::SessionUpdate { .. } => {}
            other => panic!("expected session.update, got {}", other.event_type()),
        }
        self.send_json(serde_json::json!({
            "type": "session.updated",
            "session": {"id": "sess_mock"}
        }))
        .await;
    }

    pub async fn speech_started(&self) {
        self.send_json(serde_json::json!({
            "type": "input_audio_buffer.speech_started",
            "audio_start_ms": 0,
            "item_id": "item_1"
        }))
        .await;
    }

    pub async fn audio_delta(&self, response_id: &str, pcm: &[u8]) {
        self.send_json(serde_json::json!({
            "type": "response.audio.delta",
            "response_id": response_id,
            "item_id": "item_2",
            "delta": BASE64_STANDARD.encode(pcm)
        }))
        .await;
    }
}

/// Scriptable speech service.
pub struct MockSpeechService {
    refuse: bool,
    connects: AtomicU32,
    connect_times: Mutex<Vec<Instant>>,
    sessions: mpsc::UnboundedSender<RemoteSession>,
}

impl MockSpeechService {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteSession>) {
        Self::build(false)
    }

    /// A service that refuses every connection.
    pub fn refusing() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteSession>) {
        Self::build(true)
    }

    fn build(refuse: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteSession>) {
        let (sessions, sessions_rx) = mpsc::unbounded_channel();
        let service = Arc::new(Self {
            refuse,
            connects: AtomicU32::new(0),
            connect_times: Mutex::new(Vec::new()),
            sessions,
        });
        (service, sessions_rx)
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().clone()
    }
}

#[async_trait]
impl SpeechConnector for MockSpeechService {
    async fn connect(&self, request: &ConnectRequest) -> RealtimeResult<SpeechLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connect_times.lock().push(Instant::now());
        if self.refuse {
            return Err(RealtimeError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }

        let (out_tx, out_rx) = mpsc::channel(256);
        let (in_tx, in_rx) = mpsc::channel(256);
        let _ = self.sessions.send(RemoteSession {
            request: request.clone(),
            from_bridge: out_rx,
            to_bridge: in_tx,
        });
        Ok(SpeechLink::new(out_tx, in_rx))
    }
}

/// Wait for the next link the bridge opens.
pub async fn next_session(
    sessions: &mut mpsc::UnboundedReceiver<RemoteSession>,
) -> RemoteSession {
    tokio::time::timeout(WAIT, sessions.recv())
        .await
        .expect("timed out waiting for a speech connection")
        .expect("mock service dropped")
}
