//! Connection seam between the session worker and the speech service.
//!
//! A [`SpeechConnector`] opens one [`SpeechLink`]: a pair of channels carrying
//! [`ClientEvent`]s out and [`ServerEvent`]s in. The production connector
//! drives a WebSocket from a spawned IO task; tests plug in an in-process
//! connector to simulate the service, including connections that always fail.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};

use super::base::{RealtimeError, RealtimeResult};
use super::config::SpeechServiceConfig;
use super::messages::{ClientEvent, ServerEvent};

/// Capacity of the outgoing and incoming event channels.
pub const WS_CHANNEL_CAPACITY: usize = 256;

/// Parameters for one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Model the session runs on
    pub model: String,
    /// Correlation id sent to the service
    pub call_id: String,
}

/// An open connection to the speech service.
///
/// The link is considered dropped once `incoming` yields `None`.
pub struct SpeechLink {
    pub outgoing: mpsc::Sender<ClientEvent>,
    pub incoming: mpsc::Receiver<RealtimeResult<ServerEvent>>,
    io_task: Option<JoinHandle<()>>,
}

impl SpeechLink {
    pub fn new(
        outgoing: mpsc::Sender<ClientEvent>,
        incoming: mpsc::Receiver<RealtimeResult<ServerEvent>>,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            io_task: None,
        }
    }

    /// Attach the task that owns the underlying transport.
    pub fn with_io_task(mut self, task: JoinHandle<()>) -> Self {
        self.io_task = Some(task);
        self
    }

    /// Tear down the transport. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
    }
}

impl Drop for SpeechLink {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SpeechLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechLink")
            .field("has_io_task", &self.io_task.is_some())
            .finish()
    }
}

/// Opens links to the speech service.
#[async_trait]
pub trait SpeechConnector: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> RealtimeResult<SpeechLink>;
}

// =============================================================================
// WebSocket Connector
// =============================================================================

/// Connector speaking the realtime protocol over a WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    service: SpeechServiceConfig,
}

impl WebSocketConnector {
    pub fn new(service: SpeechServiceConfig) -> RealtimeResult<Self> {
        if service.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        // Surface a bad endpoint at startup rather than on the first call
        service.websocket_url("probe")?;
        Ok(Self { service })
    }
}

#[async_trait]
impl SpeechConnector for WebSocketConnector {
    async fn connect(&self, request: &ConnectRequest) -> RealtimeResult<SpeechLink> {
        let model = self.service.resolve_model(&request.model);
        let url = self.service.websocket_url(model)?;

        let mut ws_request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        let headers = ws_request.headers_mut();
        headers.insert(
            "api-key",
            HeaderValue::from_str(&self.service.api_key)
                .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?,
        );
        if let Ok(value) = HeaderValue::from_str(&request.call_id) {
            headers.insert("x-ms-client-request-id", value);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(ws_request)
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        tracing::info!(call_id = %request.call_id, model = %model, "Connected to speech service");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<RealtimeResult<ServerEvent>>(WS_CHANNEL_CAPACITY);

        let call_id = request.call_id.clone();
        let io_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        let Some(event) = outgoing else {
                            // Worker released the link
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break;
                        };
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!(call_id = %call_id, "Failed to send WebSocket message: {}", e);
                            let _ = in_tx.send(Err(RealtimeError::WebSocketError(e.to_string()))).await;
                            break;
                        }
                    }

                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => match ServerEvent::parse(&text) {
                                Ok(event) => {
                                    if in_tx.send(Ok(event)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to parse server event: {}", e);
                                }
                            },
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::info!(call_id = %call_id, ?frame, "WebSocket closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::error!(call_id = %call_id, "WebSocket error: {}", e);
                                let _ = in_tx.send(Err(RealtimeError::WebSocketError(e.to_string()))).await;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            tracing::debug!(call_id = %call_id, "Speech service IO task finished");
        });

        Ok(SpeechLink::new(out_tx, in_rx).with_io_task(io_task))
    }
}
