//! Test Fixtures Module
//!
//! - Audio fixtures (programmatically generated μ-law and PCM16)
//! - Tenant files and server bootstrap
//! - Telephony frame builders

#![allow(dead_code)]

pub mod audio_fixtures;

pub use audio_fixtures::*;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use callbridge_gateway::core::realtime::{ReconnectionConfig, SpeechConnector};
use callbridge_gateway::core::session::SessionTuning;
use callbridge_gateway::directory::{ClientDirectory, FileTenantSource, TenantCache};
use callbridge_gateway::{AppState, ServerConfig, routes};

pub type TelephonyClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const SIP_NUMBER: &str = "+5511999990001";

pub const TENANTS_YAML: &str = r#"
"+5511999990001":
  client_name: "Acme"
  voice: "en-US-Ava:DragonHDLatestNeural"
  instructions: "You answer for Acme."
"#;

/// Timing that keeps tests fast: no grace, no debounce, short backoff.
pub fn quick_tuning() -> SessionTuning {
    SessionTuning {
        connect_timeout_ms: 1_000,
        grace_period_ms: 0,
        debounce_ms: 0,
        reconnect: ReconnectionConfig {
            max_attempts: 2,
            initial_delay_ms: 20,
            max_delay_ms: 80,
            backoff_multiplier: 2.0,
            jitter: true,
        },
    }
}

/// Write `yaml` as the tenants file under `dir`.
pub fn write_tenants(dir: &Path, yaml: &str) -> std::path::PathBuf {
    let path = dir.join("tenants.yaml");
    std::fs::write(&path, yaml).expect("write tenants file");
    path
}

/// Application state over a file directory and the given connector.
pub fn test_state(
    tenants_path: &Path,
    tuning: SessionTuning,
    connector: Arc<dyn SpeechConnector>,
) -> Arc<AppState> {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.session = tuning;

    let directory = Arc::new(ClientDirectory::new(
        Arc::new(FileTenantSource::new(tenants_path)),
        TenantCache::new(Duration::from_secs(60)),
    ));
    AppState::with_parts(config, directory, connector)
}

/// Serve the full router on an ephemeral port.
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::create_app_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Open a telephony media stream for `sip_number`.
pub async fn dial(addr: SocketAddr, sip_number: &str) -> TelephonyClient {
    let url = format!("ws://{addr}/ws/audio/{sip_number}");
    let (client, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("WebSocket upgrade");
    client
}

pub fn start_frame(stream_id: &str) -> Message {
    Message::Text(
        json!({
            "event": "start",
            "streamId": stream_id,
            "start": {"mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}}
        })
        .to_string()
        .into(),
    )
}

pub fn media_frame(mulaw: &[u8]) -> Message {
    Message::Text(
        json!({"event": "media", "media": {"payload": BASE64_STANDARD.encode(mulaw)}})
            .to_string()
            .into(),
    )
}

pub fn stop_frame() -> Message {
    Message::Text(json!({"event": "stop"}).to_string().into())
}

pub async fn send(client: &mut TelephonyClient, message: Message) {
    client.send(message).await.expect("send telephony frame");
}

/// What the bridge sent back to the telephony side.
#[derive(Debug)]
pub enum Inbound {
    Json(Value),
    Closed(Option<u16>),
}

pub async fn next_inbound(client: &mut TelephonyClient) -> Inbound {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(3), client.next())
            .await
            .expect("timed out waiting for bridge frame");
        match next {
            Some(Ok(Message::Text(text))) => {
                return Inbound::Json(serde_json::from_str(&text).expect("JSON frame"));
            }
            Some(Ok(Message::Close(frame))) => {
                return Inbound::Closed(frame.map(|f| u16::from(f.code)));
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return Inbound::Closed(None),
        }
    }
}

/// Read until the bridge closes, returning the close code.
pub async fn expect_close(client: &mut TelephonyClient) -> Option<u16> {
    loop {
        if let Inbound::Closed(code) = next_inbound(client).await {
            return code;
        }
    }
}
