//! Speech-service session worker.
//!
//! One [`SpeechSessionWorker`] owns the speech side of one call. It connects
//! and configures the session, consumes service events, tracks who is speaking,
//! executes barge-in and reconnects with backoff until the retry budget runs out.
//! Everything it produces for the caller goes out on one ordered
//! [`WorkerOutput`] channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::prelude::*;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{SessionTuning, build_session_config};
use crate::core::realtime::{
    ClientEvent, ConnectRequest, RealtimeError, RealtimeResult, ResponseConfig, ServerEvent,
    SpeechConnector, SpeechLink, SpeechSessionState,
};
use crate::directory::TenantConfig;

/// How long a control event may wait for room on a congested link.
const CONTROL_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// What the worker hands to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutput {
    /// Agent audio, PCM16 at the service rate
    Audio(Bytes),
    /// Discard all buffered agent audio (barge-in)
    Flush,
    /// Reconnect budget exhausted; the call cannot continue
    Failed(String),
}

/// Why a live link stopped.
enum LinkEnd {
    Shutdown,
    Dropped(String),
}

#[derive(Debug, Default)]
struct TurnTracker {
    grace_until: Option<Instant>,
    last_speech_started: Option<Instant>,
    current_response: Option<String>,
    cancelled_response: Option<String>,
}

impl TurnTracker {
    fn reset(&mut self, grace: Duration) {
        *self = Self {
            grace_until: Some(Instant::now() + grace),
            ..Self::default()
        };
    }
}

struct Inner {
    call_id: String,
    tenant: Arc<TenantConfig>,
    tuning: SessionTuning,
    connector: Arc<dyn SpeechConnector>,
    state: watch::Sender<SpeechSessionState>,
    output: mpsc::UnboundedSender<WorkerOutput>,
    link_tx: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    control_tx: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
    turn: Mutex<TurnTracker>,
    cancel: CancellationToken,
    started: AtomicBool,
}

/// Speech-service session for one call.
///
/// Cheap to clone; every clone drives the same session. One task runs
/// [`connect_and_run`](Self::connect_and_run) while others call
/// [`send_audio`](Self::send_audio), [`trigger_barge_in`](Self::trigger_barge_in)
/// and [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct SpeechSessionWorker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SpeechSessionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSessionWorker")
            .field("call_id", &self.inner.call_id)
            .field("state", &self.state())
            .finish()
    }
}

impl SpeechSessionWorker {
    /// Create a worker and the receiver for its outputs.
    pub fn new(
        call_id: impl Into<String>,
        tenant: Arc<TenantConfig>,
        tuning: SessionTuning,
        connector: Arc<dyn SpeechConnector>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerOutput>) {
        let (output, output_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SpeechSessionState::Connecting);
        let worker = Self {
            inner: Arc::new(Inner {
                call_id: call_id.into(),
                tenant,
                tuning,
                connector,
                state,
                output,
                link_tx: Mutex::new(None),
                control_tx: Mutex::new(None),
                turn: Mutex::new(TurnTracker::default()),
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
        };
        (worker, output_rx)
    }

    pub fn call_id(&self) -> &str {
        &self.inner.call_id
    }

    pub fn state(&self) -> SpeechSessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SpeechSessionState> {
        self.inner.state.subscribe()
    }

    /// Connect, configure and consume service events until shutdown.
    ///
    /// Returns `Ok` on shutdown and `Err` once the reconnect budget is spent,
    /// after the state has moved to `Failed` and [`WorkerOutput::Failed`] was sent.
    pub async fn connect_and_run(&self) -> RealtimeResult<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(RealtimeError::SessionError(
                "session worker is already running".to_string(),
            ));
        }

        let reconnect = &self.inner.tuning.reconnect;
        let mut attempt: u32 = 0;
        let mut greeted = false;

        loop {
            if self.inner.cancel.is_cancelled() {
                return Ok(());
            }
            self.transition(|s| !s.is_terminal(), SpeechSessionState::Connecting);

            let reason = match self.open_session().await {
                Ok(link) => {
                    attempt = 0;
                    match self.run_link(link, &mut greeted).await {
                        LinkEnd::Shutdown => return Ok(()),
                        LinkEnd::Dropped(reason) => reason,
                    }
                }
                Err(_) if self.inner.cancel.is_cancelled() => return Ok(()),
                Err(e) => e.to_string(),
            };

            if self.inner.cancel.is_cancelled() {
                return Ok(());
            }
            attempt += 1;
            if !reconnect.should_retry(attempt) {
                return Err(self.fail(reason, attempt));
            }

            let delay = Duration::from_millis(reconnect.calculate_delay(attempt));
            warn!(
                call_id = %self.inner.call_id,
                attempt,
                max_attempts = reconnect.max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Speech service connection lost, retrying"
            );

            tokio::select! {
                _ = self.inner.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Forward one uplink chunk. Returns `false` when the session is not active.
    pub async fn send_audio(&self, pcm: &[u8]) -> bool {
        if pcm.is_empty() || !self.state().is_active() {
            return false;
        }
        let Some(sender) = self.inner.link_tx.lock().clone() else {
            return false;
        };
        if sender.send(ClientEvent::audio_append(pcm)).await.is_err() {
            debug!(call_id = %self.inner.call_id, "Audio dropped, link closed");
            return false;
        }
        true
    }

    /// Interrupt the agent if it is speaking.
    ///
    /// Idempotent: only the call that moves the state from `AgentSpeaking` to
    /// `UserSpeaking` dispatches the cancel and the flush; it returns `true`.
    pub fn trigger_barge_in(&self) -> bool {
        let interrupted = self.inner.state.send_if_modified(|state| {
            if *state == SpeechSessionState::AgentSpeaking {
                *state = SpeechSessionState::UserSpeaking;
                true
            } else {
                false
            }
        });
        if !interrupted {
            return false;
        }

        let cancelled = {
            let mut turn = self.inner.turn.lock();
            let current = turn.current_response.take();
            if current.is_some() {
                turn.cancelled_response = current.clone();
            }
            current
        };

        // Neither send blocks the event loop
        self.send_control(ClientEvent::ResponseCancel);
        let _ = self.inner.output.send(WorkerOutput::Flush);

        info!(
            call_id = %self.inner.call_id,
            response_id = cancelled.as_deref().unwrap_or("-"),
            "Barge-in: agent response cancelled"
        );
        true
    }

    /// Queue a control event on the live link.
    ///
    /// Goes straight onto the link when it has room, so it keeps its place
    /// relative to audio. A full link hands the event to the control task.
    fn send_control(&self, event: ClientEvent) {
        let call_id = &self.inner.call_id;
        let Some(link) = self.inner.link_tx.lock().clone() else {
            debug!(call_id = %call_id, event_type = event.event_type(), "No live link for control event");
            return;
        };
        let event = match link.try_send(event) {
            Ok(()) => return,
            Err(TrySendError::Closed(event)) => {
                debug!(call_id = %call_id, event_type = event.event_type(), "Link closed, control event dropped");
                return;
            }
            Err(TrySendError::Full(event)) => event,
        };
        debug!(call_id = %call_id, event_type = event.event_type(), "Link full, deferring control event");
        if let Some(control) = self.inner.control_tx.lock().as_ref()
            && control.send(event).is_err()
        {
            warn!(call_id = %call_id, "Control task gone, event dropped");
        }
    }

    /// Request termination. Safe from any state, any number of times.
    pub fn shutdown(&self) {
        let changed = self.inner.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = SpeechSessionState::Closing;
                true
            }
        });
        self.inner.cancel.cancel();
        self.inner.link_tx.lock().take();
        self.inner.control_tx.lock().take();
        if changed {
            info!(call_id = %self.inner.call_id, "Speech session shutting down");
        }
    }

    fn transition(&self, allowed: impl Fn(&SpeechSessionState) -> bool, to: SpeechSessionState) {
        let call_id = &self.inner.call_id;
        self.inner.state.send_if_modified(|state| {
            if *state == to || !allowed(&*state) {
                return false;
            }
            debug!(call_id = %call_id, from = %state, to = %to, "Session state change");
            *state = to;
            true
        });
    }

    fn fail(&self, reason: String, attempts: u32) -> RealtimeError {
        error!(
            call_id = %self.inner.call_id,
            attempts,
            reason = %reason,
            "Speech service unreachable, giving up"
        );
        self.transition(|s| *s != SpeechSessionState::Closing, SpeechSessionState::Failed);
        let _ = self.inner.output.send(WorkerOutput::Failed(reason.clone()));
        RealtimeError::ConnectionFailed(reason)
    }

    /// Connect and wait for the session acknowledgment, bounded by the connect timeout.
    async fn open_session(&self) -> RealtimeResult<SpeechLink> {
        let request = ConnectRequest {
            model: self.inner.tenant.model.clone(),
            call_id: self.inner.call_id.clone(),
        };
        let timeout = self.inner.tuning.connect_timeout();

        let handshake = async {
            let mut link = self.inner.connector.connect(&request).await?;
            let session = build_session_config(&self.inner.tenant);
            link.outgoing
                .send(ClientEvent::SessionUpdate {
                    session: Box::new(session),
                })
                .await
                .map_err(|_| RealtimeError::NotConnected)?;

            loop {
                match link.incoming.recv().await {
                    Some(Ok(ServerEvent::SessionUpdated { session })) => {
                        info!(
                            call_id = %self.inner.call_id,
                            session_id = %session.id,
                            "Speech session configured"
                        );
                        return Ok(link);
                    }
                    Some(Ok(ServerEvent::Error { error })) => {
                        return Err(RealtimeError::ProviderError(error.message));
                    }
                    Some(Ok(other)) => {
                        trace!(call_id = %self.inner.call_id, ?other, "Event before session ack");
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(RealtimeError::ConnectionFailed(
                            "connection closed before session was configured".to_string(),
                        ));
                    }
                }
            }
        };

        tokio::select! {
            _ = self.inner.cancel.cancelled() => {
                Err(RealtimeError::SessionError("shutdown requested".to_string()))
            }
            result = tokio::time::timeout(timeout, handshake) => match result {
                Ok(result) => result,
                Err(_) => Err(RealtimeError::Timeout(format!(
                    "session not ready after {}ms",
                    timeout.as_millis()
                ))),
            },
        }
    }

    async fn run_link(&self, mut link: SpeechLink, greeted: &mut bool) -> LinkEnd {
        *self.inner.link_tx.lock() = Some(link.outgoing.clone());
        let control_task = self.spawn_control_task(link.outgoing.clone());
        self.inner.turn.lock().reset(self.inner.tuning.grace_period());
        self.transition(|s| *s == SpeechSessionState::Connecting, SpeechSessionState::ActiveIdle);

        let greeting = if *greeted {
            None
        } else {
            self.inner.tenant.greeting_text().map(str::to_string)
        };
        let greeting_at =
            Instant::now() + Duration::from_millis(self.inner.tenant.greeting_delay_ms);
        let mut greeting_pending = greeting.is_some();
        let outgoing = link.outgoing.clone();

        let end = loop {
            tokio::select! {
                biased;

                _ = self.inner.cancel.cancelled() => break LinkEnd::Shutdown,

                _ = tokio::time::sleep_until(greeting_at), if greeting_pending => {
                    greeting_pending = false;
                    *greeted = true;
                    if let Some(text) = greeting.as_deref() {
                        self.send_greeting(&outgoing, text).await;
                    }
                }

                event = link.incoming.recv() => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => break LinkEnd::Dropped(e.to_string()),
                    None => break LinkEnd::Dropped("speech service closed the connection".to_string()),
                },
            }
        };

        self.inner.link_tx.lock().take();
        self.inner.control_tx.lock().take();
        control_task.abort();
        link.close();
        end
    }

    /// Forward control events for one link in order.
    ///
    /// Caller audio may fill the link queue; control events wait for room
    /// here instead of being dropped or stalling the event loop.
    fn spawn_control_task(&self, outgoing: mpsc::Sender<ClientEvent>) -> JoinHandle<()> {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ClientEvent>();
        *self.inner.control_tx.lock() = Some(control_tx);
        let call_id = self.inner.call_id.clone();

        tokio::spawn(async move {
            while let Some(event) = control_rx.recv().await {
                let event_type = event.event_type();
                match outgoing.send_timeout(event, CONTROL_SEND_TIMEOUT).await {
                    Ok(()) => debug!(call_id = %call_id, event_type, "Control event sent"),
                    Err(SendTimeoutError::Timeout(_)) => {
                        warn!(call_id = %call_id, event_type, "Control event timed out, link congested");
                    }
                    Err(SendTimeoutError::Closed(_)) => break,
                }
            }
        })
    }

    async fn send_greeting(&self, outgoing: &mpsc::Sender<ClientEvent>, text: &str) {
        let event = ClientEvent::ResponseCreate {
            response: Some(ResponseConfig {
                modalities: None,
                instructions: Some(format!("Greet the caller by saying: {text}")),
            }),
        };
        if outgoing.send(event).await.is_err() {
            warn!(call_id = %self.inner.call_id, "Greeting not sent, link closed");
            return;
        }
        // The greeting's echo must not read as the caller speaking
        self.inner.turn.lock().grace_until =
            Some(Instant::now() + self.inner.tuning.grace_period());
        info!(call_id = %self.inner.call_id, "Greeting requested");
    }

    fn handle_event(&self, event: ServerEvent) {
        let call_id = &self.inner.call_id;
        match event {
            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                let now = Instant::now();
                {
                    let mut turn = self.inner.turn.lock();
                    if turn.grace_until.is_some_and(|until| now < until) {
                        debug!(call_id = %call_id, audio_start_ms, "Speech start ignored during grace period");
                        return;
                    }
                    let debounce = self.inner.tuning.debounce();
                    if turn
                        .last_speech_started
                        .is_some_and(|last| now.duration_since(last) < debounce)
                    {
                        debug!(call_id = %call_id, audio_start_ms, "Speech start debounced");
                        return;
                    }
                    turn.last_speech_started = Some(now);
                }

                if !self.trigger_barge_in() {
                    self.transition(
                        |s| *s == SpeechSessionState::ActiveIdle,
                        SpeechSessionState::UserSpeaking,
                    );
                }
            }

            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                debug!(call_id = %call_id, audio_end_ms, "Caller stopped speaking");
                self.transition(
                    |s| *s == SpeechSessionState::UserSpeaking,
                    SpeechSessionState::ActiveIdle,
                );
            }

            ServerEvent::ResponseCreated { response } => {
                debug!(call_id = %call_id, response_id = %response.id, "Response created");
                if !response.id.is_empty() {
                    self.inner.turn.lock().current_response = Some(response.id);
                }
            }

            ServerEvent::AudioDelta {
                response_id, delta, ..
            } => self.handle_audio_delta(response_id, &delta),

            ServerEvent::AudioDone { response_id } => {
                debug!(call_id = %call_id, response_id = %response_id, "Response audio complete");
            }

            ServerEvent::AudioTranscriptDone {
                response_id,
                transcript,
            } => {
                info!(call_id = %call_id, response_id = %response_id, transcript = %transcript, "Agent said");
                self.finish_response(&response_id);
            }

            ServerEvent::ResponseDone { response } => {
                debug!(call_id = %call_id, response_id = %response.id, status = %response.status, "Response done");
                self.finish_response(&response.id);
            }

            ServerEvent::TranscriptionCompleted { transcript, .. } => {
                info!(call_id = %call_id, transcript = %transcript, "Caller said");
            }

            ServerEvent::Error { error } => {
                warn!(
                    call_id = %call_id,
                    error_type = %error.error_type,
                    code = error.code.as_deref().unwrap_or("-"),
                    "Speech service error: {}",
                    error.message
                );
            }

            ServerEvent::AudioTranscriptDelta { .. }
            | ServerEvent::SessionCreated { .. }
            | ServerEvent::SessionUpdated { .. }
            | ServerEvent::Unknown => {
                trace!(call_id = %call_id, "Ignoring service event");
            }
        }
    }

    fn handle_audio_delta(&self, response_id: String, delta: &str) {
        {
            let mut turn = self.inner.turn.lock();
            if !response_id.is_empty() && turn.cancelled_response.as_deref() == Some(response_id.as_str()) {
                trace!(call_id = %self.inner.call_id, response_id = %response_id, "Dropping audio of cancelled response");
                return;
            }
            if !response_id.is_empty() {
                turn.current_response = Some(response_id);
            }
        }

        let audio = match BASE64_STANDARD.decode(delta) {
            Ok(audio) if !audio.is_empty() => audio,
            Ok(_) => return,
            Err(e) => {
                warn!(call_id = %self.inner.call_id, "Undecodable audio delta: {}", e);
                return;
            }
        };

        self.transition(
            |s| matches!(s, SpeechSessionState::ActiveIdle | SpeechSessionState::UserSpeaking),
            SpeechSessionState::AgentSpeaking,
        );
        let _ = self.inner.output.send(WorkerOutput::Audio(Bytes::from(audio)));
    }

    fn finish_response(&self, response_id: &str) {
        {
            let mut turn = self.inner.turn.lock();
            if turn.current_response.as_deref() == Some(response_id) {
                turn.current_response = None;
            }
        }
        self.transition(
            |s| *s == SpeechSessionState::AgentSpeaking,
            SpeechSessionState::ActiveIdle,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    use crate::core::realtime::{ApiError, ReconnectionConfig};
    use crate::core::realtime::messages::{Response, Session};

    const WAIT: Duration = Duration::from_secs(2);

    /// Remote half of a fake service connection.
    struct RemoteEnd {
        from_worker: mpsc::Receiver<ClientEvent>,
        to_worker: mpsc::Sender<RealtimeResult<ServerEvent>>,
    }

    impl RemoteEnd {
        async fn recv(&mut self) -> ClientEvent {
            tokio::time::timeout(WAIT, self.from_worker.recv())
                .await
                .expect("timed out waiting for client event")
                .expect("worker closed the link")
        }

        async fn send(&self, event: ServerEvent) {
            self.to_worker.send(Ok(event)).await.unwrap();
        }

        async fn ack_session(&mut self) {
            assert!(matches!(self.recv().await, ClientEvent::SessionUpdate { .. }));
            self.send(ServerEvent::SessionUpdated {
                session: Session {
                    id: "sess_1".to_string(),
                    model: None,
                },
            })
            .await;
        }
    }

    struct FakeConnector {
        fail: bool,
        attempts: AtomicU32,
        attempt_times: Mutex<Vec<Instant>>,
        remotes: mpsc::UnboundedSender<RemoteEnd>,
    }

    impl FakeConnector {
        fn new(fail: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
            let (remotes, remotes_rx) = mpsc::unbounded_channel();
            let connector = Arc::new(Self {
                fail,
                attempts: AtomicU32::new(0),
                attempt_times: Mutex::new(Vec::new()),
                remotes,
            });
            (connector, remotes_rx)
        }
    }

    #[async_trait]
    impl SpeechConnector for FakeConnector {
        async fn connect(&self, _request: &ConnectRequest) -> RealtimeResult<SpeechLink> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.attempt_times.lock().push(Instant::now());
            if self.fail {
                return Err(RealtimeError::ConnectionFailed("refused".to_string()));
            }
            let (out_tx, out_rx) = mpsc::channel(64);
            let (in_tx, in_rx) = mpsc::channel(64);
            let _ = self.remotes.send(RemoteEnd {
                from_worker: out_rx,
                to_worker: in_tx,
            });
            Ok(SpeechLink::new(out_tx, in_rx))
        }
    }

    fn quick_tuning() -> SessionTuning {
        SessionTuning {
            connect_timeout_ms: 1_000,
            grace_period_ms: 0,
            debounce_ms: 0,
            reconnect: ReconnectionConfig {
                max_attempts: 2,
                initial_delay_ms: 10,
                max_delay_ms: 40,
                backoff_multiplier: 2.0,
                jitter: true,
            },
        }
    }

    fn audio_delta(response_id: &str, bytes: &[u8]) -> ServerEvent {
        ServerEvent::AudioDelta {
            response_id: response_id.to_string(),
            item_id: String::new(),
            delta: BASE64_STANDARD.encode(bytes),
        }
    }

    fn speech_started() -> ServerEvent {
        ServerEvent::SpeechStarted {
            audio_start_ms: 0,
            item_id: String::new(),
        }
    }

    async fn next_output(outputs: &mut mpsc::UnboundedReceiver<WorkerOutput>) -> WorkerOutput {
        tokio::time::timeout(WAIT, outputs.recv())
            .await
            .expect("timed out waiting for worker output")
            .expect("output channel closed")
    }

    async fn wait_state(worker: &SpeechSessionWorker, wanted: SpeechSessionState) {
        let mut rx = worker.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == wanted))
            .await
            .expect("timed out waiting for state")
            .unwrap();
    }

    struct Running {
        worker: SpeechSessionWorker,
        outputs: mpsc::UnboundedReceiver<WorkerOutput>,
        remote: RemoteEnd,
        remotes: mpsc::UnboundedReceiver<RemoteEnd>,
        task: tokio::task::JoinHandle<RealtimeResult<()>>,
    }

    async fn start(tenant: TenantConfig, tuning: SessionTuning) -> Running {
        let (connector, mut remotes) = FakeConnector::new(false);
        let (worker, outputs) =
            SpeechSessionWorker::new("call-test", Arc::new(tenant), tuning, connector);
        let runner = worker.clone();
        let task = tokio::spawn(async move { runner.connect_and_run().await });

        let mut remote = tokio::time::timeout(WAIT, remotes.recv())
            .await
            .unwrap()
            .unwrap();
        remote.ack_session().await;
        wait_state(&worker, SpeechSessionState::ActiveIdle).await;

        Running {
            worker,
            outputs,
            remote,
            remotes,
            task,
        }
    }

    #[tokio::test]
    async fn test_session_becomes_active_after_ack() {
        let (connector, mut remotes) = FakeConnector::new(false);
        let (worker, _outputs) = SpeechSessionWorker::new(
            "call-1",
            Arc::new(TenantConfig::default()),
            quick_tuning(),
            connector,
        );
        assert_eq!(worker.state(), SpeechSessionState::Connecting);

        let runner = worker.clone();
        let task = tokio::spawn(async move { runner.connect_and_run().await });
        let mut remote = remotes.recv().await.unwrap();

        match remote.recv().await {
            ClientEvent::SessionUpdate { session } => {
                assert_eq!(
                    session.voice.unwrap().name,
                    "en-US-Andrew:DragonHDLatestNeural"
                );
            }
            other => panic!("expected session.update, got {other:?}"),
        }
        // Not active until acknowledged
        assert_eq!(worker.state(), SpeechSessionState::Connecting);
        assert!(!worker.send_audio(&[1, 2]).await);

        remote
            .send(ServerEvent::SessionUpdated {
                session: Session::default(),
            })
            .await;
        wait_state(&worker, SpeechSessionState::ActiveIdle).await;

        assert!(worker.send_audio(&[1, 2]).await);
        assert!(matches!(
            remote.recv().await,
            ClientEvent::InputAudioBufferAppend { .. }
        ));

        worker.shutdown();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_barge_in_cancels_and_flushes() {
        let mut run = start(TenantConfig::default(), quick_tuning()).await;

        run.remote.send(audio_delta("resp_1", &[1, 1])).await;
        assert_eq!(
            next_output(&mut run.outputs).await,
            WorkerOutput::Audio(Bytes::from_static(&[1, 1]))
        );
        assert_eq!(run.worker.state(), SpeechSessionState::AgentSpeaking);

        run.remote.send(speech_started()).await;
        assert!(matches!(run.remote.recv().await, ClientEvent::ResponseCancel));
        assert_eq!(next_output(&mut run.outputs).await, WorkerOutput::Flush);
        assert_eq!(run.worker.state(), SpeechSessionState::UserSpeaking);

        // Late audio of the cancelled response is dropped, a new response plays
        run.remote.send(audio_delta("resp_1", &[2, 2])).await;
        run.remote.send(audio_delta("resp_2", &[3, 3])).await;
        assert_eq!(
            next_output(&mut run.outputs).await,
            WorkerOutput::Audio(Bytes::from_static(&[3, 3]))
        );
        assert_eq!(run.worker.state(), SpeechSessionState::AgentSpeaking);

        run.worker.shutdown();
        run.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_trigger_barge_in_is_idempotent() {
        let mut run = start(TenantConfig::default(), quick_tuning()).await;
        assert!(!run.worker.trigger_barge_in());

        run.remote.send(audio_delta("resp_1", &[5, 5])).await;
        next_output(&mut run.outputs).await;

        assert!(run.worker.trigger_barge_in());
        assert!(!run.worker.trigger_barge_in());
        assert!(run.worker.send_audio(&[9, 9]).await);

        // Exactly one cancel precedes the audio append
        assert!(matches!(run.remote.recv().await, ClientEvent::ResponseCancel));
        assert!(matches!(
            run.remote.recv().await,
            ClientEvent::InputAudioBufferAppend { .. }
        ));
        assert_eq!(next_output(&mut run.outputs).await, WorkerOutput::Flush);
        assert!(run.outputs.try_recv().is_err());

        run.worker.shutdown();
    }

    #[tokio::test]
    async fn test_barge_in_cancel_survives_full_link_queue() {
        let mut run = start(TenantConfig::default(), quick_tuning()).await;

        run.remote.send(audio_delta("resp_1", &[1, 1])).await;
        next_output(&mut run.outputs).await;
        assert_eq!(run.worker.state(), SpeechSessionState::AgentSpeaking);

        // Caller audio fills every slot of the link queue
        for _ in 0..64 {
            assert!(run.worker.send_audio(&[3, 3]).await);
        }

        assert!(run.worker.trigger_barge_in());
        assert_eq!(next_output(&mut run.outputs).await, WorkerOutput::Flush);

        let mut appends = 0;
        loop {
            match run.remote.recv().await {
                ClientEvent::InputAudioBufferAppend { .. } => appends += 1,
                ClientEvent::ResponseCancel => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(appends, 64);
        assert_eq!(run.worker.state(), SpeechSessionState::UserSpeaking);

        run.worker.shutdown();
        run.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_grace_period_suppresses_speech_started() {
        let tuning = SessionTuning {
            grace_period_ms: 10_000,
            ..quick_tuning()
        };
        let mut run = start(TenantConfig::default(), tuning).await;

        run.remote.send(audio_delta("resp_1", &[1, 1])).await;
        next_output(&mut run.outputs).await;
        run.remote.send(speech_started()).await;
        run.remote.send(audio_delta("resp_1", &[2, 2])).await;

        // Had the speech start been honored, a flush would come first
        assert_eq!(
            next_output(&mut run.outputs).await,
            WorkerOutput::Audio(Bytes::from_static(&[2, 2]))
        );
        assert_eq!(run.worker.state(), SpeechSessionState::AgentSpeaking);
        run.worker.shutdown();
    }

    #[tokio::test]
    async fn test_debounce_collapses_repeated_speech_started() {
        let tuning = SessionTuning {
            debounce_ms: 10_000,
            ..quick_tuning()
        };
        let mut run = start(TenantConfig::default(), tuning).await;

        run.remote.send(speech_started()).await;
        wait_state(&run.worker, SpeechSessionState::UserSpeaking).await;
        run.remote
            .send(ServerEvent::SpeechStopped {
                audio_end_ms: 0,
                item_id: String::new(),
            })
            .await;
        wait_state(&run.worker, SpeechSessionState::ActiveIdle).await;

        run.remote.send(audio_delta("resp_1", &[1, 1])).await;
        next_output(&mut run.outputs).await;

        // Second start inside the debounce window: no barge-in
        run.remote.send(speech_started()).await;
        run.remote.send(audio_delta("resp_1", &[2, 2])).await;
        assert_eq!(
            next_output(&mut run.outputs).await,
            WorkerOutput::Audio(Bytes::from_static(&[2, 2]))
        );
        assert_eq!(run.worker.state(), SpeechSessionState::AgentSpeaking);
        run.worker.shutdown();
    }

    #[tokio::test]
    async fn test_response_done_returns_to_idle() {
        let mut run = start(TenantConfig::default(), quick_tuning()).await;

        run.remote.send(audio_delta("resp_1", &[1, 1])).await;
        next_output(&mut run.outputs).await;
        run.remote
            .send(ServerEvent::ResponseDone {
                response: Response {
                    id: "resp_1".to_string(),
                    status: "completed".to_string(),
                },
            })
            .await;
        wait_state(&run.worker, SpeechSessionState::ActiveIdle).await;

        run.remote.send(audio_delta("resp_2", &[1, 1])).await;
        next_output(&mut run.outputs).await;
        run.remote
            .send(ServerEvent::AudioTranscriptDone {
                response_id: "resp_2".to_string(),
                transcript: "Hello".to_string(),
            })
            .await;
        wait_state(&run.worker, SpeechSessionState::ActiveIdle).await;
        run.worker.shutdown();
    }

    #[tokio::test]
    async fn test_error_event_keeps_session() {
        let mut run = start(TenantConfig::default(), quick_tuning()).await;
        run.remote
            .send(ServerEvent::Error {
                error: ApiError {
                    error_type: "invalid_request_error".to_string(),
                    code: None,
                    message: "bad".to_string(),
                },
            })
            .await;
        run.remote.send(audio_delta("resp_1", &[4, 4])).await;
        next_output(&mut run.outputs).await;
        assert!(run.worker.state().is_active());
        run.worker.shutdown();
    }

    #[tokio::test]
    async fn test_greeting_sent_after_delay() {
        let tenant = TenantConfig {
            greeting: Some("Welcome to Acme".to_string()),
            greeting_delay_ms: 20,
            ..Default::default()
        };
        let mut run = start(tenant, quick_tuning()).await;

        match run.remote.recv().await {
            ClientEvent::ResponseCreate { response } => {
                assert_eq!(
                    response.unwrap().instructions.as_deref(),
                    Some("Greet the caller by saying: Welcome to Acme")
                );
            }
            other => panic!("expected response.create, got {other:?}"),
        }
        run.worker.shutdown();
    }

    #[tokio::test]
    async fn test_reconnects_after_drop_without_greeting_again() {
        let tenant = TenantConfig {
            greeting: Some("Hi".to_string()),
            greeting_delay_ms: 0,
            ..Default::default()
        };
        let mut run = start(tenant, quick_tuning()).await;
        assert!(matches!(
            run.remote.recv().await,
            ClientEvent::ResponseCreate { .. }
        ));

        drop(run.remote);
        let mut second = tokio::time::timeout(WAIT, run.remotes.recv())
            .await
            .unwrap()
            .unwrap();
        second.ack_session().await;
        wait_state(&run.worker, SpeechSessionState::ActiveIdle).await;

        assert!(run.worker.send_audio(&[7, 7]).await);
        assert!(matches!(
            second.recv().await,
            ClientEvent::InputAudioBufferAppend { .. }
        ));
        run.worker.shutdown();
        run.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_always_failing_connection_ends_failed() {
        let (connector, _remotes) = FakeConnector::new(true);
        let tuning = SessionTuning {
            reconnect: ReconnectionConfig {
                max_attempts: 3,
                initial_delay_ms: 20,
                max_delay_ms: 80,
                backoff_multiplier: 2.0,
                jitter: true,
            },
            ..quick_tuning()
        };
        let (min, max) = tuning.reconnect.delay_bounds();
        let (worker, mut outputs) = SpeechSessionWorker::new(
            "call-fail",
            Arc::new(TenantConfig::default()),
            tuning,
            connector.clone(),
        );

        let result = worker.connect_and_run().await;
        assert!(matches!(result, Err(RealtimeError::ConnectionFailed(_))));
        assert_eq!(worker.state(), SpeechSessionState::Failed);
        assert!(matches!(
            outputs.recv().await,
            Some(WorkerOutput::Failed(_))
        ));

        // First attempt plus max_attempts retries
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        let times = connector.attempt_times.lock().clone();
        for pair in times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_millis(min), "gap {gap:?} below {min}ms");
            assert!(
                gap <= Duration::from_millis(max + 250),
                "gap {gap:?} far above {max}ms"
            );
        }

        // Shutdown after failure keeps the failure visible
        worker.shutdown();
        assert_eq!(worker.state(), SpeechSessionState::Failed);
    }

    #[tokio::test]
    async fn test_connect_timeout_counts_as_failure() {
        let (connector, mut remotes) = FakeConnector::new(false);
        let tuning = SessionTuning {
            connect_timeout_ms: 50,
            reconnect: ReconnectionConfig {
                max_attempts: 1,
                initial_delay_ms: 10,
                max_delay_ms: 10,
                backoff_multiplier: 2.0,
                jitter: false,
            },
            ..quick_tuning()
        };
        let (worker, _outputs) = SpeechSessionWorker::new(
            "call-timeout",
            Arc::new(TenantConfig::default()),
            tuning,
            connector.clone(),
        );

        // Hold the remote ends open so only the timeout can fail the handshake
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(remote) = remotes.recv().await {
                held.push(remote);
            }
        });

        let started = Instant::now();
        let result = worker.connect_and_run().await;
        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(worker.state(), SpeechSessionState::Failed);
        holder.abort();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let run = start(TenantConfig::default(), quick_tuning()).await;
        run.worker.shutdown();
        run.worker.shutdown();
        assert_eq!(run.worker.state(), SpeechSessionState::Closing);
        assert!(run.task.await.unwrap().is_ok());
        assert!(!run.worker.send_audio(&[1, 2]).await);
        assert!(!run.worker.trigger_barge_in());
        run.worker.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_before_run() {
        let (connector, _remotes) = FakeConnector::new(false);
        let (worker, _outputs) = SpeechSessionWorker::new(
            "call-early",
            Arc::new(TenantConfig::default()),
            quick_tuning(),
            connector.clone(),
        );
        worker.shutdown();
        assert!(worker.connect_and_run().await.is_ok());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(worker.state(), SpeechSessionState::Closing);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let run = start(TenantConfig::default(), quick_tuning()).await;
        assert!(matches!(
            run.worker.connect_and_run().await,
            Err(RealtimeError::SessionError(_))
        ));
        run.worker.shutdown();
    }
}
